//! Bounded retry for inserts with randomly drawn keys.

use sqlkv_types::{Context, config::RetryConfig};

use crate::error::{Error, Result};

/// Runs `operation` until it succeeds, fails with anything other than
/// [`Error::PrimaryKeyConstraint`], or `config.max_attempts` is reached.
///
/// `operation` receives the 1-based attempt number and should draw a fresh
/// key on every call. The context is checked before each attempt.
///
/// # Errors
///
/// Returns the first non-collision error unchanged,
/// [`Error::Cancelled`]/[`Error::DeadlineExceeded`] if `ctx` ends between
/// attempts, or [`Error::RetryExhausted`] wrapping the final collision.
///
/// # Example
///
/// ```no_run
/// # use sqlkv_store::retry_on_key_collision;
/// # use sqlkv_types::{Context, config::RetryConfig, idgen};
/// # fn insert_with(_id: i64) -> sqlkv_store::Result<i64> { Ok(0) }
/// let ctx = Context::background();
/// let id = retry_on_key_collision(&ctx, &RetryConfig::default(), |_| {
///     insert_with(idgen::generate_id())
/// })?;
/// # Ok::<(), sqlkv_store::Error>(())
/// ```
pub fn retry_on_key_collision<R>(
    ctx: &Context,
    config: &RetryConfig,
    mut operation: impl FnMut(u32) -> Result<R>,
) -> Result<R> {
    let mut attempt = 0;
    loop {
        ctx.check()?;
        attempt += 1;
        match operation(attempt) {
            Err(err @ Error::PrimaryKeyConstraint { .. }) => {
                if attempt >= config.max_attempts {
                    return Err(Error::RetryExhausted { attempts: attempt, source: Box::new(err) });
                }
                tracing::debug!(attempt, error = %err, "Primary key collision, retrying");
            },
            result => return result,
        }
    }
}
