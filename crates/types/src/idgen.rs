//! Random primary keys.
//!
//! Ids are drawn uniformly from `1..2^40`. That keeps them positive, well
//! inside SQLite's 64-bit integer range, and short when printed. Collisions
//! are possible; pair inserts with
//! [`retry_on_key_collision`](../../sqlkv_store/fn.retry_on_key_collision.html).

/// Number of random bits in a generated id.
pub const ID_BITS: u32 = 40;

/// Largest id [`generate_id`] can return.
pub const MAX_ID: i64 = (1 << ID_BITS) - 1;

/// Returns a random id in `1..=MAX_ID`.
///
/// # Example
///
/// ```no_run
/// # use sqlkv_types::idgen;
/// let id = idgen::generate_id();
/// assert!(id > 0 && id <= idgen::MAX_ID);
/// ```
pub fn generate_id() -> i64 {
    loop {
        let id = (rand::random::<u64>() & MAX_ID as u64) as i64;
        if id != 0 {
            return id;
        }
    }
}
