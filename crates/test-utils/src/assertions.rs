//! Test assertion helpers.

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Asserts every element is strictly greater than the one before it.
///
/// # Panics
///
/// Panics naming the first offending index and pair.
///
/// # Example
///
/// ```
/// use sqlkv_test_utils::assert_strictly_increasing;
///
/// assert_strictly_increasing(&[1, 2, 5, 9]);
/// ```
#[track_caller]
pub fn assert_strictly_increasing<T: Ord + Debug>(values: &[T]) {
    if let Some(i) = values.windows(2).position(|w| w[0] >= w[1]) {
        panic!(
            "sequence not strictly increasing at index {}: {:?} then {:?}",
            i + 1,
            values[i],
            values[i + 1]
        );
    }
}

/// Polls a condition until it returns true or the timeout expires.
///
/// Returns `true` if the condition held before the timeout.
pub fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(DEFAULT_POLL_INTERVAL);
    }
    condition()
}
