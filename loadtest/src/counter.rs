//! The identifier sequence shared by all clients of a profile.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of distinct product identifiers handed out before the sequence wraps around.
pub const ID_CYCLE: u64 = 1000;

/// A process-wide counter used to generate product identifiers for writes.
///
/// Every call to [`next_product_id`](Self::next_product_id) increments the counter exactly once,
/// so concurrent clients never observe the same raw counter value. The derived identifier cycles
/// through `1..=ID_CYCLE`, which means identifiers are reused over a long run.
#[derive(Debug, Default)]
pub struct ProductCounter {
    value: AtomicU64,
}

impl ProductCounter {
    /// Creates a counter starting at the given raw value.
    pub fn starting_at(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// Increments the counter and returns the product identifier derived from the new value.
    pub fn next_product_id(&self) -> u32 {
        let value = self.value.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        product_id_for(value)
    }

    /// The current raw counter value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Maps a raw counter value into `1..=ID_CYCLE`.
pub fn product_id_for(value: u64) -> u32 {
    (value % ID_CYCLE + 1) as u32
}
