//! Tuning knobs for the engine, collected in one place.

/// Number of retired-list shards. Must be a power of two.
pub(crate) const NUM_SHARDS: usize = 8;

/// Capacity of the per-thread record cache.
pub(crate) const TLC_CAPACITY: usize = 8;

/// Base reclamation threshold: a reclamation pass is attempted once at least
/// this many objects are retired, regardless of the record population.
pub(crate) const BASE_THRESHOLD: i64 = 1000;

/// Dynamic threshold multiplier: with many live records a scan is more
/// expensive, so the threshold scales with the record count.
pub(crate) const COUNT_MULTIPLIER: i64 = 2;

const _: () = assert!(NUM_SHARDS.is_power_of_two());
