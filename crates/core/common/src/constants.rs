//! Shared constants
//!
//! Single source of truth for scale factors and default sizes.

/// Fixed-point scale factor (4 decimal places)
pub const FIXED_POINT_SCALE: i64 = 10_000;
/// Fixed-point scale factor as f64, for edge conversions only
pub const FIXED_POINT_SCALE_F64: f64 = 10_000.0;

/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: u64 = 1_000_000;
/// Nanoseconds per second
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Initial capacity reserved per book side
pub const DEFAULT_BOOK_DEPTH: usize = 32;
/// Initial capacity of the timer heap
pub const DEFAULT_TIMER_CAPACITY: usize = 256;
/// Initial capacity of the instrument tables
pub const DEFAULT_UNIVERSE_CAPACITY: usize = 4_096;

/// Log filter used when neither config nor `RUST_LOG` provides one
pub const DEFAULT_LOG_FILTER: &str = "info";
