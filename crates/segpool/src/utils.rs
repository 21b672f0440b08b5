//! Utility functions and helpers for segpool
//!
//! - Alignment helpers used by configuration validation
//! - `Backoff` for CAS retry loops

use crate::sync::hint;

/// Checks if a value is a power of two (zero is not)
#[inline(always)]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use segpool::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment));
    (value + alignment - 1) & !(alignment - 1)
}

/// Checks if a value is aligned to the given alignment
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(is_power_of_two(alignment));
    value & (alignment - 1) == 0
}

/// Largest power of two dividing `value` (`value` must be non-zero)
#[inline(always)]
pub const fn power_of_two_factor(value: usize) -> usize {
    debug_assert!(value != 0);
    1 << value.trailing_zeros()
}

/// Backoff utility for spin loops
#[derive(Debug, Clone)]
pub struct Backoff {
    current: u32,
    max: u32,
}

impl Backoff {
    /// Create new backoff with default parameters
    #[inline]
    pub fn new() -> Self {
        Self {
            current: 1,
            max: 64,
        }
    }

    /// Perform backoff
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..self.current {
            hint::spin_loop();
        }
        if self.current < self.max {
            self.current *= 2;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
