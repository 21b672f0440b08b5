//! Error types for segpool
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Requested size {size} exceeds the largest size class ({max_class} bytes)")]
    RequestedSizeTooLarge { size: usize, max_class: usize },

    #[error("Memory pool exhausted: no chunk of at least {size} bytes after {attempts} probes")]
    PoolExhausted { size: usize, attempts: usize },

    // --- Deallocation Errors ---
    #[error("Invalid deallocation size {size}: largest size class is {max_class} bytes")]
    InvalidSize { size: usize, max_class: usize },

    #[error(
        "Address {address:#x} (+{size} bytes) is outside the arena [{arena_start:#x}, {arena_end:#x})"
    )]
    AddressOutOfRange {
        address: usize,
        size: usize,
        arena_start: usize,
        arena_end: usize,
    },

    #[error("Address {address:#x} is not on a {align}-byte chunk boundary")]
    MisalignedAddress { address: usize, align: usize },

    // --- Internal Invariant Violations ---
    #[error("Free list {class_index} could not be unlocked (observed head word {observed:#x})")]
    UnlockFailure { class_index: usize, observed: usize },

    // --- Construction Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },
}

impl MemoryError {
    /// Check if error is retryable
    ///
    /// Only exhaustion can clear up on its own, when other threads return
    /// chunks to the pool.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Check if error means the pool state can no longer be trusted
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnlockFailure { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestedSizeTooLarge { .. } => "MEM:ALLOC:TOO_LARGE",
            Self::PoolExhausted { .. } => "MEM:POOL:EXHAUSTED",
            Self::InvalidSize { .. } => "MEM:DEALLOC:SIZE",
            Self::AddressOutOfRange { .. } => "MEM:DEALLOC:RANGE",
            Self::MisalignedAddress { .. } => "MEM:DEALLOC:ALIGN",
            Self::UnlockFailure { .. } => "MEM:POOL:UNLOCK",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::AllocationFailed { .. } => "MEM:ARENA:ALLOC",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create requested size too large error
    pub fn requested_size_too_large(size: usize, max_class: usize) -> Self {
        Self::RequestedSizeTooLarge { size, max_class }
    }

    /// Create pool exhausted error
    pub fn pool_exhausted(size: usize, attempts: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, attempts, "Memory pool exhausted");

        Self::PoolExhausted { size, attempts }
    }

    /// Create invalid deallocation size error
    pub fn invalid_size(size: usize, max_class: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, max_class, "Deallocation size exceeds every size class");

        Self::InvalidSize { size, max_class }
    }

    /// Create address out of range error
    pub fn address_out_of_range(
        address: usize,
        size: usize,
        arena_start: usize,
        arena_end: usize,
    ) -> Self {
        #[cfg(feature = "logging")]
        error!(
            address = format_args!("{address:#x}"),
            size, "Deallocation address outside the arena"
        );

        Self::AddressOutOfRange {
            address,
            size,
            arena_start,
            arena_end,
        }
    }

    /// Create misaligned address error
    pub fn misaligned_address(address: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(
            address = format_args!("{address:#x}"),
            align, "Deallocation address off the chunk grid"
        );

        Self::MisalignedAddress { address, align }
    }

    /// Create unlock failure error
    pub fn unlock_failure(class_index: usize, observed: usize) -> Self {
        Self::UnlockFailure {
            class_index,
            observed,
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "Arena allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory pool operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = MemoryError::requested_size_too_large(2048, 1024);
        assert!(error.to_string().contains("2048"));
        assert!(error.to_string().contains("1024"));

        let error = MemoryError::address_out_of_range(0x10, 64, 0x1000, 0x2000);
        assert!(error.to_string().contains("0x10"));
        assert!(error.to_string().contains("0x2000"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(MemoryError::pool_exhausted(64, 10).code(), "MEM:POOL:EXHAUSTED");
        assert_eq!(MemoryError::invalid_size(4096, 1024).code(), "MEM:DEALLOC:SIZE");
        assert_eq!(MemoryError::unlock_failure(0, 0).code(), "MEM:POOL:UNLOCK");
    }

    #[test]
    fn test_retryable() {
        assert!(MemoryError::pool_exhausted(64, 100).is_retryable());
        assert!(!MemoryError::requested_size_too_large(64, 32).is_retryable());
        assert!(!MemoryError::invalid_size(64, 32).is_retryable());
    }

    #[test]
    fn test_only_unlock_failure_is_fatal() {
        assert!(MemoryError::unlock_failure(3, 0).is_fatal());
        assert!(!MemoryError::pool_exhausted(64, 100).is_fatal());
        assert!(!MemoryError::invalid_config("x").is_fatal());
    }
}
