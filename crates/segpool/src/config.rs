//! Pool configuration

use crate::error::{MemoryError, MemoryResult};
use crate::free_list::LINK_SIZE;
use crate::size_class::SizeClasses;
use crate::utils::is_power_of_two;

/// Probe ceiling used when every candidate list keeps reading empty
pub const DEFAULT_MAX_PROBE_ATTEMPTS: usize = 100_000;

/// What the pool does with a recoverable error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the error to the caller and leave the pool untouched
    #[default]
    ReturnError,
    /// Log a diagnostic and abort the process
    Abort,
}

/// Configuration for the segregated pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Chunk sizes, smallest first
    pub size_classes: SizeClasses,

    /// Size of the backing arena in bytes; rounded down to a whole number of
    /// largest-class chunks
    pub arena_size: usize,

    /// Alignment of the arena base
    pub arena_align: usize,

    /// Empty-scan probes before `allocate` reports exhaustion
    pub max_probe_attempts: usize,

    /// Error handling policy
    pub error_policy: ErrorPolicy,

    /// Check deallocated addresses against the arena and chunk grid
    pub validate_addresses: bool,

    /// Use exponential backoff for CAS retries
    pub use_backoff: bool,

    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated memory (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for deallocated memory (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size_classes: SizeClasses::default(),
            arena_size: 1024 * 1024,
            arena_align: 64,
            max_probe_attempts: DEFAULT_MAX_PROBE_ATTEMPTS,
            error_policy: ErrorPolicy::ReturnError,
            validate_addresses: true,
            use_backoff: true,
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl PoolConfig {
    /// Configuration with the given classes and arena size, defaults elsewhere
    pub fn new(size_classes: SizeClasses, arena_size: usize) -> Self {
        Self {
            size_classes,
            arena_size,
            ..Self::default()
        }
    }

    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            validate_addresses: true,
            use_backoff: true,
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            validate_addresses: true,
            use_backoff: false,
            track_stats: true,
            alloc_pattern: Some(0xBB),
            dealloc_pattern: Some(0xDD),
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            validate_addresses: false,
            use_backoff: false,
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Set the size-class table
    #[must_use = "builder methods must be chained or built"]
    pub fn with_size_classes(mut self, size_classes: SizeClasses) -> Self {
        self.size_classes = size_classes;
        self
    }

    /// Set the arena size in bytes
    #[must_use = "builder methods must be chained or built"]
    pub fn with_arena_size(mut self, arena_size: usize) -> Self {
        self.arena_size = arena_size;
        self
    }

    /// Set the arena alignment
    #[must_use = "builder methods must be chained or built"]
    pub fn with_arena_align(mut self, arena_align: usize) -> Self {
        self.arena_align = arena_align;
        self
    }

    /// Set the exhaustion probe ceiling
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_probe_attempts(mut self, attempts: usize) -> Self {
        self.max_probe_attempts = attempts;
        self
    }

    /// Set the error policy
    #[must_use = "builder methods must be chained or built"]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Enable or disable statistics
    #[must_use = "builder methods must be chained or built"]
    pub fn with_stats(mut self, track_stats: bool) -> Self {
        self.track_stats = track_stats;
        self
    }

    /// Number of largest-class chunks the arena is partitioned into
    pub fn chunk_count(&self) -> usize {
        self.arena_size / self.size_classes.max_size()
    }

    /// Arena bytes actually used: whole largest-class chunks only
    pub fn usable_arena_size(&self) -> usize {
        self.chunk_count() * self.size_classes.max_size()
    }

    /// Check the configuration before building a pool
    pub fn validate(&self) -> MemoryResult<()> {
        if self.arena_size == 0 {
            return Err(MemoryError::invalid_config("arena size must be non-zero"));
        }

        if self.chunk_count() == 0 {
            return Err(MemoryError::InvalidConfig {
                reason: format!(
                    "arena of {} bytes cannot hold one {}-byte chunk",
                    self.arena_size,
                    self.size_classes.max_size()
                ),
            });
        }

        if !is_power_of_two(self.arena_align) || self.arena_align < LINK_SIZE {
            return Err(MemoryError::InvalidConfig {
                reason: format!(
                    "arena alignment {} must be a power of two of at least {LINK_SIZE}",
                    self.arena_align
                ),
            });
        }

        if self.max_probe_attempts == 0 {
            return Err(MemoryError::invalid_config(
                "max probe attempts must be at least 1",
            ));
        }

        Ok(())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_probe_attempts, DEFAULT_MAX_PROBE_ATTEMPTS);
        assert_eq!(config.error_policy, ErrorPolicy::ReturnError);
    }

    #[test]
    fn test_presets_are_valid() {
        for config in [
            PoolConfig::production(),
            PoolConfig::debug(),
            PoolConfig::performance(),
        ] {
            assert!(config.validate().is_ok());
        }
        assert!(PoolConfig::debug().track_stats);
        assert!(!PoolConfig::performance().validate_addresses);
    }

    #[test]
    fn test_arena_rounds_down_to_largest_class() {
        let classes = SizeClasses::new(vec![64, 1024]).unwrap();
        let config = PoolConfig::new(classes, 4096 + 100);
        assert_eq!(config.chunk_count(), 4);
        assert_eq!(config.usable_arena_size(), 4096);
    }

    #[test]
    fn test_rejects_invalid() {
        let classes = SizeClasses::new(vec![64, 1024]).unwrap();

        assert!(PoolConfig::new(classes.clone(), 0).validate().is_err());
        assert!(PoolConfig::new(classes.clone(), 512).validate().is_err());
        assert!(
            PoolConfig::new(classes.clone(), 4096)
                .with_arena_align(24)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::new(classes, 4096)
                .with_max_probe_attempts(0)
                .validate()
                .is_err()
        );
    }
}
