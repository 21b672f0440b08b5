//! Size-class table
//!
//! An immutable, strictly increasing list of chunk sizes. Requests are rounded
//! up to the first class that fits. The same ascending scan is used when a
//! chunk is returned, so allocate and deallocate always agree on the class
//! for a given size.

use core::fmt;

use crate::error::{MemoryError, MemoryResult};
use crate::free_list::LINK_SIZE;

/// Index of a size class inside a [`SizeClasses`] table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(usize);

impl SizeClass {
    /// Position of the class in the table (0 is the smallest)
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Ordered table of chunk sizes supported by a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClasses {
    sizes: Box<[usize]>,
}

impl SizeClasses {
    /// Build a table from explicit chunk sizes
    ///
    /// Sizes must be strictly increasing, and every size must be a non-zero
    /// multiple of the link word so a free chunk can hold its successor.
    pub fn new(sizes: Vec<usize>) -> MemoryResult<Self> {
        if sizes.is_empty() {
            return Err(MemoryError::invalid_config("size class table is empty"));
        }

        for (i, &size) in sizes.iter().enumerate() {
            if size < LINK_SIZE || size % LINK_SIZE != 0 {
                return Err(MemoryError::InvalidConfig {
                    reason: format!(
                        "size class {size} must be a non-zero multiple of {LINK_SIZE} bytes"
                    ),
                });
            }
            if i > 0 && size <= sizes[i - 1] {
                return Err(MemoryError::InvalidConfig {
                    reason: format!(
                        "size classes must be strictly increasing ({} then {size})",
                        sizes[i - 1]
                    ),
                });
            }
        }

        Ok(Self {
            sizes: sizes.into_boxed_slice(),
        })
    }

    /// Build a geometric table `min, min * factor, ...` that ends with `max`
    ///
    /// `max` is always the last class even when it is not an exact power of
    /// `factor` times `min`.
    pub fn geometric(min: usize, max: usize, factor: usize) -> MemoryResult<Self> {
        if factor < 2 {
            return Err(MemoryError::invalid_config("growth factor must be at least 2"));
        }
        if min == 0 || min > max {
            return Err(MemoryError::InvalidConfig {
                reason: format!("invalid size range {min}..={max}"),
            });
        }

        let mut sizes = Vec::new();
        let mut size = min;
        while size < max {
            sizes.push(size);
            size = match size.checked_mul(factor) {
                Some(next) => next,
                None => break,
            };
        }
        sizes.push(max);

        Self::new(sizes)
    }

    /// Number of classes
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Always false: construction rejects empty tables
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Chunk size of `class`
    #[inline]
    pub fn size_of(&self, class: SizeClass) -> usize {
        self.sizes[class.0]
    }

    /// The largest class
    #[inline]
    pub fn largest(&self) -> SizeClass {
        SizeClass(self.sizes.len() - 1)
    }

    /// Chunk size of the largest class
    #[inline]
    pub fn max_size(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    /// Minimal class whose chunk size is at least `size`
    ///
    /// Returns `None` when `size` exceeds every class.
    #[inline]
    pub fn class_for(&self, size: usize) -> Option<SizeClass> {
        self.sizes.iter().position(|&s| size <= s).map(SizeClass)
    }

    /// Class at `index`, if it exists
    #[inline]
    pub fn get(&self, index: usize) -> Option<SizeClass> {
        (index < self.sizes.len()).then_some(SizeClass(index))
    }

    /// Classes from `from` upward, smallest first
    #[inline]
    pub(crate) fn upward_from(&self, from: SizeClass) -> impl Iterator<Item = SizeClass> + use<> {
        (from.0..self.sizes.len()).map(SizeClass)
    }

    /// Iterate `(class, chunk size)` pairs, smallest first
    pub fn iter(&self) -> impl Iterator<Item = (SizeClass, usize)> + '_ {
        self.sizes.iter().enumerate().map(|(i, &s)| (SizeClass(i), s))
    }

    /// Raw chunk sizes
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.sizes
    }
}

impl Default for SizeClasses {
    fn default() -> Self {
        Self {
            sizes: vec![64, 256, 1024, 4096].into_boxed_slice(),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> SizeClasses {
        SizeClasses::new(vec![64, 256, 1024]).unwrap()
    }

    #[rstest]
    #[case(0, Some(0))]
    #[case(1, Some(0))]
    #[case(64, Some(0))]
    #[case(65, Some(1))]
    #[case(256, Some(1))]
    #[case(1000, Some(2))]
    #[case(1024, Some(2))]
    #[case(1025, None)]
    fn test_class_for(#[case] size: usize, #[case] expected: Option<usize>) {
        assert_eq!(table().class_for(size).map(SizeClass::index), expected);
    }

    #[test]
    fn test_rejects_unordered() {
        let err = SizeClasses::new(vec![64, 64]).unwrap_err();
        assert_eq!(err.code(), "MEM:CONFIG:INVALID");
        assert!(SizeClasses::new(vec![256, 64]).is_err());
    }

    #[test]
    fn test_rejects_too_small_or_misaligned() {
        assert!(SizeClasses::new(vec![0, 64]).is_err());
        assert!(SizeClasses::new(vec![LINK_SIZE / 2]).is_err());
        assert!(SizeClasses::new(vec![LINK_SIZE + 1]).is_err());
        assert!(SizeClasses::new(Vec::new()).is_err());
    }

    #[test]
    fn test_geometric() {
        let classes = SizeClasses::geometric(32, 1024, 4).unwrap();
        assert_eq!(classes.as_slice(), &[32, 128, 512, 1024]);

        let classes = SizeClasses::geometric(64, 64, 2).unwrap();
        assert_eq!(classes.as_slice(), &[64]);

        assert!(SizeClasses::geometric(64, 1024, 1).is_err());
        assert!(SizeClasses::geometric(128, 64, 2).is_err());
    }

    #[test]
    fn test_largest_and_iter() {
        let classes = table();
        assert_eq!(classes.largest().index(), 2);
        assert_eq!(classes.max_size(), 1024);
        let sizes: Vec<usize> = classes.iter().map(|(_, s)| s).collect();
        assert_eq!(sizes, vec![64, 256, 1024]);
        let upward: Vec<usize> = classes.upward_from(SizeClass(1)).map(SizeClass::index).collect();
        assert_eq!(upward, vec![1, 2]);
    }
}
