//! Utilities for aligning memory

use std::ops::{Add, Rem, Sub};

/// Align a size up to the next multiple of `alignment`. Does not align the base address.
/// Values that are already aligned are returned unchanged.
pub fn align<T>(value: T, alignment: T) -> T
where
    T: Add<T, Output = T> + Sub<T, Output = T> + Rem<T, Output = T> + PartialEq + Default + Copy, {
    let unaligned_size = value % alignment;
    if unaligned_size == T::default() {
        value
    } else {
        value + (alignment - unaligned_size)
    }
}

#[cfg(test)]
mod tests {
    use super::align;

    #[test]
    fn aligned_values_are_unchanged() {
        assert_eq!(align(0u64, 16), 0);
        assert_eq!(align(16u64, 16), 16);
        assert_eq!(align(65536u64, 16), 65536);
    }

    #[test]
    fn rounds_up_to_alignment() {
        assert_eq!(align(1u64, 16), 16);
        assert_eq!(align(100u64, 16), 112);
        assert_eq!(align(17u32, 8), 24);
    }
}
