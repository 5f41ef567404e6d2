//! Pure value predicates used throughout discovery

use super::layout::address;

/// Is `value` a plausible user-space pointer?
#[inline]
pub fn is_plausible_ptr(value: u64) -> bool {
    (address::MIN_USER..=address::MAX_USER).contains(&value)
}

/// Null or plausible, as expected of optional links (outer, children, next)
#[inline]
pub fn is_null_or_ptr(value: u64) -> bool {
    value == 0 || is_plausible_ptr(value)
}

/// Squared length of a quaternion
pub fn quat_len_sq(q: [f64; 4]) -> f64 {
    q.iter().map(|c| c * c).sum()
}

/// Loose unit check: squared length within (0.5, 1.5)
pub fn is_reasonable_quat(q: [f64; 4]) -> bool {
    q.iter().all(|c| c.is_finite()) && {
        let len = quat_len_sq(q);
        len > 0.5 && len < 1.5
    }
}

/// Tight unit check used when telling float and double layouts apart
pub fn is_unit_quat(q: [f64; 4]) -> bool {
    q.iter().all(|c| c.is_finite()) && {
        let len = quat_len_sq(q);
        len > 0.95 && len < 1.05
    }
}

/// Printable ASCII as accepted in interned names
#[inline]
pub fn is_printable_ascii(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

pub fn align_up(value: i32, align: i32) -> i32 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_bounds() {
        assert!(!is_plausible_ptr(0));
        assert!(!is_plausible_ptr(0xFFFF));
        assert!(is_plausible_ptr(0x10000));
        assert!(is_plausible_ptr(0x7FF6_1234_0000));
        assert!(is_plausible_ptr(0x7FFF_FFFF_FFFF));
        assert!(!is_plausible_ptr(0x8000_0000_0000));
        assert!(!is_plausible_ptr(0xFFFF_8000_0000_0000));
    }

    #[test]
    fn test_null_or_ptr() {
        assert!(is_null_or_ptr(0));
        assert!(is_null_or_ptr(0x1_4000_0000));
        assert!(!is_null_or_ptr(1));
    }

    #[test]
    fn test_quaternion_checks() {
        assert!(is_reasonable_quat([0.0, 0.0, 0.0, 1.0]));
        assert!(is_reasonable_quat([0.0, 0.0, 0.8, 0.8]));
        assert!(!is_unit_quat([0.0, 0.0, 0.8, 0.8]));
        assert!(is_unit_quat([0.5, 0.5, 0.5, 0.5]));
        assert!(!is_reasonable_quat([0.0, 0.0, 0.0, 0.0]));
        assert!(!is_reasonable_quat([f64::NAN, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0x5C, 8), 0x60);
        assert_eq!(align_up(0x60, 8), 0x60);
        assert_eq!(align_up(0xB4, 8), 0xB8);
    }
}
