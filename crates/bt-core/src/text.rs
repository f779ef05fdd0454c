//! Bounded string copies for fixed-capacity fields.

/// Capacity of a phone number field, including the terminator slot.
pub const PHONE_NUMBER_CAPACITY: usize = 32 + 1;

/// Capacity of a contact name field, including the terminator slot.
pub const NAME_CAPACITY: usize = 64 + 1;

/// Capacity of an AT command field, including the terminator slot.
pub const AT_COMMAND_CAPACITY: usize = 512 + 1;

/// Capacity of a vendor AT command prefix, including the terminator slot.
pub const VENDOR_PREFIX_CAPACITY: usize = 10 + 1;

/// Longest AT command accepted from an application.
pub const AT_COMMAND_MAX: usize = AT_COMMAND_CAPACITY - 1;

/// Copies at most `capacity - 1` bytes of `s`, never splitting a character.
///
/// `capacity` counts the terminator slot of the fixed-size field the string
/// is destined for, so a capacity of 0 or 1 yields an empty string.
pub fn bounded_copy(s: &str, capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    if s.len() <= limit {
        return s.to_string();
    }

    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.get(..end).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_strings_are_unchanged() {
        assert_eq!(bounded_copy("5551234", PHONE_NUMBER_CAPACITY), "5551234");
        assert_eq!(bounded_copy("", PHONE_NUMBER_CAPACITY), "");
    }

    #[test]
    fn test_truncates_to_capacity_minus_one() {
        let long = "9".repeat(40);
        let copy = bounded_copy(&long, PHONE_NUMBER_CAPACITY);
        assert_eq!(copy.len(), 32);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // "é" is two bytes; a 4-byte limit must not split the third one.
        let copy = bounded_copy("ééé", 6);
        assert_eq!(copy, "éé");
        assert_eq!(bounded_copy("ééé", 5), "éé");
        assert_eq!(bounded_copy("ééé", 4), "é");
    }

    #[test]
    fn test_degenerate_capacity() {
        assert_eq!(bounded_copy("abc", 0), "");
        assert_eq!(bounded_copy("abc", 1), "");
    }
}
