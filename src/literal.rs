//! Ledger literal normalization
//!
//! Values read from public mappings and from wallet records arrive as typed
//! literals: `"5u32"`, `1000u64.private`, `"aleo1..."`, `true`. Every
//! comparison against a ledger-serialized value goes through this module so
//! that `"5u32"`, `5u32.private` and `5` all compare equal.

use std::fmt;

const VISIBILITY_SUFFIXES: [&str; 3] = [".private", ".public", ".constant"];

/// Integer and field type tags accepted on numeric literals
const TYPE_TAGS: [&str; 12] = [
    "u8", "u16", "u32", "u64", "u128", "i8", "i16", "i32", "i64", "i128", "field", "scalar",
];

/// Numeric literal type tag used when formatting transaction inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralType {
    U8,
    U16,
    U32,
    U64,
    U128,
    Field,
}

impl LiteralType {
    /// Suffix appended to the decimal value
    pub fn suffix(&self) -> &'static str {
        match self {
            LiteralType::U8 => "u8",
            LiteralType::U16 => "u16",
            LiteralType::U32 => "u32",
            LiteralType::U64 => "u64",
            LiteralType::U128 => "u128",
            LiteralType::Field => "field",
        }
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Format a value as a typed ledger literal, e.g. `format_literal(5, U32) == "5u32"`
pub fn format_literal(value: impl Into<u128>, ty: LiteralType) -> String {
    format!("{}{}", value.into(), ty.suffix())
}

/// Strip JSON quoting, surrounding whitespace and a visibility suffix
pub fn strip_literal(raw: &str) -> &str {
    let mut s = raw.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s = s[1..s.len() - 1].trim();
    }
    for suffix in VISIBILITY_SUFFIXES {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped;
            break;
        }
    }
    s
}

/// Parse a numeric literal, tolerating quotes, visibility and type tags.
///
/// Returns `None` for anything that is not a non-negative integer, including
/// a number followed by an unknown tag.
pub fn parse_numeric(raw: &str) -> Option<u128> {
    let s = strip_literal(raw);
    let digits_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if digits_end == 0 {
        return None;
    }

    let (digits, tag) = s.split_at(digits_end);
    if !tag.is_empty() && !TYPE_TAGS.contains(&tag) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a numeric literal that must fit in `u64`
pub fn parse_u64(raw: &str) -> Option<u64> {
    parse_numeric(raw).and_then(|v| u64::try_from(v).ok())
}

/// Parse a numeric literal that must fit in `u32`
pub fn parse_u32(raw: &str) -> Option<u32> {
    parse_numeric(raw).and_then(|v| u32::try_from(v).ok())
}

/// Parse a boolean literal
pub fn parse_bool(raw: &str) -> Option<bool> {
    match strip_literal(raw) {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse an account address literal
pub fn parse_address(raw: &str) -> Option<String> {
    let s = strip_literal(raw);
    if s.starts_with("aleo1") && s.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(s.to_string())
    } else {
        None
    }
}

/// Whether `raw` is a well-formed account address (`aleo1` + 58 characters)
pub fn is_valid_address(raw: &str) -> bool {
    raw.len() == 63 && parse_address(raw).as_deref() == Some(raw)
}

/// Compare two ledger values, numerically when both are numeric literals
pub fn literals_equal(a: &str, b: &str) -> bool {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => strip_literal(a) == strip_literal(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_forms() {
        assert_eq!(parse_numeric("5u32"), Some(5));
        assert_eq!(parse_numeric("\"5u32\""), Some(5));
        assert_eq!(parse_numeric("1000u64.private"), Some(1000));
        assert_eq!(parse_numeric(" 42 "), Some(42));
        assert_eq!(parse_numeric("123456field"), Some(123456));
        assert_eq!(parse_numeric("7u128"), Some(7));
    }

    #[test]
    fn test_parse_numeric_rejects_garbage() {
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("u32"), None);
        assert_eq!(parse_numeric("5u33"), None);
        assert_eq!(parse_numeric("-5i32"), None);
        assert_eq!(parse_numeric("null"), None);
    }

    #[test]
    fn test_width_checks() {
        assert_eq!(parse_u32("4294967295u32"), Some(u32::MAX));
        assert_eq!(parse_u32("4294967296u64"), None);
        assert_eq!(parse_u64("18446744073709551616u128"), None);
    }

    #[test]
    fn test_tagged_and_untagged_compare_equal() {
        // raw string comparison would miss all of these
        assert!(literals_equal("3u32", "3u32.private"));
        assert!(literals_equal("\"3u32\"", "3"));
        assert!(literals_equal("03u32", "3u32"));
        assert!(!literals_equal("3u32", "4u32"));
        assert!(literals_equal("\"aleo1xyz\"", "aleo1xyz.private"));
    }

    #[test]
    fn test_bool_and_address() {
        assert_eq!(parse_bool("\"true\""), Some(true));
        assert_eq!(parse_bool("false.public"), Some(false));
        assert_eq!(parse_bool("1"), None);

        let addr = format!("aleo1{}", "q".repeat(58));
        assert_eq!(parse_address(&format!("\"{addr}\"")), Some(addr.clone()));
        assert!(is_valid_address(&addr));
        assert!(!is_valid_address("aleo1short"));
        assert_eq!(parse_address("0x1234"), None);
    }

    #[test]
    fn test_format_literal() {
        assert_eq!(format_literal(5u32, LiteralType::U32), "5u32");
        assert_eq!(format_literal(1000u64, LiteralType::U64), "1000u64");
        assert_eq!(format_literal(2u8, LiteralType::U8), "2u8");
    }
}
