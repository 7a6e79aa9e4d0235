//! Argument abstraction functions
//!
//! Each abstraction maps one raw argument value to one MIST token. The
//! functions depend only on the raw value (and the argument's truncation length),
//! so repeated runs over identical input produce identical tokens.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::LazyLock;

/// Token substituted when neither the value nor the default table can
/// provide one
pub const FALLBACK_TOKEN: &str = "00000000";

/// Default truncation length for `string` arguments
pub const DEFAULT_MAX_LEN: usize = 64;

static SEPARATOR_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\{2,}").unwrap());

static USER_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[a-z]:)?\\(?:users|documents and settings)\\)[^\\]+").unwrap()
});

/// Abstraction applied to a raw argument value before emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Abstraction {
    /// Normalized file-system or registry path, hashed
    Path,
    /// String truncated to `max_len` characters, hashed
    String,
    /// Full textual value of any scalar, hashed
    Hash,
    /// Integer value, low 32 bits
    Integer,
    /// Hexadecimal value, low 32 bits
    Hex,
    /// Log2 bucket of an integer's magnitude
    Bucket,
}

impl Abstraction {
    pub const ALL: [Abstraction; 6] = [
        Abstraction::Path,
        Abstraction::String,
        Abstraction::Hash,
        Abstraction::Integer,
        Abstraction::Hex,
        Abstraction::Bucket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Abstraction::Path => "path",
            Abstraction::String => "string",
            Abstraction::Hash => "hash",
            Abstraction::Integer => "integer",
            Abstraction::Hex => "hex",
            Abstraction::Bucket => "bucket",
        }
    }

    /// Convert a raw value into a token
    ///
    /// Returns `None` when the value does not have the shape this abstraction
    /// expects; the caller substitutes the default token.
    pub fn apply(self, value: &Value, max_len: usize) -> Option<String> {
        match self {
            Abstraction::Path => value.as_str().map(|s| hash_token(&normalize_path(s))),
            Abstraction::String => value.as_str().map(|s| hash_token(&truncate(s, max_len))),
            Abstraction::Hash => scalar_text(value).map(|s| hash_token(&s)),
            Abstraction::Integer => parse_integer(value).map(|n| format!("{:08x}", n as u32)),
            Abstraction::Hex => parse_hex(value).map(|n| format!("{:08x}", n as u32)),
            Abstraction::Bucket => parse_integer(value).map(|n| format!("{:08x}", bucket(n))),
        }
    }
}

impl fmt::Display for Abstraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Abstraction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Abstraction::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown abstraction type '{}'", s))
    }
}

/// Normalize a Windows-style path so equivalent spellings hash alike
///
/// Lowercases, turns `/` into `\`, collapses separator runs, replaces the
/// user-profile directory name with `user` and drops trailing separators.
pub fn normalize_path(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace('/', "\\");
    let collapsed = SEPARATOR_RUN.replace_all(&lowered, "\\");
    let anonymized = USER_PROFILE.replace(&collapsed, "${1}user");
    anonymized.trim_end_matches('\\').to_string()
}

/// 32-bit token of a string: FNV-1a 64 folded in half
pub fn hash_token(text: &str) -> String {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(text.as_bytes());
    let h = hasher.finish();
    format!("{:08x}", ((h >> 32) ^ h) as u32)
}

fn truncate(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integer value of a scalar, wide enough to hold any u64 or i64 unchanged
fn parse_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i128)),
        Value::String(s) => {
            let s = s.trim();
            match strip_hex_prefix(s) {
                Some(digits) => u64::from_str_radix(digits, 16).ok().map(i128::from),
                None => s.parse::<i128>().ok(),
            }
        }
        Value::Bool(b) => Some(i128::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_hex(value: &Value) -> Option<i128> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            let digits = strip_hex_prefix(s).unwrap_or(s);
            u64::from_str_radix(digits, 16).ok().map(i128::from)
        }
        other => parse_integer(other),
    }
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Bit length of the magnitude: 0 for 0, 64 for 2^63..2^64
fn bucket(n: i128) -> u32 {
    u128::BITS - n.unsigned_abs().leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_path_case_and_separators() {
        assert_eq!(normalize_path("C:/Temp//A.EXE"), r"c:\temp\a.exe");
        assert_eq!(normalize_path(r"C:\Windows\System32\"), r"c:\windows\system32");
    }

    #[test]
    fn test_normalize_path_user_profile() {
        assert_eq!(
            normalize_path(r"C:\Users\Alice\AppData\evil.dll"),
            r"c:\users\user\appdata\evil.dll"
        );
        assert_eq!(
            normalize_path(r"C:\Documents and Settings\bob\x.txt"),
            r"c:\documents and settings\user\x.txt"
        );
    }

    #[test]
    fn test_path_tokens_match_for_equivalent_spellings() {
        let a = Abstraction::Path.apply(&json!(r"C:\TEMP\a.exe"), DEFAULT_MAX_LEN);
        let b = Abstraction::Path.apply(&json!("c:/temp/a.exe"), DEFAULT_MAX_LEN);
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_token_is_eight_hex_digits() {
        let token = hash_token("kernel32.dll");
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token, hash_token("kernel32.dll"));
        assert_ne!(token, hash_token("ntdll.dll"));
    }

    #[test]
    fn test_string_truncation() {
        let long = "a".repeat(100);
        let prefix = "a".repeat(10);
        assert_eq!(
            Abstraction::String.apply(&json!(long), 10),
            Some(hash_token(&prefix))
        );
    }

    #[test]
    fn test_integer_forms() {
        let apply = |v: Value| Abstraction::Integer.apply(&v, DEFAULT_MAX_LEN);
        assert_eq!(apply(json!(16)), Some("00000010".to_string()));
        assert_eq!(apply(json!("16")), Some("00000010".to_string()));
        assert_eq!(apply(json!("0x10")), Some("00000010".to_string()));
        assert_eq!(apply(json!(-1)), Some("ffffffff".to_string()));
        assert_eq!(apply(json!(true)), Some("00000001".to_string()));
        assert_eq!(apply(json!(u64::MAX)), Some("ffffffff".to_string()));
        assert_eq!(apply(json!("sixteen")), None);
        assert_eq!(apply(json!(null)), None);
    }

    #[test]
    fn test_hex_accepts_bare_digits() {
        let apply = |v: Value| Abstraction::Hex.apply(&v, DEFAULT_MAX_LEN);
        assert_eq!(apply(json!("ff")), Some("000000ff".to_string()));
        assert_eq!(apply(json!("0x80000002")), Some("80000002".to_string()));
        assert_eq!(apply(json!("zz")), None);
    }

    #[test]
    fn test_bucket() {
        let apply = |v: Value| Abstraction::Bucket.apply(&v, DEFAULT_MAX_LEN);
        assert_eq!(apply(json!(0)), Some("00000000".to_string()));
        assert_eq!(apply(json!(1)), Some("00000001".to_string()));
        assert_eq!(apply(json!(1000)), Some("0000000a".to_string()));
        assert_eq!(apply(json!(1023)), apply(json!(600)));
        assert_eq!(apply(json!(-1000)), apply(json!(1000)));
    }

    #[test]
    fn test_bucket_uses_full_u64_magnitude() {
        let apply = |v: Value| Abstraction::Bucket.apply(&v, DEFAULT_MAX_LEN);
        assert_eq!(apply(json!(u64::MAX)), Some("00000040".to_string()));
        assert_eq!(apply(json!("0xffffffffffffffff")), Some("00000040".to_string()));
        assert_eq!(apply(json!(1u64 << 63)), Some("00000040".to_string()));
        assert_eq!(apply(json!(i64::MAX)), Some("0000003f".to_string()));
        assert_eq!(apply(json!(i64::MIN)), Some("00000040".to_string()));
        assert_eq!(apply(json!("18446744073709551615")), Some("00000040".to_string()));
    }

    #[test]
    fn test_wrong_shapes_rejected() {
        for abstraction in Abstraction::ALL {
            assert_eq!(abstraction.apply(&json!({"a": 1}), DEFAULT_MAX_LEN), None);
            assert_eq!(abstraction.apply(&json!([1, 2]), DEFAULT_MAX_LEN), None);
        }
        assert_eq!(Abstraction::Path.apply(&json!(5), DEFAULT_MAX_LEN), None);
    }

    #[test]
    fn test_from_str_round_trips_names() {
        for abstraction in Abstraction::ALL {
            assert_eq!(abstraction.name().parse::<Abstraction>(), Ok(abstraction));
        }
        assert!("pathname".parse::<Abstraction>().is_err());
    }
}
