//! Tag-length-value primitives for EMV-style payloads.
//!
//! Every field is `tag (2 digits) + length (2 digits, zero padded) + value`,
//! where the length is the byte length of the value. Values longer than 99
//! bytes cannot be represented.

use thiserror::Error;

pub const MAX_VALUE_LEN: usize = 99;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlvError {
    #[error("field {tag} is {len} bytes long, the limit is {MAX_VALUE_LEN}")]
    ValueTooLong { tag: String, len: usize },

    #[error("truncated field at offset {0}")]
    Truncated(usize),

    #[error("invalid length prefix at offset {0}")]
    InvalidLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvField<'a> {
    pub tag: &'a str,
    pub value: &'a str,
}

/// Appends one encoded field to `out`.
pub fn write_field(out: &mut String, tag: &str, value: &str) -> Result<(), TlvError> {
    let len = value.len();
    if len > MAX_VALUE_LEN {
        return Err(TlvError::ValueTooLong {
            tag: tag.to_string(),
            len,
        });
    }

    out.push_str(tag);
    out.push_str(&format!("{:02}", len));
    out.push_str(value);
    Ok(())
}

/// Splits a TLV stream into its top-level fields.
pub fn parse(input: &str) -> Result<Vec<TlvField<'_>>, TlvError> {
    let mut fields = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let tag = input
            .get(offset..offset + 2)
            .ok_or(TlvError::Truncated(offset))?;
        let len_digits = input
            .get(offset + 2..offset + 4)
            .ok_or(TlvError::Truncated(offset))?;

        if !len_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TlvError::InvalidLength(offset));
        }
        let len: usize = len_digits
            .parse()
            .map_err(|_| TlvError::InvalidLength(offset))?;

        let start = offset + 4;
        let value = input
            .get(start..start + len)
            .ok_or(TlvError::Truncated(offset))?;

        fields.push(TlvField { tag, value });
        offset = start + len;
    }

    Ok(fields)
}

/// Looks up the first field carrying `tag`.
pub fn find<'a>(fields: &[TlvField<'a>], tag: &str) -> Option<&'a str> {
    fields.iter().find(|f| f.tag == tag).map(|f| f.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(tag: &str, value: &str) -> Result<String, TlvError> {
        let mut out = String::new();
        write_field(&mut out, tag, value)?;
        Ok(out)
    }

    #[test]
    fn encodes_length_prefix_with_zero_padding() {
        assert_eq!(field("59", "ACME").unwrap(), "5904ACME");
        assert_eq!(field("62", "").unwrap(), "6200");
        assert_eq!(field("05", &"x".repeat(12)).unwrap(), format!("0512{}", "x".repeat(12)));
    }

    #[test]
    fn rejects_values_over_limit() {
        let err = field("26", &"k".repeat(100)).unwrap_err();
        assert_eq!(
            err,
            TlvError::ValueTooLong {
                tag: "26".to_string(),
                len: 100
            }
        );
        assert!(field("26", &"k".repeat(99)).is_ok());
    }

    #[test]
    fn parses_nested_streams() {
        let fields = parse("000201260800040abc5802BR").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(find(&fields, "00"), Some("01"));
        assert_eq!(find(&fields, "58"), Some("BR"));

        let inner = parse(find(&fields, "26").unwrap()).unwrap();
        assert_eq!(find(&inner, "00"), Some("0abc"));
    }

    #[test]
    fn reports_truncated_input() {
        assert_eq!(parse("5910SHORT"), Err(TlvError::Truncated(0)));
        assert_eq!(parse("0002010"), Err(TlvError::Truncated(6)));
    }

    #[test]
    fn reports_non_numeric_length() {
        assert_eq!(parse("59AXHELLO"), Err(TlvError::InvalidLength(0)));
    }
}
