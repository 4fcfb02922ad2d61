//! Human-readable byte sizes ("10MB", "1B", "1.50 KB")
//!
//! Units are binary: each step multiplies by 1024. Parsing accepts the
//! output of [`format_size`] so a formatted value reads back within its
//! rounding error.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Suffixes ordered longest first so "mb" wins over "b"
const SUFFIXES: [(&str, u32); 6] = [
    ("bytes", 0),
    ("tb", 4),
    ("gb", 3),
    ("mb", 2),
    ("kb", 1),
    ("b", 0),
];

/// Fraction digits beyond this only affect sub-byte precision
const MAX_FRACTION_DIGITS: usize = 19;

/// A count of bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        ByteSize(bytes)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// Parse a size literal: a non-negative number with an optional
    /// case-insensitive `b`, `kb`, `mb`, `gb`, `tb` or `bytes` suffix.
    ///
    /// A bare number is a count of bytes. A decimal fraction is allowed and
    /// rounded to the nearest byte after scaling.
    ///
    /// # Examples
    ///
    /// ```
    /// use writebench::size::ByteSize;
    ///
    /// assert_eq!(ByteSize::parse("10MB").unwrap().bytes(), 10 * 1024 * 1024);
    /// assert_eq!(ByteSize::parse("1B").unwrap().bytes(), 1);
    /// assert!(ByteSize::parse("abc").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSizeFormat(input.to_string());

        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        let (number, exponent) = SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(suffix, exponent)| (&trimmed[..trimmed.len() - suffix.len()], *exponent))
            .unwrap_or((trimmed, 0));
        let number = number.trim_end();
        let multiplier = 1u64 << (10 * exponent);

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) if !fraction.is_empty() => (whole, fraction),
            Some(_) => return Err(invalid()),
            None => (number, ""),
        };
        if whole.is_empty()
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole_bytes = whole
            .parse::<u64>()
            .ok()
            .and_then(|w| w.checked_mul(multiplier))
            .ok_or_else(invalid)?;

        let fraction_bytes = if fraction.is_empty() {
            0
        } else {
            let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let value: u128 = digits.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(digits.len() as u32);
            ((value * u128::from(multiplier) + scale / 2) / scale) as u64
        };

        whole_bytes
            .checked_add(fraction_bytes)
            .map(ByteSize)
            .ok_or_else(invalid)
    }
}

/// Format a byte count with the largest fitting unit.
///
/// GB, MB and KB carry two decimals; anything below 1 KB is an integer
/// count of "Bytes".
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} Bytes", bytes)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl FromStr for ByteSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ByteSize::parse(s)
    }
}
