//! Kubernetes resource quantities
//!
//! Quantities travel as strings (`"500m"`, `"2"`, `"1Gi"`). The operator only
//! needs to compare, clamp and sum them, so they are parsed to `f64` in base
//! units (cores, bytes) and formatted back in a canonical form.

use crate::ResourceList;
use thiserror::Error;

/// Resource name for CPU
pub const CPU: &str = "cpu";

/// Resource name for memory
pub const MEMORY: &str = "memory";

/// Quantity parsing error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The string is not a valid quantity
    #[error("invalid quantity {0:?}")]
    Invalid(String),
}

const BINARY_SUFFIXES: [(&str, f64); 6] = [
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: [(&str, f64); 9] = [
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity string to its value in base units
///
/// # Errors
///
/// Returns `QuantityError::Invalid` for empty strings, non-numeric values or unknown suffixes.
pub fn parse(quantity: &str) -> Result<f64, QuantityError> {
    let s = quantity.trim();
    if s.is_empty() {
        return Err(QuantityError::Invalid(quantity.to_string()));
    }

    let invalid = || QuantityError::Invalid(quantity.to_string());

    for (suffix, factor) in BINARY_SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return parse_number(number).map(|v| v * factor).ok_or_else(invalid);
        }
    }

    // Exponent form ("1e3", "12E-2"); "E" alone is the exa suffix
    if let Some(idx) = s.find(['e', 'E']).filter(|&i| i + 1 < s.len()) {
        let (mantissa, exponent) = (&s[..idx], &s[idx + 1..]);
        if let (Some(m), Ok(e)) = (parse_number(mantissa), exponent.parse::<i32>()) {
            return Ok(m * 10f64.powi(e));
        }
    }

    for (suffix, factor) in DECIMAL_SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return parse_number(number).map(|v| v * factor).ok_or_else(invalid);
        }
    }

    parse_number(s).ok_or_else(invalid)
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-')) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a CPU value (cores) as whole cores or millicores
#[must_use]
pub fn format_cpu(cores: f64) -> String {
    let millis = (cores * 1000.0).round() as i64;
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{millis}m")
    }
}

/// Format a memory value (bytes) with the largest exact binary suffix
#[must_use]
pub fn format_memory(bytes: f64) -> String {
    let bytes = bytes.round() as i64;
    for (suffix, factor) in [("Gi", 1_i64 << 30), ("Mi", 1 << 20), ("Ki", 1 << 10)] {
        if bytes != 0 && bytes % factor == 0 {
            return format!("{}{suffix}", bytes / factor);
        }
    }
    bytes.to_string()
}

/// Sum one resource across several resource lists, skipping unparsable entries
#[must_use]
pub fn sum<'a>(lists: impl IntoIterator<Item = &'a ResourceList>, resource: &str) -> f64 {
    lists
        .into_iter()
        .filter_map(|list| list.get(resource))
        .filter_map(|q| parse(q).ok())
        .sum()
}
