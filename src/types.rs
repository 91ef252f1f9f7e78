use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

/// Comparison applied by a filter leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Compare {
    #[default]
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Contains,
    NotContains,
}

impl Compare {
    /// Parse a dataset operator string (`"=="`, `"gte"`, `"&lt;"`, ...)
    pub fn from_operator(op: &str) -> Result<Self> {
        let compare = match op {
            "==" | "=" | "eq" | "in" => Compare::Equal,
            "!=" | "ne" | "not_in" => Compare::NotEqual,
            "<" | "lt" | "&lt;" => Compare::LessThan,
            "<=" | "lte" | "&lt;=" => Compare::LessThanEqual,
            ">" | "gt" | "&gt;" => Compare::GreaterThan,
            ">=" | "gte" | "&gt;=" => Compare::GreaterThanEqual,
            "&" => Compare::Contains,
            "~" => Compare::NotContains,
            _ => {
                return Err(Error::format(format!(
                    "{} is not a valid comparison operator",
                    op
                )));
            }
        };
        Ok(compare)
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Compare::Equal => "==",
            Compare::NotEqual => "!=",
            Compare::LessThan => "<",
            Compare::LessThanEqual => "<=",
            Compare::GreaterThan => ">",
            Compare::GreaterThanEqual => ">=",
            Compare::Contains => "&",
            Compare::NotContains => "~",
        }
    }

    /// Apply the comparison. CONTAINS/NOT_CONTAINS degrade to equality for scalar values.
    pub fn check<T: PartialOrd>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Compare::Equal | Compare::Contains => lhs == rhs,
            Compare::NotEqual | Compare::NotContains => lhs != rhs,
            Compare::LessThan => lhs < rhs,
            Compare::LessThanEqual => lhs <= rhs,
            Compare::GreaterThan => lhs > rhs,
            Compare::GreaterThanEqual => lhs >= rhs,
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(
            self,
            Compare::Equal | Compare::NotEqual | Compare::Contains | Compare::NotContains
        )
    }
}

impl FromStr for Compare {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Compare::from_operator(s)
    }
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// Strand of an aligned record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_reverse_flag(rev_strand: u8) -> Self {
        if rev_strand == 1 {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }
}

/// Local context bitfield (`cx` tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalContextFlags(pub u8);

impl LocalContextFlags {
    pub const NO_LOCAL_CONTEXT: Self = Self(0);
    pub const ADAPTER_BEFORE: Self = Self(1);
    pub const ADAPTER_AFTER: Self = Self(2);
    pub const BARCODE_BEFORE: Self = Self(4);
    pub const BARCODE_AFTER: Self = Self(8);
    pub const FORWARD_PASS: Self = Self(16);
    pub const REVERSE_PASS: Self = Self(32);
    pub const ADAPTER_BEFORE_BAD: Self = Self(64);
    pub const ADAPTER_AFTER_BAD: Self = Self(128);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let flag = match name {
            "NO_LOCAL_CONTEXT" => Self::NO_LOCAL_CONTEXT,
            "ADAPTER_BEFORE" => Self::ADAPTER_BEFORE,
            "ADAPTER_AFTER" => Self::ADAPTER_AFTER,
            "BARCODE_BEFORE" => Self::BARCODE_BEFORE,
            "BARCODE_AFTER" => Self::BARCODE_AFTER,
            "FORWARD_PASS" => Self::FORWARD_PASS,
            "REVERSE_PASS" => Self::REVERSE_PASS,
            "ADAPTER_BEFORE_BAD" => Self::ADAPTER_BEFORE_BAD,
            "ADAPTER_AFTER_BAD" => Self::ADAPTER_AFTER_BAD,
            _ => return None,
        };
        Some(flag)
    }

    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

impl BitOr for LocalContextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for LocalContextFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Hash applied to hole numbers by the ZMW modulo filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterHash {
    #[default]
    #[serde(rename = "uint32cast")]
    UnsignedLongCast,
    #[serde(rename = "boosthashcombine")]
    BoostHashCombine,
}

impl FilterHash {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uint32cast" => Ok(FilterHash::UnsignedLongCast),
            "boosthashcombine" => Ok(FilterHash::BoostHashCombine),
            _ => Err(Error::format(format!("unsupported hash type: {}", name))),
        }
    }

    pub fn hash(&self, hole_number: i32) -> u32 {
        match self {
            FilterHash::UnsignedLongCast => hole_number as u32,
            FilterHash::BoostHashCombine => {
                let upper = ((hole_number >> 16) & 0xFFFF) as u64;
                let lower = (hole_number & 0xFFFF) as u64;
                let seed = hash_combine(0, upper);
                hash_combine(seed, lower) as u32
            }
        }
    }
}

fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Genomic region: reference name plus 0-based, half-open `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicInterval {
    #[serde(rename = "referenceName")]
    pub name: String,
    pub start: u32,
    pub end: u32,
}

impl GenomicInterval {
    pub fn new(name: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// Overlap test against a 0-based, half-open span on the same reference
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        start < self.end && end > self.start
    }
}

impl FromStr for GenomicInterval {
    type Err = Error;

    /// Parses `name:start-end`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::format(format!("invalid genomic interval: {}", s));
        let (name, range) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse::<u32>().map_err(|_| invalid())?;
        let end = end.trim().parse::<u32>().map_err(|_| invalid())?;
        if name.is_empty() || end < start {
            return Err(invalid());
        }
        Ok(Self::new(name, start, end))
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.name, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_aliases() {
        for op in ["==", "=", "eq", "in"] {
            assert_eq!(Compare::from_operator(op).unwrap(), Compare::Equal);
        }
        for op in ["!=", "ne", "not_in"] {
            assert_eq!(Compare::from_operator(op).unwrap(), Compare::NotEqual);
        }
        assert_eq!(Compare::from_operator("&lt;").unwrap(), Compare::LessThan);
        assert_eq!(Compare::from_operator("lte").unwrap(), Compare::LessThanEqual);
        assert_eq!(Compare::from_operator("&gt;").unwrap(), Compare::GreaterThan);
        assert_eq!(Compare::from_operator(">=").unwrap(), Compare::GreaterThanEqual);
        assert_eq!(Compare::from_operator("&").unwrap(), Compare::Contains);
        assert_eq!(Compare::from_operator("~").unwrap(), Compare::NotContains);
        assert!(Compare::from_operator("=>").unwrap_err().is_format());
    }

    #[test]
    fn test_compare_check() {
        assert!(Compare::LessThan.check(&1, &2));
        assert!(!Compare::LessThan.check(&2, &2));
        assert!(Compare::GreaterThanEqual.check(&2, &2));
        assert!(Compare::Contains.check(&7, &7));
        assert!(Compare::NotContains.check(&7, &8));
    }

    #[test]
    fn test_compare_serde() {
        let json = serde_json::to_string(&Compare::GreaterThanEqual).unwrap();
        assert_eq!(json, "\"GREATER_THAN_EQUAL\"");
        let parsed: Compare = serde_json::from_str("\"NOT_CONTAINS\"").unwrap();
        assert_eq!(parsed, Compare::NotContains);
    }

    #[test]
    fn test_local_context_flags() {
        let flags = LocalContextFlags::ADAPTER_BEFORE | LocalContextFlags::ADAPTER_AFTER;
        assert_eq!(flags.bits(), 3);
        assert!(flags.intersects(LocalContextFlags::ADAPTER_AFTER));
        assert!(!flags.intersects(LocalContextFlags::BARCODE_BEFORE));
        assert_eq!(
            LocalContextFlags::from_name("ADAPTER_AFTER_BAD"),
            Some(LocalContextFlags(128))
        );
        assert_eq!(LocalContextFlags::from_name("adapter_before"), None);
    }

    #[test]
    fn test_filter_hash() {
        assert_eq!(FilterHash::UnsignedLongCast.hash(14743), 14743);
        assert_eq!(FilterHash::UnsignedLongCast.hash(-1), u32::MAX);
        // upper == 0, so the first combine leaves 0x9e3779b9
        let seed = 0x9e37_79b9u64;
        let expected = seed ^ (14743u64 + 0x9e37_79b9 + (seed << 6) + (seed >> 2));
        assert_eq!(FilterHash::BoostHashCombine.hash(14743), expected as u32);
        assert_eq!(
            FilterHash::from_name("BoostHashCombine").unwrap(),
            FilterHash::BoostHashCombine
        );
        assert!(FilterHash::from_name("crc32").is_err());
    }

    #[test]
    fn test_genomic_interval_parse() {
        let interval: GenomicInterval = "lambda_NEB3011:5000-6000".parse().unwrap();
        assert_eq!(interval, GenomicInterval::new("lambda_NEB3011", 5000, 6000));
        assert_eq!(interval.to_string(), "lambda_NEB3011:5000-6000");
        assert!(interval.overlaps(5999, 7000));
        assert!(!interval.overlaps(6000, 7000));
        assert!("chr1".parse::<GenomicInterval>().is_err());
        assert!("chr1:10-5".parse::<GenomicInterval>().is_err());
    }
}
