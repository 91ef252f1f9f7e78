//! Filter predicate algebra over PBI columns.
//!
//! A [`PbiFilter`] is a tree of column predicates combined with
//! intersection, union and negation. Evaluating it against a
//! [`PbiRawData`] yields the sorted row indices that pass.

pub mod dataset;
pub mod leaf;

pub use dataset::{DatasetFilter, Property};
pub use leaf::{Comparison, LeafFilter, QueryNameLookup, ReadGroupLookup};

use crate::pbi::PbiRawData;
use crate::types::{Compare, FilterHash, LocalContextFlags, Strand};
use crate::{Error, Result};

/// Sorted, de-duplicated row indices
pub type IndexList = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum PbiFilter {
    Leaf(LeafFilter),
    Intersect(Vec<PbiFilter>),
    Union(Vec<PbiFilter>),
    Not(Box<PbiFilter>),
}

impl Default for PbiFilter {
    /// Empty intersection, which accepts every row
    fn default() -> Self {
        PbiFilter::Intersect(Vec::new())
    }
}

impl From<LeafFilter> for PbiFilter {
    fn from(leaf: LeafFilter) -> Self {
        PbiFilter::Leaf(leaf)
    }
}

impl PbiFilter {
    pub fn intersection(filters: Vec<PbiFilter>) -> Self {
        PbiFilter::Intersect(filters)
    }

    pub fn union(filters: Vec<PbiFilter>) -> Self {
        PbiFilter::Union(filters)
    }

    pub fn negate(filter: PbiFilter) -> Self {
        PbiFilter::Not(Box::new(filter))
    }

    /// Add a child. A leaf or negation becomes an intersection of itself and `filter`.
    pub fn add(&mut self, filter: PbiFilter) {
        match self {
            PbiFilter::Intersect(children) | PbiFilter::Union(children) => children.push(filter),
            _ => {
                let current = std::mem::take(self);
                *self = PbiFilter::Intersect(vec![current, filter]);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PbiFilter::Intersect(c) | PbiFilter::Union(c) if c.is_empty())
    }

    /// Rows of `index` accepted by this filter
    pub fn evaluate(&self, index: &PbiRawData) -> IndexList {
        let num_rows = index.num_reads() as usize;
        match self {
            PbiFilter::Leaf(leaf) => leaf.evaluate(index),
            PbiFilter::Intersect(children) => {
                let Some((first, rest)) = children.split_first() else {
                    return (0..num_rows).collect();
                };
                let mut result = first.evaluate(index);
                for child in rest {
                    if result.is_empty() {
                        break;
                    }
                    result = intersect(&result, &child.evaluate(index));
                }
                result
            }
            PbiFilter::Union(children) => {
                if children.is_empty() {
                    return (0..num_rows).collect();
                }
                children
                    .iter()
                    .fold(Vec::new(), |acc, child| union(&acc, &child.evaluate(index)))
            }
            PbiFilter::Not(inner) => complement(&inner.evaluate(index), num_rows),
        }
    }

    // Convenience constructors, one per leaf kind

    pub fn aligned_end(value: u32, compare: Compare) -> Self {
        LeafFilter::AlignedEnd(Comparison::single(value, compare)).into()
    }

    pub fn aligned_length(value: u32, compare: Compare) -> Self {
        LeafFilter::AlignedLength(Comparison::single(value, compare)).into()
    }

    pub fn aligned_start(value: u32, compare: Compare) -> Self {
        LeafFilter::AlignedStart(Comparison::single(value, compare)).into()
    }

    pub fn aligned_strand(strand: Strand, compare: Compare) -> Result<Self> {
        if !matches!(compare, Compare::Equal | Compare::NotEqual) {
            return Err(Error::construction(format!(
                "unsupported compare type ({}) for aligned strand; use == or !=",
                compare.operator()
            )));
        }
        Ok(LeafFilter::AlignedStrand(Comparison::single(strand, compare)).into())
    }

    /// Rows whose forward or reverse barcode matches
    pub fn barcode(barcode: i16, compare: Compare) -> Self {
        PbiFilter::union(vec![
            Self::barcode_forward(barcode, compare),
            Self::barcode_reverse(barcode, compare),
        ])
    }

    /// Rows whose forward and reverse barcodes both match
    pub fn barcodes(forward: i16, reverse: i16, compare: Compare) -> Self {
        PbiFilter::intersection(vec![
            Self::barcode_forward(forward, compare),
            Self::barcode_reverse(reverse, compare),
        ])
    }

    pub fn barcode_forward(barcode: i16, compare: Compare) -> Self {
        LeafFilter::BarcodeForward(Comparison::single(barcode, compare)).into()
    }

    pub fn barcode_forward_list(barcodes: Vec<i16>, compare: Compare) -> Result<Self> {
        Ok(LeafFilter::BarcodeForward(Comparison::list(barcodes, compare)?).into())
    }

    pub fn barcode_reverse(barcode: i16, compare: Compare) -> Self {
        LeafFilter::BarcodeReverse(Comparison::single(barcode, compare)).into()
    }

    pub fn barcode_reverse_list(barcodes: Vec<i16>, compare: Compare) -> Result<Self> {
        Ok(LeafFilter::BarcodeReverse(Comparison::list(barcodes, compare)?).into())
    }

    pub fn barcode_quality(quality: u8, compare: Compare) -> Self {
        LeafFilter::BarcodeQuality(Comparison::single(i16::from(quality), compare)).into()
    }

    pub fn identity(value: f32, compare: Compare) -> Self {
        LeafFilter::Identity(Comparison::single(value, compare)).into()
    }

    pub fn local_context(flags: LocalContextFlags, compare: Compare) -> Self {
        LeafFilter::LocalContext { flags, compare }.into()
    }

    pub fn map_quality(value: u8, compare: Compare) -> Self {
        LeafFilter::MapQuality(Comparison::single(value, compare)).into()
    }

    pub fn movie_name(name: &str, compare: Compare) -> Result<Self> {
        Self::movie_names(&[name], compare)
    }

    pub fn movie_names<S: AsRef<str>>(names: &[S], compare: Compare) -> Result<Self> {
        let ids = leaf::movie_read_group_ids(names);
        Ok(LeafFilter::MovieName {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            ids: Comparison::list(ids, compare)?,
        }
        .into())
    }

    pub fn num_deleted_bases(value: u64, compare: Compare) -> Self {
        LeafFilter::NumDeletedBases(Comparison::single(value, compare)).into()
    }

    pub fn num_inserted_bases(value: u64, compare: Compare) -> Self {
        LeafFilter::NumInsertedBases(Comparison::single(value, compare)).into()
    }

    pub fn num_matches(value: u32, compare: Compare) -> Self {
        LeafFilter::NumMatches(Comparison::single(value, compare)).into()
    }

    pub fn num_mismatches(value: u32, compare: Compare) -> Self {
        LeafFilter::NumMismatches(Comparison::single(value, compare)).into()
    }

    pub fn num_subreads(value: usize, compare: Compare) -> Self {
        LeafFilter::NumSubreads(Comparison::single(value, compare)).into()
    }

    pub fn query_end(value: i32, compare: Compare) -> Self {
        LeafFilter::QueryEnd(Comparison::single(value, compare)).into()
    }

    pub fn query_length(value: i32, compare: Compare) -> Self {
        LeafFilter::QueryLength(Comparison::single(value, compare)).into()
    }

    pub fn query_start(value: i32, compare: Compare) -> Self {
        LeafFilter::QueryStart(Comparison::single(value, compare)).into()
    }

    pub fn query_name(name: &str, compare: Compare) -> Result<Self> {
        Self::query_names(&[name], compare)
    }

    pub fn query_names<S: AsRef<str>>(names: &[S], compare: Compare) -> Result<Self> {
        Ok(LeafFilter::QueryName {
            lookup: QueryNameLookup::new(names)?,
            compare: leaf::list_compare(compare)?,
        }
        .into())
    }

    pub fn read_accuracy(value: f32, compare: Compare) -> Self {
        LeafFilter::ReadAccuracy(Comparison::single(value, compare)).into()
    }

    /// Numeric read-group ids, as stored in the `rgId` column
    pub fn read_group_ids(ids: &[i32], compare: Compare) -> Result<Self> {
        Ok(LeafFilter::ReadGroup {
            lookup: ReadGroupLookup::from_ids(ids),
            compare: leaf::list_compare(compare)?,
        }
        .into())
    }

    /// String read-group ids, optionally with a `/forward--reverse` barcode suffix
    pub fn read_groups<S: AsRef<str>>(ids: &[S], compare: Compare) -> Result<Self> {
        Ok(LeafFilter::ReadGroup {
            lookup: ReadGroupLookup::from_names(ids)?,
            compare: leaf::list_compare(compare)?,
        }
        .into())
    }

    pub fn reference_end(value: u32, compare: Compare) -> Self {
        LeafFilter::ReferenceEnd(Comparison::single(value, compare)).into()
    }

    pub fn reference_id(value: i32, compare: Compare) -> Self {
        LeafFilter::ReferenceId(Comparison::single(value, compare)).into()
    }

    pub fn reference_ids(values: Vec<i32>, compare: Compare) -> Result<Self> {
        Ok(LeafFilter::ReferenceId(Comparison::list(values, compare)?).into())
    }

    pub fn reference_name(name: &str, compare: Compare) -> Result<Self> {
        Self::reference_names(&[name], compare)
    }

    pub fn reference_names<S: AsRef<str>>(names: &[S], compare: Compare) -> Result<Self> {
        Ok(LeafFilter::ReferenceName {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            compare: leaf::list_compare(compare)?,
        }
        .into())
    }

    pub fn reference_start(value: u32, compare: Compare) -> Self {
        LeafFilter::ReferenceStart(Comparison::single(value, compare)).into()
    }

    pub fn zmw(value: i32, compare: Compare) -> Self {
        LeafFilter::Zmw(Comparison::single(value, compare)).into()
    }

    pub fn zmws(values: Vec<i32>, compare: Compare) -> Result<Self> {
        Ok(LeafFilter::Zmw(Comparison::list(values, compare)?).into())
    }

    /// `hash(zmw) % denominator` compared against `value`
    pub fn zmw_modulo(
        denominator: u32,
        value: u32,
        hash: FilterHash,
        compare: Compare,
    ) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::construction("ZMW modulo denominator must be non-zero"));
        }
        Ok(LeafFilter::ZmwModulo {
            denominator,
            value,
            hash,
            compare,
        }
        .into())
    }

    /// Records on `t_id` overlapping the 0-based, half-open span `[start, end)`
    pub fn genomic_range(t_id: i32, start: u32, end: u32) -> Self {
        PbiFilter::intersection(vec![
            Self::reference_id(t_id, Compare::Equal),
            Self::reference_start(end, Compare::LessThan),
            Self::reference_end(start, Compare::GreaterThan),
        ])
    }
}

fn intersect(a: &[usize], b: &[usize]) -> IndexList {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

fn union(a: &[usize], b: &[usize]) -> IndexList {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) if x < y => {
                i += 1;
                x
            }
            (Some(&x), Some(&y)) if x > y => {
                j += 1;
                y
            }
            (Some(&x), Some(_)) => {
                i += 1;
                j += 1;
                x
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, Some(&y)) => {
                j += 1;
                y
            }
            (None, None) => break,
        };
        result.push(next);
    }
    result
}

fn complement(rows: &[usize], num_rows: usize) -> IndexList {
    let mut excluded = rows.iter().peekable();
    (0..num_rows)
        .filter(|row| excluded.next_if_eq(&row).is_none())
        .collect()
}
