//! Leaf predicates over individual index columns.

use crate::pbi::read_group::{self, RecordType};
use crate::pbi::{PbiRawData, PbiSections};
use crate::types::{Compare, FilterHash, LocalContextFlags, Strand};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Map a caller's operator onto the set-membership form used by list filters
pub fn list_compare(compare: Compare) -> Result<Compare> {
    match compare {
        Compare::Equal | Compare::Contains => Ok(Compare::Contains),
        Compare::NotEqual | Compare::NotContains => Ok(Compare::NotContains),
        other => Err(Error::construction(format!(
            "unsupported compare type ({}) for a list filter; \
             only equality or whitelist/blacklist membership is allowed",
            other.operator()
        ))),
    }
}

/// A value (or value list) and the comparison applied to a column
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison<T> {
    Single { value: T, compare: Compare },
    /// Sorted lookup values; `compare` is `Contains` or `NotContains`
    List { values: Vec<T>, compare: Compare },
}

impl<T: PartialOrd + Clone> Comparison<T> {
    pub fn single(value: T, compare: Compare) -> Self {
        Comparison::Single { value, compare }
    }

    pub fn list(mut values: Vec<T>, compare: Compare) -> Result<Self> {
        let compare = list_compare(compare)?;
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        values.dedup();
        Ok(Comparison::List { values, compare })
    }

    pub fn compare(&self) -> Compare {
        match self {
            Comparison::Single { compare, .. } | Comparison::List { compare, .. } => *compare,
        }
    }

    pub fn accepts(&self, lhs: &T) -> bool {
        match self {
            Comparison::Single { value, compare } => compare.check(lhs, value),
            Comparison::List { values, compare } => {
                let found = values
                    .binary_search_by(|v| v.partial_cmp(lhs).unwrap_or(Ordering::Less))
                    .is_ok();
                if *compare == Compare::Contains {
                    found
                } else {
                    !found
                }
            }
        }
    }
}

/// Movie/ZMW/query-interval lookup built from PacBio record names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryNameLookup {
    rg_groups: HashMap<i32, usize>,
    zmws: Vec<HashMap<i32, Option<BTreeSet<(i32, i32)>>>>,
}

impl QueryNameLookup {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut lookup = Self::default();
        for name in names {
            lookup.add(name.as_ref())?;
        }
        Ok(lookup)
    }

    fn add(&mut self, name: &str) -> Result<()> {
        let invalid =
            |why: &str| Error::format(format!("{} is not a valid PacBio record name: {}", name, why));

        let record_type = if name.starts_with("transcript/") {
            RecordType::Transcript
        } else if name.contains("/ccs") {
            RecordType::Ccs
        } else {
            RecordType::Unknown
        };

        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() < 2 {
            return Err(invalid("expected movie/zmw/..."));
        }
        let zmw: i32 = parts[1]
            .parse()
            .map_err(|_| invalid("ZMW id must be a number"))?;

        let candidates: Vec<RecordType> = match record_type {
            RecordType::Ccs | RecordType::Transcript => vec![record_type],
            _ => vec![
                RecordType::Polymerase,
                RecordType::HqRegion,
                RecordType::Subread,
                RecordType::Scrap,
                RecordType::Unknown,
                RecordType::Zmw,
            ],
        };
        let rg_ids: Vec<i32> = candidates
            .iter()
            .map(|t| read_group::read_group_int(parts[0], *t))
            .collect();
        let group = self.group_for(&rg_ids);

        match record_type {
            RecordType::Ccs | RecordType::Transcript => {
                self.zmws[group].entry(zmw).or_insert(None);
            }
            _ => {
                let interval = parts.get(2).ok_or_else(|| invalid("missing qStart_qEnd"))?;
                let (qs, qe) = interval
                    .split_once('_')
                    .ok_or_else(|| invalid("expected qStart_qEnd"))?;
                let qs: i32 = qs
                    .parse()
                    .map_err(|_| invalid("qStart/qEnd must be numbers"))?;
                let qe: i32 = qe
                    .parse()
                    .map_err(|_| invalid("qStart/qEnd must be numbers"))?;
                self.zmws[group]
                    .entry(zmw)
                    .or_insert_with(|| Some(BTreeSet::new()))
                    .get_or_insert_with(BTreeSet::new)
                    .insert((qs, qe));
            }
        }
        Ok(())
    }

    fn group_for(&mut self, rg_ids: &[i32]) -> usize {
        if let Some(group) = rg_ids.first().and_then(|id| self.rg_groups.get(id)) {
            return *group;
        }
        let group = self.zmws.len();
        self.zmws.push(HashMap::new());
        for id in rg_ids {
            self.rg_groups.insert(*id, group);
        }
        group
    }

    pub fn contains(&self, index: &PbiRawData, row: usize) -> bool {
        let basic = index.basic();
        let Some(group) = self.rg_groups.get(&basic.rg_id[row]) else {
            return false;
        };
        match self.zmws[*group].get(&basic.hole_number[row]) {
            None => false,
            Some(None) => true,
            Some(Some(intervals)) => intervals.contains(&(basic.q_start[row], basic.q_end[row])),
        }
    }
}

/// Read-group ids, each optionally restricted to barcode pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadGroupLookup {
    ids: HashMap<i32, Option<Vec<(i16, i16)>>>,
}

impl ReadGroupLookup {
    pub fn from_ids(ids: &[i32]) -> Self {
        Self {
            ids: ids.iter().map(|id| (*id, None)).collect(),
        }
    }

    /// Parse string ids such as `b89a4406` or `b89a4406/0--1`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut lookup = Self::default();
        for name in names {
            let name = name.as_ref().trim();
            let id = read_group::id_to_int(name)
                .ok_or_else(|| Error::format(format!("invalid read group id: {}", name)))?;
            let entry = lookup.ids.entry(id).or_insert(None);
            if let Some(barcodes) = read_group::barcodes_from_id(name) {
                entry.get_or_insert_with(Vec::new).push(barcodes);
            }
        }
        Ok(lookup)
    }

    pub fn contains(&self, index: &PbiRawData, row: usize) -> bool {
        match self.ids.get(&index.basic().rg_id[row]) {
            None => false,
            Some(None) => true,
            Some(Some(pairs)) => {
                if !index.has_barcode_data() {
                    return false;
                }
                let barcode = index.barcode();
                let row_pair = (barcode.bc_forward[row], barcode.bc_reverse[row]);
                pairs.contains(&row_pair)
            }
        }
    }
}

/// Index column predicate
#[derive(Debug, Clone, PartialEq)]
pub enum LeafFilter {
    AlignedEnd(Comparison<u32>),
    AlignedLength(Comparison<u32>),
    AlignedStart(Comparison<u32>),
    AlignedStrand(Comparison<Strand>),
    BarcodeForward(Comparison<i16>),
    BarcodeReverse(Comparison<i16>),
    /// Compared as a signed value, so the missing marker (-1) never passes `>= 0`
    BarcodeQuality(Comparison<i16>),
    Identity(Comparison<f32>),
    LocalContext {
        flags: LocalContextFlags,
        compare: Compare,
    },
    MapQuality(Comparison<u8>),
    /// Read-group ids derived from movie names, matched by membership
    MovieName {
        names: Vec<String>,
        ids: Comparison<i32>,
    },
    NumDeletedBases(Comparison<u64>),
    NumInsertedBases(Comparison<u64>),
    NumMatches(Comparison<u32>),
    NumMismatches(Comparison<u32>),
    NumSubreads(Comparison<usize>),
    QueryEnd(Comparison<i32>),
    QueryLength(Comparison<i32>),
    QueryName {
        lookup: QueryNameLookup,
        compare: Compare,
    },
    QueryStart(Comparison<i32>),
    ReadAccuracy(Comparison<f32>),
    ReadGroup {
        lookup: ReadGroupLookup,
        compare: Compare,
    },
    ReferenceEnd(Comparison<u32>),
    ReferenceId(Comparison<i32>),
    /// Resolved against the reference names attached to the index at evaluation time
    ReferenceName {
        names: Vec<String>,
        compare: Compare,
    },
    ReferenceStart(Comparison<u32>),
    Zmw(Comparison<i32>),
    ZmwModulo {
        denominator: u32,
        value: u32,
        hash: FilterHash,
        compare: Compare,
    },
}

impl LeafFilter {
    /// Section this leaf reads, beyond the basic columns
    fn required_section(&self) -> Option<PbiSections> {
        use LeafFilter::*;
        match self {
            AlignedEnd(_) | AlignedLength(_) | AlignedStart(_) | AlignedStrand(_)
            | Identity(_) | MapQuality(_) | NumDeletedBases(_) | NumInsertedBases(_)
            | NumMatches(_) | NumMismatches(_) | ReferenceEnd(_) | ReferenceId(_)
            | ReferenceName { .. } | ReferenceStart(_) => Some(PbiSections::MAPPED),
            BarcodeForward(_) | BarcodeReverse(_) | BarcodeQuality(_) => Some(PbiSections::BARCODE),
            _ => None,
        }
    }

    /// Sorted row indices accepted by this leaf
    pub fn evaluate(&self, index: &PbiRawData) -> Vec<usize> {
        if let Some(section) = self.required_section() {
            if !index.sections().contains(section) {
                return Vec::new();
            }
        }
        let num_rows = index.num_reads() as usize;

        match self {
            LeafFilter::NumSubreads(comparison) => {
                let passing = zmws_with_passing_subread_count(index, comparison);
                let zmws = &index.basic().hole_number;
                (0..num_rows).filter(|&row| passing.contains(&zmws[row])).collect()
            }
            LeafFilter::ReferenceName { names, compare } => {
                let mut ids: Vec<i32> = names
                    .iter()
                    .filter_map(|name| index.reference_id(name))
                    .collect();
                ids.sort_unstable();
                let comparison = Comparison::List {
                    values: ids,
                    compare: *compare,
                };
                let t_ids = &index.mapped().t_id;
                (0..num_rows)
                    .filter(|&row| comparison.accepts(&t_ids[row]))
                    .collect()
            }
            _ => (0..num_rows)
                .filter(|&row| self.accepts(index, row))
                .collect(),
        }
    }

    /// Row test for leaves that only need the row itself
    fn accepts(&self, index: &PbiRawData, row: usize) -> bool {
        let basic = index.basic();
        let mapped = index.mapped();
        let barcode = index.barcode();
        match self {
            LeafFilter::AlignedEnd(c) => c.accepts(&mapped.a_end[row]),
            LeafFilter::AlignedLength(c) => c.accepts(&mapped.aligned_length(row)),
            LeafFilter::AlignedStart(c) => c.accepts(&mapped.a_start[row]),
            LeafFilter::AlignedStrand(c) => c.accepts(&mapped.strand(row)),
            LeafFilter::BarcodeForward(c) => c.accepts(&barcode.bc_forward[row]),
            LeafFilter::BarcodeReverse(c) => c.accepts(&barcode.bc_reverse[row]),
            LeafFilter::BarcodeQuality(c) => c.accepts(&i16::from(barcode.bc_qual[row])),
            LeafFilter::Identity(c) => c.accepts(&index.identity(row)),
            LeafFilter::LocalContext { flags, compare } => {
                let row_flags = LocalContextFlags(basic.ctxt_flag[row]);
                match compare {
                    Compare::Contains => row_flags.intersects(*flags),
                    Compare::NotContains => !row_flags.intersects(*flags),
                    other => other.check(&row_flags, flags),
                }
            }
            LeafFilter::MapQuality(c) => c.accepts(&mapped.map_qv[row]),
            LeafFilter::MovieName { ids, .. } => ids.accepts(&basic.rg_id[row]),
            LeafFilter::NumDeletedBases(c) => c.accepts(&mapped.num_deleted_bases(row)),
            LeafFilter::NumInsertedBases(c) => c.accepts(&mapped.num_inserted_bases(row)),
            LeafFilter::NumMatches(c) => c.accepts(&mapped.n_m[row]),
            LeafFilter::NumMismatches(c) => c.accepts(&mapped.n_mm[row]),
            LeafFilter::QueryEnd(c) => c.accepts(&basic.q_end[row]),
            LeafFilter::QueryLength(c) => c.accepts(&basic.query_length(row)),
            LeafFilter::QueryName { lookup, compare } => {
                lookup.contains(index, row) == (*compare == Compare::Contains)
            }
            LeafFilter::QueryStart(c) => c.accepts(&basic.q_start[row]),
            LeafFilter::ReadAccuracy(c) => c.accepts(&basic.read_qual[row]),
            LeafFilter::ReadGroup { lookup, compare } => {
                lookup.contains(index, row) == (*compare == Compare::Contains)
            }
            LeafFilter::ReferenceEnd(c) => c.accepts(&mapped.t_end[row]),
            LeafFilter::ReferenceId(c) => c.accepts(&mapped.t_id[row]),
            LeafFilter::ReferenceStart(c) => c.accepts(&mapped.t_start[row]),
            LeafFilter::Zmw(c) => c.accepts(&basic.hole_number[row]),
            LeafFilter::ZmwModulo {
                denominator,
                value,
                hash,
                compare,
            } => {
                let hashed = hash.hash(basic.hole_number[row]);
                compare.check(&(hashed % denominator), value)
            }
            // evaluated over the whole index in `evaluate`
            LeafFilter::NumSubreads(_) | LeafFilter::ReferenceName { .. } => false,
        }
    }
}

/// Hole numbers whose run of consecutive rows has an accepted length
fn zmws_with_passing_subread_count(
    index: &PbiRawData,
    comparison: &Comparison<usize>,
) -> HashSet<i32> {
    let mut passing = HashSet::new();
    let zmws = &index.basic().hole_number;
    let mut rows = zmws.iter().peekable();
    while let Some(zmw) = rows.next() {
        let mut count = 1;
        while rows.next_if(|next| *next == zmw).is_some() {
            count += 1;
        }
        if comparison.accepts(&count) {
            passing.insert(*zmw);
        }
    }
    passing
}

/// Candidate read-group ids for every read type a movie can produce
pub fn movie_read_group_ids<S: AsRef<str>>(movie_names: &[S]) -> Vec<i32> {
    movie_names
        .iter()
        .flat_map(|movie| {
            RecordType::ALL
                .into_iter()
                .map(move |t| read_group::read_group_int(movie.as_ref(), t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbi::raw::tests::{test2_barcoded_index, test2_index};

    const MOVIE: &str = "m140905_042212_sidney_c100564852550000001823085912221377_s1_X0";

    #[test]
    fn test_list_compare_mapping() {
        assert_eq!(list_compare(Compare::Equal).unwrap(), Compare::Contains);
        assert_eq!(list_compare(Compare::NotEqual).unwrap(), Compare::NotContains);
        let err = list_compare(Compare::LessThan).unwrap_err();
        assert_eq!(err.error_type(), "ConstructionError");
    }

    #[test]
    fn test_comparison_list_lookup() {
        let whitelist = Comparison::list(vec![30, 10, 20, 10], Compare::Equal).unwrap();
        assert!(whitelist.accepts(&20));
        assert!(!whitelist.accepts(&15));
        let blacklist = Comparison::list(vec![10], Compare::NotEqual).unwrap();
        assert!(blacklist.accepts(&15));
        assert!(!blacklist.accepts(&10));
    }

    #[test]
    fn test_query_length_leaf() {
        let leaf = LeafFilter::QueryLength(Comparison::single(500, Compare::GreaterThanEqual));
        assert_eq!(leaf.evaluate(&test2_index()), vec![1, 2, 3]);
    }

    #[test]
    fn test_mapped_leaf_without_mapped_data() {
        let mut index = test2_index();
        index.set_sections(PbiSections::BASIC);
        let leaf = LeafFilter::ReferenceStart(Comparison::single(0, Compare::GreaterThanEqual));
        assert!(leaf.evaluate(&index).is_empty());
    }

    #[test]
    fn test_local_context_contains() {
        let index = test2_index();
        let adapter_after = LeafFilter::LocalContext {
            flags: LocalContextFlags::ADAPTER_AFTER,
            compare: Compare::Contains,
        };
        assert_eq!(adapter_after.evaluate(&index), vec![2, 3]);

        let no_adapter_before = LeafFilter::LocalContext {
            flags: LocalContextFlags::ADAPTER_BEFORE,
            compare: Compare::NotContains,
        };
        assert_eq!(no_adapter_before.evaluate(&index), vec![0, 2]);

        let none = LeafFilter::LocalContext {
            flags: LocalContextFlags::NO_LOCAL_CONTEXT,
            compare: Compare::Equal,
        };
        assert_eq!(none.evaluate(&index), vec![0]);
    }

    #[test]
    fn test_barcode_quality_missing_value() {
        let mut index = test2_barcoded_index();
        index.barcode_mut().bc_qual[1] = -1;
        let leaf = LeafFilter::BarcodeQuality(Comparison::single(0, Compare::GreaterThanEqual));
        assert_eq!(leaf.evaluate(&index), vec![0, 2, 3]);
    }

    #[test]
    fn test_movie_name_leaf() {
        let ids = movie_read_group_ids(&[MOVIE]);
        assert_eq!(ids.len(), 8);
        let leaf = LeafFilter::MovieName {
            names: vec![MOVIE.to_string()],
            ids: Comparison::list(ids, Compare::Equal).unwrap(),
        };
        assert_eq!(leaf.evaluate(&test2_index()), vec![0, 1, 2, 3]);

        let other = LeafFilter::MovieName {
            names: vec!["movie1".to_string()],
            ids: Comparison::list(movie_read_group_ids(&["movie1"]), Compare::Equal).unwrap(),
        };
        assert!(other.evaluate(&test2_index()).is_empty());
    }

    #[test]
    fn test_query_name_lookup() {
        let names = [
            format!("{}/14743/2114_2531", MOVIE),
            format!("{}/14743/5615_6237", MOVIE),
            format!("{}/14743/1_2", MOVIE),
        ];
        let lookup = QueryNameLookup::new(&names).unwrap();
        let leaf = LeafFilter::QueryName {
            lookup: lookup.clone(),
            compare: Compare::Contains,
        };
        assert_eq!(leaf.evaluate(&test2_index()), vec![0, 3]);

        let leaf = LeafFilter::QueryName {
            lookup,
            compare: Compare::NotContains,
        };
        assert_eq!(leaf.evaluate(&test2_index()), vec![1, 2]);
    }

    #[test]
    fn test_query_name_lookup_ccs() {
        let mut index = test2_index();
        index.basic_mut().rg_id[2] = read_group::read_group_int(MOVIE, RecordType::Ccs);
        let lookup = QueryNameLookup::new(&[format!("{}/14743/ccs", MOVIE)]).unwrap();
        let leaf = LeafFilter::QueryName {
            lookup,
            compare: Compare::Contains,
        };
        assert_eq!(leaf.evaluate(&index), vec![2]);
    }

    #[test]
    fn test_query_name_rejects_malformed() {
        assert!(QueryNameLookup::new(&["read1"]).unwrap_err().is_format());
        assert!(QueryNameLookup::new(&["movie/abc/0_10"]).unwrap_err().is_format());
        assert!(QueryNameLookup::new(&["movie/12/0-10"]).unwrap_err().is_format());
    }

    #[test]
    fn test_read_group_lookup_with_barcodes() {
        let index = test2_barcoded_index();
        let lookup = ReadGroupLookup::from_names(&["b89a4406/17--18"]).unwrap();
        let leaf = LeafFilter::ReadGroup {
            lookup,
            compare: Compare::Contains,
        };
        assert_eq!(leaf.evaluate(&index), vec![1, 3]);

        let plain = LeafFilter::ReadGroup {
            lookup: ReadGroupLookup::from_ids(&[-1197849594]),
            compare: Compare::Contains,
        };
        assert_eq!(plain.evaluate(&index), vec![0, 1, 2, 3]);
        assert!(ReadGroupLookup::from_names(&["zzz"]).is_err());
    }

    #[test]
    fn test_num_subreads() {
        let mut index = test2_index();
        index.basic_mut().hole_number = vec![1, 1, 1, 2];
        let leaf = LeafFilter::NumSubreads(Comparison::single(2, Compare::GreaterThanEqual));
        assert_eq!(leaf.evaluate(&index), vec![0, 1, 2]);
        let leaf = LeafFilter::NumSubreads(Comparison::single(1, Compare::Equal));
        assert_eq!(leaf.evaluate(&index), vec![3]);
    }

    #[test]
    fn test_reference_name_resolution() {
        let mut index = test2_index();
        let leaf = LeafFilter::ReferenceName {
            names: vec!["lambda_NEB3011".to_string()],
            compare: Compare::Contains,
        };
        assert!(leaf.evaluate(&index).is_empty());

        index.set_reference_names(vec!["lambda_NEB3011".to_string()]);
        assert_eq!(leaf.evaluate(&index), vec![0, 1, 2, 3]);

        let unknown = LeafFilter::ReferenceName {
            names: vec!["chrX".to_string()],
            compare: Compare::Contains,
        };
        assert!(unknown.evaluate(&index).is_empty());
    }

    #[test]
    fn test_zmw_modulo() {
        let index = test2_index();
        let leaf = LeafFilter::ZmwModulo {
            denominator: 2,
            value: 1,
            hash: FilterHash::UnsignedLongCast,
            compare: Compare::Equal,
        };
        // 14743 is odd
        assert_eq!(leaf.evaluate(&index), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_identity_leaf() {
        let index = test2_index();
        let leaf = LeafFilter::Identity(Comparison::single(0.95, Compare::GreaterThanEqual));
        let expected: Vec<usize> = (0..4).filter(|&row| index.identity(row) >= 0.95).collect();
        assert_eq!(leaf.evaluate(&index), expected);
    }
}
