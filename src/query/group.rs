//! Re-batching of record streams into per-ZMW or per-name groups.
//!
//! Groups are runs of consecutive records with the same key; input is never
//! re-sorted, so a key split across the stream yields several groups.

use super::entire_file::EntireFileQuery;
use super::pbi_filter::PbiFilterQuery;
use super::{GroupQuery, Query};
use crate::filter::PbiFilter;
use crate::pbi::record;
use crate::types::Compare;
use crate::Result;
use noodles::sam::alignment::RecordBuf;
use std::path::Path;

/// Groups consecutive records sharing a key
struct Grouper<Q, K> {
    query: Q,
    key: fn(&RecordBuf) -> K,
    pending: Option<RecordBuf>,
}

impl<Q: Query, K: PartialEq> Grouper<Q, K> {
    fn new(query: Q, key: fn(&RecordBuf) -> K) -> Self {
        Self {
            query,
            key,
            pending: None,
        }
    }

    fn next_group(&mut self) -> Result<Option<Vec<RecordBuf>>> {
        let first = match self.pending.take() {
            Some(record) => record,
            None => match self.query.next_record()? {
                Some(record) => record,
                None => return Ok(None),
            },
        };
        let key = (self.key)(&first);
        let mut group = vec![first];
        while let Some(record) = self.query.next_record()? {
            if (self.key)(&record) == key {
                group.push(record);
            } else {
                self.pending = Some(record);
                break;
            }
        }
        Ok(Some(group))
    }
}

fn record_name(record: &RecordBuf) -> Option<Vec<u8>> {
    record.name().map(|name| name.to_vec())
}

/// Batches of records from the same ZMW
pub struct ZmwGroupQuery<Q = Box<dyn Query>> {
    grouper: Grouper<Q, Option<i32>>,
}

impl ZmwGroupQuery<Box<dyn Query>> {
    /// Every ZMW of every file
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        Ok(Self::from_query(Box::new(EntireFileQuery::new(paths)?)))
    }

    /// Only the listed ZMWs, selected through each file's `.pbi`
    pub fn with_whitelist<P: AsRef<Path>>(paths: &[P], zmws: Vec<i32>) -> Result<Self> {
        let filter = PbiFilter::zmws(zmws, Compare::Equal)?;
        Ok(Self::from_query(Box::new(PbiFilterQuery::new(filter, paths)?)))
    }
}

impl<Q: Query> ZmwGroupQuery<Q> {
    pub fn from_query(query: Q) -> Self {
        Self {
            grouper: Grouper::new(query, record::hole_number),
        }
    }
}

impl<Q: Query> GroupQuery for ZmwGroupQuery<Q> {
    fn next_group(&mut self) -> Result<Option<Vec<RecordBuf>>> {
        self.grouper.next_group()
    }
}

impl<Q: Query> Iterator for ZmwGroupQuery<Q> {
    type Item = Result<Vec<RecordBuf>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group().transpose()
    }
}

/// Batches of consecutive records with the same full name
pub struct QNameQuery<Q = Box<dyn Query>> {
    grouper: Grouper<Q, Option<Vec<u8>>>,
}

impl QNameQuery<Box<dyn Query>> {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        Ok(Self::from_query(Box::new(EntireFileQuery::new(paths)?)))
    }
}

impl<Q: Query> QNameQuery<Q> {
    pub fn from_query(query: Q) -> Self {
        Self {
            grouper: Grouper::new(query, record_name),
        }
    }
}

impl<Q: Query> GroupQuery for QNameQuery<Q> {
    fn next_group(&mut self) -> Result<Option<Vec<RecordBuf>>> {
        self.grouper.next_group()
    }
}

impl<Q: Query> Iterator for QNameQuery<Q> {
    type Item = Result<Vec<RecordBuf>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group().transpose()
    }
}
