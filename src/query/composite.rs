//! Combinators over per-file record streams.

use super::Query;
use crate::Result;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;

/// Drains each reader completely before moving to the next
pub struct SequentialQuery<Q> {
    readers: VecDeque<Q>,
}

impl<Q: Query> SequentialQuery<Q> {
    pub fn new(readers: Vec<Q>) -> Self {
        Self {
            readers: readers.into(),
        }
    }

    pub fn num_readers(&self) -> usize {
        self.readers.len()
    }
}

impl<Q: Query> Query for SequentialQuery<Q> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        while let Some(reader) = self.readers.front_mut() {
            if let Some(record) = reader.next_record()? {
                return Ok(Some(record));
            }
            self.readers.pop_front();
        }
        Ok(None)
    }
}

impl<Q: Query> Iterator for SequentialQuery<Q> {
    type Item = Result<RecordBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Merge position of a record: reference id, then 1-based start, unmapped last
pub fn position_key(record: &RecordBuf) -> (usize, usize) {
    match (record.reference_sequence_id(), record.alignment_start()) {
        (Some(id), Some(start)) => (id, usize::from(start)),
        (Some(id), None) => (id, usize::MAX),
        _ => (usize::MAX, usize::MAX),
    }
}

/// K-way merge of position-sorted readers. Ties go to the earlier reader.
pub struct SortedQuery<Q> {
    readers: Vec<Q>,
    heads: Vec<Option<RecordBuf>>,
    primed: bool,
}

impl<Q: Query> SortedQuery<Q> {
    pub fn new(readers: Vec<Q>) -> Self {
        let heads = readers.iter().map(|_| None).collect();
        Self {
            readers,
            heads,
            primed: false,
        }
    }

    /// Forget buffered records so the readers can be re-targeted
    pub fn reset(&mut self) {
        self.heads.iter_mut().for_each(|head| *head = None);
        self.primed = false;
    }

    pub fn readers_mut(&mut self) -> &mut [Q] {
        &mut self.readers
    }

    fn prime(&mut self) -> Result<()> {
        for (reader, head) in self.readers.iter_mut().zip(self.heads.iter_mut()) {
            *head = reader.next_record()?;
        }
        self.primed = true;
        Ok(())
    }
}

impl<Q: Query> Query for SortedQuery<Q> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        if !self.primed {
            self.prime()?;
        }

        let next = self
            .heads
            .iter()
            .enumerate()
            .filter_map(|(i, head)| head.as_ref().map(|record| (position_key(record), i)))
            .min()
            .map(|(_, i)| i);

        let Some(i) = next else {
            return Ok(None);
        };
        let refill = self.readers[i].next_record()?;
        Ok(std::mem::replace(&mut self.heads[i], refill))
    }
}

impl<Q: Query> Iterator for SortedQuery<Q> {
    type Item = Result<RecordBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
