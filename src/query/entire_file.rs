use super::composite::SequentialQuery;
use super::source::{self, AlignmentSource, BamSource};
use super::{Query, query_iterator};
use crate::Result;
use noodles::sam::alignment::RecordBuf;
use std::path::Path;

/// Every record of one file, in physical order
pub(crate) struct FileReader<S> {
    source: S,
}

impl<S: AlignmentSource> Query for FileReader<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        let mut record = RecordBuf::default();
        if self.source.read_record(&mut record)? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

/// Streams every record of every file, one file after another
pub struct EntireFileQuery<S = BamSource> {
    inner: SequentialQuery<FileReader<S>>,
}

impl EntireFileQuery<BamSource> {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        Ok(Self::from_sources(source::open_all(paths)?))
    }
}

impl<S: AlignmentSource> EntireFileQuery<S> {
    pub fn from_sources(sources: Vec<S>) -> Self {
        let readers = sources
            .into_iter()
            .map(|source| FileReader { source })
            .collect();
        Self {
            inner: SequentialQuery::new(readers),
        }
    }
}

impl<S: AlignmentSource> Query for EntireFileQuery<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        self.inner.next_record()
    }
}

query_iterator!(EntireFileQuery);
