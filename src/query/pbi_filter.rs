//! Index-driven record selection.
//!
//! Each file's `.pbi` is evaluated against the filter and the passing rows
//! are merged into runs of consecutive rows. A run costs one seek.

use super::source::{AlignmentSource, BamSource};
use super::{Query, query_iterator};
use crate::filter::PbiFilter;
use crate::pbi::{PbiRawData, pbi_path_for};
use crate::types::Compare;
use crate::{Error, Result};
use noodles::bgzf::VirtualPosition;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

/// Run of consecutive passing rows starting at `virtual_offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBlock {
    pub first_row: usize,
    pub num_reads: usize,
    pub virtual_offset: i64,
}

/// Merge sorted row indices into blocks of consecutive rows
pub fn merge_blocks(rows: &[usize], offsets: &[i64]) -> Vec<IndexBlock> {
    let mut blocks: Vec<IndexBlock> = Vec::new();
    for &row in rows {
        match blocks.last_mut() {
            Some(block) if block.first_row + block.num_reads == row => block.num_reads += 1,
            _ => blocks.push(IndexBlock {
                first_row: row,
                num_reads: 1,
                virtual_offset: offsets[row],
            }),
        }
    }
    blocks
}

struct IndexedFile<S> {
    source: S,
    index: PbiRawData,
    blocks: VecDeque<IndexBlock>,
    remaining: usize,
    num_selected: usize,
}

impl<S: AlignmentSource> IndexedFile<S> {
    fn new(source: S, mut index: PbiRawData) -> Self {
        let names = source
            .header()
            .reference_sequences()
            .keys()
            .map(|name| String::from_utf8_lossy(name.as_ref()).into_owned())
            .collect();
        index.set_reference_names(names);
        Self {
            source,
            index,
            blocks: VecDeque::new(),
            remaining: 0,
            num_selected: 0,
        }
    }

    fn apply(&mut self, filter: &PbiFilter) {
        let rows = filter.evaluate(&self.index);
        self.num_selected = rows.len();
        self.blocks = merge_blocks(&rows, &self.index.basic().file_offset).into();
        self.remaining = 0;
    }
}

impl<S: AlignmentSource> Query for IndexedFile<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        while self.remaining == 0 {
            let Some(block) = self.blocks.pop_front() else {
                return Ok(None);
            };
            self.source
                .seek(VirtualPosition::from(block.virtual_offset as u64))?;
            self.remaining = block.num_reads;
        }

        let mut record = RecordBuf::default();
        if !self.source.read_record(&mut record)? {
            return Err(Error::format(format!(
                "index points past the end of the alignment file ({} records missing)",
                self.remaining
            )));
        }
        self.remaining -= 1;
        Ok(Some(record))
    }
}

/// Records passing a [`PbiFilter`], file by file in index order
pub struct PbiFilterQuery<S = BamSource> {
    files: Vec<IndexedFile<S>>,
    current: usize,
    filter: PbiFilter,
}

impl PbiFilterQuery<BamSource> {
    /// Open each BAM together with its `<bam>.pbi`
    pub fn new<P: AsRef<Path>>(filter: PbiFilter, paths: &[P]) -> Result<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let source = BamSource::open(path)?;
            let index = PbiRawData::from_file(pbi_path_for(path))?;
            sources.push((source, index));
        }
        Ok(Self::from_sources(filter, sources))
    }

    /// Records whose `rq` passes `accuracy`
    pub fn read_accuracy<P: AsRef<Path>>(
        paths: &[P],
        accuracy: f32,
        compare: Compare,
    ) -> Result<Self> {
        Self::new(PbiFilter::read_accuracy(accuracy, compare), paths)
    }

    /// Records whose query length passes `length`
    pub fn subread_length<P: AsRef<Path>>(
        paths: &[P],
        length: i32,
        compare: Compare,
    ) -> Result<Self> {
        Self::new(PbiFilter::query_length(length, compare), paths)
    }

    /// Records from the listed ZMWs only
    pub fn zmw_whitelist<P: AsRef<Path>>(paths: &[P], zmws: Vec<i32>) -> Result<Self> {
        Self::new(PbiFilter::zmws(zmws, Compare::Equal)?, paths)
    }
}

impl<S: AlignmentSource> PbiFilterQuery<S> {
    pub fn from_sources(filter: PbiFilter, sources: Vec<(S, PbiRawData)>) -> Self {
        let files = sources
            .into_iter()
            .map(|(source, index)| IndexedFile::new(source, index))
            .collect();
        let mut query = Self {
            files,
            current: 0,
            filter: PbiFilter::default(),
        };
        query.set_filter(filter);
        query
    }

    /// Re-evaluate against a new filter and restart from the first file
    pub fn set_filter(&mut self, filter: PbiFilter) {
        for file in &mut self.files {
            file.apply(&filter);
        }
        self.current = 0;
        self.filter = filter;
        debug!(
            files = self.files.len(),
            num_reads = self.num_reads(),
            "applied PBI filter"
        );
    }

    pub fn filter(&self) -> &PbiFilter {
        &self.filter
    }

    /// Number of records the current filter selects across all files
    pub fn num_reads(&self) -> usize {
        self.files.iter().map(|f| f.num_selected).sum()
    }
}

impl<S: AlignmentSource> Query for PbiFilterQuery<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        while let Some(file) = self.files.get_mut(self.current) {
            if let Some(record) = file.next_record()? {
                return Ok(Some(record));
            }
            self.current += 1;
        }
        Ok(None)
    }
}

query_iterator!(PbiFilterQuery);
