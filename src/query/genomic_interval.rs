//! Region queries through each file's BAI index.

use super::composite::SortedQuery;
use super::source::{AlignmentSource, BamSource};
use super::{Query, query_iterator};
use crate::types::GenomicInterval;
use crate::{Error, Result};
use noodles::bam::bai;
use noodles::bgzf::VirtualPosition;
use noodles::core::Position;
use noodles::core::region::Interval;
use noodles::csi::binning_index::BinningIndex;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Conventional BAI path for a BAM: `<bam>.bai`
pub fn bai_path_for(bam_path: &Path) -> PathBuf {
    let mut path = bam_path.as_os_str().to_owned();
    path.push(".bai");
    PathBuf::from(path)
}

/// Resolved target, 0-based half-open
#[derive(Debug, Clone, Copy)]
struct Target {
    reference_id: usize,
    start: usize,
    end: usize,
}

impl Target {
    fn overlaps(&self, record: &RecordBuf) -> bool {
        if record.flags().is_unmapped() || record.reference_sequence_id() != Some(self.reference_id)
        {
            return false;
        }
        match (record.alignment_start(), record.alignment_end()) {
            (Some(start), Some(end)) => {
                usize::from(start) - 1 < self.end && usize::from(end) > self.start
            }
            _ => false,
        }
    }

    /// Sorted input means nothing at or after `end` can overlap
    fn is_past(&self, record: &RecordBuf) -> bool {
        match (record.reference_sequence_id(), record.alignment_start()) {
            (Some(id), Some(start)) => {
                id > self.reference_id
                    || (id == self.reference_id && usize::from(start) - 1 >= self.end)
            }
            _ => true,
        }
    }
}

struct IntervalFile<S> {
    source: S,
    index: bai::Index,
    target: Option<Target>,
    chunks: VecDeque<Chunk>,
    chunk_end: Option<VirtualPosition>,
}

impl<S: AlignmentSource> IntervalFile<S> {
    fn clear(&mut self) {
        self.target = None;
        self.chunks.clear();
        self.chunk_end = None;
    }

    fn reference_id(&self, name: &str) -> Option<usize> {
        self.source
            .header()
            .reference_sequences()
            .get_index_of(name.as_bytes())
    }

    fn retarget(&mut self, reference_id: usize, interval: &GenomicInterval) -> Result<()> {
        self.clear();
        if interval.end <= interval.start {
            return Ok(());
        }
        let start = Position::try_from(interval.start as usize + 1)
            .map_err(|e| Error::format(format!("invalid start position: {}", e)))?;
        let end = Position::try_from(interval.end as usize)
            .map_err(|e| Error::format(format!("invalid end position: {}", e)))?;

        let chunks = self
            .index
            .query(reference_id, Interval::from(start..=end))
            .map_err(|e| Error::format(format!("index query failed: {}", e)))?;
        self.chunks = chunks.into();
        self.target = Some(Target {
            reference_id,
            start: interval.start as usize,
            end: interval.end as usize,
        });
        Ok(())
    }
}

impl<S: AlignmentSource> Query for IntervalFile<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        let Some(target) = self.target else {
            return Ok(None);
        };
        let mut record = RecordBuf::default();
        loop {
            let in_chunk = self
                .chunk_end
                .is_some_and(|end| self.source.virtual_position() < end);
            if !in_chunk {
                let Some(chunk) = self.chunks.pop_front() else {
                    self.clear();
                    return Ok(None);
                };
                self.source.seek(chunk.start())?;
                self.chunk_end = Some(chunk.end());
                continue;
            }

            if !self.source.read_record(&mut record)? {
                self.chunk_end = None;
                continue;
            }
            if target.overlaps(&record) {
                return Ok(Some(record));
            }
            if target.is_past(&record) {
                self.clear();
                return Ok(None);
            }
        }
    }
}

/// Records overlapping a [`GenomicInterval`], merged across files by position
pub struct GenomicIntervalQuery<S = BamSource> {
    merged: SortedQuery<IntervalFile<S>>,
    interval: Option<GenomicInterval>,
}

impl GenomicIntervalQuery<BamSource> {
    /// Open each BAM and its `<bam>.bai`. No interval is selected yet.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let missing: Vec<String> = paths
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !bai_path_for(p).is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::format(format!(
                "cannot create genomic interval query: BAI index missing for {}",
                missing.join(", ")
            )));
        }

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let bai_path = bai_path_for(path);
            let index = bai::fs::read(&bai_path).map_err(|e| {
                Error::format(format!(
                    "failed to read BAI index {}: {}",
                    bai_path.display(),
                    e
                ))
            })?;
            sources.push((BamSource::open(path)?, index));
        }
        Ok(Self::from_sources(sources))
    }

    pub fn new<P: AsRef<Path>>(interval: &GenomicInterval, paths: &[P]) -> Result<Self> {
        let mut query = Self::open(paths)?;
        query.interval(interval)?;
        Ok(query)
    }
}

impl<S: AlignmentSource> GenomicIntervalQuery<S> {
    pub fn from_sources(sources: Vec<(S, bai::Index)>) -> Self {
        let files = sources
            .into_iter()
            .map(|(source, index)| IntervalFile {
                source,
                index,
                target: None,
                chunks: VecDeque::new(),
                chunk_end: None,
            })
            .collect();
        Self {
            merged: SortedQuery::new(files),
            interval: None,
        }
    }

    /// Select a new interval, discarding any unread records.
    ///
    /// Fails if a file does not know the reference name; the query is then
    /// empty until a valid interval is selected.
    pub fn interval(&mut self, interval: &GenomicInterval) -> Result<()> {
        self.merged.reset();
        self.interval = None;
        let files = self.merged.readers_mut();
        files.iter_mut().for_each(IntervalFile::clear);

        let mut reference_ids = Vec::with_capacity(files.len());
        for file in files.iter() {
            let id = file.reference_id(&interval.name).ok_or_else(|| {
                Error::format(format!("unknown reference name: {}", interval.name))
            })?;
            reference_ids.push(id);
        }
        for (file, id) in files.iter_mut().zip(reference_ids) {
            if let Err(e) = file.retarget(id, interval) {
                files.iter_mut().for_each(IntervalFile::clear);
                return Err(e);
            }
        }

        debug!(interval = %interval, files = files.len(), "selected genomic interval");
        self.interval = Some(interval.clone());
        Ok(())
    }

    pub fn current_interval(&self) -> Option<&GenomicInterval> {
        self.interval.as_ref()
    }
}

impl<S: AlignmentSource> Query for GenomicIntervalQuery<S> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        self.merged.next_record()
    }
}

query_iterator!(GenomicIntervalQuery);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bai_path_for() {
        assert_eq!(
            bai_path_for(Path::new("/data/movie.subreads.bam")),
            PathBuf::from("/data/movie.subreads.bam.bai")
        );
    }

    #[test]
    fn test_missing_bai_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"").unwrap();
        let err = GenomicIntervalQuery::open(&[&bam]).err().unwrap();
        assert!(err.is_format());
        assert!(err.to_string().contains("reads.bam"));
    }
}
