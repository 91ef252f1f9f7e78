//! Incremental construction of a PBI index while scanning a BAM file.

use super::raw::{ReferenceData, ReferenceEntry, UNMAPPED_ID, UNSET_ROW};
use super::record::RecordSummary;
use super::{PbiRawData, PbiSections, PbiVersion};
use crate::{Error, Result};
use noodles::sam::alignment::RecordBuf;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tracks per-reference row runs for a coordinate-sorted BAM.
///
/// Entries are keyed by `t_id as u32`, so the unmapped entry (-1) sorts last.
#[derive(Debug)]
pub struct ReferenceDataBuilder {
    entries: BTreeMap<u32, ReferenceEntry>,
    last_ref_id: i32,
    last_pos: i64,
}

impl ReferenceDataBuilder {
    pub fn new(num_references: usize) -> Self {
        let mut entries = BTreeMap::new();
        for t_id in 0..num_references {
            entries.insert(t_id as u32, ReferenceEntry::new(t_id as i32));
        }
        entries.insert(UNMAPPED_ID as u32, ReferenceEntry::new(UNMAPPED_ID));
        Self {
            entries,
            last_ref_id: UNMAPPED_ID,
            last_pos: -1,
        }
    }

    /// Record one row. Returns false once the input is found not to be coordinate-sorted.
    pub fn add_record(&mut self, t_id: i32, pos: i64, row: u32) -> bool {
        if self.last_ref_id != t_id {
            if t_id >= 0 {
                // unmapped reads must come last
                let unmapped_seen = self
                    .entries
                    .get(&(UNMAPPED_ID as u32))
                    .is_some_and(|e| e.begin_row != UNSET_ROW);
                if unmapped_seen {
                    return false;
                }
                match self.entries.get(&(t_id as u32)) {
                    Some(entry) if entry.begin_row != UNSET_ROW => return false,
                    Some(_) => {}
                    None => return false,
                }
            }
            self.last_ref_id = t_id;
        } else if t_id >= 0 && self.last_pos > pos {
            return false;
        }

        let Some(entry) = self.entries.get_mut(&(t_id as u32)) else {
            return false;
        };
        if entry.begin_row == UNSET_ROW {
            entry.begin_row = row;
        }
        entry.end_row = row + 1;
        self.last_pos = pos;
        true
    }

    pub fn result(&self) -> ReferenceData {
        ReferenceData {
            entries: self.entries.values().copied().collect(),
        }
    }
}

/// Accumulates index rows and writes the finished `.pbi` on [`PbiBuilder::close`].
///
/// The index is first written to `<pbi>.build` and renamed into place, so a
/// partially written index never appears under the final name.
pub struct PbiBuilder {
    pbi_path: PathBuf,
    index: PbiRawData,
    reference_builder: Option<ReferenceDataBuilder>,
    has_mapped_data: bool,
    has_barcode_data: bool,
    closed: bool,
}

impl PbiBuilder {
    pub fn new(
        pbi_path: impl AsRef<Path>,
        num_references: usize,
        is_coordinate_sorted: bool,
    ) -> Self {
        let mut index = PbiRawData::new(0);
        index.set_version(PbiVersion::CURRENT);
        Self {
            pbi_path: pbi_path.as_ref().to_path_buf(),
            index,
            reference_builder: is_coordinate_sorted
                .then(|| ReferenceDataBuilder::new(num_references)),
            has_mapped_data: false,
            has_barcode_data: false,
            closed: false,
        }
    }

    pub fn num_reads(&self) -> u32 {
        self.index.num_reads()
    }

    /// Append one record read from `file_offset` (BGZF virtual offset)
    pub fn add_record(&mut self, record: &RecordBuf, file_offset: i64) -> Result<()> {
        self.add_summary(&RecordSummary::from_record(record), file_offset)
    }

    pub fn add_summary(&mut self, summary: &RecordSummary, file_offset: i64) -> Result<()> {
        if self.closed {
            return Err(Error::construction("cannot add records to a closed index builder"));
        }
        let row = self.index.num_reads();

        let basic = self.index.basic_mut();
        basic.rg_id.push(summary.rg_id);
        basic.q_start.push(summary.q_start);
        basic.q_end.push(summary.q_end);
        basic.hole_number.push(summary.hole_number);
        basic.read_qual.push(summary.read_qual);
        basic.ctxt_flag.push(summary.ctxt_flag);
        basic.file_offset.push(file_offset);

        if summary.t_id >= 0 {
            self.has_mapped_data = true;
        }
        let mapped = self.index.mapped_mut();
        mapped.t_id.push(summary.t_id);
        mapped.t_start.push(summary.t_start);
        mapped.t_end.push(summary.t_end);
        mapped.a_start.push(summary.a_start);
        mapped.a_end.push(summary.a_end);
        mapped.rev_strand.push(summary.rev_strand);
        mapped.n_m.push(summary.n_m);
        mapped.n_mm.push(summary.n_mm);
        mapped.map_qv.push(summary.map_qv);
        mapped.n_ins_ops.push(summary.n_ins_ops);
        mapped.n_del_ops.push(summary.n_del_ops);

        let (bc_forward, bc_reverse, bc_qual) = match summary.barcodes {
            Some((f, r, q)) if f >= 0 || r >= 0 || q >= 0 => {
                self.has_barcode_data = true;
                (f, r, q)
            }
            _ => (-1, -1, -1),
        };
        let barcode = self.index.barcode_mut();
        barcode.bc_forward.push(bc_forward);
        barcode.bc_reverse.push(bc_reverse);
        barcode.bc_qual.push(bc_qual);

        if let Some(reference_builder) = self.reference_builder.as_mut() {
            let pos = if summary.t_id >= 0 {
                i64::from(summary.t_start)
            } else {
                -1
            };
            if !reference_builder.add_record(summary.t_id, pos, row) {
                warn!(
                    row,
                    "records are not coordinate-sorted, skipping reference section"
                );
                self.reference_builder = None;
            }
        }

        self.index.set_num_reads(row + 1);
        Ok(())
    }

    /// Write the index. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let mut sections = PbiSections::BASIC;
        if self.has_mapped_data {
            sections.insert(PbiSections::MAPPED);
            if let Some(reference_builder) = &self.reference_builder {
                sections.insert(PbiSections::REFERENCE);
                *self.index.reference_mut() = reference_builder.result();
            }
        }
        if self.has_barcode_data {
            sections.insert(PbiSections::BARCODE);
        }
        self.index.set_sections(sections);

        let build_path = build_path_for(&self.pbi_path);
        let written = super::io::save(&self.index, &build_path).and_then(|()| {
            std::fs::rename(&build_path, &self.pbi_path).map_err(|e| {
                Error::format(format!(
                    "could not move {} into place: {}",
                    build_path.display(),
                    e
                ))
            })
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&build_path);
            return Err(e);
        }
        self.closed = true;

        debug!(
            path = %self.pbi_path.display(),
            num_reads = self.index.num_reads(),
            sections = sections.bits(),
            "closed index builder"
        );
        Ok(())
    }

    /// Index as built so far, or as written after `close`
    pub fn index(&self) -> &PbiRawData {
        &self.index
    }
}

impl Drop for PbiBuilder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.pbi_path.display(), "failed to write index: {}", e);
        }
    }
}

fn build_path_for(pbi_path: &Path) -> PathBuf {
    let mut path = pbi_path.as_os_str().to_owned();
    path.push(".build");
    PathBuf::from(path)
}
