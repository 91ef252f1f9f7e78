//! In-memory columnar representation of one (or several aggregated) PBI files.

use super::{PbiSections, PbiVersion};
use crate::types::Strand;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Reference id recorded for unmapped reads
pub const UNMAPPED_ID: i32 = -1;

/// Row marker for a reference entry that has no records
pub const UNSET_ROW: u32 = u32::MAX;

/// Position recorded for unmapped reads
pub const UNMAPPED_POSITION: u32 = u32::MAX;

/// Per-record summary columns that every index carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicData {
    pub rg_id: Vec<i32>,
    pub q_start: Vec<i32>,
    pub q_end: Vec<i32>,
    pub hole_number: Vec<i32>,
    pub read_qual: Vec<f32>,
    pub ctxt_flag: Vec<u8>,
    pub file_offset: Vec<i64>,
    /// Source file of each row. In-memory only; empty unless indexes were aggregated.
    pub file_number: Vec<u16>,
}

impl BasicData {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            rg_id: Vec::with_capacity(n),
            q_start: Vec::with_capacity(n),
            q_end: Vec::with_capacity(n),
            hole_number: Vec::with_capacity(n),
            read_qual: Vec::with_capacity(n),
            ctxt_flag: Vec::with_capacity(n),
            file_offset: Vec::with_capacity(n),
            file_number: Vec::new(),
        }
    }

    pub fn file_number(&self, row: usize) -> u16 {
        self.file_number.get(row).copied().unwrap_or(0)
    }

    pub fn query_length(&self, row: usize) -> i32 {
        self.q_end[row] - self.q_start[row]
    }
}

/// Alignment summary columns
#[derive(Debug, Clone, PartialEq)]
pub struct MappedData {
    pub t_id: Vec<i32>,
    pub t_start: Vec<u32>,
    pub t_end: Vec<u32>,
    pub a_start: Vec<u32>,
    pub a_end: Vec<u32>,
    pub rev_strand: Vec<u8>,
    pub n_m: Vec<u32>,
    pub n_mm: Vec<u32>,
    pub map_qv: Vec<u8>,
    pub n_ins_ops: Vec<u32>,
    pub n_del_ops: Vec<u32>,
    /// Whether the indel-operation columns are present (format 4.0.0 and later)
    pub has_indel_ops: bool,
}

impl Default for MappedData {
    fn default() -> Self {
        Self {
            t_id: Vec::new(),
            t_start: Vec::new(),
            t_end: Vec::new(),
            a_start: Vec::new(),
            a_end: Vec::new(),
            rev_strand: Vec::new(),
            n_m: Vec::new(),
            n_mm: Vec::new(),
            map_qv: Vec::new(),
            n_ins_ops: Vec::new(),
            n_del_ops: Vec::new(),
            has_indel_ops: true,
        }
    }
}

impl MappedData {
    pub fn strand(&self, row: usize) -> Strand {
        Strand::from_reverse_flag(self.rev_strand[row])
    }

    pub fn aligned_length(&self, row: usize) -> u32 {
        self.a_end[row].wrapping_sub(self.a_start[row])
    }

    pub fn num_inserted_bases(&self, row: usize) -> u64 {
        let span = i64::from(self.a_end[row]) - i64::from(self.a_start[row]);
        (span - i64::from(self.n_m[row]) - i64::from(self.n_mm[row])).max(0) as u64
    }

    pub fn num_deleted_bases(&self, row: usize) -> u64 {
        let span = i64::from(self.t_end[row]) - i64::from(self.t_start[row]);
        (span - i64::from(self.n_m[row]) - i64::from(self.n_mm[row])).max(0) as u64
    }

    pub fn is_mapped(&self, row: usize) -> bool {
        self.t_id[row] >= 0
    }
}

/// Skip-index entry: rows `[begin_row, end_row)` hold the records mapped to `t_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub t_id: i32,
    pub begin_row: u32,
    pub end_row: u32,
}

impl ReferenceEntry {
    pub fn new(t_id: i32) -> Self {
        Self {
            t_id,
            begin_row: UNSET_ROW,
            end_row: UNSET_ROW,
        }
    }

    pub fn with_rows(t_id: i32, begin_row: u32, end_row: u32) -> Self {
        Self {
            t_id,
            begin_row,
            end_row,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.begin_row == UNSET_ROW || self.end_row == UNSET_ROW
    }

    pub fn num_rows(&self) -> u32 {
        if self.is_unset() {
            0
        } else {
            self.end_row.saturating_sub(self.begin_row)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub entries: Vec<ReferenceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarcodeData {
    pub bc_forward: Vec<i16>,
    pub bc_reverse: Vec<i16>,
    pub bc_qual: Vec<i8>,
}

/// Row-at-a-time projection of every present column
#[derive(Debug, Clone, PartialEq)]
pub struct PbiRow {
    pub rg_id: i32,
    pub q_start: i32,
    pub q_end: i32,
    pub hole_number: i32,
    pub read_qual: f32,
    pub ctxt_flag: u8,
    pub file_offset: i64,
    pub file_number: u16,
    pub mapped: Option<MappedRow>,
    pub barcode: Option<BarcodeRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub t_id: i32,
    pub t_start: u32,
    pub t_end: u32,
    pub a_start: u32,
    pub a_end: u32,
    pub strand: Strand,
    pub n_m: u32,
    pub n_mm: u32,
    pub map_qv: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeRow {
    pub bc_forward: i16,
    pub bc_reverse: i16,
    pub bc_qual: i8,
}

/// Raw PBI contents: header fields plus the four column groups.
#[derive(Debug, Clone)]
pub struct PbiRawData {
    version: PbiVersion,
    sections: PbiSections,
    num_reads: u32,
    basic: BasicData,
    mapped: MappedData,
    reference: ReferenceData,
    barcode: BarcodeData,
    filename: Option<PathBuf>,
    reference_names: Vec<String>,
}

impl Default for PbiRawData {
    fn default() -> Self {
        Self {
            version: PbiVersion::CURRENT,
            sections: PbiSections::BASIC,
            num_reads: 0,
            basic: BasicData::default(),
            mapped: MappedData::default(),
            reference: ReferenceData::default(),
            barcode: BarcodeData::default(),
            filename: None,
            reference_names: Vec::new(),
        }
    }
}

impl PartialEq for PbiRawData {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.sections == other.sections
            && self.num_reads == other.num_reads
            && self.basic == other.basic
            && (!self.has_mapped_data() || self.mapped == other.mapped)
            && (!self.has_reference_data() || self.reference == other.reference)
            && (!self.has_barcode_data() || self.barcode == other.barcode)
    }
}

impl PbiRawData {
    pub fn new(num_reads: u32) -> Self {
        Self {
            num_reads,
            ..Self::default()
        }
    }

    /// Load a `.pbi` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        super::io::load(path)
    }

    /// Load several `.pbi` files and concatenate them, tracking each row's source file.
    pub fn aggregate<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut result = Self {
            sections: PbiSections::BASIC | PbiSections::MAPPED | PbiSections::BARCODE,
            ..Self::default()
        };
        let mut aggregate_version: Option<PbiVersion> = None;

        for (file_number, path) in paths.iter().enumerate() {
            let file_number = u16::try_from(file_number)
                .map_err(|_| Error::construction("too many index files to aggregate"))?;
            let current = Self::from_file(path)?;

            let version = current.version;
            match aggregate_version {
                None => aggregate_version = Some(version),
                Some(v) if v.has_indel_ops() != version.has_indel_ops() => {
                    return Err(Error::format(
                        "dataset contains incompatible PBI index versions; \
                         regenerate the indexes to ensure compatibility",
                    ));
                }
                Some(_) => {}
            }
            let with_indels = aggregate_version.map_or(true, |v| v.has_indel_ops());
            result.append(current, file_number, with_indels);
        }

        let version = aggregate_version.unwrap_or(PbiVersion::CURRENT);
        result.version = version;
        result.mapped.has_indel_ops = version.has_indel_ops();
        Ok(result)
    }

    fn append(&mut self, other: Self, file_number: u16, with_indels: bool) {
        let n = other.num_reads as usize;
        self.num_reads += other.num_reads;

        let has_mapped = other.has_mapped_data();
        let has_barcode = other.has_barcode_data();
        let (basic, mapped, barcode) = (other.basic, other.mapped, other.barcode);

        self.basic.rg_id.extend(basic.rg_id);
        self.basic.q_start.extend(basic.q_start);
        self.basic.q_end.extend(basic.q_end);
        self.basic.hole_number.extend(basic.hole_number);
        self.basic.read_qual.extend(basic.read_qual);
        self.basic.ctxt_flag.extend(basic.ctxt_flag);
        self.basic.file_offset.extend(basic.file_offset);
        self.basic
            .file_number
            .extend(std::iter::repeat(file_number).take(n));

        if has_barcode {
            self.barcode.bc_forward.extend(barcode.bc_forward);
            self.barcode.bc_reverse.extend(barcode.bc_reverse);
            self.barcode.bc_qual.extend(barcode.bc_qual);
        } else {
            self.barcode.bc_forward.extend(std::iter::repeat(-1).take(n));
            self.barcode.bc_reverse.extend(std::iter::repeat(-1).take(n));
            self.barcode.bc_qual.extend(std::iter::repeat(-1).take(n));
        }

        if has_mapped {
            self.mapped.t_id.extend(mapped.t_id);
            self.mapped.t_start.extend(mapped.t_start);
            self.mapped.t_end.extend(mapped.t_end);
            self.mapped.a_start.extend(mapped.a_start);
            self.mapped.a_end.extend(mapped.a_end);
            self.mapped.rev_strand.extend(mapped.rev_strand);
            self.mapped.n_m.extend(mapped.n_m);
            self.mapped.n_mm.extend(mapped.n_mm);
            self.mapped.map_qv.extend(mapped.map_qv);
            if with_indels {
                self.mapped.n_ins_ops.extend(mapped.n_ins_ops);
                self.mapped.n_del_ops.extend(mapped.n_del_ops);
            }
        } else {
            self.mapped.t_id.extend(std::iter::repeat(UNMAPPED_ID).take(n));
            for column in [
                &mut self.mapped.t_start,
                &mut self.mapped.t_end,
                &mut self.mapped.a_start,
                &mut self.mapped.a_end,
            ] {
                column.extend(std::iter::repeat(UNMAPPED_POSITION).take(n));
            }
            self.mapped.rev_strand.extend(std::iter::repeat(0).take(n));
            self.mapped.n_m.extend(std::iter::repeat(0).take(n));
            self.mapped.n_mm.extend(std::iter::repeat(0).take(n));
            self.mapped.map_qv.extend(std::iter::repeat(255).take(n));
            if with_indels {
                self.mapped.n_ins_ops.extend(std::iter::repeat(0).take(n));
                self.mapped.n_del_ops.extend(std::iter::repeat(0).take(n));
            }
        }
    }

    pub fn version(&self) -> PbiVersion {
        self.version
    }

    pub fn set_version(&mut self, version: PbiVersion) {
        self.version = version;
        self.mapped.has_indel_ops = version.has_indel_ops();
    }

    pub fn sections(&self) -> PbiSections {
        self.sections
    }

    pub fn set_sections(&mut self, sections: PbiSections) {
        self.sections = sections;
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads
    }

    pub fn set_num_reads(&mut self, num_reads: u32) {
        self.num_reads = num_reads;
    }

    pub fn has_mapped_data(&self) -> bool {
        self.sections.contains(PbiSections::MAPPED)
    }

    pub fn has_reference_data(&self) -> bool {
        self.sections.contains(PbiSections::REFERENCE)
    }

    pub fn has_barcode_data(&self) -> bool {
        self.sections.contains(PbiSections::BARCODE)
    }

    pub fn basic(&self) -> &BasicData {
        &self.basic
    }

    pub fn basic_mut(&mut self) -> &mut BasicData {
        &mut self.basic
    }

    pub fn mapped(&self) -> &MappedData {
        &self.mapped
    }

    pub fn mapped_mut(&mut self) -> &mut MappedData {
        &mut self.mapped
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn reference_mut(&mut self) -> &mut ReferenceData {
        &mut self.reference
    }

    pub fn barcode(&self) -> &BarcodeData {
        &self.barcode
    }

    pub fn barcode_mut(&mut self) -> &mut BarcodeData {
        &mut self.barcode
    }

    /// Path this index was loaded from, if any
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub(crate) fn set_filename(&mut self, path: PathBuf) {
        self.filename = Some(path);
    }

    /// Reference names of the indexed BAM, used to resolve name-based filters
    pub fn reference_names(&self) -> &[String] {
        &self.reference_names
    }

    pub fn set_reference_names(&mut self, names: Vec<String>) {
        self.reference_names = names;
    }

    pub fn reference_id(&self, name: &str) -> Option<i32> {
        self.reference_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| i32::try_from(i).ok())
    }

    pub fn reference_entry(&self, t_id: i32) -> Option<&ReferenceEntry> {
        if !self.has_reference_data() {
            return None;
        }
        self.reference.entries.iter().find(|e| e.t_id == t_id)
    }

    /// `1 - (mismatches + deletions + insertions) / query length`
    pub fn identity(&self, row: usize) -> f32 {
        let read_length = self.basic.query_length(row) as f32;
        let non_matches = self.mapped.n_mm[row] as f32
            + self.mapped.num_deleted_bases(row) as f32
            + self.mapped.num_inserted_bases(row) as f32;
        1.0 - (non_matches / read_length)
    }

    /// Row view, or `None` if `row` is out of range for any present column
    pub fn row(&self, row: usize) -> Option<PbiRow> {
        if row >= self.num_reads as usize {
            return None;
        }
        let mapped = if self.has_mapped_data() {
            let mapped = &self.mapped;
            Some(MappedRow {
                t_id: *mapped.t_id.get(row)?,
                t_start: *mapped.t_start.get(row)?,
                t_end: *mapped.t_end.get(row)?,
                a_start: *mapped.a_start.get(row)?,
                a_end: *mapped.a_end.get(row)?,
                strand: Strand::from_reverse_flag(*mapped.rev_strand.get(row)?),
                n_m: *mapped.n_m.get(row)?,
                n_mm: *mapped.n_mm.get(row)?,
                map_qv: *mapped.map_qv.get(row)?,
            })
        } else {
            None
        };
        let barcode = if self.has_barcode_data() {
            let barcode = &self.barcode;
            Some(BarcodeRow {
                bc_forward: *barcode.bc_forward.get(row)?,
                bc_reverse: *barcode.bc_reverse.get(row)?,
                bc_qual: *barcode.bc_qual.get(row)?,
            })
        } else {
            None
        };
        let basic = &self.basic;
        Some(PbiRow {
            rg_id: *basic.rg_id.get(row)?,
            q_start: *basic.q_start.get(row)?,
            q_end: *basic.q_end.get(row)?,
            hole_number: *basic.hole_number.get(row)?,
            read_qual: *basic.read_qual.get(row)?,
            ctxt_flag: *basic.ctxt_flag.get(row)?,
            file_offset: *basic.file_offset.get(row)?,
            file_number: basic.file_number(row),
            mapped,
            barcode,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = PbiRow> + '_ {
        (0..self.num_reads as usize).filter_map(move |i| self.row(i))
    }

    /// Check that reference entries are sorted and cover disjoint, in-bounds row runs.
    /// Loading never calls this; callers that need fail-fast behavior can.
    pub fn validate_reference_data(&self) -> Result<()> {
        if !self.has_reference_data() {
            return Ok(());
        }
        let mut last_id: Option<u32> = None;
        let mut last_end = 0u32;
        for entry in &self.reference.entries {
            let id = entry.t_id as u32;
            if last_id.is_some_and(|last| last >= id) {
                return Err(Error::format(format!(
                    "reference entries out of order at tId {}",
                    entry.t_id
                )));
            }
            last_id = Some(id);
            if entry.is_unset() {
                continue;
            }
            if entry.begin_row > entry.end_row
                || entry.end_row > self.num_reads
                || entry.begin_row < last_end
            {
                return Err(Error::format(format!(
                    "reference entry for tId {} has invalid rows [{}, {})",
                    entry.t_id, entry.begin_row, entry.end_row
                )));
            }
            let rows = entry.begin_row as usize..entry.end_row as usize;
            if self.has_mapped_data() && self.mapped.t_id[rows].iter().any(|&t| t != entry.t_id) {
                return Err(Error::format(format!(
                    "rows for tId {} are not contiguous",
                    entry.t_id
                )));
            }
            last_end = entry.end_row;
        }
        Ok(())
    }
}
