//! PacBio BAM index (PBI): data model, on-disk codec and builder.
//!
//! A `.pbi` file sits next to its BAM (`movie.subreads.bam.pbi`) and stores
//! per-record summary columns plus the BGZF virtual offset of each record.

pub mod builder;
pub mod io;
pub mod raw;
pub mod read_group;
pub mod record;

pub use builder::{PbiBuilder, ReferenceDataBuilder};
pub use raw::{
    BarcodeData, BasicData, MappedData, PbiRawData, PbiRow, ReferenceData, ReferenceEntry,
    UNMAPPED_ID, UNMAPPED_POSITION, UNSET_ROW,
};
pub use read_group::RecordType;

use crate::{Error, Result};
use noodles::bam;
use noodles::sam::alignment::RecordBuf;
use std::fs::File;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Section bitmask stored in the PBI header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PbiSections(u16);

impl PbiSections {
    pub const BASIC: Self = Self(0x0);
    pub const MAPPED: Self = Self(0x1);
    pub const REFERENCE: Self = Self(0x2);
    pub const BARCODE: Self = Self(0x4);
    pub const ALL: Self = Self(0x7);

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for PbiSections {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// PBI format versions this crate reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PbiVersion {
    V3_0_0,
    V3_0_1,
    V3_0_2,
    V4_0_0,
}

impl PbiVersion {
    pub const CURRENT: Self = PbiVersion::V4_0_0;

    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0x030000 => Ok(PbiVersion::V3_0_0),
            0x030001 => Ok(PbiVersion::V3_0_1),
            0x030002 => Ok(PbiVersion::V3_0_2),
            0x040000 => Ok(PbiVersion::V4_0_0),
            _ => Err(Error::format(format!(
                "unsupported PBI version: {:#08x}",
                value
            ))),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            PbiVersion::V3_0_0 => 0x030000,
            PbiVersion::V3_0_1 => 0x030001,
            PbiVersion::V3_0_2 => 0x030002,
            PbiVersion::V4_0_0 => 0x040000,
        }
    }

    /// Whether the mapped section carries insertion/deletion operation counts
    pub fn has_indel_ops(&self) -> bool {
        *self >= PbiVersion::V4_0_0
    }
}

/// Conventional index path for a BAM: `<bam>.pbi`
pub fn pbi_path_for(bam_path: &Path) -> PathBuf {
    let mut path = bam_path.as_os_str().to_owned();
    path.push(".pbi");
    PathBuf::from(path)
}

/// Whether the header declares `SO:coordinate`
pub fn is_coordinate_sorted(header: &noodles::sam::Header) -> bool {
    use noodles::sam::header::record::value::map::header::tag;

    header
        .header()
        .and_then(|hd| hd.other_fields().get(&tag::SORT_ORDER))
        .is_some_and(|so| so.as_slice() == b"coordinate")
}

pub struct PbiFile;

impl PbiFile {
    /// Scan a BAM file and write its index to `<bam>.pbi`. Returns the index path.
    pub fn create_from(bam_path: impl AsRef<Path>) -> Result<PathBuf> {
        let bam_path = bam_path.as_ref();
        let pbi_path = pbi_path_for(bam_path);

        let file = File::open(bam_path).map_err(|e| {
            Error::format(format!(
                "failed to open BAM file {}: {}",
                bam_path.display(),
                e
            ))
        })?;
        let mut reader = bam::io::Reader::new(file);
        let header = reader.read_header().map_err(|e| {
            Error::format(format!(
                "failed to read BAM header from {}: {}",
                bam_path.display(),
                e
            ))
        })?;

        let coordinate_sorted = is_coordinate_sorted(&header);
        let mut builder = PbiBuilder::new(
            &pbi_path,
            header.reference_sequences().len(),
            coordinate_sorted,
        );

        let mut record = RecordBuf::default();
        loop {
            let offset = u64::from(reader.get_ref().virtual_position());
            let n = reader
                .read_record_buf(&header, &mut record)
                .map_err(|e| Error::format(format!("failed to read BAM record: {}", e)))?;
            if n == 0 {
                break;
            }
            builder.add_record(&record, offset as i64)?;
        }

        let num_reads = builder.num_reads();
        builder.close()?;

        debug!(
            bam = %bam_path.display(),
            coordinate_sorted,
            num_reads,
            "scanned BAM for index"
        );
        info!("wrote {}", pbi_path.display());
        Ok(pbi_path)
    }
}
