use crate::{Error, Result};
use noodles::bam;
use noodles::bgzf;
use noodles::bgzf::VirtualPosition;
use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Seekable stream of alignment records from one file
pub trait AlignmentSource {
    fn header(&self) -> &sam::Header;

    /// Read the next record into `record`. Returns `false` at end of file.
    fn read_record(&mut self, record: &mut RecordBuf) -> Result<bool>;

    fn seek(&mut self, position: VirtualPosition) -> Result<()>;

    fn virtual_position(&self) -> VirtualPosition;

    fn is_coordinate_sorted(&self) -> bool {
        crate::pbi::is_coordinate_sorted(self.header())
    }
}

/// [`AlignmentSource`] over a BAM file on disk
pub struct BamSource {
    path: PathBuf,
    reader: bam::io::Reader<bgzf::io::Reader<File>>,
    header: sam::Header,
}

impl BamSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::format(format!("failed to open BAM file {}: {}", path.display(), e))
        })?;
        let mut reader = bam::io::Reader::new(file);
        let header = reader.read_header().map_err(|e| {
            Error::format(format!(
                "failed to read BAM header from {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlignmentSource for BamSource {
    fn header(&self) -> &sam::Header {
        &self.header
    }

    fn read_record(&mut self, record: &mut RecordBuf) -> Result<bool> {
        let n = self.reader.read_record_buf(&self.header, record)?;
        Ok(n > 0)
    }

    fn seek(&mut self, position: VirtualPosition) -> Result<()> {
        self.reader.get_mut().seek(position)?;
        Ok(())
    }

    fn virtual_position(&self) -> VirtualPosition {
        self.reader.get_ref().virtual_position()
    }
}

/// Open every path as a [`BamSource`]
pub fn open_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<BamSource>> {
    paths.iter().map(|path| BamSource::open(path)).collect()
}
