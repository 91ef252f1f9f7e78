//! Reading and writing `.pbi` files.
//!
//! The whole file, header included, is one BGZF stream. After decompression:
//!
//! ```text
//! magic "PBI\x01" | version u32 | sections u16 | numReads u32 | 18 reserved bytes
//! basic | mapped | reference | barcode      (column runs, little-endian)
//! ```

use super::raw::{BarcodeData, BasicData, MappedData, ReferenceData, ReferenceEntry};
use super::{PbiRawData, PbiSections, PbiVersion};
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use noodles::bgzf;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"PBI\x01";

const RESERVED_LEN: usize = 18;

// rgId, qStart, qEnd, holeNumber, readQual, ctxtFlag, fileOffset
const BASIC_ROW_BYTES: u64 = 4 * 5 + 1 + 8;
// tId, tStart, tEnd, aStart, aEnd, revStrand, nM, nMM, mapQV
const MAPPED_ROW_BYTES: u64 = 4 * 5 + 1 + 4 * 2 + 1;
// nInsOps, nDelOps
const INDEL_ROW_BYTES: u64 = 4 * 2;
// bcForward, bcReverse, bcQual
const BARCODE_ROW_BYTES: u64 = 2 * 2 + 1;

/// Load a `.pbi` file into memory
pub fn load(path: impl AsRef<Path>) -> Result<PbiRawData> {
    let path = path.as_ref();
    if !path.to_string_lossy().ends_with(".pbi") {
        return Err(Error::format(format!(
            "{} is not a PBI file (expected .pbi extension)",
            path.display()
        )));
    }

    let file = File::open(path)
        .map_err(|e| Error::format(format!("could not open {}: {}", path.display(), e)))?;
    let mut data = Vec::new();
    bgzf::io::Reader::new(file)
        .read_to_end(&mut data)
        .map_err(|e| {
            Error::format(format!(
                "could not decompress {}: {}",
                path.display(),
                e
            ))
        })?;

    let mut index = decode(&data).map_err(|e| match e {
        Error::Format(msg) => Error::format(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    index.set_filename(path.to_path_buf());

    debug!(
        path = %path.display(),
        num_reads = index.num_reads(),
        sections = index.sections().bits(),
        "loaded PBI"
    );
    Ok(index)
}

/// Write an index to `path` as a BGZF-compressed PBI stream
pub fn save(index: &PbiRawData, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    check_column_lengths(index)?;

    let mut data = Vec::new();
    encode(index, &mut data)?;

    let file = File::create(path)?;
    let mut writer = bgzf::io::Writer::new(file);
    writer.write_all(&data)?;
    writer.finish()?;

    debug!(path = %path.display(), num_reads = index.num_reads(), "wrote PBI");
    Ok(())
}

/// Decode a decompressed PBI stream
pub fn decode(data: &[u8]) -> Result<PbiRawData> {
    let mut reader = Cursor::new(data);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| Error::format("expected PBI file, found unknown format instead"))?;
    if &magic != MAGIC {
        return Err(Error::format(
            "expected PBI file, found unknown format instead",
        ));
    }

    let version = PbiVersion::from_u32(reader.read_u32::<LittleEndian>().map_err(truncated)?)?;
    let sections = PbiSections::from_bits(reader.read_u16::<LittleEndian>().map_err(truncated)?);
    let num_reads = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut reserved = [0u8; RESERVED_LEN];
    reader.read_exact(&mut reserved).map_err(truncated)?;

    let mut index = PbiRawData::new(num_reads);
    index.set_version(version);
    index.set_sections(sections);

    if num_reads > 0 {
        let needed = u64::from(num_reads) * row_size(sections, version);
        let available = data.len() as u64 - reader.position();
        if needed > available {
            return Err(Error::format(format!(
                "truncated PBI data: header declares {} reads ({} bytes), {} bytes remain",
                num_reads, needed, available
            )));
        }

        let n = num_reads as usize;
        *index.basic_mut() = read_basic(&mut reader, n).map_err(truncated)?;
        if sections.contains(PbiSections::MAPPED) {
            *index.mapped_mut() =
                read_mapped(&mut reader, n, version.has_indel_ops()).map_err(truncated)?;
        }
        if sections.contains(PbiSections::REFERENCE) {
            *index.reference_mut() = read_reference(&mut reader).map_err(truncated)?;
        }
        if sections.contains(PbiSections::BARCODE) {
            *index.barcode_mut() = read_barcode(&mut reader, n).map_err(truncated)?;
        }
    }

    Ok(index)
}

/// Encode an index into a decompressed PBI stream
pub fn encode<W: Write>(index: &PbiRawData, writer: &mut W) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(index.version().as_u32())?;
    writer.write_u16::<LittleEndian>(index.sections().bits())?;
    writer.write_u32::<LittleEndian>(index.num_reads())?;
    writer.write_all(&[0u8; RESERVED_LEN])?;

    if index.num_reads() > 0 {
        write_basic(writer, index.basic())?;
        if index.has_mapped_data() {
            write_mapped(writer, index.mapped(), index.version().has_indel_ops())?;
        }
        if index.has_reference_data() {
            write_reference(writer, index.reference())?;
        }
        if index.has_barcode_data() {
            write_barcode(writer, index.barcode())?;
        }
    }
    Ok(())
}

/// Bytes per read across the column sections present in the file
fn row_size(sections: PbiSections, version: PbiVersion) -> u64 {
    let mut size = BASIC_ROW_BYTES;
    if sections.contains(PbiSections::MAPPED) {
        size += MAPPED_ROW_BYTES;
        if version.has_indel_ops() {
            size += INDEL_ROW_BYTES;
        }
    }
    if sections.contains(PbiSections::BARCODE) {
        size += BARCODE_ROW_BYTES;
    }
    size
}

fn truncated(e: io::Error) -> Error {
    Error::format(format!("truncated PBI data: {}", e))
}

fn check_column_lengths(index: &PbiRawData) -> Result<()> {
    let n = index.num_reads() as usize;
    let check = |group: &str, len: usize| {
        if len == n {
            Ok(())
        } else {
            Err(Error::format(format!(
                "{} column has {} entries, expected {}",
                group, len, n
            )))
        }
    };

    let basic = index.basic();
    check("rgId", basic.rg_id.len())?;
    check("qStart", basic.q_start.len())?;
    check("qEnd", basic.q_end.len())?;
    check("holeNumber", basic.hole_number.len())?;
    check("readQual", basic.read_qual.len())?;
    check("ctxtFlag", basic.ctxt_flag.len())?;
    check("fileOffset", basic.file_offset.len())?;

    if index.has_mapped_data() {
        let mapped = index.mapped();
        check("tId", mapped.t_id.len())?;
        check("tStart", mapped.t_start.len())?;
        check("tEnd", mapped.t_end.len())?;
        check("aStart", mapped.a_start.len())?;
        check("aEnd", mapped.a_end.len())?;
        check("revStrand", mapped.rev_strand.len())?;
        check("nM", mapped.n_m.len())?;
        check("nMM", mapped.n_mm.len())?;
        check("mapQV", mapped.map_qv.len())?;
        if index.version().has_indel_ops() {
            check("nInsOps", mapped.n_ins_ops.len())?;
            check("nDelOps", mapped.n_del_ops.len())?;
        }
    }

    if index.has_barcode_data() {
        let barcode = index.barcode();
        check("bcForward", barcode.bc_forward.len())?;
        check("bcReverse", barcode.bc_reverse.len())?;
        check("bcQual", barcode.bc_qual.len())?;
    }
    Ok(())
}

fn read_basic<R: Read>(reader: &mut R, n: usize) -> io::Result<BasicData> {
    let mut basic = BasicData {
        rg_id: vec![0; n],
        q_start: vec![0; n],
        q_end: vec![0; n],
        hole_number: vec![0; n],
        read_qual: vec![0.0; n],
        ctxt_flag: vec![0; n],
        file_offset: vec![0; n],
        file_number: Vec::new(),
    };
    reader.read_i32_into::<LittleEndian>(&mut basic.rg_id)?;
    reader.read_i32_into::<LittleEndian>(&mut basic.q_start)?;
    reader.read_i32_into::<LittleEndian>(&mut basic.q_end)?;
    reader.read_i32_into::<LittleEndian>(&mut basic.hole_number)?;
    reader.read_f32_into::<LittleEndian>(&mut basic.read_qual)?;
    reader.read_exact(&mut basic.ctxt_flag)?;
    reader.read_i64_into::<LittleEndian>(&mut basic.file_offset)?;
    Ok(basic)
}

fn read_mapped<R: Read>(reader: &mut R, n: usize, with_indels: bool) -> io::Result<MappedData> {
    let mut mapped = MappedData {
        t_id: vec![0; n],
        t_start: vec![0; n],
        t_end: vec![0; n],
        a_start: vec![0; n],
        a_end: vec![0; n],
        rev_strand: vec![0; n],
        n_m: vec![0; n],
        n_mm: vec![0; n],
        map_qv: vec![0; n],
        n_ins_ops: Vec::new(),
        n_del_ops: Vec::new(),
        has_indel_ops: with_indels,
    };
    reader.read_i32_into::<LittleEndian>(&mut mapped.t_id)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.t_start)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.t_end)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.a_start)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.a_end)?;
    reader.read_exact(&mut mapped.rev_strand)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.n_m)?;
    reader.read_u32_into::<LittleEndian>(&mut mapped.n_mm)?;
    reader.read_exact(&mut mapped.map_qv)?;
    if with_indels {
        mapped.n_ins_ops = vec![0; n];
        mapped.n_del_ops = vec![0; n];
        reader.read_u32_into::<LittleEndian>(&mut mapped.n_ins_ops)?;
        reader.read_u32_into::<LittleEndian>(&mut mapped.n_del_ops)?;
    }
    Ok(mapped)
}

fn read_reference<R: Read>(reader: &mut R) -> io::Result<ReferenceData> {
    let num_refs = reader.read_u32::<LittleEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..num_refs {
        let t_id = reader.read_u32::<LittleEndian>()? as i32;
        let begin_row = reader.read_u32::<LittleEndian>()?;
        let end_row = reader.read_u32::<LittleEndian>()?;
        entries.push(ReferenceEntry::with_rows(t_id, begin_row, end_row));
    }
    Ok(ReferenceData { entries })
}

fn read_barcode<R: Read>(reader: &mut R, n: usize) -> io::Result<BarcodeData> {
    let mut barcode = BarcodeData {
        bc_forward: vec![0; n],
        bc_reverse: vec![0; n],
        bc_qual: vec![0; n],
    };
    reader.read_i16_into::<LittleEndian>(&mut barcode.bc_forward)?;
    reader.read_i16_into::<LittleEndian>(&mut barcode.bc_reverse)?;
    reader.read_i8_into(&mut barcode.bc_qual)?;
    Ok(barcode)
}

fn write_basic<W: Write>(writer: &mut W, basic: &BasicData) -> io::Result<()> {
    basic
        .rg_id
        .iter()
        .try_for_each(|&x| writer.write_i32::<LittleEndian>(x))?;
    basic
        .q_start
        .iter()
        .try_for_each(|&x| writer.write_i32::<LittleEndian>(x))?;
    basic
        .q_end
        .iter()
        .try_for_each(|&x| writer.write_i32::<LittleEndian>(x))?;
    basic
        .hole_number
        .iter()
        .try_for_each(|&x| writer.write_i32::<LittleEndian>(x))?;
    basic
        .read_qual
        .iter()
        .try_for_each(|&x| writer.write_f32::<LittleEndian>(x))?;
    writer.write_all(&basic.ctxt_flag)?;
    basic
        .file_offset
        .iter()
        .try_for_each(|&x| writer.write_i64::<LittleEndian>(x))
}

fn write_mapped<W: Write>(writer: &mut W, mapped: &MappedData, with_indels: bool) -> io::Result<()> {
    mapped
        .t_id
        .iter()
        .try_for_each(|&x| writer.write_i32::<LittleEndian>(x))?;
    for column in [&mapped.t_start, &mapped.t_end, &mapped.a_start, &mapped.a_end] {
        column
            .iter()
            .try_for_each(|&x| writer.write_u32::<LittleEndian>(x))?;
    }
    writer.write_all(&mapped.rev_strand)?;
    for column in [&mapped.n_m, &mapped.n_mm] {
        column
            .iter()
            .try_for_each(|&x| writer.write_u32::<LittleEndian>(x))?;
    }
    writer.write_all(&mapped.map_qv)?;
    if with_indels {
        for column in [&mapped.n_ins_ops, &mapped.n_del_ops] {
            column
                .iter()
                .try_for_each(|&x| writer.write_u32::<LittleEndian>(x))?;
        }
    }
    Ok(())
}

fn write_reference<W: Write>(writer: &mut W, reference: &ReferenceData) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(reference.entries.len() as u32)?;
    for entry in &reference.entries {
        writer.write_u32::<LittleEndian>(entry.t_id as u32)?;
        writer.write_u32::<LittleEndian>(entry.begin_row)?;
        writer.write_u32::<LittleEndian>(entry.end_row)?;
    }
    Ok(())
}

fn write_barcode<W: Write>(writer: &mut W, barcode: &BarcodeData) -> io::Result<()> {
    barcode
        .bc_forward
        .iter()
        .try_for_each(|&x| writer.write_i16::<LittleEndian>(x))?;
    barcode
        .bc_reverse
        .iter()
        .try_for_each(|&x| writer.write_i16::<LittleEndian>(x))?;
    barcode
        .bc_qual
        .iter()
        .try_for_each(|&x| writer.write_i8(x))
}
