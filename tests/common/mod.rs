//! Synthetic BAM fixtures shared by the integration tests.

#![allow(dead_code)]

use bstr::BString;
use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar, Sequence};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const MOVIE: &str = "m140905_042212_sidney_c100564852550000001823085912221377_s1_X0";
pub const REFERENCES: [(&str, usize); 2] = [("lambda_NEB3011", 48502), ("chr2", 10000)];

/// Header with the test references, optionally declaring `SO:coordinate`
pub fn header(coordinate_sorted: bool) -> sam::Header {
    use noodles::sam::header::record::value::map::Header as HeaderRecord;
    use noodles::sam::header::record::value::map::Map as HeaderRecordMap;
    use noodles::sam::header::record::value::map::header::tag::Tag as HeaderTag;
    use noodles::sam::header::record::value::{Map, map::ReferenceSequence};

    let HeaderTag::Other(sort_order_tag) = HeaderTag::from([b'S', b'O']) else {
        unreachable!()
    };
    let sort_order = if coordinate_sorted { "coordinate" } else { "unknown" };
    let header_map = HeaderRecordMap::<HeaderRecord>::builder()
        .insert(sort_order_tag, sort_order)
        .build()
        .unwrap();

    let mut builder = sam::Header::builder().set_header(header_map);
    for (name, len) in REFERENCES {
        builder = builder.add_reference_sequence(
            BString::from(name),
            Map::<ReferenceSequence>::new(NonZeroUsize::new(len).unwrap()),
        );
    }
    builder.build()
}

/// Alignment of a subread
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub reference_id: usize,
    /// 0-based
    pub start: usize,
    pub reverse: bool,
}

pub fn mapped(reference_id: usize, start: usize, reverse: bool) -> Option<Placement> {
    Some(Placement {
        reference_id,
        start,
        reverse,
    })
}

/// PacBio subread `movie/zmw/qs_qe` with the per-read tags the index reads
pub fn subread(zmw: i32, q_start: i32, q_end: i32, placement: Option<Placement>) -> RecordBuf {
    let len = (q_end - q_start) as usize;
    let name = format!("{}/{}/{}_{}", MOVIE, zmw, q_start, q_end);
    let mut builder = RecordBuf::builder()
        .set_name(BString::from(name))
        .set_sequence(Sequence::from(vec![b'A'; len]));

    builder = match placement {
        Some(p) => builder
            .set_flags(if p.reverse {
                Flags::REVERSE_COMPLEMENTED
            } else {
                Flags::empty()
            })
            .set_reference_sequence_id(p.reference_id)
            .set_alignment_start(Position::try_from(p.start + 1).unwrap())
            .set_mapping_quality(MappingQuality::new(60).unwrap())
            .set_cigar(Cigar::from(vec![Op::new(Kind::SequenceMatch, len)])),
        None => builder.set_flags(Flags::UNMAPPED),
    };

    let mut record = builder.build();
    let data = record.data_mut();
    data.insert(Tag::from([b'z', b'm']), Value::Int32(zmw));
    data.insert(Tag::from([b'q', b's']), Value::Int32(q_start));
    data.insert(Tag::from([b'q', b'e']), Value::Int32(q_end));
    data.insert(Tag::from([b'r', b'q']), Value::Float(0.9));
    data.insert(Tag::from([b'c', b'x']), Value::UInt8(0));
    record
}

pub fn set_read_accuracy(record: &mut RecordBuf, accuracy: f32) {
    record
        .data_mut()
        .insert(Tag::from([b'r', b'q']), Value::Float(accuracy));
}

pub fn write_bam(path: &Path, header: &sam::Header, records: &[RecordBuf]) {
    let mut writer = bam::io::Writer::new(fs::File::create(path).unwrap());
    writer.write_header(header).unwrap();
    for record in records {
        writer.write_alignment_record(header, record).unwrap();
    }
    writer.try_finish().unwrap();
}

/// Write `<bam>.bai` next to a coordinate-sorted BAM
pub fn index_bam(path: &Path) {
    let index = bam::fs::index(path).unwrap();
    let mut bai_path = path.as_os_str().to_owned();
    bai_path.push(".bai");
    let mut writer = noodles::bam::bai::io::Writer::new(fs::File::create(PathBuf::from(bai_path)).unwrap());
    writer.write_index(&index).unwrap();
}

/// The four lambda subreads of ZMW 14743, in file order (not coordinate-sorted)
pub fn lambda_subreads() -> Vec<RecordBuf> {
    vec![
        subread(14743, 2114, 2531, mapped(0, 9507, false)),
        subread(14743, 2579, 4055, mapped(0, 8453, true)),
        subread(14743, 4101, 5571, mapped(0, 8455, false)),
        subread(14743, 5615, 6237, mapped(0, 9291, true)),
    ]
}

pub fn record_name(record: &RecordBuf) -> String {
    String::from_utf8_lossy(record.name().unwrap().as_ref()).into_owned()
}
