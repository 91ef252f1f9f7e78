//! Per-record summary values stored in the index.

use super::raw::{UNMAPPED_ID, UNMAPPED_POSITION};
use super::read_group::{self, RecordType};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::data::field::value::Array;

const HOLE_NUMBER: Tag = Tag::new(b'z', b'm');
const QUERY_START: Tag = Tag::new(b'q', b's');
const QUERY_END: Tag = Tag::new(b'q', b'e');
const READ_ACCURACY: Tag = Tag::new(b'r', b'q');
const LOCAL_CONTEXT: Tag = Tag::new(b'c', b'x');
const BARCODES: Tag = Tag::new(b'b', b'c');
const BARCODE_QUALITY: Tag = Tag::new(b'b', b'q');

/// Everything the builder needs from one BAM record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub rg_id: i32,
    pub q_start: i32,
    pub q_end: i32,
    pub hole_number: i32,
    pub read_qual: f32,
    pub ctxt_flag: u8,
    pub t_id: i32,
    pub t_start: u32,
    pub t_end: u32,
    pub a_start: u32,
    pub a_end: u32,
    pub rev_strand: u8,
    pub n_m: u32,
    pub n_mm: u32,
    pub map_qv: u8,
    pub n_ins_ops: u32,
    pub n_del_ops: u32,
    /// `(bc_forward, bc_reverse, bc_qual)` when both `bc` and `bq` are present
    pub barcodes: Option<(i16, i16, i8)>,
}

impl RecordSummary {
    pub fn from_record(record: &RecordBuf) -> Self {
        let name = record
            .name()
            .map(|n| String::from_utf8_lossy(n.as_ref()).into_owned())
            .unwrap_or_default();
        let record_type = RecordType::from_name(&name);
        let seq_len = record.sequence().len() as i32;

        let (q_start, q_end) = match record_type {
            RecordType::Ccs | RecordType::Transcript => (0, seq_len),
            _ => match (int_tag(record, QUERY_START), int_tag(record, QUERY_END)) {
                (Some(qs), Some(qe)) => (qs as i32, qe as i32),
                _ => (0, seq_len),
            },
        };

        let hole_number = int_tag(record, HOLE_NUMBER)
            .map(|zm| zm as i32)
            .or_else(|| hole_number_from_name(&name))
            .unwrap_or(0);

        let read_qual = match record.data().get(&READ_ACCURACY) {
            Some(Value::Float(rq)) => *rq,
            _ => 0.0,
        };
        let ctxt_flag = int_tag(record, LOCAL_CONTEXT).map_or(0, |cx| cx as u8);

        let rg_id = read_group_id(record, &name, record_type);

        let mut n_m = 0u32;
        let mut n_mm = 0u32;
        let mut n_ins_ops = 0u32;
        let mut n_del_ops = 0u32;
        for op in record.cigar().as_ref() {
            match op.kind() {
                Kind::SequenceMatch => n_m += op.len() as u32,
                Kind::SequenceMismatch => n_mm += op.len() as u32,
                Kind::Insertion => n_ins_ops += 1,
                Kind::Deletion => n_del_ops += 1,
                _ => {}
            }
        }

        let flags = record.flags();
        let is_mapped = !flags.is_unmapped();
        let rev_strand = u8::from(flags.is_reverse_complemented());

        let (t_id, t_start, t_end, a_start, a_end) = match (
            is_mapped,
            record.reference_sequence_id(),
            record.alignment_start(),
            record.alignment_end(),
        ) {
            (true, Some(id), Some(start), Some(end)) => {
                let (lead, trail) = soft_clips(record);
                let (a_start, a_end) = if rev_strand == 1 {
                    (q_start + trail, q_end - lead)
                } else {
                    (q_start + lead, q_end - trail)
                };
                (
                    id as i32,
                    (usize::from(start) - 1) as u32,
                    usize::from(end) as u32,
                    a_start as u32,
                    a_end as u32,
                )
            }
            _ => (
                UNMAPPED_ID,
                UNMAPPED_POSITION,
                UNMAPPED_POSITION,
                UNMAPPED_POSITION,
                UNMAPPED_POSITION,
            ),
        };

        let map_qv = record.mapping_quality().map_or(255, |mq| mq.get());

        Self {
            rg_id,
            q_start,
            q_end,
            hole_number,
            read_qual,
            ctxt_flag,
            t_id,
            t_start,
            t_end,
            a_start,
            a_end,
            rev_strand,
            n_m,
            n_mm,
            map_qv,
            n_ins_ops,
            n_del_ops,
            barcodes: barcodes(record),
        }
    }
}

fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Int8(n) => Some(i64::from(*n)),
        Value::UInt8(n) => Some(i64::from(*n)),
        Value::Int16(n) => Some(i64::from(*n)),
        Value::UInt16(n) => Some(i64::from(*n)),
        Value::Int32(n) => Some(i64::from(*n)),
        Value::UInt32(n) => Some(i64::from(*n)),
        _ => None,
    }
}

fn int_tag(record: &RecordBuf, tag: Tag) -> Option<i64> {
    record.data().get(&tag).and_then(int_value)
}

fn int_array(array: &Array) -> Vec<i64> {
    match array {
        Array::Int8(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::UInt8(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::Int16(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::UInt16(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::Int32(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::UInt32(v) => v.iter().map(|&n| i64::from(n)).collect(),
        Array::Float(_) => Vec::new(),
    }
}

fn barcodes(record: &RecordBuf) -> Option<(i16, i16, i8)> {
    let bc = match record.data().get(&BARCODES)? {
        Value::Array(array) => int_array(array),
        _ => return None,
    };
    let bq = int_tag(record, BARCODE_QUALITY)?;
    match bc.as_slice() {
        [forward, reverse] => Some((*forward as i16, *reverse as i16, bq as i8)),
        _ => None,
    }
}

/// Record's read-group id as an integer, deriving one from the name when no RG tag is set
fn read_group_id(record: &RecordBuf, name: &str, record_type: RecordType) -> i32 {
    match record.data().get(&Tag::READ_GROUP) {
        Some(Value::String(rg)) => {
            let rg = String::from_utf8_lossy(rg.as_ref()).into_owned();
            read_group::id_to_int(&rg).unwrap_or(0)
        }
        _ => {
            let movie = name.split('/').next().unwrap_or_default();
            read_group::read_group_int(movie, record_type)
        }
    }
}

/// ZMW hole number from the `zm` tag, falling back to the record name
pub fn hole_number(record: &RecordBuf) -> Option<i32> {
    int_tag(record, HOLE_NUMBER).map(|zm| zm as i32).or_else(|| {
        record
            .name()
            .and_then(|n| hole_number_from_name(&String::from_utf8_lossy(n.as_ref())))
    })
}

/// `movie/zmw/...` -> zmw
pub fn hole_number_from_name(name: &str) -> Option<i32> {
    let mut parts = name.split('/');
    match (parts.next(), parts.next()) {
        (Some("transcript"), _) => None,
        (Some(_), Some(zmw)) => zmw.parse().ok(),
        _ => None,
    }
}

/// Soft-clipped bases at the start and end of the CIGAR (genomic orientation)
fn soft_clips(record: &RecordBuf) -> (i32, i32) {
    let ops = record.cigar().as_ref();
    (clip_len(ops.iter()), clip_len(ops.iter().rev()))
}

fn clip_len<'a>(ops: impl Iterator<Item = &'a Op>) -> i32 {
    ops.skip_while(|op| op.kind() == Kind::HardClip)
        .take_while(|op| op.kind() == Kind::SoftClip)
        .map(|op| op.len() as i32)
        .sum()
}
