//! Building and loading `.pbi` files from synthetic BAMs.

mod common;

use common::{header, lambda_subreads, mapped, record_name, subread, write_bam};
use noodles::bgzf::VirtualPosition;
use noodles::sam::alignment::RecordBuf;
use pbindex::pbi::{PbiSections, pbi_path_for};
use pbindex::query::{AlignmentSource, BamSource};
use pbindex::{PbiFile, PbiRawData};
use std::process::Command;
use tempfile::TempDir;

fn sorted_records() -> Vec<RecordBuf> {
    vec![
        subread(100, 0, 500, mapped(0, 1000, false)),
        subread(100, 550, 1200, mapped(0, 2000, true)),
        subread(200, 0, 800, mapped(0, 2500, false)),
        subread(300, 0, 300, mapped(1, 10, false)),
    ]
}

#[test]
fn test_sorted_mapped_bam_has_reference_data() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("sorted.bam");
    write_bam(&bam, &header(true), &sorted_records());

    let pbi_path = PbiFile::create_from(&bam).unwrap();
    assert_eq!(pbi_path, pbi_path_for(&bam));

    let index = PbiRawData::from_file(&pbi_path).unwrap();
    assert!(index.has_mapped_data());
    assert!(index.has_reference_data());
    assert!(!index.has_barcode_data());
    assert_eq!(index.num_reads(), 4);

    let basic = index.basic();
    assert_eq!(basic.hole_number, vec![100, 100, 200, 300]);
    assert_eq!(basic.q_start, vec![0, 550, 0, 0]);
    assert_eq!(basic.q_end, vec![500, 1200, 800, 300]);

    let mapped = index.mapped();
    assert_eq!(mapped.t_id, vec![0, 0, 0, 1]);
    assert_eq!(mapped.t_start, vec![1000, 2000, 2500, 10]);
    assert_eq!(mapped.t_end, vec![1500, 2650, 3300, 310]);
    assert_eq!(mapped.rev_strand, vec![0, 1, 0, 0]);
    assert_eq!(mapped.n_m, vec![500, 650, 800, 300]);

    let first = index.reference_entry(0).unwrap();
    assert_eq!((first.begin_row, first.end_row), (0, 3));
    let second = index.reference_entry(1).unwrap();
    assert_eq!((second.begin_row, second.end_row), (3, 4));
    index.validate_reference_data().unwrap();
}

#[test]
fn test_unsorted_bam_drops_reference_data() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unsorted.bam");
    write_bam(&bam, &header(false), &lambda_subreads());

    let index = PbiRawData::from_file(PbiFile::create_from(&bam).unwrap()).unwrap();
    assert_eq!(index.sections(), PbiSections::BASIC | PbiSections::MAPPED);
    assert_eq!(index.mapped().t_start, vec![9507, 8453, 8455, 9291]);
}

#[test]
fn test_unmapped_bam_is_basic_only() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unmapped.bam");
    let records = vec![subread(1, 0, 100, None), subread(2, 0, 200, None)];
    write_bam(&bam, &header(false), &records);

    let index = PbiRawData::from_file(PbiFile::create_from(&bam).unwrap()).unwrap();
    assert_eq!(index.sections(), PbiSections::BASIC);
    assert_eq!(index.num_reads(), 2);
}

#[test]
fn test_file_offsets_address_records() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("offsets.bam");
    let records = lambda_subreads();
    write_bam(&bam, &header(false), &records);

    let index = PbiRawData::from_file(PbiFile::create_from(&bam).unwrap()).unwrap();
    let mut source = BamSource::open(&bam).unwrap();
    let mut record = RecordBuf::default();
    for row in (0..records.len()).rev() {
        let offset = index.basic().file_offset[row] as u64;
        source.seek(VirtualPosition::from(offset)).unwrap();
        assert!(source.read_record(&mut record).unwrap());
        assert_eq!(record_name(&record), record_name(&records[row]));
    }
}

#[test]
fn test_loading_non_pbi_is_format_error() {
    let dir = TempDir::new().unwrap();

    let fasta = dir.path().join("reads.fa.pbi");
    std::fs::write(&fasta, b">read1\nACGT\n").unwrap();
    assert!(PbiRawData::from_file(&fasta).unwrap_err().is_format());

    // a BAM is BGZF, but carries the wrong magic
    let bam = dir.path().join("reads.bam");
    write_bam(&bam, &header(false), &lambda_subreads());
    let disguised = dir.path().join("reads.bam.pbi");
    std::fs::copy(&bam, &disguised).unwrap();
    let err = PbiRawData::from_file(&disguised).unwrap_err();
    assert!(err.is_format());
    assert_eq!(err.error_type(), "FormatError");
}

#[test]
fn test_aggregate_across_files() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.bam");
    let second = dir.path().join("b.bam");
    write_bam(&first, &header(true), &sorted_records());
    write_bam(&second, &header(false), &lambda_subreads());
    let pbis = [
        PbiFile::create_from(&first).unwrap(),
        PbiFile::create_from(&second).unwrap(),
    ];

    let merged = PbiRawData::aggregate(&pbis).unwrap();
    assert_eq!(merged.num_reads(), 8);
    assert_eq!(merged.basic().file_number(3), 0);
    assert_eq!(merged.basic().file_number(4), 1);
}

#[test]
fn test_cli_writes_index() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("cli.bam");
    write_bam(&bam, &header(true), &sorted_records());

    let output = Command::new(env!("CARGO_BIN_EXE_pbindex"))
        .arg(&bam)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(pbi_path_for(&bam).is_file());
}

#[test]
fn test_cli_reports_failure() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.bam");

    let output = Command::new(env!("CARGO_BIN_EXE_pbindex"))
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pbindex ERROR: [FormatError]"), "{}", stderr);
}
