//! Read-group identifiers derived from movie name and read type.

use md5::{Digest, Md5};
use std::fmt;

/// PacBio read type, as encoded in the read-group `DS` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Zmw,
    Polymerase,
    HqRegion,
    Subread,
    Ccs,
    Scrap,
    Unknown,
    Transcript,
}

impl RecordType {
    /// Read types a movie name may produce, in lookup order
    pub const ALL: [RecordType; 8] = [
        RecordType::Ccs,
        RecordType::Transcript,
        RecordType::Polymerase,
        RecordType::HqRegion,
        RecordType::Subread,
        RecordType::Scrap,
        RecordType::Unknown,
        RecordType::Zmw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Zmw => "ZMW",
            RecordType::Polymerase => "POLYMERASE",
            RecordType::HqRegion => "HQREGION",
            RecordType::Subread => "SUBREAD",
            RecordType::Ccs => "CCS",
            RecordType::Scrap => "SCRAP",
            RecordType::Unknown => "UNKNOWN",
            RecordType::Transcript => "TRANSCRIPT",
        }
    }

    /// Type implied by a record name when no read group is attached
    pub fn from_name(name: &str) -> Self {
        if name.starts_with("transcript/") {
            RecordType::Transcript
        } else if name.ends_with("/ccs") || name.contains("/ccs/") {
            RecordType::Ccs
        } else {
            RecordType::Subread
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First 8 hex characters of `MD5("{movie}//{READTYPE}")`
pub fn make_read_group_id(movie_name: &str, read_type: &str) -> String {
    let digest = Md5::digest(format!("{}//{}", movie_name, read_type).as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Barcoded read-group id: `{id}/{forward}--{reverse}`
pub fn make_barcoded_read_group_id(
    movie_name: &str,
    read_type: &str,
    barcodes: (i16, i16),
) -> String {
    format!(
        "{}/{}--{}",
        make_read_group_id(movie_name, read_type),
        barcodes.0,
        barcodes.1
    )
}

/// Text of a read-group id before any barcode suffix
pub fn base_id(id: &str) -> &str {
    id.split_once('/').map_or(id, |(base, _)| base)
}

/// Numeric form of a read-group id, as stored in the index `rgId` column
pub fn id_to_int(id: &str) -> Option<i32> {
    u32::from_str_radix(base_id(id), 16).ok().map(|v| v as i32)
}

/// Parse the barcode pair of a barcoded read-group id (`id/3--5`)
pub fn barcodes_from_id(id: &str) -> Option<(i16, i16)> {
    let (_, suffix) = id.split_once('/')?;
    let (forward, reverse) = suffix.split_once("--")?;
    Some((forward.parse().ok()?, reverse.parse().ok()?))
}

/// Integer read-group id for a movie and read type
pub fn read_group_int(movie_name: &str, read_type: RecordType) -> i32 {
    id_to_int(&make_read_group_id(movie_name, read_type.as_str())).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVIE: &str = "m140905_042212_sidney_c100564852550000001823085912221377_s1_X0";

    #[test]
    fn test_make_read_group_id() {
        assert_eq!(make_read_group_id(MOVIE, "SUBREAD"), "b89a4406");
        assert_eq!(make_read_group_id(MOVIE, "CCS"), "5c6eab27");
        assert_eq!(make_read_group_id(MOVIE, "HQREGION"), "00082ba1");
        assert_eq!(make_read_group_id("movie1", "SUBREAD"), "3f58e5b8");
    }

    #[test]
    fn test_id_to_int() {
        assert_eq!(id_to_int("b89a4406"), Some(-1197849594));
        assert_eq!(id_to_int("00082ba1"), Some(535457));
        assert_eq!(id_to_int("5c6eab27/0--1"), Some(1550756647));
        assert_eq!(id_to_int("not-hex"), None);
    }

    #[test]
    fn test_read_group_int_per_type() {
        let expected = [
            (RecordType::Subread, -1197849594),
            (RecordType::Ccs, 1550756647),
            (RecordType::Zmw, 2005553570),
            (RecordType::Polymerase, -1701855713),
            (RecordType::Scrap, 1580846372),
            (RecordType::Unknown, 1079723832),
            (RecordType::Transcript, 819535653),
        ];
        for (read_type, id) in expected {
            assert_eq!(read_group_int(MOVIE, read_type), id, "{}", read_type);
        }
    }

    #[test]
    fn test_barcoded_ids() {
        let id = make_barcoded_read_group_id("movie1", "SUBREAD", (3, 5));
        assert_eq!(id, "3f58e5b8/3--5");
        assert_eq!(base_id(&id), "3f58e5b8");
        assert_eq!(barcodes_from_id(&id), Some((3, 5)));
        assert_eq!(barcodes_from_id("3f58e5b8"), None);
    }

    #[test]
    fn test_record_type_from_name() {
        assert_eq!(RecordType::from_name("movie/42/ccs"), RecordType::Ccs);
        assert_eq!(
            RecordType::from_name("transcript/7"),
            RecordType::Transcript
        );
        assert_eq!(RecordType::from_name("movie/42/0_100"), RecordType::Subread);
    }
}
