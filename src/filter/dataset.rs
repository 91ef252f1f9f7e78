//! Translation of dataset filter descriptions into [`PbiFilter`] trees.
//!
//! A description is a list of [`DatasetFilter`]s, each a list of
//! [`Property`] triples. Properties of one filter are intersected and the
//! filters are unioned.

use super::PbiFilter;
use crate::types::{Compare, FilterHash, LocalContextFlags};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub operator: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl Property {
    pub fn new(name: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator: operator.into(),
            value: value.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFilter {
    pub properties: Vec<Property>,
}

impl DatasetFilter {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }
}

/// Union over `filters` of the intersection of each filter's properties
pub fn from_dataset_filters(filters: &[DatasetFilter]) -> Result<PbiFilter> {
    translate(filters, None)
}

/// Parse a JSON array of dataset filters
pub fn from_json_str(json: &str) -> Result<PbiFilter> {
    translate(&parse_json(json)?, None)
}

/// Like [`from_json_str`], resolving relative `qname` files against the JSON file's directory
pub fn from_json_file(path: impl AsRef<Path>) -> Result<PbiFilter> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let filters = parse_json(&json)?;
    debug!("Loaded {} dataset filters from {}", filters.len(), path.display());
    translate(&filters, path.parent())
}

fn parse_json(json: &str) -> Result<Vec<DatasetFilter>> {
    serde_json::from_str(json)
        .map_err(|e| Error::format(format!("invalid dataset filter description: {}", e)))
}

fn translate(filters: &[DatasetFilter], base_dir: Option<&Path>) -> Result<PbiFilter> {
    let mut union = Vec::with_capacity(filters.len());
    for filter in filters {
        let properties = filter
            .properties
            .iter()
            .map(|property| property_filter(property, base_dir))
            .collect::<Result<Vec<_>>>()?;
        union.push(PbiFilter::intersection(properties));
    }
    Ok(PbiFilter::union(union))
}

fn property_filter(property: &Property, base_dir: Option<&Path>) -> Result<PbiFilter> {
    build(property, base_dir).map_err(|e| {
        let reason = match e {
            Error::Format(msg) | Error::Construction(msg) => msg,
            other => other.to_string(),
        };
        Error::format(format!(
            "could not create filter from property:\n  Name:     {}\n  Value:    {}\n  Operator: {}\n  reason:   {}",
            property.name, property.value, property.operator, reason
        ))
    })
}

fn build(property: &Property, base_dir: Option<&Path>) -> Result<PbiFilter> {
    let name = property.name.trim().to_ascii_lowercase();
    let compare = Compare::from_operator(&property.operator.trim().to_ascii_lowercase())?;
    let value = property.value.trim();

    if name == "zm" && property.attributes.contains_key("Modulo") {
        return zmw_modulo(property);
    }
    if value.is_empty() {
        return Err(Error::format(format!("empty value for {} property", name)));
    }

    let filter = match name.as_str() {
        "ae" | "aend" => PbiFilter::aligned_end(parse(value)?, compare),
        "alignedlength" => PbiFilter::aligned_length(parse(value)?, compare),
        "as" | "astart" | "readstart" => PbiFilter::aligned_start(parse(value)?, compare),
        "bq" | "bcq" => PbiFilter::barcode_quality(parse(value)?, compare),
        "accuracy" | "identity" => PbiFilter::identity(parse(value)?, compare),
        "mapqv" => PbiFilter::map_quality(parse(value)?, compare),
        "n_subreads" => PbiFilter::num_subreads(parse(value)?, compare),
        "qe" | "qend" => PbiFilter::query_end(parse(value)?, compare),
        "length" | "querylength" => PbiFilter::query_length(parse(value)?, compare),
        "qs" | "qstart" => PbiFilter::query_start(parse(value)?, compare),
        "rq" => PbiFilter::read_accuracy(parse(value)?, compare),
        "te" | "tend" => PbiFilter::reference_end(parse(value)?, compare),
        "ts" | "tstart" | "pos" => PbiFilter::reference_start(parse(value)?, compare),

        "bc" | "barcode" => match Values::split(value) {
            Values::Single(v) => PbiFilter::barcode(parse(v)?, compare),
            Values::List(values) => match values.as_slice() {
                [forward, reverse] => PbiFilter::barcodes(parse(forward)?, parse(reverse)?, compare),
                _ => return Err(Error::format("only 2 barcode values expected")),
            },
        },
        "bcf" => match Values::split(value) {
            Values::Single(v) => PbiFilter::barcode_forward(parse(v)?, compare),
            Values::List(values) => PbiFilter::barcode_forward_list(parse_all(&values)?, compare)?,
        },
        "bcr" => match Values::split(value) {
            Values::Single(v) => PbiFilter::barcode_reverse(parse(v)?, compare),
            Values::List(values) => PbiFilter::barcode_reverse_list(parse_all(&values)?, compare)?,
        },
        "cx" => PbiFilter::local_context(local_context(value)?, compare),
        "movie" => PbiFilter::movie_names(&Values::split(value).into_vec(), compare)?,
        "qid" => PbiFilter::read_group_ids(&parse_all(&Values::split(value).into_vec())?, compare)?,
        "qname" => {
            let path = resolve(value, base_dir);
            if path.is_file() {
                PbiFilter::query_names(&read_names(&path)?, compare)?
            } else {
                PbiFilter::query_names(&Values::split(value).into_vec(), compare)?
            }
        }
        "qname_file" => PbiFilter::query_names(&read_names(&resolve(value, base_dir))?, compare)?,
        "rname" => PbiFilter::reference_names(&Values::split(value).into_vec(), compare)?,
        "zm" | "zmw" => match Values::split(value) {
            Values::Single(v) => PbiFilter::zmw(parse(v)?, compare),
            Values::List(values) => PbiFilter::zmws(parse_all(&values)?, compare)?,
        },
        _ => {
            return Err(Error::format(format!(
                "{} is not a recognized filter property",
                property.name
            )));
        }
    };
    Ok(filter)
}

fn zmw_modulo(property: &Property) -> Result<PbiFilter> {
    let (Some(modulo), Some(hash)) = (
        property.attributes.get("Modulo"),
        property.attributes.get("Hash"),
    ) else {
        return Err(Error::format(format!(
            "modulo filter is not supported on property: {}",
            property.name
        )));
    };
    let hash = FilterHash::from_name(hash.trim())?;
    PbiFilter::zmw_modulo(
        parse(modulo)?,
        parse(&property.value)?,
        hash,
        Compare::Equal,
    )
}

/// A raw value is a list when it contains a comma, optionally inside brackets
enum Values<'a> {
    Single(&'a str),
    List(Vec<&'a str>),
}

impl<'a> Values<'a> {
    fn split(value: &'a str) -> Self {
        let inner = if value.len() >= 2
            && value.starts_with(['[', '(', '{'])
            && value.ends_with([']', ')', '}'])
        {
            &value[1..value.len() - 1]
        } else {
            value
        };
        if inner.contains(',') {
            Values::List(inner.split(',').map(str::trim).collect())
        } else {
            Values::Single(inner.trim())
        }
    }

    fn into_vec(self) -> Vec<&'a str> {
        match self {
            Values::Single(v) => vec![v],
            Values::List(values) => values,
        }
    }
}

fn parse<T: FromStr>(token: &str) -> Result<T> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::format(format!("invalid value: {}", token)))
}

fn parse_all<T: FromStr>(tokens: &[&str]) -> Result<Vec<T>> {
    tokens.iter().map(|t| parse(t)).collect()
}

/// Integer flags, or `|`-joined flag names
fn local_context(value: &str) -> Result<LocalContextFlags> {
    if value.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(LocalContextFlags(parse(value)?));
    }
    value.split('|').try_fold(LocalContextFlags::NO_LOCAL_CONTEXT, |flags, name| {
        let name = name.trim();
        LocalContextFlags::from_name(name)
            .map(|flag| flags | flag)
            .ok_or_else(|| Error::format(format!("unknown local context flag: {}", name)))
    })
}

fn resolve(value: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(value);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::format(format!("could not read query names from {}: {}", path.display(), e))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbi::raw::tests::{test2_barcoded_index, test2_index};

    const MOVIE: &str = "m140905_042212_sidney_c100564852550000001823085912221377_s1_X0";

    fn single(name: &str, operator: &str, value: &str) -> Vec<DatasetFilter> {
        vec![DatasetFilter::new(vec![Property::new(name, operator, value)])]
    }

    #[test]
    fn test_read_accuracy_property() {
        let filter = from_dataset_filters(&single("rq", ">=", "0.85")).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 2]);
    }

    #[test]
    fn test_properties_intersect_filters_union() {
        let filters = vec![
            DatasetFilter::new(vec![
                Property::new("length", "gte", "500"),
                Property::new("qstart", "<", "3000"),
            ]),
            DatasetFilter::new(vec![Property::new("qs", "==", "5615")]),
        ];
        let filter = from_dataset_filters(&filters).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![1, 3]);
    }

    #[test]
    fn test_no_filters_accepts_all() {
        let filter = from_dataset_filters(&[]).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let filter = from_dataset_filters(&single("TStart", "&gt;=", "9200")).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 3]);
    }

    #[test]
    fn test_barcode_values() {
        let index = test2_barcoded_index();
        let pair = from_dataset_filters(&single("bc", "=", "[17,18]")).unwrap();
        assert_eq!(pair.evaluate(&index), vec![1, 3]);

        let either = from_dataset_filters(&single("barcode", "=", "257")).unwrap();
        assert_eq!(either.evaluate(&index), vec![2]);

        let forward = from_dataset_filters(&single("bcf", "in", "(0, 256)")).unwrap();
        assert_eq!(forward.evaluate(&index), vec![0, 2]);

        let err = from_dataset_filters(&single("bc", "=", "[1,2,3]")).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_local_context_values() {
        let index = test2_index();
        let names =
            from_dataset_filters(&single("cx", "&", "ADAPTER_BEFORE | ADAPTER_AFTER")).unwrap();
        assert_eq!(names.evaluate(&index), vec![1, 2, 3]);

        let raw = from_dataset_filters(&single("cx", "~", "1")).unwrap();
        assert_eq!(raw.evaluate(&index), vec![0, 2]);

        assert!(from_dataset_filters(&single("cx", "&", "NOT_A_FLAG")).is_err());
    }

    #[test]
    fn test_zmw_modulo_attributes() {
        let property = Property::new("zm", "=", "1")
            .with_attribute("Modulo", "2")
            .with_attribute("Hash", "uint32cast");
        let filter = from_dataset_filters(&[DatasetFilter::new(vec![property])]).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 1, 2, 3]);

        let missing_hash = Property::new("zm", "=", "0").with_attribute("Modulo", "2");
        assert!(from_dataset_filters(&[DatasetFilter::new(vec![missing_hash])]).is_err());
    }

    #[test]
    fn test_list_rejects_ordering_operator() {
        let err = from_dataset_filters(&single("zm", "<", "[1,2]")).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("Name:     zm"));
    }

    #[test]
    fn test_unknown_name_and_operator() {
        let err = from_dataset_filters(&single("bogus", "=", "1")).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("bogus"));

        let err = from_dataset_filters(&single("rq", "=~", "0.8")).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("Operator: =~"));

        assert!(from_dataset_filters(&single("qs", "=", "abc")).is_err());
        assert!(from_dataset_filters(&single("qs", "=", "")).is_err());
    }

    #[test]
    fn test_movie_and_qid() {
        let index = test2_index();
        let movie = from_dataset_filters(&single("movie", "=", MOVIE)).unwrap();
        assert_eq!(movie.evaluate(&index), vec![0, 1, 2, 3]);

        let qid = from_dataset_filters(&single("qid", "!=", "-1197849594")).unwrap();
        assert!(qid.evaluate(&index).is_empty());
    }

    #[test]
    fn test_query_names_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let names = format!("{m}/14743/2114_2531\n{m}/14743/4101_5571\n", m = MOVIE);
        std::fs::write(dir.path().join("names.txt"), names).unwrap();
        let json = r#"[{"properties": [{"name": "qname_file", "operator": "=", "value": "names.txt"}]}]"#;
        let json_path = dir.path().join("filter.json");
        std::fs::write(&json_path, json).unwrap();

        let filter = from_json_file(&json_path).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 2]);

        let absolute = dir.path().join("names.txt");
        let filter =
            from_dataset_filters(&single("qname", "=", &absolute.to_string_lossy())).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0, 2]);
    }

    #[test]
    fn test_inline_query_names() {
        let value = format!("[{m}/14743/2579_4055,{m}/14743/5615_6237]", m = MOVIE);
        let filter = from_dataset_filters(&single("qname", "==", &value)).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![1, 3]);
    }

    #[test]
    fn test_json_description() {
        let json = r#"[
            {"properties": [
                {"name": "rq", "operator": ">=", "value": "0.85"},
                {"name": "ts", "operator": ">", "value": "9000"}
            ]}
        ]"#;
        let filter = from_json_str(json).unwrap();
        assert_eq!(filter.evaluate(&test2_index()), vec![0]);
        assert!(from_json_str("{not json").unwrap_err().is_format());
    }
}
