use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "pbindex")]
#[command(about = "Build the PacBio index (.pbi) for a BAM file")]
pub struct Config {
    /// Input BAM file
    #[arg(value_name = "input.bam")]
    pub input: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Where the index is written: `<input>.pbi`
    pub fn pbi_path(&self) -> PathBuf {
        crate::pbi::pbi_path_for(&self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbi_path() {
        let config = Config {
            input: PathBuf::from("/data/movie.subreads.bam"),
            log_level: "info".to_string(),
        };
        assert_eq!(
            config.pbi_path(),
            PathBuf::from("/data/movie.subreads.bam.pbi")
        );
    }

    #[test]
    fn test_parse_positional_input() {
        let config = Config::try_parse_from(["pbindex", "reads.bam", "--log-level", "debug"]).unwrap();
        assert_eq!(config.input, PathBuf::from("reads.bam"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_input_is_required() {
        assert!(Config::try_parse_from(["pbindex"]).is_err());
    }
}
