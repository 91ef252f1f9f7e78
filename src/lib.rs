pub mod config;
pub mod error;
pub mod filter;
pub mod pbi;
pub mod query;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::PbiFilter;
pub use pbi::{PbiBuilder, PbiFile, PbiRawData};
pub use types::{Compare, GenomicInterval, Strand};
