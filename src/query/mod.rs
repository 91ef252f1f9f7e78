//! Record iterators over one or more BAM files.
//!
//! Every query implements [`Query`] and is also an [`Iterator`] of
//! `Result<RecordBuf>`. Errors in the arguments surface when a query is
//! built (or re-targeted); only genuine I/O failures appear mid-iteration.

pub mod composite;
pub mod entire_file;
pub mod genomic_interval;
pub mod group;
pub mod pbi_filter;
pub mod source;

pub use composite::{SequentialQuery, SortedQuery};
pub use entire_file::EntireFileQuery;
pub use genomic_interval::GenomicIntervalQuery;
pub use group::{QNameQuery, ZmwGroupQuery};
pub use pbi_filter::{IndexBlock, PbiFilterQuery};
pub use source::{AlignmentSource, BamSource};

use crate::Result;
use noodles::sam::alignment::RecordBuf;

/// Pull-based record stream
pub trait Query {
    /// Next record, or `None` once exhausted
    fn next_record(&mut self) -> Result<Option<RecordBuf>>;
}

/// Pull-based stream of record batches
pub trait GroupQuery {
    fn next_group(&mut self) -> Result<Option<Vec<RecordBuf>>>;
}

impl<Q: Query + ?Sized> Query for Box<Q> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        (**self).next_record()
    }
}

/// Implement `Iterator` on top of `Query::next_record`
macro_rules! query_iterator {
    ($ty:ident) => {
        impl<S: $crate::query::AlignmentSource> Iterator for $ty<S> {
            type Item = $crate::Result<noodles::sam::alignment::RecordBuf>;

            fn next(&mut self) -> Option<Self::Item> {
                $crate::query::Query::next_record(self).transpose()
            }
        }
    };
}

pub(crate) use query_iterator;
