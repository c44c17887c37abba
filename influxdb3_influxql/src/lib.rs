//! InfluxQL query vocabulary shared between the query planner, the shard
//! coordinator and the storage engine.
//!
//! This crate does not parse or execute InfluxQL. It defines the types that
//! flow across the boundary between a planned query and the shards that serve
//! it:
//!
//! * [`DataType`] - the ranked field value kinds used when merging schemas.
//! * [`Measurement`] and [`Sources`] - the `FROM` clause, possibly containing
//!   regular expressions that shards expand into concrete measurements.
//! * [`Expr`] - the tag predicate shards use to select series.
//! * [`TagSet`] - a group of series sharing the values of the `GROUP BY` tags.
//! * [`IteratorOptions`] - everything a shard needs to open an iterator.
//! * [`PointIterator`], [`IteratorCreator`] and [`IteratorComposer`] - the
//!   pull-based iterator contracts, with the [`LazyIterator`] and
//!   [`SortedMergeIterator`] combinators.

pub mod data_type;
pub mod expr;
pub mod iterator;
pub mod options;
pub mod point;
pub mod source;
pub mod tag_set;

pub use data_type::DataType;
pub use expr::Expr;
pub use iterator::{
    IteratorComposer, IteratorCreator, IteratorError, LazyComposer, LazyIterator, PointIterator,
    SendablePointIterator, SortedMergeIterator, VecIterator,
};
pub use options::{Interval, IteratorOptions};
pub use point::{FieldValue, Point, Tags};
pub use source::{Measurement, MeasurementName, Sources};
pub use tag_set::{TagSet, limit_tag_sets};

/// A boxed, thread safe error as returned by storage engine implementations.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;
