//! The capabilities the coordinator needs from a storage shard.

use std::{fmt::Display, sync::Arc};

use influxdb3_influxql::{
    DynError, Expr, IteratorOptions, SendablePointIterator, Sources, TagSet,
};

use crate::schema::{Dimensions, FieldTypes};

#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub struct ShardId(u64);

impl ShardId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ShardId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a measurement inside one shard's index, as returned by
/// [`Shard::measurement`].
///
/// The handle is only meaningful to the shard that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementRef {
    name: Arc<str>,
}

impl MeasurementRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A storage partition holding the series of a time range.
///
/// Implementations may block on I/O; the coordinator calls them from the
/// blocking thread pool when it fans out across shards.
pub trait Shard: std::fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> ShardId;

    /// Field types and tag keys of the named measurements.
    ///
    /// Names not present in the shard are ignored.
    fn field_dimensions(&self, measurements: &[String]) -> Result<(FieldTypes, Dimensions), DynError>;

    /// Look up a measurement by name.
    fn measurement(&self, name: &str) -> Option<MeasurementRef>;

    /// Group the series of `measurement` matching `condition` by the values of
    /// the `dimensions` tags, ordered by tag set key.
    fn tag_sets(
        &self,
        measurement: &MeasurementRef,
        dimensions: &[String],
        condition: Option<&Expr>,
    ) -> Result<Vec<TagSet>, DynError>;

    /// Open an iterator over the series of one tag set.
    fn create_series_iterator(
        &self,
        measurement: &MeasurementRef,
        tag_set: &TagSet,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, DynError>;

    /// Open an iterator over every series of the shard matching `opt`.
    fn create_iterator(&self, opt: &IteratorOptions) -> Result<SendablePointIterator, DynError>;

    /// Replace regular expression sources with the concrete measurements they
    /// match in this shard.
    fn expand_sources(&self, sources: &Sources) -> Result<Sources, DynError>;
}
