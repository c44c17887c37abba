//! Fan-out of InfluxQL queries across storage shards.
//!
//! Given the shards that hold data for a query, this crate resolves the merged
//! schema the planner validates against and builds the single iterator that
//! the query engine pulls from. Two mappers cover the two ways the planner
//! sees shards:
//!
//! * [`ShardMapper`] - a flat list of shards, each annotated with the
//!   measurements relevant to the query. Matching series are discovered in
//!   parallel across shards and composed in a deterministic order.
//! * [`ShardGroupMapping`] - shards grouped by retention key into time
//!   buckets. Sources are expanded and schemas merged sequentially, and one
//!   iterator source is built per time bucket.
//!
//! Shards are reached only through the [`Shard`] trait.

pub mod schema;
pub mod shard;
pub mod shard_group;
pub mod shard_mapper;
pub mod tag_sets;
pub mod test_util;

pub use schema::{Dimensions, FieldDimensions, FieldTypes};
pub use shard::{MeasurementRef, Shard, ShardId};
pub use shard_group::{GroupSource, ShardFanIn, ShardGroup, ShardGroupMapping};
pub use shard_mapper::{
    SeriesDiscovery, SeriesInfo, ShardInfo, ShardMapper, SkipReason, SkippedMeasurement,
};

use influxdb3_influxql::{DynError, IteratorError, Sources};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve fields and dimensions of shard {shard_id}: {source}")]
    FieldDimensions {
        shard_id: ShardId,
        #[source]
        source: DynError,
    },

    #[error("failed to expand sources in shard {shard_id}: {source}")]
    ExpandSources {
        shard_id: ShardId,
        #[source]
        source: DynError,
    },

    #[error("regular expression sources must be expanded first: {sources}")]
    UnexpandedSources { sources: Sources },

    #[error(transparent)]
    CreateIterator(#[from] IteratorError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
