//! Resolution of the series of one measurement in one shard.

use influxdb3_influxql::{DynError, IteratorOptions, limit_tag_sets};

use crate::shard_mapper::{SeriesInfo, ShardInfo};

/// Resolve the series of measurement `name` in the shard described by `info`.
///
/// Tag sets are grouped by `opt.dimensions`, filtered by `opt.condition` and
/// limited by `opt.slimit`/`opt.soffset` before a [`SeriesInfo`] is built for
/// each. A measurement missing from the shard yields no series; shards only
/// hold a subset of the measurements a query touches.
pub fn create_tag_sets(
    info: &ShardInfo,
    name: &str,
    opt: &IteratorOptions,
) -> Result<Vec<SeriesInfo>, DynError> {
    let Some(measurement) = info.shard.measurement(name) else {
        return Ok(vec![]);
    };

    let tag_sets = info
        .shard
        .tag_sets(&measurement, &opt.dimensions, opt.condition.as_ref())?;
    let tag_sets = limit_tag_sets(tag_sets, opt.slimit, opt.soffset);

    Ok(tag_sets
        .into_iter()
        .enumerate()
        .map(|(i, tag_set)| SeriesInfo::new(info, measurement.clone(), tag_set, i))
        .collect())
}
