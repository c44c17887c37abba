//! Shards grouped by retention key into time buckets.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use influxdb3_influxql::{
    IteratorComposer, IteratorCreator, IteratorError, IteratorOptions, LazyComposer,
    SendablePointIterator, SortedMergeIterator, Sources, VecIterator,
};
use tracing::debug;

use crate::{
    Error, Result, Shard,
    schema::{Dimensions, FieldDimensions, FieldTypes},
};

/// The shards of one time bucket.
#[derive(Debug, Clone)]
pub struct ShardGroup {
    pub shards: Vec<Arc<dyn Shard>>,
    pub start_time: DateTime<Utc>,
}

impl ShardGroup {
    pub fn new(shards: impl IntoIterator<Item = Arc<dyn Shard>>, start_time: DateTime<Utc>) -> Self {
        Self {
            shards: shards.into_iter().collect(),
            start_time,
        }
    }
}

/// The iterator source standing in for one [`ShardGroup`].
#[derive(Debug, Clone)]
pub enum GroupSource {
    /// The group has no shards and contributes nothing.
    Empty,
    /// The group's only shard, used as is.
    Single(Arc<dyn Shard>),
    /// Several shards read as one source.
    FanIn(ShardFanIn),
}

impl GroupSource {
    pub fn for_group(group: &ShardGroup) -> Self {
        match group.shards.as_slice() {
            [] => Self::Empty,
            [shard] => Self::Single(Arc::clone(shard)),
            shards => Self::FanIn(ShardFanIn::new(shards.iter().map(Arc::clone))),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl IteratorCreator for GroupSource {
    fn create_iterator(
        &self,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError> {
        match self {
            Self::Empty => Ok(Box::new(VecIterator::default())),
            Self::Single(shard) => shard.create_iterator(opt).map_err(IteratorError::Create),
            Self::FanIn(fan_in) => fan_in.create_iterator(opt),
        }
    }
}

/// Reads several shards as a single source, merging their iterators in
/// (name, tags, time) order.
#[derive(Debug, Clone)]
pub struct ShardFanIn {
    shards: Vec<Arc<dyn Shard>>,
}

impl ShardFanIn {
    pub fn new(shards: impl IntoIterator<Item = Arc<dyn Shard>>) -> Self {
        Self {
            shards: shards.into_iter().collect(),
        }
    }

    pub fn shards(&self) -> &[Arc<dyn Shard>] {
        &self.shards
    }
}

impl IteratorCreator for ShardFanIn {
    fn create_iterator(
        &self,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError> {
        let mut inputs = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            match shard.create_iterator(opt) {
                Ok(itr) => inputs.push(itr),
                Err(e) => {
                    for mut itr in inputs {
                        itr.close();
                    }
                    return Err(IteratorError::Create(e));
                }
            }
        }
        Ok(Box::new(SortedMergeIterator::new(inputs, opt.ascending)))
    }
}

/// Retention key to the time-ordered shard groups under it.
///
/// All operations are sequential; shards are visited in retention key order,
/// then group order, then shard order.
#[derive(Debug)]
pub struct ShardGroupMapping {
    groups: BTreeMap<String, Vec<ShardGroup>>,
    composer: Arc<dyn IteratorComposer>,
}

impl ShardGroupMapping {
    pub fn new(groups: impl IntoIterator<Item = (impl Into<String>, Vec<ShardGroup>)>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|(key, groups)| (key.into(), groups))
                .collect(),
            composer: Arc::new(LazyComposer),
        }
    }

    /// Replace the [`LazyComposer`] used to combine group iterators.
    pub fn with_composer(mut self, composer: Arc<dyn IteratorComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<ShardGroup>> {
        &self.groups
    }

    fn shards(&self) -> impl Iterator<Item = &Arc<dyn Shard>> {
        self.groups
            .values()
            .flatten()
            .flat_map(|group| group.shards.iter())
    }

    /// Call `f` on every shard, stopping at the first error.
    pub fn walk<E>(&self, f: impl FnMut(&Arc<dyn Shard>) -> Result<(), E>) -> Result<(), E> {
        self.shards().try_for_each(f)
    }

    /// Expand regular expression sources against every shard.
    ///
    /// Returns each distinct measurement once, ordered by its string form.
    pub fn expand_sources(&self, sources: &Sources) -> Result<Sources> {
        let mut expanded = BTreeMap::new();
        self.walk(|shard| {
            let found = shard
                .expand_sources(sources)
                .map_err(|source| Error::ExpandSources {
                    shard_id: shard.id(),
                    source,
                })?;
            for m in found {
                expanded.entry(m.to_string()).or_insert(m);
            }
            Ok::<_, Error>(())
        })?;
        Ok(expanded.into_values().collect())
    }

    /// Merge the field types and dimensions of `sources` across every shard.
    ///
    /// `sources` must already be expanded with
    /// [`expand_sources`](Self::expand_sources).
    pub fn field_dimensions(&self, sources: &Sources) -> Result<(FieldTypes, Dimensions)> {
        if sources.has_regex() {
            return Err(Error::UnexpandedSources {
                sources: sources.clone(),
            });
        }

        let measurements = sources.names();
        let mut merged = FieldDimensions::default();
        self.walk(|shard| {
            let (fields, dimensions) =
                shard
                    .field_dimensions(&measurements)
                    .map_err(|source| Error::FieldDimensions {
                        shard_id: shard.id(),
                        source,
                    })?;
            merged.merge(fields, dimensions);
            Ok::<_, Error>(())
        })?;
        Ok(merged.into_parts())
    }

    /// One source per non-empty shard group, in traversal order.
    pub fn group_sources(&self) -> Vec<GroupSource> {
        self.groups
            .iter()
            .flat_map(|(key, groups)| groups.iter().map(move |g| (key, g)))
            .filter_map(|(key, group)| {
                let source = GroupSource::for_group(group);
                debug!(
                    retention_key = %key,
                    start_time = %group.start_time,
                    n_shards = group.shards.len(),
                    "resolved shard group source"
                );
                (!source.is_empty()).then_some(source)
            })
            .collect()
    }

    /// Build the iterator for `opt` over every shard group.
    pub fn create_iterator(&self, opt: IteratorOptions) -> Result<SendablePointIterator> {
        let creators = self
            .group_sources()
            .into_iter()
            .map(|source| Arc::new(source) as Arc<dyn IteratorCreator>)
            .collect();
        Ok(self.composer.compose(creators, opt)?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use influxdb3_influxql::{DataType, FieldValue, Measurement, PointIterator};
    use pretty_assertions::assert_eq;
    use regex::Regex;

    use super::*;
    use crate::{ShardId, test_util::MemShard};

    fn time(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn shard(s: MemShard) -> Arc<dyn Shard> {
        Arc::new(s)
    }

    fn ids(shards: &[Arc<dyn Shard>]) -> Vec<u64> {
        shards.iter().map(|s| s.id().as_u64()).collect()
    }

    #[test]
    fn test_walk_order() {
        let mapping = ShardGroupMapping::new([
            (
                "rp_b",
                vec![ShardGroup::new([shard(MemShard::new(5))], time(0))],
            ),
            (
                "rp_a",
                vec![
                    ShardGroup::new([shard(MemShard::new(3)), shard(MemShard::new(1))], time(0)),
                    ShardGroup::new([], time(10)),
                    ShardGroup::new([shard(MemShard::new(2))], time(20)),
                ],
            ),
        ]);

        let mut visited = vec![];
        mapping
            .walk(|s| {
                visited.push(s.id().as_u64());
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(visited, vec![3, 1, 2, 5]);

        // stops at the first error
        let mut visited = vec![];
        let res = mapping.walk(|s| {
            visited.push(s.id().as_u64());
            if s.id() == ShardId::new(1) {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(res, Err("boom"));
        assert_eq!(visited, vec![3, 1]);
    }

    #[test]
    fn test_expand_sources_dedupes_and_sorts() {
        let s1 = MemShard::new(1)
            .with_series("mem", &[])
            .with_series("cpu", &[]);
        let s2 = MemShard::new(2)
            .with_series("cpu", &[])
            .with_series("disk", &[]);
        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![
                ShardGroup::new([shard(s1)], time(0)),
                ShardGroup::new([shard(s2)], time(10)),
            ],
        )]);

        let sources = Sources::new([
            Measurement::regex(Regex::new("^(cpu|mem|disk)$").unwrap()),
            Measurement::new("net"),
        ]);
        let expanded = mapping.expand_sources(&sources).unwrap();
        let got: Vec<_> = expanded.iter().map(ToString::to_string).collect();
        assert_eq!(got, vec!["cpu", "disk", "mem", "net"]);
    }

    #[test]
    fn test_expand_sources_error() {
        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![ShardGroup::new(
                [
                    shard(MemShard::new(1).with_series("cpu", &[])),
                    shard(MemShard::new(2).fail_expand_sources()),
                ],
                time(0),
            )],
        )]);

        assert_matches!(
            mapping.expand_sources(&Sources::new([Measurement::new("cpu")])),
            Err(Error::ExpandSources { shard_id, .. }) if shard_id == ShardId::new(2)
        );
    }

    #[test]
    fn test_field_dimensions() {
        let s1 = MemShard::new(1)
            .with_points("cpu", &[("host", "a")], "usage", [(0, FieldValue::Integer(1))])
            .with_field("mem", "free", DataType::Integer);
        let s2 = MemShard::new(2).with_points(
            "cpu",
            &[("region", "west")],
            "usage",
            [(0, FieldValue::Float(1.0))],
        );
        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![ShardGroup::new([shard(s1), shard(s2)], time(0))],
        )]);

        let (fields, dimensions) = mapping
            .field_dimensions(&Sources::new([Measurement::new("cpu")]))
            .unwrap();
        assert_eq!(fields, FieldTypes::from([("usage".to_string(), DataType::Float)]));
        assert_eq!(
            dimensions,
            Dimensions::from(["host".to_string(), "region".to_string()])
        );

        let failing = ShardGroupMapping::new([(
            "autogen",
            vec![ShardGroup::new([shard(MemShard::new(9).fail_field_dimensions())], time(0))],
        )]);
        assert_matches!(
            failing.field_dimensions(&Sources::default()),
            Err(Error::FieldDimensions { .. })
        );
    }

    #[test]
    fn test_field_dimensions_rejects_unexpanded_sources() {
        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![ShardGroup::new(
                [shard(MemShard::new(1).with_field("cpu", "usage", DataType::Float))],
                time(0),
            )],
        )]);

        let sources = Sources::new([
            Measurement::new("mem"),
            Measurement::regex(Regex::new("^cpu").unwrap()),
        ]);
        assert_matches!(
            mapping.field_dimensions(&sources),
            Err(Error::UnexpandedSources { sources: s }) if s.len() == 2
        );

        let expanded = mapping.expand_sources(&sources).unwrap();
        let (fields, _) = mapping.field_dimensions(&expanded).unwrap();
        assert_eq!(fields, FieldTypes::from([("usage".to_string(), DataType::Float)]));
    }

    #[test]
    fn test_group_sources() {
        let single = shard(MemShard::new(1));
        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![
                ShardGroup::new([], time(0)),
                ShardGroup::new([Arc::clone(&single)], time(10)),
                ShardGroup::new([shard(MemShard::new(2)), shard(MemShard::new(3))], time(20)),
            ],
        )]);

        let sources = mapping.group_sources();
        assert_eq!(sources.len(), 2);
        assert_matches!(&sources[0], GroupSource::Single(s) if Arc::ptr_eq(s, &single));
        assert_matches!(&sources[1], GroupSource::FanIn(f) => {
            assert_eq!(ids(f.shards()), vec![2, 3]);
        });
    }

    #[test]
    fn test_create_iterator() {
        let s1 = MemShard::new(1)
            .with_points("cpu", &[("host", "b")], "usage", [(1, FieldValue::Float(1.0))])
            .with_points("cpu", &[("host", "a")], "usage", [(3, FieldValue::Float(1.0))]);
        let s2 = MemShard::new(2)
            .with_points("cpu", &[("host", "a")], "usage", [(2, FieldValue::Float(1.0))]);
        let s3 = MemShard::new(3)
            .with_points("cpu", &[("host", "a")], "usage", [(100, FieldValue::Float(1.0))]);

        let mapping = ShardGroupMapping::new([(
            "autogen",
            vec![
                ShardGroup::new([shard(s1), shard(s2)], time(0)),
                ShardGroup::new([], time(50)),
                ShardGroup::new([shard(s3)], time(100)),
            ],
        )]);

        let opt = IteratorOptions {
            sources: Sources::new([Measurement::new("cpu")]),
            dimensions: vec!["host".to_string()],
            ..Default::default()
        };
        let mut itr = mapping.create_iterator(opt).unwrap();
        let mut got = vec![];
        while let Some(p) = itr.next_point().unwrap() {
            got.push((p.tags["host"].clone(), p.time));
        }
        assert_eq!(
            got,
            vec![
                ("a".to_string(), 2),
                ("a".to_string(), 3),
                ("b".to_string(), 1),
                ("a".to_string(), 100),
            ]
        );
    }

    #[test]
    fn test_fan_in_create_error() {
        let fan_in = ShardFanIn::new([
            shard(MemShard::new(1)),
            shard(MemShard::new(2).fail_create_iterator()),
        ]);
        assert_matches!(
            fan_in.create_iterator(&IteratorOptions::default()),
            Err(IteratorError::Create(_))
        );
    }
}
