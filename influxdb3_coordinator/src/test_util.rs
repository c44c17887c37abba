//! An in-memory [`Shard`] for tests and embedding.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use influxdb3_influxql::{
    DataType, DynError, Expr, FieldValue, IteratorOptions, MeasurementName, Point,
    SendablePointIterator, Sources, TagSet, Tags, VecIterator,
};
use parking_lot::Mutex;

use crate::{
    MeasurementRef, Shard, ShardId,
    schema::{Dimensions, FieldDimensions, FieldTypes},
};

#[derive(Debug, Default, Clone)]
struct MemSeries {
    tags: Tags,
    /// Points ordered by time.
    points: Vec<(i64, FieldValue)>,
}

#[derive(Debug, Default, Clone)]
struct MemMeasurement {
    fields: FieldTypes,
    /// Series keyed by series key.
    series: BTreeMap<String, MemSeries>,
}

#[derive(Debug, Default, Clone)]
struct Failures {
    field_dimensions: bool,
    expand_sources: bool,
    create_iterator: bool,
    tag_sets: BTreeSet<String>,
}

/// A [`Shard`] holding its series in memory, with injectable failures.
///
/// Clones share the record of [`tag_sets`](Shard::tag_sets) calls.
#[derive(Debug, Clone)]
pub struct MemShard {
    id: ShardId,
    measurements: BTreeMap<String, MemMeasurement>,
    failures: Failures,
    tag_set_calls: Arc<Mutex<Vec<String>>>,
}

impl MemShard {
    pub fn new(id: u64) -> Self {
        Self {
            id: ShardId::new(id),
            measurements: Default::default(),
            failures: Default::default(),
            tag_set_calls: Default::default(),
        }
    }

    /// Declare `field` of `measurement` without writing any points.
    pub fn with_field(mut self, measurement: &str, field: &str, data_type: DataType) -> Self {
        self.measurements
            .entry(measurement.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), data_type);
        self
    }

    /// Add a series with no points.
    pub fn with_series(self, measurement: &str, tags: &[(&str, &str)]) -> Self {
        self.with_points(measurement, tags, "", [])
    }

    /// Add `points` for `field` to the series identified by `tags`.
    ///
    /// The field's type is taken from the first point.
    pub fn with_points(
        mut self,
        measurement: &str,
        tags: &[(&str, &str)],
        field: &str,
        points: impl IntoIterator<Item = (i64, FieldValue)>,
    ) -> Self {
        let tags: Tags = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let key = series_key(measurement, &tags);

        let m = self.measurements.entry(measurement.to_string()).or_default();
        let series = m.series.entry(key).or_insert_with(|| MemSeries {
            tags,
            points: vec![],
        });
        series.points.extend(points);
        series.points.sort_by_key(|(time, _)| *time);

        if let Some((_, value)) = series.points.first() {
            m.fields
                .entry(field.to_string())
                .or_insert_with(|| value.data_type());
        }
        self
    }

    pub fn fail_field_dimensions(mut self) -> Self {
        self.failures.field_dimensions = true;
        self
    }

    pub fn fail_expand_sources(mut self) -> Self {
        self.failures.expand_sources = true;
        self
    }

    pub fn fail_create_iterator(mut self) -> Self {
        self.failures.create_iterator = true;
        self
    }

    /// Fail tag set resolution for `measurement`.
    pub fn fail_tag_sets(mut self, measurement: &str) -> Self {
        self.failures.tag_sets.insert(measurement.to_string());
        self
    }

    /// Measurements passed to [`Shard::tag_sets`], in call order.
    pub fn tag_set_calls(&self) -> Vec<String> {
        self.tag_set_calls.lock().clone()
    }

    fn tag_set_points(
        &self,
        measurement: &str,
        tag_set: &TagSet,
        opt: &IteratorOptions,
    ) -> Vec<Point> {
        let Some(m) = self.measurements.get(measurement) else {
            return vec![];
        };

        let mut points: Vec<_> = tag_set
            .series_keys
            .iter()
            .filter_map(|key| m.series.get(key))
            .flat_map(|series| series.points.iter())
            .filter(|(time, _)| opt.contains_time(*time))
            .map(|(time, value)| {
                Point::new(measurement, tag_set.tags.clone(), *time, value.clone())
            })
            .collect();
        points.sort_by_key(|p| p.time);
        if !opt.ascending {
            points.reverse();
        }
        points
    }
}

fn series_key(measurement: &str, tags: &Tags) -> String {
    let mut key = measurement.to_string();
    for (k, v) in tags {
        key.push(',');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

impl Shard for MemShard {
    fn id(&self) -> ShardId {
        self.id
    }

    fn field_dimensions(&self, measurements: &[String]) -> Result<(FieldTypes, Dimensions), DynError> {
        if self.failures.field_dimensions {
            return Err(format!("field dimensions unavailable in shard {}", self.id).into());
        }

        let mut merged = FieldDimensions::default();
        for m in measurements.iter().filter_map(|name| self.measurements.get(name)) {
            let dimensions = m
                .series
                .values()
                .flat_map(|s| s.tags.keys().cloned())
                .collect();
            merged.merge(m.fields.clone(), dimensions);
        }
        Ok(merged.into_parts())
    }

    fn measurement(&self, name: &str) -> Option<MeasurementRef> {
        self.measurements
            .contains_key(name)
            .then(|| MeasurementRef::new(name))
    }

    fn tag_sets(
        &self,
        measurement: &MeasurementRef,
        dimensions: &[String],
        condition: Option<&Expr>,
    ) -> Result<Vec<TagSet>, DynError> {
        self.tag_set_calls
            .lock()
            .push(measurement.name().to_string());

        if self.failures.tag_sets.contains(measurement.name()) {
            return Err(format!(
                "tag set resolution failed for {} in shard {}",
                measurement.name(),
                self.id
            )
            .into());
        }

        let Some(m) = self.measurements.get(measurement.name()) else {
            return Ok(vec![]);
        };

        let mut tag_sets: BTreeMap<Vec<u8>, TagSet> = BTreeMap::new();
        for (key, series) in &m.series {
            if condition.is_some_and(|c| !c.eval(&series.tags)) {
                continue;
            }
            let group: Tags = dimensions
                .iter()
                .map(|d| (d.clone(), series.tags.get(d).cloned().unwrap_or_default()))
                .collect();
            let tag_set = TagSet::new(group);
            tag_sets
                .entry(tag_set.key.clone())
                .or_insert_with(|| tag_set.with_filter(condition.cloned()))
                .add_series(key.as_str());
        }
        Ok(tag_sets.into_values().collect())
    }

    fn create_series_iterator(
        &self,
        measurement: &MeasurementRef,
        tag_set: &TagSet,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, DynError> {
        if self.failures.create_iterator {
            return Err(format!("shard {} is closed", self.id).into());
        }
        let points = self.tag_set_points(measurement.name(), tag_set, opt);
        Ok(Box::new(VecIterator::new(points)))
    }

    fn create_iterator(&self, opt: &IteratorOptions) -> Result<SendablePointIterator, DynError> {
        if self.failures.create_iterator {
            return Err(format!("shard {} is closed", self.id).into());
        }

        let mut points = vec![];
        for name in opt.sources.names() {
            let Some(measurement) = self.measurement(&name) else {
                continue;
            };
            for tag_set in self.tag_sets(&measurement, &opt.dimensions, opt.condition.as_ref())? {
                points.extend(self.tag_set_points(&name, &tag_set, opt));
            }
        }

        points.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.tags.cmp(&b.tags))
                .then_with(|| a.time.cmp(&b.time))
        });
        if !opt.ascending {
            points.reverse();
        }
        Ok(Box::new(VecIterator::new(points)))
    }

    fn expand_sources(&self, sources: &Sources) -> Result<Sources, DynError> {
        if self.failures.expand_sources {
            return Err(format!("cannot expand sources in shard {}", self.id).into());
        }

        let mut expanded = BTreeMap::new();
        for source in sources {
            match &source.name {
                MeasurementName::Regex(re) => {
                    for name in self.measurements.keys().filter(|name| re.is_match(name)) {
                        let m = source.with_name(name.as_str());
                        expanded.insert(m.to_string(), m);
                    }
                }
                MeasurementName::Name(_) => {
                    expanded.insert(source.to_string(), source.clone());
                }
            }
        }
        Ok(expanded.into_values().collect())
    }
}
