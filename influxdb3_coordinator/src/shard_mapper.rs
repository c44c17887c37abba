//! Parallel series discovery across a flat list of shards.

use std::{fmt::Display, num::NonZeroUsize, sync::Arc};

use chrono::{DateTime, Utc};
use influxdb3_clap_blocks::coordinator::CoordinatorConfig;
use influxdb3_influxql::{
    DynError, IteratorComposer, IteratorCreator, IteratorError, IteratorOptions, LazyComposer,
    SendablePointIterator, TagSet,
};
use parking_lot::Mutex;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    Error, MeasurementRef, Result, Shard, ShardId,
    schema::{Dimensions, FieldDimensions, FieldTypes},
    tag_sets::create_tag_sets,
};

/// A shard annotated for one query.
#[derive(Debug, Clone)]
pub struct ShardInfo {
    pub shard: Arc<dyn Shard>,
    /// Measurements of the query that this shard may hold, in the order they
    /// are resolved.
    pub measurements: Vec<String>,
    /// Logical start time of the shard's time range.
    pub start_time: DateTime<Utc>,
}

impl ShardInfo {
    pub fn new(
        shard: Arc<dyn Shard>,
        measurements: impl IntoIterator<Item = impl Into<String>>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            shard,
            measurements: measurements.into_iter().map(Into::into).collect(),
            start_time,
        }
    }
}

/// Where a series was found, used to order series that share a tag set key
/// and start time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesPosition {
    shard: usize,
    measurement: usize,
    tag_set: usize,
}

/// One tag set of one measurement in one shard.
///
/// Opening an iterator on a [`SeriesInfo`] opens the shard's iterator for its
/// tag set.
#[derive(Debug, Clone)]
pub struct SeriesInfo {
    shard: Arc<dyn Shard>,
    measurement: MeasurementRef,
    tag_set: TagSet,
    start_time: DateTime<Utc>,
    position: SeriesPosition,
}

impl SeriesInfo {
    pub(crate) fn new(
        info: &ShardInfo,
        measurement: MeasurementRef,
        tag_set: TagSet,
        tag_set_position: usize,
    ) -> Self {
        Self {
            shard: Arc::clone(&info.shard),
            measurement,
            tag_set,
            start_time: info.start_time,
            position: SeriesPosition {
                tag_set: tag_set_position,
                ..Default::default()
            },
        }
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard.id()
    }

    pub fn measurement(&self) -> &MeasurementRef {
        &self.measurement
    }

    pub fn tag_set(&self) -> &TagSet {
        &self.tag_set
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Order by tag set key, then start time. Series equal on both keep the
    /// order of their shard, measurement and tag set in the mapper's input.
    fn sort_order(&self, other: &Self) -> std::cmp::Ordering {
        self.tag_set
            .key
            .cmp(&other.tag_set.key)
            .then_with(|| self.start_time.cmp(&other.start_time))
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl IteratorCreator for SeriesInfo {
    fn create_iterator(
        &self,
        opt: &IteratorOptions,
    ) -> Result<SendablePointIterator, IteratorError> {
        self.shard
            .create_series_iterator(&self.measurement, &self.tag_set, opt)
            .map_err(IteratorError::Create)
    }
}

/// Why a shard worker stopped before resolving all of its measurements.
#[derive(Debug)]
pub enum SkipReason {
    /// The measurement has no matching series in the shard.
    NoSeries,
    /// Tag set resolution failed.
    Error(DynError),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSeries => f.write_str("no matching series"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

/// A shard whose series discovery stopped at `measurement`, leaving the
/// `abandoned` measurements unresolved.
#[derive(Debug)]
pub struct SkippedMeasurement {
    pub shard_id: ShardId,
    pub measurement: String,
    pub abandoned: Vec<String>,
    pub reason: SkipReason,
}

/// Output of [`ShardMapper::discover_series`].
#[derive(Debug, Default)]
pub struct SeriesDiscovery {
    /// Matching series, ordered by tag set key then start time.
    pub series: Vec<SeriesInfo>,
    /// Shards that stopped early, in shard order.
    pub skipped: Vec<SkippedMeasurement>,
}

/// Maps a query onto a flat list of shards.
///
/// Constructed per query by the planner and dropped once the iterator has
/// been built.
#[derive(Debug)]
pub struct ShardMapper {
    shards: Vec<ShardInfo>,
    concurrency: NonZeroUsize,
    composer: Arc<dyn IteratorComposer>,
}

impl ShardMapper {
    /// Map onto `shards`, discovering series on up to one shard per logical
    /// core at a time.
    pub fn new(shards: impl IntoIterator<Item = ShardInfo>) -> Self {
        Self {
            shards: shards.into_iter().collect(),
            concurrency: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            composer: Arc::new(LazyComposer),
        }
    }

    /// Apply the coordinator's CLI configuration.
    pub fn with_config(self, config: &CoordinatorConfig) -> Self {
        self.with_concurrency(config.shard_concurrency())
    }

    /// Bound the number of shards whose series are discovered concurrently.
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Replace the [`LazyComposer`] used to combine series iterators.
    pub fn with_composer(mut self, composer: Arc<dyn IteratorComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn shards(&self) -> &[ShardInfo] {
        &self.shards
    }

    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    /// Merge the field types and dimensions of every shard's measurements.
    ///
    /// Shards are visited in order; the first failure is returned and nothing
    /// merged so far is kept.
    pub fn field_dimensions(&self) -> Result<(FieldTypes, Dimensions)> {
        let mut merged = FieldDimensions::default();
        for info in &self.shards {
            let (fields, dimensions) = info
                .shard
                .field_dimensions(&info.measurements)
                .map_err(|source| Error::FieldDimensions {
                    shard_id: info.shard.id(),
                    source,
                })?;
            merged.merge(fields, dimensions);
        }
        Ok(merged.into_parts())
    }

    /// Find the series matching `opt` in every shard.
    ///
    /// One blocking task runs per shard with at most
    /// [`concurrency`](Self::concurrency) running at once. A task resolves
    /// its shard's measurements in order and gives up on the shard at the
    /// first measurement that fails or has no series; those shards are
    /// reported in [`SeriesDiscovery::skipped`] instead of failing the call.
    pub async fn discover_series(&self, opt: &IteratorOptions) -> SeriesDiscovery {
        let permits = Arc::new(Semaphore::new(self.concurrency.get()));
        let series = Arc::new(Mutex::new(Vec::new()));
        let skipped = Arc::new(Mutex::new(Vec::new()));
        let opt = Arc::new(opt.clone());
        debug!(
            n_shards = self.shards.len(),
            concurrency = self.concurrency.get(),
            "discovering series"
        );

        let mut workers = JoinSet::new();
        for (shard_position, info) in self.shards.iter().enumerate() {
            // Wait for a free slot before spawning so that no more than
            // `concurrency` tasks exist at once.
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .expect("shard worker semaphore is never closed");

            let info = info.clone();
            let opt = Arc::clone(&opt);
            let series = Arc::clone(&series);
            let skipped = Arc::clone(&skipped);
            workers.spawn_blocking(move || {
                let _permit = permit;
                discover_shard_series(&info, shard_position, &opt, &series, &skipped);
            });
        }

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        let mut series = std::mem::take(&mut *series.lock());
        series.sort_by(SeriesInfo::sort_order);

        let mut skipped = std::mem::take(&mut *skipped.lock());
        skipped.sort_by_key(|(shard_position, _)| *shard_position);
        let skipped = skipped.into_iter().map(|(_, s)| s).collect();

        SeriesDiscovery { series, skipped }
    }

    /// Build the iterator for `opt` over every matching series.
    ///
    /// Shards that fail during series discovery are logged and left out; the
    /// only error returned is one raised by the composer.
    pub async fn create_iterator(&self, opt: IteratorOptions) -> Result<SendablePointIterator> {
        let SeriesDiscovery { series, skipped } = self.discover_series(&opt).await;

        for s in &skipped {
            match &s.reason {
                SkipReason::Error(e) => warn!(
                    shard_id = %s.shard_id,
                    measurement = %s.measurement,
                    abandoned = ?s.abandoned,
                    error = %e,
                    "series discovery failed, skipping remaining measurements of shard"
                ),
                SkipReason::NoSeries if !s.abandoned.is_empty() => debug!(
                    shard_id = %s.shard_id,
                    measurement = %s.measurement,
                    abandoned = ?s.abandoned,
                    "no series for measurement, skipping remaining measurements of shard"
                ),
                SkipReason::NoSeries => {}
            }
        }

        info!(
            n_shards = self.shards.len(),
            n_series = series.len(),
            n_skipped = skipped.len(),
            concurrency = self.concurrency.get(),
            "series discovery complete"
        );

        let creators = series
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn IteratorCreator>)
            .collect();
        Ok(self.composer.compose(creators, opt)?)
    }
}

/// Resolve the series of one shard's measurements, in order, appending them
/// to `series`.
fn discover_shard_series(
    info: &ShardInfo,
    shard_position: usize,
    opt: &IteratorOptions,
    series: &Mutex<Vec<SeriesInfo>>,
    skipped: &Mutex<Vec<(usize, SkippedMeasurement)>>,
) {
    for (measurement_position, name) in info.measurements.iter().enumerate() {
        let reason = match create_tag_sets(info, name, opt) {
            Ok(found) if !found.is_empty() => {
                let found: Vec<_> = found
                    .into_iter()
                    .map(|mut s| {
                        s.position.shard = shard_position;
                        s.position.measurement = measurement_position;
                        s
                    })
                    .collect();
                series.lock().extend(found);
                continue;
            }
            Ok(_) => SkipReason::NoSeries,
            Err(e) => SkipReason::Error(e),
        };

        // The first empty or failed measurement ends the shard's discovery.
        let skip = SkippedMeasurement {
            shard_id: info.shard.id(),
            measurement: name.clone(),
            abandoned: info.measurements[measurement_position + 1..].to_vec(),
            reason,
        };
        skipped.lock().push((shard_position, skip));
        return;
    }
}
