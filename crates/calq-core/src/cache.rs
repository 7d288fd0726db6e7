//! Range-keyed cache of aggregated calendar items.
//!
//! Entries are kept ordered, non-overlapping and non-adjacent: a load that
//! touches existing entries is merged into them, newest items winning per
//! day. Concurrent requests for overlapping spans share one in-flight load
//! per sub-range, and a range is only visible once its whole load has
//! landed.

use crate::config::CacheConfig;
use crate::date::{CalendarDate, DateRange};
use crate::error::QueryError;
use crate::interval::{
    chunk_range, clip_range, compute_uncovered_ranges, is_fully_covered, split_range_by_invalidation,
};
use crate::pipeline::{ItemsByDate, QueryOrchestrator};
use crate::recurrence::MAX_EXPANSION_DAYS;
use crate::repository::CandidateStore;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Load attempts before an unassemblable range is reported as an error.
const MAX_LOAD_ROUNDS: usize = 3;

type LoadFuture = Shared<BoxFuture<'static, Result<(), QueryError>>>;

/// One contiguous cached span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub range: DateRange,
    pub items_by_date: ItemsByDate,
    pub source_tag: String,
    pub last_loaded_at: DateTime<Utc>,
}

impl CacheEntry {
    fn slice(&self, piece: DateRange) -> CacheEntry {
        CacheEntry {
            range: piece,
            items_by_date: self
                .items_by_date
                .range(piece.start()..=piece.end())
                .map(|(date, items)| (*date, items.clone()))
                .collect(),
            source_tag: self.source_tag.clone(),
            last_loaded_at: self.last_loaded_at,
        }
    }
}

/// How many whole months around an anchor survive pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub months: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { months: 3 }
    }
}

impl RetentionPolicy {
    /// From the first day `months` months before the anchor's month to the
    /// last day `months` months after it.
    pub fn window(&self, anchor: CalendarDate) -> DateRange {
        let months = i32::try_from(self.months).unwrap_or(i32::MAX);
        let first = anchor.first_of_month();
        let start = first.add_months(-months).unwrap_or(first);
        let end = first
            .add_months(months)
            .map(|d| d.last_of_month())
            .unwrap_or_else(|| anchor.last_of_month());
        DateRange::new(start, end).unwrap_or_else(|| DateRange::single(anchor))
    }
}

/// Items for a requested range, sliced out of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeView {
    pub range: DateRange,
    pub items_by_date: ItemsByDate,
    pub cache_hit: bool,
    pub elapsed: Duration,
}

/// Result of [`RangeCache::ensure_range_loaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
    pub cache_hit: bool,
    pub elapsed: Duration,
}

impl EnsureOutcome {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

struct InFlight {
    id: u64,
    load: LoadFuture,
}

#[derive(Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    in_flight: HashMap<DateRange, InFlight>,
    /// Loads whose result must not be installed because their span was
    /// invalidated while they ran.
    superseded: HashSet<u64>,
    next_load_id: u64,
    pruned_for_month: Option<(i32, u32)>,
}

impl CacheState {
    fn spans(&self) -> Vec<DateRange> {
        self.entries.iter().map(|e| e.range).collect()
    }

    fn covers(&self, range: &DateRange) -> bool {
        self.entries.iter().any(|e| e.range.contains(range))
    }

    /// Stitches the requested days together, or `None` if any day is missing.
    fn assemble(&self, range: DateRange) -> Option<ItemsByDate> {
        if !is_fully_covered(range, &self.spans()) {
            return None;
        }
        let mut items = ItemsByDate::new();
        for entry in self.entries.iter().filter(|e| e.range.overlaps(&range)) {
            for (date, day) in entry.items_by_date.range(range.start()..=range.end()) {
                items.insert(*date, day.clone());
            }
        }
        Some(items)
    }

    fn covering_load(&self, range: &DateRange) -> Option<LoadFuture> {
        self.in_flight
            .iter()
            .find(|(span, _)| span.contains(range))
            .map(|(_, flight)| flight.load.clone())
    }

    /// Drops the in-flight registration of a finished load. Returns whether
    /// the load was superseded by an invalidation or a forced refresh.
    fn finish_load(&mut self, range: DateRange, id: u64) -> bool {
        if self.in_flight.get(&range).is_some_and(|flight| flight.id == id) {
            self.in_flight.remove(&range);
        }
        self.superseded.remove(&id)
    }

    /// Installs a freshly loaded span, merging it with every entry it
    /// overlaps or borders.
    fn install(&mut self, range: DateRange, loaded: ItemsByDate, source_tag: String, now: DateTime<Utc>) {
        let mut merged_range = range;
        let mut items = ItemsByDate::new();
        let mut kept = Vec::with_capacity(self.entries.len() + 1);

        for entry in self.entries.drain(..) {
            if entry.range.touches(&range) {
                merged_range = merged_range.hull(&entry.range);
                items.extend(
                    entry
                        .items_by_date
                        .into_iter()
                        .filter(|(date, _)| !range.contains_date(*date)),
                );
            } else {
                kept.push(entry);
            }
        }
        items.extend(loaded.into_iter().filter(|(date, _)| range.contains_date(*date)));

        kept.push(CacheEntry {
            range: merged_range,
            items_by_date: items,
            source_tag,
            last_loaded_at: now,
        });
        kept.sort_by_key(|entry| entry.range);
        self.entries = kept;
    }

    fn invalidate(&mut self, range: DateRange) {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            if !entry.range.overlaps(&range) {
                self.entries.push(entry);
                continue;
            }
            for piece in split_range_by_invalidation(entry.range, range) {
                self.entries.push(entry.slice(piece));
            }
        }

        let stale: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(span, _)| span.overlaps(&range))
            .map(|(_, flight)| flight.id)
            .collect();
        self.superseded.extend(stale);
    }

    fn clear(&mut self) {
        self.entries.clear();
        let stale: Vec<u64> = self.in_flight.values().map(|flight| flight.id).collect();
        self.superseded.extend(stale);
    }

    fn prune(&mut self, keep: DateRange) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter_map(|entry| clip_range(entry.range, keep).map(|piece| entry.slice(piece)))
            .collect();
    }
}

/// Range cache in front of a [`QueryOrchestrator`].
///
/// Loads are driven on the current Tokio runtime when there is one, so a
/// load completes and lands even if every caller waiting on it is dropped.
pub struct RangeCache<S: ?Sized> {
    orchestrator: Arc<QueryOrchestrator<S>>,
    state: Arc<Mutex<CacheState>>,
    retention: RetentionPolicy,
    source_tag: String,
}

impl<S: CandidateStore + ?Sized + 'static> RangeCache<S> {
    pub fn new(orchestrator: Arc<QueryOrchestrator<S>>, config: &CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            retention: RetentionPolicy {
                months: config.retention_months,
            },
            source_tag: orchestrator.store().source_tag().to_string(),
            orchestrator,
        }
    }

    pub fn from_store(store: Arc<S>, config: &CacheConfig) -> Self {
        Self::new(Arc::new(QueryOrchestrator::new(store)), config)
    }

    pub fn orchestrator(&self) -> &Arc<QueryOrchestrator<S>> {
        &self.orchestrator
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// True when one cached entry fully contains `range`.
    pub fn covers(&self, range: &DateRange) -> bool {
        self.state.lock().covers(range)
    }

    /// Items for `range`, loading whatever is not cached yet.
    ///
    /// With `force_refresh` the whole range is reloaded and replaces cached
    /// days. The returned view is never partial: either every day of the
    /// range is present or an error comes back.
    pub async fn get_or_load_range(&self, range: DateRange, force_refresh: bool) -> Result<RangeView, QueryError> {
        let started = Instant::now();

        if !force_refresh {
            let cached = self.state.lock().assemble(range);
            if let Some(items_by_date) = cached {
                tracing::debug!(%range, "range cache hit");
                return Ok(view(range, items_by_date, true, started));
            }

            let covering = self.state.lock().covering_load(&range);
            if let Some(load) = covering {
                tracing::debug!(%range, "joining in-flight load");
                load.await?;
                let assembled = self.state.lock().assemble(range);
                if let Some(items_by_date) = assembled {
                    return Ok(view(range, items_by_date, false, started));
                }
            }
        }

        let mut force = force_refresh;
        for round in 1..=MAX_LOAD_ROUNDS {
            let loads = self.schedule_loads(range, force);
            force = false;
            for outcome in join_all(loads).await {
                outcome?;
            }
            let assembled = self.state.lock().assemble(range);
            if let Some(items_by_date) = assembled {
                return Ok(view(range, items_by_date, false, started));
            }
            tracing::debug!(%range, round, "range still incomplete after load");
        }

        Err(QueryError::CacheInconsistency(format!(
            "range {} not assembled after {} load rounds",
            range, MAX_LOAD_ROUNDS
        )))
    }

    /// Makes sure a range is cached without handing items back.
    pub async fn ensure_range_loaded(&self, start: &str, end: &str) -> Result<EnsureOutcome, QueryError> {
        let range = DateRange::parse(start, end)?;
        let view = self.get_or_load_range(range, false).await?;
        Ok(EnsureOutcome {
            cache_hit: view.cache_hit,
            elapsed: view.elapsed,
        })
    }

    /// Drops cached days inside `range`, splitting entries around the hole.
    /// Loads already running over the range will not install their result.
    pub fn invalidate_by_date_range(&self, range: DateRange) {
        self.state.lock().invalidate(range);
        tracing::info!(%range, "invalidated cached range");
    }

    pub fn invalidate_all(&self) {
        self.state.lock().clear();
        tracing::info!("invalidated whole range cache");
    }

    /// Clips every entry to `keep`; entries outside it disappear.
    pub fn prune_outside_date_range(&self, keep: DateRange) {
        self.state.lock().prune(keep);
        tracing::debug!(%keep, "pruned range cache");
    }

    /// Prunes to the retention window around `anchor`, at most once per
    /// anchor month. Returns whether a prune ran.
    pub fn prune_around_anchor(&self, anchor: CalendarDate) -> bool {
        let month = (anchor.year(), anchor.month());
        let mut state = self.state.lock();
        if state.pruned_for_month == Some(month) {
            return false;
        }
        state.pruned_for_month = Some(month);
        let keep = self.retention.window(anchor);
        state.prune(keep);
        tracing::info!(%anchor, %keep, "pruned range cache around anchor");
        true
    }

    /// Spans of the cached entries, ascending.
    pub fn entry_spans(&self) -> Vec<DateRange> {
        self.state.lock().spans()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.state.lock().entries.clone()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Registers loads for every part of `range` that is neither cached nor
    /// already loading, and returns everything the caller has to wait for.
    ///
    /// Each load covers at most [`MAX_EXPANSION_DAYS`] days so recurring
    /// todos are always expanded, never refused.
    fn schedule_loads(&self, range: DateRange, force: bool) -> Vec<LoadFuture> {
        let mut state = self.state.lock();
        let mut waits = Vec::new();

        let targets = if force {
            // Older loads over these days must not land on top of the refresh.
            let stale: Vec<u64> = state
                .in_flight
                .iter()
                .filter(|(span, _)| span.overlaps(&range))
                .map(|(_, flight)| flight.id)
                .collect();
            state.superseded.extend(stale);
            vec![range]
        } else {
            let mut blocked = state.spans();
            for (span, flight) in state.in_flight.iter().filter(|(span, _)| span.overlaps(&range)) {
                blocked.push(*span);
                waits.push(flight.load.clone());
            }
            compute_uncovered_ranges(range, &blocked)
        };

        let pieces = targets
            .into_iter()
            .flat_map(|target| chunk_range(target, MAX_EXPANSION_DAYS));
        for target in pieces {
            state.next_load_id += 1;
            let id = state.next_load_id;
            let load = self.start_load(target, id);
            tracing::debug!(range = %target, id, "starting range load");
            state.in_flight.insert(
                target,
                InFlight {
                    id,
                    load: load.clone(),
                },
            );
            waits.push(load);
        }
        waits
    }

    fn start_load(&self, range: DateRange, id: u64) -> LoadFuture {
        let orchestrator = Arc::clone(&self.orchestrator);
        let state = Arc::clone(&self.state);
        let source_tag = self.source_tag.clone();

        let load: LoadFuture = async move {
            let report = orchestrator.query_range(range).await;
            let mut state = state.lock();
            let superseded = state.finish_load(range, id);
            match report.result {
                Ok(_) if superseded => {
                    tracing::debug!(%range, id, "discarding superseded load");
                    Ok::<(), QueryError>(())
                }
                Ok(output) => {
                    state.install(range, output.items_by_date, source_tag, Utc::now());
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!(%range, id, %err, "range load failed");
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(load.clone());
        }
        load
    }
}

fn view(range: DateRange, items_by_date: ItemsByDate, cache_hit: bool, started: Instant) -> RangeView {
    RangeView {
        range,
        items_by_date,
        cache_hit,
        elapsed: started.elapsed(),
    }
}
