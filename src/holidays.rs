//! Holiday lookup cache
//!
//! Answers "is calendar date D a holiday?" from a periodically refreshed
//! snapshot of the remote holiday feed. Refreshes are single-flight and
//! timeout-bounded; any retrieval failure publishes an embedded fallback
//! dataset instead, so a lookup can never fail outward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Snapshot age beyond which a lookup refreshes first.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Bound on a single feed retrieval.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One holiday: a civil calendar date plus its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayRecord {
    pub date: NaiveDate,
    pub name: String,
}

/// Wire format of the feed: a JSON array of entries whose `date` is an
/// ISO timestamp. Only the date part is significant.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    date: String,
    name: String,
}

/// Where the active snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// No refresh has completed yet
    Empty,
    /// Built from a successful feed retrieval
    Remote,
    /// Built from the embedded dataset after a retrieval failure
    Fallback,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Empty => "empty",
            SnapshotSource::Remote => "remote",
            SnapshotSource::Fallback => "fallback",
        }
    }
}

/// Immutable view of the holiday set. Replaced wholesale on refresh and
/// never mutated, so a reader always observes a complete dataset.
#[derive(Debug)]
pub struct HolidaySnapshot {
    holidays: HashMap<NaiveDate, HolidayRecord>,
    fetched_at: Option<DateTime<Utc>>,
    source: SnapshotSource,
}

impl HolidaySnapshot {
    fn empty() -> Self {
        Self {
            holidays: HashMap::new(),
            fetched_at: None,
            source: SnapshotSource::Empty,
        }
    }

    fn from_records(records: Vec<HolidayRecord>, source: SnapshotSource) -> Self {
        let mut holidays = HashMap::with_capacity(records.len());
        for record in records {
            holidays.insert(record.date, record);
        }
        Self {
            holidays,
            fetched_at: Some(Utc::now()),
            source,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&HolidayRecord> {
        self.holidays.get(&date)
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn source(&self) -> SnapshotSource {
        self.source
    }
}

/// Cache observability summary, consumed by the status endpoint.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub source: SnapshotSource,
}

/// Capability contract for holiday retrieval. Implementations report
/// failures; the cache decides how to degrade.
#[async_trait]
pub trait HolidaySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<HolidayRecord>>;
}

/// Production source: the holiday feed over HTTPS.
pub struct RemoteHolidaySource {
    client: reqwest::Client,
    url: String,
}

impl RemoteHolidaySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl HolidaySource for RemoteHolidaySource {
    async fn fetch(&self) -> Result<Vec<HolidayRecord>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("holiday feed request failed")?
            .error_for_status()
            .context("holiday feed returned an error status")?;

        let entries: Vec<FeedEntry> = response
            .json()
            .await
            .context("holiday feed payload is not a JSON holiday array")?;

        parse_feed(entries)
    }
}

/// Reduce feed entries to dated records. Any unparseable entry fails the
/// whole payload; the caller degrades to the fallback dataset.
fn parse_feed(entries: Vec<FeedEntry>) -> Result<Vec<HolidayRecord>> {
    entries
        .into_iter()
        .map(|entry| {
            let date_part = entry.date.split('T').next().unwrap_or(entry.date.as_str());
            let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .with_context(|| format!("unparseable holiday date {:?}", entry.date))?;
            Ok(HolidayRecord {
                date,
                name: entry.name,
            })
        })
        .collect()
}

/// Colombian holidays for 2025-2026, used verbatim whenever the feed is
/// unavailable. Revise alongside calendar-year updates.
const FALLBACK_HOLIDAYS: &[(&str, &str)] = &[
    // 2025
    ("2025-01-01", "Año Nuevo"),
    ("2025-01-06", "Día de los Reyes Magos"),
    ("2025-03-24", "Día de San José"),
    ("2025-04-17", "Jueves Santo"),
    ("2025-04-18", "Viernes Santo"),
    ("2025-05-01", "Día del Trabajo"),
    ("2025-06-02", "Día de la Ascensión"),
    ("2025-06-23", "Corpus Christi"),
    ("2025-06-30", "San Pedro y San Pablo"),
    ("2025-07-20", "Día de la Independencia"),
    ("2025-08-07", "Batalla de Boyacá"),
    ("2025-08-18", "La Asunción"),
    ("2025-10-13", "Día de la Raza"),
    ("2025-11-03", "Todos los Santos"),
    ("2025-11-17", "Independencia de Cartagena"),
    ("2025-12-08", "Día de la Inmaculada Concepción"),
    ("2025-12-25", "Navidad"),
    // 2026
    ("2026-01-01", "Año Nuevo"),
    ("2026-01-12", "Día de los Reyes Magos"),
    ("2026-03-23", "Día de San José"),
    ("2026-04-02", "Jueves Santo"),
    ("2026-04-03", "Viernes Santo"),
    ("2026-05-01", "Día del Trabajo"),
    ("2026-05-18", "Día de la Ascensión"),
    ("2026-06-08", "Corpus Christi"),
    ("2026-06-15", "Sagrado Corazón"),
    ("2026-06-29", "San Pedro y San Pablo"),
    ("2026-07-20", "Día de la Independencia"),
    ("2026-08-07", "Batalla de Boyacá"),
    ("2026-08-17", "La Asunción"),
    ("2026-10-12", "Día de la Raza"),
    ("2026-11-02", "Todos los Santos"),
    ("2026-11-16", "Independencia de Cartagena"),
    ("2026-12-08", "Día de la Inmaculada Concepción"),
    ("2026-12-25", "Navidad"),
];

fn fallback_records() -> Vec<HolidayRecord> {
    FALLBACK_HOLIDAYS
        .iter()
        .map(|(date, name)| HolidayRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .expect("fallback dataset holds literal ISO dates"),
            name: (*name).to_string(),
        })
        .collect()
}

/// The holiday cache. Lookups read the current snapshot; refreshes build
/// a replacement snapshot and publish it with one atomic swap.
pub struct HolidayCache {
    source: Box<dyn HolidaySource>,
    fetch_timeout: Duration,
    max_age: chrono::Duration,
    snapshot: RwLock<Arc<HolidaySnapshot>>,
    refresh_gate: tokio::sync::Mutex<()>,
    publishes: AtomicU64,
}

impl HolidayCache {
    pub fn new(source: Box<dyn HolidaySource>) -> Self {
        Self::with_limits(source, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_AGE)
    }

    pub fn with_limits(
        source: Box<dyn HolidaySource>,
        fetch_timeout: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            source,
            fetch_timeout,
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX),
            snapshot: RwLock::new(Arc::new(HolidaySnapshot::empty())),
            refresh_gate: tokio::sync::Mutex::new(()),
            publishes: AtomicU64::new(0),
        }
    }

    /// Answer "is this civil date a holiday", refreshing first when the
    /// snapshot has never loaded or has exceeded its max age. Never fails
    /// outward; the worst case is a fallback-sourced answer.
    pub async fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.needs_refresh() {
            self.refresh().await;
        }
        self.current().contains(date)
    }

    /// The active snapshot. The returned view stays consistent regardless
    /// of concurrent refreshes.
    pub fn current(&self) -> Arc<HolidaySnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn status(&self) -> CacheStatus {
        let snapshot = self.current();
        CacheStatus {
            count: snapshot.len(),
            last_refresh: snapshot.fetched_at(),
            source: snapshot.source(),
        }
    }

    fn needs_refresh(&self) -> bool {
        match self.current().fetched_at() {
            None => true,
            Some(at) => Utc::now().signed_duration_since(at) > self.max_age,
        }
    }

    /// Warm the cache once at startup. Retrieval failure is absorbed by
    /// `refresh`, so this cannot fail; it exists so startup can await the
    /// first load instead of racing the first request.
    pub async fn preload(&self) {
        info!("Preloading holiday cache...");
        self.refresh().await;
        let status = self.status();
        info!(
            "Holiday cache ready: {} holidays (source: {})",
            status.count,
            status.source.as_str()
        );
    }

    /// Refresh the snapshot, sharing one underlying retrieval among
    /// concurrent callers. Always leaves a complete snapshot published.
    pub async fn refresh(&self) {
        let entered = self.publishes.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.publishes.load(Ordering::Acquire) != entered {
            // A refresh completed while we waited on the gate; its
            // snapshot is the outcome we were waiting for.
            debug!("Refresh satisfied by a concurrent caller");
            return;
        }

        let snapshot = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(Ok(records)) => {
                info!("Holiday feed refreshed: {} holidays", records.len());
                HolidaySnapshot::from_records(records, SnapshotSource::Remote)
            }
            Ok(Err(e)) => {
                warn!("Holiday feed unavailable, using fallback dataset: {:#}", e);
                HolidaySnapshot::from_records(fallback_records(), SnapshotSource::Fallback)
            }
            Err(_) => {
                warn!(
                    "Holiday feed timed out after {:?}, using fallback dataset",
                    self.fetch_timeout
                );
                HolidaySnapshot::from_records(fallback_records(), SnapshotSource::Fallback)
            }
        };

        *self.snapshot.write().unwrap() = Arc::new(snapshot);
        self.publishes.fetch_add(1, Ordering::Release);
    }
}
