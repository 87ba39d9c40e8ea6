//! Per-day and lifetime running totals, updated once per event.
//!
//! The accumulator is the single writer of the event log: each event is
//! committed together with the summaries it changes, so a failed write never
//! leaves an event counted in one place and missing from the other.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use log::info;
use tokio::sync::Mutex;

use crate::achievements::LifetimeTotals;
use crate::activity::Category;
use crate::aggregate::{empty_category_totals, platform_key};
use crate::models::EventRecord;
use crate::store::{self, RecordStore};

const TOLERANCE: f64 = 1e-6;

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Local calendar day an epoch-millisecond timestamp falls on.
pub fn local_date_of(timestamp_ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|instant| instant.with_timezone(&Local).date_naive())
}

/// Epoch milliseconds of local midnight starting `date`.
pub fn local_midnight_ms(date: NaiveDate) -> i64 {
    let Some(naive) = date.and_hms_opt(0, 0, 0) else {
        return 0;
    };
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.timestamp_millis(),
        // Midnight skipped by a DST jump; fall back to the UTC reading.
        None => Utc.from_utc_datetime(&naive).timestamp_millis(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: String,
    pub total_carbon: f64,
    pub by_category: BTreeMap<Category, f64>,
    pub by_platform: BTreeMap<String, f64>,
    #[serde(default)]
    pub event_count: u64,
}

impl DailySummary {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            total_carbon: 0.0,
            by_category: empty_category_totals(),
            by_platform: BTreeMap::new(),
            event_count: 0,
        }
    }

    /// `total_carbon` reconciles with both breakdowns.
    pub fn is_consistent(&self) -> bool {
        let by_category: f64 = self.by_category.values().sum();
        let by_platform: f64 = self.by_platform.values().sum();
        (self.total_carbon - by_category).abs() < TOLERANCE
            && (self.total_carbon - by_platform).abs() < TOLERANCE
    }
}

/// Adds one event to the summary. Replaying an event counts it twice.
pub fn apply_event(mut summary: DailySummary, event: &EventRecord) -> DailySummary {
    let grams = if event.carbon_grams.is_finite() && event.carbon_grams > 0.0 {
        event.carbon_grams
    } else {
        0.0
    };

    summary.total_carbon += grams;
    *summary.by_category.entry(event.category).or_insert(0.0) += grams;
    *summary
        .by_platform
        .entry(platform_key(&event.platform))
        .or_insert(0.0) += grams;
    summary.event_count += 1;
    summary
}

/// Summaries after an event was committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub summary: DailySummary,
    pub lifetime: LifetimeTotals,
}

/// Owns the `daily:<date>` and lifetime read-modify-write cycle. The lock
/// serializes concurrent `record` calls so no update is lost.
#[derive(Clone)]
pub struct DailySummaryAccumulator {
    store: Arc<dyn RecordStore>,
    write_lock: Arc<Mutex<()>>,
}

impl DailySummaryAccumulator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends `event` to the log and folds it into its day and the lifetime
    /// totals in one store commit.
    pub async fn record(&self, event: &EventRecord) -> Result<Recorded> {
        let date = local_date_of(event.timestamp)
            .with_context(|| format!("event {} has an invalid timestamp", event.id))?;
        let key = store::daily_key(&date_key(date));

        let _guard = self.write_lock.lock().await;
        let current = store::load::<DailySummary>(self.store.as_ref(), &key).await?;
        let first_of_day = current.as_ref().map_or(true, |day| day.event_count == 0);
        let summary = apply_event(
            current.unwrap_or_else(|| DailySummary::empty(date_key(date))),
            event,
        );
        let lifetime = self.lifetime().await?.apply(event, first_of_day);

        let records = vec![
            (key, encode(&summary)?),
            (store::LIFETIME_KEY.to_string(), encode(&lifetime)?),
        ];
        self.store
            .commit_event(event, records)
            .await
            .with_context(|| format!("failed to commit event {} for {}", event.id, summary.date))?;

        Ok(Recorded { summary, lifetime })
    }

    /// Stored lifetime totals, rebuilt from the log when none are stored yet.
    pub async fn lifetime(&self) -> Result<LifetimeTotals> {
        match store::load::<LifetimeTotals>(self.store.as_ref(), store::LIFETIME_KEY).await? {
            Some(totals) => Ok(totals),
            None => self.scan_lifetime().await,
        }
    }

    /// Rebuilds the lifetime totals from the whole event log and stores them.
    pub async fn recompute_lifetime(&self) -> Result<LifetimeTotals> {
        let _guard = self.write_lock.lock().await;
        let totals = self.scan_lifetime().await?;
        store::save(self.store.as_ref(), store::LIFETIME_KEY, &totals).await?;
        info!(
            "Recomputed lifetime totals: {} events over {} days",
            totals.event_count, totals.days_tracked
        );
        Ok(totals)
    }

    async fn scan_lifetime(&self) -> Result<LifetimeTotals> {
        let events = self.store.events_between(i64::MIN, i64::MAX).await?;
        Ok(LifetimeTotals::from_events(&events))
    }

    pub async fn for_date(&self, date: NaiveDate) -> Result<DailySummary> {
        let key = store::daily_key(&date_key(date));
        Ok(store::load::<DailySummary>(self.store.as_ref(), &key)
            .await?
            .unwrap_or_else(|| DailySummary::empty(date_key(date))))
    }

    pub async fn today(&self) -> Result<DailySummary> {
        self.for_date(Local::now().date_naive()).await
    }

    /// Summaries for `days` consecutive dates starting at `start`; missing days are empty.
    pub async fn range(&self, start: NaiveDate, days: u32) -> Result<Vec<DailySummary>> {
        let mut summaries = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = start + chrono::Duration::days(i64::from(offset));
            summaries.push(self.for_date(date).await?);
        }
        Ok(summaries)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to encode summary")
}
