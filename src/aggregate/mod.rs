//! Folding event records into totals over a time window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::activity::{Category, UNKNOWN_PLATFORM};
use crate::models::EventRecord;

/// Every category present, zero when no event carried it.
pub fn empty_category_totals() -> BTreeMap<Category, f64> {
    Category::ALL.iter().map(|category| (*category, 0.0)).collect()
}

fn grams(event: &EventRecord) -> f64 {
    if event.carbon_grams.is_finite() && event.carbon_grams > 0.0 {
        event.carbon_grams
    } else {
        0.0
    }
}

pub fn platform_key(platform: &str) -> String {
    let trimmed = platform.trim();
    if trimmed.is_empty() {
        UNKNOWN_PLATFORM.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn aggregate_by_category<'a, I>(events: I) -> BTreeMap<Category, f64>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut totals = empty_category_totals();
    for event in events {
        *totals.entry(event.category).or_insert(0.0) += grams(event);
    }
    totals
}

pub fn aggregate_by_platform<'a, I>(events: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut totals = BTreeMap::new();
    for event in events {
        *totals.entry(platform_key(&event.platform)).or_insert(0.0) += grams(event);
    }
    totals
}

pub fn total_carbon<'a, I>(events: I) -> f64
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    events.into_iter().map(grams).sum()
}

/// Events whose timestamp falls in `[start_ms, end_ms)`.
pub fn events_in_window(events: &[EventRecord], start_ms: i64, end_ms: i64) -> Vec<&EventRecord> {
    events
        .iter()
        .filter(|event| event.timestamp >= start_ms && event.timestamp < end_ms)
        .collect()
}

/// Window-level figures used by reports and recommendation contexts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTotals {
    pub carbon_grams: f64,
    pub transferred_mb: f64,
    pub video_mb: f64,
    pub active_minutes: f64,
    pub event_count: u64,
}

impl EventTotals {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut totals = Self::default();
        for event in events {
            let telemetry = &event.data.telemetry;
            totals.carbon_grams += grams(event);
            totals.transferred_mb += telemetry.total_mb.max(0.0);
            totals.video_mb += telemetry.video_mb.max(0.0);
            totals.active_minutes += telemetry.time_active.max(0.0);
            totals.event_count += 1;
        }
        totals
    }
}

/// Category, platform and volume totals for one reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowReport {
    pub start_ms: i64,
    pub end_ms: i64,
    pub totals: EventTotals,
    pub by_category: BTreeMap<Category, f64>,
    pub by_platform: BTreeMap<String, f64>,
}

impl WindowReport {
    pub fn build(events: &[EventRecord], start_ms: i64, end_ms: i64) -> Self {
        let in_window = events_in_window(events, start_ms, end_ms);
        Self {
            start_ms,
            end_ms,
            totals: EventTotals::from_events(in_window.iter().copied()),
            by_category: aggregate_by_category(in_window.iter().copied()),
            by_platform: aggregate_by_platform(in_window.iter().copied()),
        }
    }

    /// Platforms sorted by descending carbon, at most `limit` entries.
    pub fn top_platforms(&self, limit: usize) -> Vec<(String, f64)> {
        let mut platforms: Vec<(String, f64)> = self
            .by_platform
            .iter()
            .map(|(platform, grams)| (platform.clone(), *grams))
            .collect();
        platforms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        platforms.truncate(limit);
        platforms
    }
}


#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;

    use super::test_support::event;
    use super::*;

    fn sample() -> Vec<EventRecord> {
        vec![
            event(Category::Media, "youtube.com", 3.25, 1_000),
            event(Category::Shopping, "amazon.de", 1.1, 2_000),
            event(Category::Media, "netflix.com", 7.05, 3_000),
            event(Category::Browsing, "", 0.4, 4_000),
            event(Category::Browsing, "docs.rs", 2.2, 5_000),
            event(Category::Media, "youtube.com", 0.75, 6_000),
        ]
    }

    #[test]
    fn every_category_is_present() {
        let totals = aggregate_by_category(&Vec::<EventRecord>::new());
        assert_eq!(totals.len(), Category::ALL.len());
        assert!(totals.values().all(|grams| *grams == 0.0));
    }

    #[test]
    fn groups_by_category_and_platform() {
        let events = sample();
        let by_category = aggregate_by_category(&events);
        assert!((by_category[&Category::Media] - 11.05).abs() < 1e-9);
        assert!((by_category[&Category::Shopping] - 1.1).abs() < 1e-9);
        assert!((by_category[&Category::Browsing] - 2.6).abs() < 1e-9);

        let by_platform = aggregate_by_platform(&events);
        assert!((by_platform["youtube.com"] - 4.0).abs() < 1e-9);
        assert!((by_platform[UNKNOWN_PLATFORM] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn totals_do_not_depend_on_order() {
        let events = sample();
        let expected_category = aggregate_by_category(&events);
        let expected_platform = aggregate_by_platform(&events);
        let mut rng = rand::thread_rng();

        for _ in 0..25 {
            let mut shuffled = events.clone();
            shuffled.shuffle(&mut rng);

            let by_category = aggregate_by_category(&shuffled);
            for category in Category::ALL {
                assert!((by_category[&category] - expected_category[&category]).abs() < 1e-9);
            }
            let by_platform = aggregate_by_platform(&shuffled);
            for (platform, grams) in &expected_platform {
                assert!((by_platform[platform] - grams).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn window_is_half_open() {
        let events = sample();
        let window = events_in_window(&events, 2_000, 5_000);
        assert_eq!(window.len(), 3);

        let report = WindowReport::build(&events, 2_000, 5_000);
        assert_eq!(report.totals.event_count, 3);
        assert!((report.totals.carbon_grams - 8.55).abs() < 1e-9);
        assert!((report.totals.transferred_mb - 30.0).abs() < 1e-9);
    }

    #[test]
    fn top_platforms_sorted_descending() {
        let report = WindowReport::build(&sample(), 0, 10_000);
        let top = report.top_platforms(2);
        assert_eq!(top[0].0, "netflix.com");
        assert_eq!(top[1].0, "youtube.com");
    }
}
