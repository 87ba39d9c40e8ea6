//! Wires the components into the per-session flow and the reporting queries.
//!
//! `record_session` runs telemetry through the emissions engine at the
//! current grid intensity and commits the finished record together with the
//! daily and lifetime totals. It then closes a finished goal week, unlocks
//! achievements and notifies subscribers. Sessions are processed one at a
//! time.

pub mod refresher;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, Utc};
use log::{debug, info, warn};
use tokio::sync::{broadcast, Mutex};

use crate::achievements::{AchievementContext, AchievementTracker, LifetimeTotals};
use crate::activity::{categorize, platform_from_url};
use crate::aggregate::WindowReport;
use crate::config::TrackerConfig;
use crate::emissions::{self, EmissionParams, Telemetry, BASELINE_INTENSITY};
use crate::goals::{self, Goal, GoalProgress, GoalTracker};
use crate::grid::{self, GridIntensityProvider, HttpIntensityApi, IntensityApi};
use crate::location::{LocationResolver, LocationSource};
use crate::models::{EventData, EventRecord};
use crate::notify::{Notifier, TrackerEvent};
use crate::recommendations::{self, Recommendation, RecommendationContext};
use crate::store::RecordStore;
use crate::summary::{local_date_of, local_midnight_ms, DailySummary, DailySummaryAccumulator};

pub use refresher::GridRefresher;

/// Grid conditions a session was calculated under.
struct ResolvedGrid {
    intensity: f64,
    zone: Option<String>,
    is_estimated: Option<bool>,
}

#[derive(Clone)]
pub struct CarbonTracker {
    store: Arc<dyn RecordStore>,
    grid: GridIntensityProvider,
    summaries: DailySummaryAccumulator,
    goals: GoalTracker,
    achievements: AchievementTracker,
    notifier: Notifier,
    default_watts: f64,
    record_lock: Arc<Mutex<()>>,
}

impl CarbonTracker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        api: Arc<dyn IntensityApi>,
        location_source: Arc<dyn LocationSource>,
        config: &TrackerConfig,
    ) -> Self {
        let location = LocationResolver::new(
            store.clone(),
            location_source,
            config.location_fresh(),
            config.location_timeout(),
        );
        let grid = GridIntensityProvider::new(store.clone(), api, location, config);

        Self {
            summaries: DailySummaryAccumulator::new(store.clone()),
            goals: GoalTracker::new(store.clone()),
            achievements: AchievementTracker::new(store.clone()),
            notifier: Notifier::new(),
            default_watts: config.device_watts(),
            record_lock: Arc::new(Mutex::new(())),
            store,
            grid,
        }
    }

    /// Tracker that talks to the configured carbon-intensity endpoint.
    pub fn with_http(
        store: Arc<dyn RecordStore>,
        location_source: Arc<dyn LocationSource>,
        config: &TrackerConfig,
    ) -> Result<Self> {
        let api = HttpIntensityApi::new(config.grid_api_url.clone(), config.grid_request_timeout())
            .context("failed to set up carbon intensity client")?;
        Ok(Self::new(store, Arc::new(api), location_source, config))
    }

    pub fn grid(&self) -> &GridIntensityProvider {
        &self.grid
    }

    pub fn goals(&self) -> &GoalTracker {
        &self.goals
    }

    pub fn achievements(&self) -> &AchievementTracker {
        &self.achievements
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.notifier.subscribe()
    }

    async fn resolve_grid(&self, telemetry: &Telemetry) -> ResolvedGrid {
        if let Some(intensity) = telemetry
            .carbon_intensity
            .filter(|value| value.is_finite() && *value >= 0.0)
        {
            return ResolvedGrid {
                intensity,
                zone: None,
                is_estimated: None,
            };
        }

        match self.grid.realtime_intensity().await {
            Some(reading) => ResolvedGrid {
                intensity: reading.intensity,
                zone: reading.zone,
                is_estimated: reading.is_estimated,
            },
            None => ResolvedGrid {
                intensity: BASELINE_INTENSITY,
                zone: None,
                is_estimated: None,
            },
        }
    }

    /// Calculates, persists and announces one browsing session.
    pub async fn record_session(&self, domain: &str, telemetry: Telemetry) -> Result<EventRecord> {
        let _guard = self.record_lock.lock().await;

        let platform = platform_from_url(domain);
        let category = categorize(&platform);
        let resolved = self.resolve_grid(&telemetry).await;
        let params = EmissionParams::resolve(&telemetry, resolved.intensity, self.default_watts);

        let carbon_grams = emissions::total_carbon(&telemetry, params);
        let carbon_rate = emissions::carbon_rate(&telemetry, params);
        let data = EventData {
            grid_intensity: params.intensity,
            grid_zone: resolved.zone,
            grid_multiplier: grid::grid_multiplier(params.intensity),
            grid_is_estimated: resolved.is_estimated,
            device_watts_used: params.watts,
            telemetry,
        };
        let event = EventRecord::new(
            Utc::now(),
            category,
            platform,
            data,
            carbon_grams,
            Some(carbon_rate),
        );

        let recorded = self.summaries.record(&event).await?;
        debug!(
            "Recorded {:.2} g for {} ({}); {} total today",
            event.carbon_grams, event.platform, event.category, recorded.summary.total_carbon
        );

        // The event is committed from here on; later failures are logged so a
        // caller never retries an already recorded session.
        let today = local_date_of(event.timestamp).unwrap_or_else(|| Local::now().date_naive());
        if let Err(err) = self.goals.rollover_if_needed(today).await {
            warn!("Goal rollover failed after recording {}: {err:#}", event.id);
        }

        let unlocked = match self.unlock_achievements(today, recorded.lifetime).await {
            Ok(unlocked) => unlocked,
            Err(err) => {
                warn!("Achievement check failed after recording {}: {err:#}", event.id);
                Vec::new()
            }
        };

        self.notifier.emit(TrackerEvent::EventRecorded(event.clone()));
        if !unlocked.is_empty() {
            self.notifier.emit(TrackerEvent::AchievementsUnlocked(unlocked));
        }

        Ok(event)
    }

    async fn unlock_achievements(
        &self,
        today: NaiveDate,
        lifetime: LifetimeTotals,
    ) -> Result<Vec<String>> {
        let context = self.context_with(today, lifetime).await?;
        self.achievements.evaluate_and_unlock(&context, today).await
    }

    pub async fn set_goal(&self, amount: f64, today: NaiveDate) -> Result<Goal> {
        let goal = Goal::weekly(amount, today);
        self.goals.set_goal(&goal).await?;
        Ok(goal)
    }

    pub async fn today_summary(&self) -> Result<DailySummary> {
        self.summaries.today().await
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        self.summaries.for_date(date).await
    }

    /// Summaries for the seven days of the week containing `today`.
    pub async fn week_summaries(&self, today: NaiveDate) -> Result<Vec<DailySummary>> {
        self.summaries.range(goals::week_start(today), 7).await
    }

    pub async fn window_report(&self, start_ms: i64, end_ms: i64) -> Result<WindowReport> {
        let events = self.store.events_between(start_ms, end_ms).await?;
        Ok(WindowReport::build(&events, start_ms, end_ms))
    }

    pub async fn week_report(&self, today: NaiveDate) -> Result<WindowReport> {
        let start = goals::week_start(today);
        self.window_report(local_midnight_ms(start), local_midnight_ms(start + Duration::days(7)))
            .await
    }

    /// Progress of the current week against the goal; `None` without one.
    pub async fn goal_progress(&self, today: NaiveDate) -> Result<Option<GoalProgress>> {
        let Some(goal) = self.goals.goal().await? else {
            return Ok(None);
        };
        let spent = self.goals.week_total(goals::week_start(today)).await?;
        Ok(goals::progress(spent, &goal))
    }

    pub async fn lifetime_totals(&self) -> Result<LifetimeTotals> {
        self.summaries.lifetime().await
    }

    /// Rebuilds the stored lifetime totals by scanning the whole event log.
    pub async fn recompute_lifetime_totals(&self) -> Result<LifetimeTotals> {
        self.summaries.recompute_lifetime().await
    }

    pub async fn achievement_context(&self, today: NaiveDate) -> Result<AchievementContext> {
        let lifetime = self.lifetime_totals().await?;
        self.context_with(today, lifetime).await
    }

    async fn context_with(
        &self,
        today: NaiveDate,
        lifetime: LifetimeTotals,
    ) -> Result<AchievementContext> {
        Ok(AchievementContext {
            goal: self.goals.goal().await?,
            history: self.goals.history().await?,
            lifetime,
            weekly_carbon: self.goals.week_total(goals::week_start(today)).await?,
        })
    }

    /// Suggestions for the week containing `today`.
    pub async fn recommendations(&self, today: NaiveDate) -> Result<Vec<Recommendation>> {
        let start = goals::week_start(today);
        let events = self
            .store
            .events_between(local_midnight_ms(start), local_midnight_ms(start + Duration::days(7)))
            .await?;
        let intensity = self.grid.realtime_intensity().await.map(|reading| reading.intensity);
        let has_goal = self.goals.goal().await?.is_some_and(|goal| goal.is_valid());

        let context = RecommendationContext::from_events(&events, intensity, has_goal);
        let recs = recommendations::generate(&context);
        info!("Generated {} recommendation(s) for week of {}", recs.len(), start);
        Ok(recs)
    }
}
