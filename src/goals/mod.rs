//! Weekly goal, progress and streak tracking.
//!
//! A period runs Monday 00:00 to Sunday 23:59 local time. Closing a period
//! is the only transition that mutates [`GoalHistory`].

use std::sync::Arc;

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::store::{self, RecordStore};
use crate::summary::{date_key, local_midnight_ms, parse_date_key};

const NEAR_THRESHOLD_PERCENT: f64 = 80.0;
const HALF_GOAL_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod {
    #[default]
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Grams CO2 allowed per period.
    pub amount: f64,
    #[serde(default)]
    pub period: GoalPeriod,
    pub set_date: String,
}

impl Goal {
    pub fn weekly(amount: f64, set_on: NaiveDate) -> Self {
        Self {
            amount,
            period: GoalPeriod::Weekly,
            set_date: date_key(set_on),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.amount.is_finite() && self.amount > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalHistory {
    pub last_period_start: Option<String>,
    pub last_period_met: bool,
    pub current_streak: u32,
    pub best_streak: u32,
    pub total_achieved: u32,
    pub half_goal_achieved: bool,
}

/// Monday of the week containing `date`; Sunday maps back six days.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn is_new_period(history: &GoalHistory, today: NaiveDate) -> bool {
    match history.last_period_start.as_deref().and_then(parse_date_key) {
        Some(stored) => week_start(today) > stored,
        None => true,
    }
}

pub fn close_period(
    period_carbon: f64,
    goal: &Goal,
    history: &GoalHistory,
    today: NaiveDate,
) -> GoalHistory {
    let mut next = history.clone();
    let goal_met = period_carbon <= goal.amount;

    if goal_met {
        next.current_streak = if history.last_period_met {
            history.current_streak + 1
        } else {
            1
        };
        next.total_achieved += 1;
        next.best_streak = next.best_streak.max(next.current_streak);
        if period_carbon <= HALF_GOAL_RATIO * goal.amount {
            next.half_goal_achieved = true;
        }
    } else {
        next.current_streak = 0;
    }

    next.last_period_met = goal_met;
    next.last_period_start = Some(date_key(week_start(today)));
    next
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Great,
    Near,
    Over,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    /// Uncapped share of the goal used, in percent.
    pub percentage: f64,
    pub display_percentage: f64,
    pub remaining: f64,
    pub status: GoalStatus,
}

pub fn progress(current_carbon: f64, goal: &Goal) -> Option<GoalProgress> {
    if !goal.is_valid() {
        return None;
    }
    let current = if current_carbon.is_finite() {
        current_carbon.max(0.0)
    } else {
        0.0
    };

    let percentage = current / goal.amount * 100.0;
    let status = if percentage < NEAR_THRESHOLD_PERCENT {
        GoalStatus::Great
    } else if percentage <= 100.0 {
        GoalStatus::Near
    } else {
        GoalStatus::Over
    };

    Some(GoalProgress {
        percentage,
        display_percentage: percentage.min(100.0),
        remaining: (goal.amount - current).max(0.0),
        status,
    })
}

/// Persisted goal state plus the rollover that closes finished weeks.
#[derive(Clone)]
pub struct GoalTracker {
    store: Arc<dyn RecordStore>,
}

impl GoalTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn goal(&self) -> Result<Option<Goal>> {
        store::load(self.store.as_ref(), store::GOAL_KEY).await
    }

    pub async fn set_goal(&self, goal: &Goal) -> Result<()> {
        anyhow::ensure!(goal.is_valid(), "goal amount must be a positive number of grams");
        store::save(self.store.as_ref(), store::GOAL_KEY, goal).await?;
        info!("Weekly goal set to {:.2} g", goal.amount);
        Ok(())
    }

    pub async fn history(&self) -> Result<GoalHistory> {
        Ok(store::load(self.store.as_ref(), store::GOAL_HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Carbon recorded during the week starting `start`.
    pub async fn week_total(&self, start: NaiveDate) -> Result<f64> {
        let start_ms = local_midnight_ms(start);
        let end_ms = local_midnight_ms(start + Duration::days(7));
        let events = self.store.events_between(start_ms, end_ms).await?;
        Ok(aggregate::total_carbon(&events))
    }

    /// Closes the previous week when `today` starts a new one.
    ///
    /// Returns the updated history when a transition happened. Without a goal
    /// this is inert. The first call only records the current week as the
    /// starting point, since there is no finished period to judge yet.
    pub async fn rollover_if_needed(&self, today: NaiveDate) -> Result<Option<GoalHistory>> {
        let Some(goal) = self.goal().await?.filter(Goal::is_valid) else {
            return Ok(None);
        };

        let history = self.history().await?;
        if !is_new_period(&history, today) {
            return Ok(None);
        }

        let next = match history.last_period_start.as_deref().and_then(parse_date_key) {
            None => {
                debug!("Starting goal tracking at week {}", date_key(week_start(today)));
                GoalHistory {
                    last_period_start: Some(date_key(week_start(today))),
                    ..history
                }
            }
            Some(closing_start) => {
                let total = self.week_total(closing_start).await?;
                let next = close_period(total, &goal, &history, today);
                info!(
                    "Closed week {}: {:.2} g against goal {:.2} g (met: {}, streak {})",
                    date_key(closing_start),
                    total,
                    goal.amount,
                    next.last_period_met,
                    next.current_streak
                );
                next
            }
        };

        store::save(self.store.as_ref(), store::GOAL_HISTORY_KEY, &next).await?;
        Ok(Some(next))
    }
}
