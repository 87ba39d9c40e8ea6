//! Badge rules over a snapshot of goal, streak and lifetime state.
//!
//! Rules are plain functions over an immutable [`AchievementContext`]. A rule
//! that cannot decide (for example a goal rule with no goal set) returns
//! `None` and counts as not earned. Unlocks are stored once per id and never
//! rewritten, so re-earning a badge never notifies twice.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::goals::{Goal, GoalHistory};
use crate::models::EventRecord;
use crate::store::{self, RecordStore};
use crate::summary::{date_key, local_date_of};

const TRACKING_DAYS_FOR_WEEK_BADGE: u32 = 7;

/// Totals over every recorded event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeTotals {
    pub event_count: u64,
    pub total_carbon: f64,
    /// Distinct local days with at least one event.
    pub days_tracked: u32,
}

impl LifetimeTotals {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut days = BTreeSet::new();
        let mut totals = Self::default();
        for event in events {
            totals.event_count += 1;
            if event.carbon_grams.is_finite() && event.carbon_grams > 0.0 {
                totals.total_carbon += event.carbon_grams;
            }
            if let Some(day) = local_date_of(event.timestamp) {
                days.insert(day);
            }
        }
        totals.days_tracked = u32::try_from(days.len()).unwrap_or(u32::MAX);
        totals
    }

    /// Counts one more event. `first_of_day` marks the first event on its
    /// local day.
    pub fn apply(mut self, event: &EventRecord, first_of_day: bool) -> Self {
        self.event_count += 1;
        if event.carbon_grams.is_finite() && event.carbon_grams > 0.0 {
            self.total_carbon += event.carbon_grams;
        }
        if first_of_day {
            self.days_tracked = self.days_tracked.saturating_add(1);
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementContext {
    pub goal: Option<Goal>,
    pub history: GoalHistory,
    pub lifetime: LifetimeTotals,
    /// Carbon recorded so far in the current week.
    pub weekly_carbon: f64,
}

impl AchievementContext {
    fn valid_goal(&self) -> Option<&Goal> {
        self.goal.as_ref().filter(|goal| goal.is_valid())
    }
}

#[derive(Clone, Copy)]
pub struct AchievementRule {
    pub id: &'static str,
    pub title: &'static str,
    pub check: fn(&AchievementContext) -> Option<bool>,
}

fn first_session(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.lifetime.event_count >= 1)
}

fn goal_setter(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.valid_goal().is_some())
}

fn first_goal_met(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.history.total_achieved >= 1)
}

fn half_goal(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.history.half_goal_achieved)
}

fn streak_3(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.history.best_streak >= 3)
}

fn streak_10(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.history.best_streak >= 10)
}

fn under_budget(ctx: &AchievementContext) -> Option<bool> {
    let goal = ctx.valid_goal()?;
    if !ctx.weekly_carbon.is_finite() {
        return None;
    }
    Some(ctx.lifetime.event_count > 0 && ctx.weekly_carbon < goal.amount)
}

fn data_tracker_week(ctx: &AchievementContext) -> Option<bool> {
    Some(ctx.lifetime.days_tracked >= TRACKING_DAYS_FOR_WEEK_BADGE)
}

pub const DEFAULT_RULES: &[AchievementRule] = &[
    AchievementRule {
        id: "first_session",
        title: "First Steps",
        check: first_session,
    },
    AchievementRule {
        id: "goal_setter",
        title: "Goal Setter",
        check: goal_setter,
    },
    AchievementRule {
        id: "first_goal_met",
        title: "Goal Crusher",
        check: first_goal_met,
    },
    AchievementRule {
        id: "half_goal",
        title: "Half the Impact",
        check: half_goal,
    },
    AchievementRule {
        id: "streak_3",
        title: "Three in a Row",
        check: streak_3,
    },
    AchievementRule {
        id: "streak_10",
        title: "Ten Week Streak",
        check: streak_10,
    },
    AchievementRule {
        id: "under_budget",
        title: "Under Budget",
        check: under_budget,
    },
    AchievementRule {
        id: "data_tracker_week",
        title: "Data Tracker",
        check: data_tracker_week,
    },
];

pub fn rule(id: &str) -> Option<&'static AchievementRule> {
    DEFAULT_RULES.iter().find(|rule| rule.id == id)
}

/// Ids of every rule that currently holds, in registry order.
pub fn evaluate(rules: &[AchievementRule], ctx: &AchievementContext) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|rule| (rule.check)(ctx).unwrap_or(false))
        .map(|rule| rule.id)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unlock {
    pub unlocked_at: String,
}

pub type UnlockMap = BTreeMap<String, Unlock>;

pub fn newly_unlocked(earned: &[&'static str], unlocked: &UnlockMap) -> Vec<&'static str> {
    earned
        .iter()
        .copied()
        .filter(|id| !unlocked.contains_key(*id))
        .collect()
}

/// Persists unlocks under the achievements key.
#[derive(Clone)]
pub struct AchievementTracker {
    store: Arc<dyn RecordStore>,
    rules: &'static [AchievementRule],
}

impl AchievementTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_rules(store, DEFAULT_RULES)
    }

    pub fn with_rules(store: Arc<dyn RecordStore>, rules: &'static [AchievementRule]) -> Self {
        Self { store, rules }
    }

    pub fn rules(&self) -> &'static [AchievementRule] {
        self.rules
    }

    pub async fn unlocked(&self) -> Result<UnlockMap> {
        Ok(store::load(self.store.as_ref(), store::ACHIEVEMENTS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Records every newly earned badge with `today` as its unlock date and
    /// returns their ids. Existing entries are left untouched.
    pub async fn evaluate_and_unlock(
        &self,
        ctx: &AchievementContext,
        today: NaiveDate,
    ) -> Result<Vec<String>> {
        let earned = evaluate(self.rules, ctx);
        let mut unlocked = self.unlocked().await?;
        let fresh = newly_unlocked(&earned, &unlocked);
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let unlocked_at = date_key(today);
        for id in &fresh {
            unlocked.insert(
                (*id).to_string(),
                Unlock {
                    unlocked_at: unlocked_at.clone(),
                },
            );
        }
        store::save(self.store.as_ref(), store::ACHIEVEMENTS_KEY, &unlocked).await?;

        info!("Unlocked achievements: {}", fresh.join(", "));
        Ok(fresh.into_iter().map(str::to_string).collect())
    }
}
