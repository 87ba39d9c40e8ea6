//! Actionable suggestions derived from a reporting window.
//!
//! Each rule looks at one [`RecommendationContext`] and either fires with a
//! suggestion or stays quiet. Output keeps registry order, and an "all
//! clear" entry is appended when nothing fires, so the list is never empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::activity::Category;
use crate::aggregate::{aggregate_by_category, aggregate_by_platform, EventTotals};
use crate::emissions::BASELINE_INTENSITY;
use crate::models::EventRecord;

const MEDIA_SHARE_THRESHOLD: f64 = 0.5;
const PLATFORM_SHARE_THRESHOLD: f64 = 0.4;
const DIRTY_GRID_FACTOR: f64 = 1.2;
const HEAVY_TRANSFER_MB: f64 = 1000.0;
const LONG_SESSION_MINUTES: f64 = 240.0;
const SHOPPING_SHARE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub action: String,
    pub impact: Impact,
    pub description: String,
}

impl Recommendation {
    fn new(action: &str, impact: Impact, description: String) -> Self {
        Self {
            action: action.to_string(),
            impact,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationContext {
    pub by_category: BTreeMap<Category, f64>,
    pub by_platform: BTreeMap<String, f64>,
    pub total_carbon: f64,
    pub transferred_mb: f64,
    pub active_minutes: f64,
    /// Current grid intensity, `None` when no reading is available.
    pub grid_intensity: Option<f64>,
    pub has_goal: bool,
}

impl Default for RecommendationContext {
    fn default() -> Self {
        Self::from_events(&[], None, false)
    }
}

impl RecommendationContext {
    pub fn from_events(events: &[EventRecord], grid_intensity: Option<f64>, has_goal: bool) -> Self {
        let totals = EventTotals::from_events(events);
        Self {
            by_category: aggregate_by_category(events),
            by_platform: aggregate_by_platform(events),
            total_carbon: totals.carbon_grams,
            transferred_mb: totals.transferred_mb,
            active_minutes: totals.active_minutes,
            grid_intensity,
            has_goal,
        }
    }

    /// Share of the window total, `None` when there is no total to divide.
    fn share(&self, grams: f64) -> Option<f64> {
        if !self.total_carbon.is_finite() || self.total_carbon <= 0.0 || !grams.is_finite() {
            return None;
        }
        Some(grams / self.total_carbon)
    }

    fn category_share(&self, category: Category) -> Option<f64> {
        self.share(self.by_category.get(&category).copied().unwrap_or(0.0))
    }

    fn top_platform(&self) -> Option<(&str, f64)> {
        self.by_platform
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(platform, grams)| (platform.as_str(), *grams))
    }
}

pub type RecommendationRule = fn(&RecommendationContext) -> Option<Recommendation>;

fn percent(share: f64) -> f64 {
    (share * 100.0).round()
}

fn reduce_video_quality(ctx: &RecommendationContext) -> Option<Recommendation> {
    let share = ctx.category_share(Category::Media)?;
    (share > MEDIA_SHARE_THRESHOLD).then(|| {
        Recommendation::new(
            "Lower streaming quality",
            Impact::High,
            format!(
                "Media accounts for {:.0}% of your footprint. Dropping video from HD to SD cuts its transfer several times over.",
                percent(share)
            ),
        )
    })
}

fn limit_top_platform(ctx: &RecommendationContext) -> Option<Recommendation> {
    let (platform, grams) = ctx.top_platform()?;
    let share = ctx.share(grams)?;
    (share > PLATFORM_SHARE_THRESHOLD).then(|| {
        Recommendation::new(
            "Cut back on your top site",
            Impact::Medium,
            format!(
                "{platform} produced {:.0}% of your emissions ({grams:.2} g).",
                percent(share)
            ),
        )
    })
}

fn shift_to_cleaner_hours(ctx: &RecommendationContext) -> Option<Recommendation> {
    let intensity = ctx.grid_intensity.filter(|value| value.is_finite())?;
    (intensity > DIRTY_GRID_FACTOR * BASELINE_INTENSITY).then(|| {
        Recommendation::new(
            "Browse when the grid is cleaner",
            Impact::Medium,
            format!(
                "Your grid is running at {intensity:.0} gCO2/kWh, above the {BASELINE_INTENSITY:.0} g global average. Heavy downloads can wait for cleaner hours."
            ),
        )
    })
}

fn reduce_data_transfer(ctx: &RecommendationContext) -> Option<Recommendation> {
    if !ctx.transferred_mb.is_finite() {
        return None;
    }
    (ctx.transferred_mb > HEAVY_TRANSFER_MB).then(|| {
        Recommendation::new(
            "Reduce data transfer",
            Impact::Medium,
            format!(
                "You moved {:.0} MB. Blocking autoplay and heavy ads trims this noticeably.",
                ctx.transferred_mb
            ),
        )
    })
}

fn take_screen_breaks(ctx: &RecommendationContext) -> Option<Recommendation> {
    if !ctx.active_minutes.is_finite() {
        return None;
    }
    (ctx.active_minutes > LONG_SESSION_MINUTES).then(|| {
        Recommendation::new(
            "Take screen breaks",
            Impact::Low,
            format!(
                "{:.1} hours of active browsing keeps your device drawing power the whole time.",
                ctx.active_minutes / 60.0
            ),
        )
    })
}

fn set_a_goal(ctx: &RecommendationContext) -> Option<Recommendation> {
    (!ctx.has_goal).then(|| {
        Recommendation::new(
            "Set a weekly goal",
            Impact::Low,
            "A weekly carbon budget makes progress visible and unlocks streaks.".to_string(),
        )
    })
}

fn consolidate_shopping(ctx: &RecommendationContext) -> Option<Recommendation> {
    let share = ctx.category_share(Category::Shopping)?;
    (share > SHOPPING_SHARE_THRESHOLD).then(|| {
        Recommendation::new(
            "Consolidate shopping trips",
            Impact::Low,
            format!(
                "Shopping sites make up {:.0}% of your footprint. Fewer, planned visits load fewer image-heavy pages.",
                percent(share)
            ),
        )
    })
}

pub const DEFAULT_RULES: &[RecommendationRule] = &[
    reduce_video_quality,
    limit_top_platform,
    shift_to_cleaner_hours,
    reduce_data_transfer,
    take_screen_breaks,
    set_a_goal,
    consolidate_shopping,
];

pub fn all_clear() -> Recommendation {
    Recommendation::new(
        "Keep it up",
        Impact::Low,
        "Your browsing footprint looks healthy. Nothing stands out right now.".to_string(),
    )
}

pub fn generate_with(rules: &[RecommendationRule], ctx: &RecommendationContext) -> Vec<Recommendation> {
    let mut fired: Vec<Recommendation> = rules.iter().filter_map(|rule| rule(ctx)).collect();
    if fired.is_empty() {
        fired.push(all_clear());
    }
    fired
}

pub fn generate(ctx: &RecommendationContext) -> Vec<Recommendation> {
    generate_with(DEFAULT_RULES, ctx)
}
