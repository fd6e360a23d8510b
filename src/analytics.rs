//! Chart data and summary statistics over a user's entries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::{
    limits::{has_feature, Feature, Tier},
    models::MoodEntry,
};

/// Windows longer than this need [`Feature::AdvancedAnalytics`].
pub const FREE_HISTORY_DAYS: i64 = 30;
/// Longest window any tier may ask for.
pub const MAX_HISTORY_DAYS: i64 = 3650;
const TREND_THRESHOLD: f64 = 0.5;
const TOP_TAGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMood {
    pub date: NaiveDate,
    pub average: f64,
    pub entries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayAverage {
    pub weekday: String,
    pub average: f64,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodStats {
    pub count: usize,
    pub average: Option<f64>,
    pub min: Option<i16>,
    pub max: Option<i16>,
    /// Oldest first, one point per logged day.
    pub daily: Vec<DailyMood>,
    pub trend: Trend,
    pub current_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_tags: Option<Vec<TagCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday_averages: Option<Vec<WeekdayAverage>>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// First date inside a `days`-long window ending on `today`, with `days`
/// clamped to `1..=MAX_HISTORY_DAYS`.
pub fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.clamp(1, MAX_HISTORY_DAYS) - 1)
}

pub fn daily_series(entries: &[MoodEntry]) -> Vec<DailyMood> {
    let mut by_day = BTreeMap::<NaiveDate, Vec<f64>>::new();
    for entry in entries {
        by_day
            .entry(entry.entry_date)
            .or_default()
            .push(f64::from(entry.score));
    }

    by_day
        .into_iter()
        .map(|(date, scores)| DailyMood {
            date,
            entries: scores.len(),
            average: round2(mean(scores).unwrap_or_default()),
        })
        .collect()
}

/// Compares the later half of the series with the earlier half.
pub fn trend(daily: &[DailyMood]) -> Trend {
    if daily.len() < 2 {
        return Trend::Stable;
    }
    let (earlier, later) = daily.split_at(daily.len() / 2);
    let earlier = mean(earlier.iter().map(|d| d.average)).unwrap_or_default();
    let later = mean(later.iter().map(|d| d.average)).unwrap_or_default();

    let delta = later - earlier;
    if delta > TREND_THRESHOLD {
        Trend::Improving
    } else if delta < -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Consecutive logged days ending today, or yesterday if today is still open.
pub fn current_streak(entries: &[MoodEntry], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = entries.iter().map(|e| e.entry_date).collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor = cursor - Duration::days(1);
    }
    streak
}

fn top_tags(entries: &[MoodEntry]) -> Vec<TagCount> {
    let mut tally = HashMap::<&str, (usize, f64)>::new();
    for entry in entries {
        for tag in &entry.tags {
            let slot = tally.entry(tag.as_str()).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += f64::from(entry.score);
        }
    }

    let mut tags: Vec<TagCount> = tally
        .into_iter()
        .map(|(tag, (count, total))| TagCount {
            tag: tag.to_string(),
            count,
            average_score: round2(total / count as f64),
        })
        .collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(TOP_TAGS);
    tags
}

fn weekday_averages(entries: &[MoodEntry]) -> Vec<WeekdayAverage> {
    let mut buckets = BTreeMap::<u32, (Weekday, Vec<f64>)>::new();
    for entry in entries {
        let weekday = entry.entry_date.weekday();
        buckets
            .entry(weekday.num_days_from_monday())
            .or_insert_with(|| (weekday, Vec::new()))
            .1
            .push(f64::from(entry.score));
    }

    buckets
        .into_values()
        .map(|(weekday, scores)| WeekdayAverage {
            weekday: weekday.to_string(),
            entries: scores.len(),
            average: round2(mean(scores).unwrap_or_default()),
        })
        .collect()
}

pub fn compute(entries: &[MoodEntry], today: NaiveDate, tier: Tier) -> MoodStats {
    let daily = daily_series(entries);
    let advanced = has_feature(tier, Feature::AdvancedAnalytics);

    MoodStats {
        count: entries.len(),
        average: mean(entries.iter().map(|e| f64::from(e.score))).map(round2),
        min: entries.iter().map(|e| e.score).min(),
        max: entries.iter().map(|e| e.score).max(),
        trend: trend(&daily),
        current_streak: current_streak(entries, today),
        top_tags: advanced.then(|| top_tags(entries)),
        weekday_averages: advanced.then(|| weekday_averages(entries)),
        daily,
    }
}
