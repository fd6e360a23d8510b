//! Freemium limits and feature entitlements.
//!
//! Everything here is a pure function of the user's [`Tier`] and a usage
//! count. Premium caps are `None`, i.e. unbounded.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

pub const FREE_MONTHLY_ENTRY_LIMIT: i64 = 50;
pub const FREE_TAG_LIMIT: usize = 3;
pub const FREE_NOTE_LIMIT: usize = 200;

/// Share of the monthly cap after which the free tier sees a nudge.
const NUDGE_THRESHOLD_PERCENT: i64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Tier::Premium
        } else {
            Tier::Free
        }
    }

    pub fn is_premium(self) -> bool {
        self == Tier::Premium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub monthly_entries: Option<i64>,
    pub tags_per_entry: Option<usize>,
    pub note_chars: Option<usize>,
}

impl TierLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => TierLimits {
                monthly_entries: Some(FREE_MONTHLY_ENTRY_LIMIT),
                tags_per_entry: Some(FREE_TAG_LIMIT),
                note_chars: Some(FREE_NOTE_LIMIT),
            },
            Tier::Premium => TierLimits {
                monthly_entries: None,
                tags_per_entry: None,
                note_chars: None,
            },
        }
    }
}

pub fn can_create_entry(tier: Tier, monthly_count: i64) -> bool {
    TierLimits::for_tier(tier)
        .monthly_entries
        .map_or(true, |cap| monthly_count < cap)
}

pub fn can_add_tags(tier: Tier, tag_count: usize) -> bool {
    TierLimits::for_tier(tier)
        .tags_per_entry
        .map_or(true, |cap| tag_count <= cap)
}

/// Length is counted in characters so emoji-heavy notes are not penalised.
pub fn note_within_limit(tier: Tier, note: &str) -> bool {
    TierLimits::for_tier(tier)
        .note_chars
        .map_or(true, |cap| note.chars().count() <= cap)
}

pub fn entries_remaining(tier: Tier, monthly_count: i64) -> Option<i64> {
    TierLimits::for_tier(tier)
        .monthly_entries
        .map(|cap| (cap - monthly_count).max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum LimitViolation {
    MonthlyEntries { cap: i64 },
    Tags { cap: usize },
    NoteLength { cap: usize },
}

impl LimitViolation {
    pub fn trigger(self) -> UpgradeTrigger {
        match self {
            LimitViolation::MonthlyEntries { .. } => UpgradeTrigger::EntryLimit,
            LimitViolation::Tags { .. } => UpgradeTrigger::TagLimit,
            LimitViolation::NoteLength { .. } => UpgradeTrigger::NoteLimit,
        }
    }

    pub fn message(self) -> String {
        match self {
            LimitViolation::MonthlyEntries { cap } => {
                format!("free plan allows {cap} entries per month")
            }
            LimitViolation::Tags { cap } => format!("free plan allows {cap} tags per entry"),
            LimitViolation::NoteLength { cap } => {
                format!("free plan allows notes up to {cap} characters")
            }
        }
    }
}

/// Checks a new entry against the tier's caps, monthly count first.
pub fn check_new_entry(
    tier: Tier,
    monthly_count: i64,
    tags: &[String],
    note: Option<&str>,
) -> Result<(), LimitViolation> {
    let limits = TierLimits::for_tier(tier);
    if !can_create_entry(tier, monthly_count) {
        if let Some(cap) = limits.monthly_entries {
            return Err(LimitViolation::MonthlyEntries { cap });
        }
    }
    if !can_add_tags(tier, tags.len()) {
        if let Some(cap) = limits.tags_per_entry {
            return Err(LimitViolation::Tags { cap });
        }
    }
    if let Some(note) = note {
        if !note_within_limit(tier, note) {
            if let Some(cap) = limits.note_chars {
                return Err(LimitViolation::NoteLength { cap });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AdvancedAnalytics,
    AiInsights,
    DataExport,
}

impl Feature {
    pub fn trigger(self) -> UpgradeTrigger {
        match self {
            Feature::AdvancedAnalytics => UpgradeTrigger::AdvancedAnalytics,
            Feature::AiInsights => UpgradeTrigger::AiInsights,
            Feature::DataExport => UpgradeTrigger::DataExport,
        }
    }
}

pub fn has_feature(tier: Tier, _feature: Feature) -> bool {
    tier.is_premium()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeTrigger {
    EntryLimit,
    ApproachingEntryLimit,
    TagLimit,
    NoteLimit,
    AdvancedAnalytics,
    AiInsights,
    DataExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpgradePrompt {
    pub trigger: UpgradeTrigger,
    pub title: &'static str,
    pub message: &'static str,
    pub cta: &'static str,
}

impl UpgradePrompt {
    pub fn for_trigger(trigger: UpgradeTrigger) -> Self {
        let (title, message, cta) = match trigger {
            UpgradeTrigger::EntryLimit => (
                "You've reached this month's limit",
                "Free accounts can log 50 moods a month. Go Premium for unlimited entries.",
                "Unlock unlimited entries",
            ),
            UpgradeTrigger::ApproachingEntryLimit => (
                "Almost at your monthly limit",
                "You're close to the 50 entries included in the free plan this month.",
                "See Premium",
            ),
            UpgradeTrigger::TagLimit => (
                "More tags with Premium",
                "Free entries can carry up to 3 tags. Premium removes the cap.",
                "Upgrade for unlimited tags",
            ),
            UpgradeTrigger::NoteLimit => (
                "Longer notes with Premium",
                "Free notes are limited to 200 characters. Premium lets you write as much as you like.",
                "Upgrade to write more",
            ),
            UpgradeTrigger::AdvancedAnalytics => (
                "See the bigger picture",
                "Premium unlocks your full mood history, tag breakdowns and weekday patterns.",
                "Unlock advanced analytics",
            ),
            UpgradeTrigger::AiInsights => (
                "Personal AI insights",
                "Premium members get AI-written reflections on their recent moods.",
                "Get AI insights",
            ),
            UpgradeTrigger::DataExport => (
                "Export your journal",
                "Download every entry you've logged with Premium.",
                "Upgrade to export",
            ),
        };
        UpgradePrompt {
            trigger,
            title,
            message,
            cta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub tier: Tier,
    pub entries_this_month: i64,
    pub entries_remaining: Option<i64>,
    pub limits: TierLimits,
    pub nudge: Option<UpgradePrompt>,
}

impl UsageSummary {
    pub fn new(tier: Tier, entries_this_month: i64) -> Self {
        let limits = TierLimits::for_tier(tier);
        let nudge = limits.monthly_entries.and_then(|cap| {
            if entries_this_month >= cap {
                Some(UpgradePrompt::for_trigger(UpgradeTrigger::EntryLimit))
            } else if entries_this_month * 100 >= cap * NUDGE_THRESHOLD_PERCENT {
                Some(UpgradePrompt::for_trigger(
                    UpgradeTrigger::ApproachingEntryLimit,
                ))
            } else {
                None
            }
        });
        UsageSummary {
            tier,
            entries_this_month,
            entries_remaining: entries_remaining(tier, entries_this_month),
            limits,
            nudge,
        }
    }
}

/// First instant of the UTC calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, true)]
    #[case(49, true)]
    #[case(50, false)]
    #[case(51, false)]
    fn free_tier_entry_cap(#[case] count: i64, #[case] allowed: bool) {
        assert_eq!(can_create_entry(Tier::Free, count), allowed);
    }

    #[rstest]
    #[case(0)]
    #[case(50)]
    #[case(10_000)]
    fn premium_entry_cap_is_unbounded(#[case] count: i64) {
        assert!(can_create_entry(Tier::Premium, count));
        assert_eq!(entries_remaining(Tier::Premium, count), None);
    }

    #[test]
    fn tags_and_notes_respect_free_caps() {
        assert!(can_add_tags(Tier::Free, 3));
        assert!(!can_add_tags(Tier::Free, 4));
        assert!(can_add_tags(Tier::Premium, 40));

        let at_cap = "a".repeat(FREE_NOTE_LIMIT);
        let over = "a".repeat(FREE_NOTE_LIMIT + 1);
        assert!(note_within_limit(Tier::Free, &at_cap));
        assert!(!note_within_limit(Tier::Free, &over));
        assert!(note_within_limit(Tier::Premium, &over));
    }

    #[test]
    fn note_length_counts_characters() {
        let note = "😊".repeat(FREE_NOTE_LIMIT);
        assert!(note.len() > FREE_NOTE_LIMIT);
        assert!(note_within_limit(Tier::Free, &note));
    }

    #[test]
    fn check_new_entry_reports_first_violation() {
        let tags: Vec<String> = ["a", "b", "c", "d"].iter().map(|t| t.to_string()).collect();
        assert_eq!(
            check_new_entry(Tier::Free, 50, &tags, None),
            Err(LimitViolation::MonthlyEntries { cap: 50 })
        );
        assert_eq!(
            check_new_entry(Tier::Free, 10, &tags, None),
            Err(LimitViolation::Tags { cap: 3 })
        );
        let long = "x".repeat(201);
        assert_eq!(
            check_new_entry(Tier::Free, 10, &[], Some(&long)),
            Err(LimitViolation::NoteLength { cap: 200 })
        );
        assert_eq!(check_new_entry(Tier::Premium, 500, &tags, Some(&long)), Ok(()));
    }

    #[test]
    fn features_are_premium_only() {
        for feature in [Feature::AdvancedAnalytics, Feature::AiInsights, Feature::DataExport] {
            assert!(!has_feature(Tier::Free, feature));
            assert!(has_feature(Tier::Premium, feature));
        }
    }

    #[rstest]
    #[case(10, None)]
    #[case(40, Some(UpgradeTrigger::ApproachingEntryLimit))]
    #[case(50, Some(UpgradeTrigger::EntryLimit))]
    fn usage_summary_nudges_near_the_cap(
        #[case] count: i64,
        #[case] expected: Option<UpgradeTrigger>,
    ) {
        let summary = UsageSummary::new(Tier::Free, count);
        assert_eq!(summary.nudge.map(|p| p.trigger), expected);
        assert_eq!(summary.entries_remaining, Some((50 - count).max(0)));
    }

    #[test]
    fn premium_summary_has_no_nudge() {
        let summary = UsageSummary::new(Tier::Premium, 400);
        assert_eq!(summary.nudge, None);
        assert_eq!(summary.limits.monthly_entries, None);
    }

    #[test]
    fn violations_map_to_prompts() {
        let prompt = UpgradePrompt::for_trigger(LimitViolation::Tags { cap: 3 }.trigger());
        assert_eq!(prompt.trigger, UpgradeTrigger::TagLimit);
        assert!(!prompt.message.is_empty());
    }

    #[test]
    fn month_start_truncates_to_the_first() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 13, 45, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }
}
