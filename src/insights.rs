//! AI-written reflections on recent moods, with canned fallbacks.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::{
    analytics::{MoodStats, Trend},
    models::MoodEntry,
};

/// How far back the prompt looks.
pub const INSIGHT_WINDOW_DAYS: i64 = 14;
/// Cap on entries quoted in the prompt.
const PROMPT_ENTRY_LIMIT: usize = 20;

pub const EMPTY_HISTORY_INSIGHT: &str = "Log your mood for a few days and we'll start spotting patterns for you.";

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("no LLM API key configured")]
    NotConfigured,
    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("LLM returned no content")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightPrompt {
    pub system: String,
    pub user: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn complete(&self, prompt: &InsightPrompt) -> Result<String, InsightError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Ai,
    Fallback,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub insight: String,
    pub source: InsightSource,
    pub generated_for: NaiveDate,
}

const SYSTEM_PROMPT: &str = "You are a warm, concise wellbeing companion inside a mood journaling app. \
Given a user's recent mood scores (1 = very low, 10 = excellent), tags and notes, write 2-3 short \
sentences noticing one pattern and suggesting one small, practical next step. \
Do not diagnose, do not mention being an AI, and keep it under 80 words.";

pub fn build_prompt(stats: &MoodStats, entries: &[MoodEntry]) -> InsightPrompt {
    let mut user = String::new();
    let _ = writeln!(user, "Entries logged: {}", stats.count);
    if let Some(avg) = stats.average {
        let _ = writeln!(user, "Average score: {avg:.1}");
    }
    let _ = writeln!(user, "Trend: {:?}", stats.trend);
    let _ = writeln!(user, "Current streak: {} days", stats.current_streak);
    let _ = writeln!(user, "Recent entries (newest first):");

    for entry in entries.iter().take(PROMPT_ENTRY_LIMIT) {
        let _ = write!(user, "- {}: {}/10", entry.entry_date, entry.score);
        if !entry.tags.is_empty() {
            let _ = write!(user, " [{}]", entry.tags.join(", "));
        }
        if let Some(note) = entry.note.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(user, " \"{}\"", note.trim());
        }
        user.push('\n');
    }

    InsightPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Canned copy used when the provider is unavailable.
pub fn fallback_insight(stats: &MoodStats) -> String {
    match stats.trend {
        Trend::Improving => "Your mood has been lifting lately. Take a moment to note what's been helping so you can lean on it again.".to_string(),
        Trend::Declining => "The last few days look heavier than before. Be gentle with yourself, and consider one small thing that usually helps you recharge.".to_string(),
        Trend::Stable if stats.current_streak >= 3 => format!(
            "You've checked in {} days in a row. Consistent logging is the best way to see what shapes your mood.",
            stats.current_streak
        ),
        Trend::Stable => "Your mood has been fairly steady. Keep logging, and try adding tags so patterns are easier to spot.".to_string(),
    }
}

/// Produces an insight, never failing: provider errors become fallback copy.
pub async fn generate(
    provider: &dyn InsightProvider,
    stats: &MoodStats,
    recent: &[MoodEntry],
    today: NaiveDate,
) -> Insight {
    if recent.is_empty() {
        return Insight {
            insight: EMPTY_HISTORY_INSIGHT.to_string(),
            source: InsightSource::Placeholder,
            generated_for: today,
        };
    }

    let prompt = build_prompt(stats, recent);
    match provider.complete(&prompt).await {
        Ok(text) => Insight {
            insight: text,
            source: InsightSource::Ai,
            generated_for: today,
        },
        Err(e) => {
            tracing::warn!(error = %e, "⚠️ insight generation failed, using fallback");
            Insight {
                insight: fallback_insight(stats),
                source: InsightSource::Fallback,
                generated_for: today,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analytics, analytics::tests::entry, limits::Tier};

    fn today() -> NaiveDate {
        "2024-05-10".parse().unwrap()
    }

    fn recent() -> Vec<MoodEntry> {
        let mut newest = entry("2024-05-09", 8, &["run", "sun"]);
        newest.note = Some("  great walk  ".into());
        vec![newest, entry("2024-05-08", 6, &[])]
    }

    #[test]
    fn prompt_quotes_scores_tags_and_notes() {
        let entries = recent();
        let stats = analytics::compute(&entries, today(), Tier::Premium);
        let prompt = build_prompt(&stats, &entries);
        assert!(prompt.user.contains("- 2024-05-09: 8/10 [run, sun] \"great walk\""));
        assert!(prompt.user.contains("- 2024-05-08: 6/10\n"));
        assert!(prompt.user.contains("Average score: 7.0"));
        assert!(prompt.system.contains("mood"));
    }

    #[tokio::test]
    async fn provider_text_is_returned() {
        let mut provider = MockInsightProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| Ok("You seem to thrive outdoors.".into()));

        let entries = recent();
        let stats = analytics::compute(&entries, today(), Tier::Premium);
        let insight = generate(&provider, &stats, &entries, today()).await;
        assert_eq!(insight.source, InsightSource::Ai);
        assert_eq!(insight.insight, "You seem to thrive outdoors.");
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        let mut provider = MockInsightProvider::new();
        provider
            .expect_complete()
            .returning(|_| Err(InsightError::EmptyResponse));

        let entries = recent();
        let stats = analytics::compute(&entries, today(), Tier::Premium);
        let insight = generate(&provider, &stats, &entries, today()).await;
        assert_eq!(insight.source, InsightSource::Fallback);
        assert_eq!(insight.insight, fallback_insight(&stats));
    }

    #[tokio::test]
    async fn empty_history_skips_the_provider() {
        let mut provider = MockInsightProvider::new();
        provider.expect_complete().never();

        let stats = analytics::compute(&[], today(), Tier::Premium);
        let insight = generate(&provider, &stats, &[], today()).await;
        assert_eq!(insight.source, InsightSource::Placeholder);
        assert_eq!(insight.insight, EMPTY_HISTORY_INSIGHT);
    }
}
