//! Deterministic A/B bucketing.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct Experiment {
    pub name: &'static str,
    /// First variant is the control.
    pub variants: &'static [&'static str],
}

pub const EXPERIMENTS: &[Experiment] = &[
    Experiment {
        name: "pricing_page_layout",
        variants: &["control", "annual_first"],
    },
    Experiment {
        name: "upgrade_prompt_copy",
        variants: &["control", "benefit_led", "social_proof"],
    },
    Experiment {
        name: "onboarding_reminder",
        variants: &["control", "evening_nudge"],
    },
];

pub fn find(name: &str) -> Option<&'static Experiment> {
    EXPERIMENTS.iter().find(|e| e.name == name)
}

/// Same experiment and user always land in the same bucket.
pub fn assign_variant(experiment: &Experiment, user_id: Uuid) -> &'static str {
    let digest = Sha256::digest(format!("{}:{}", experiment.name, user_id).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % experiment.variants.len().max(1) as u64;

    experiment
        .variants
        .get(bucket as usize)
        .copied()
        .unwrap_or("control")
}
