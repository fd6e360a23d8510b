use std::sync::Arc;

use crate::{
    billing::BillingProvider, insights::InsightProvider, outbound::stripe::WebhookVerifier,
    store::MoodRepository,
};

/// Shared handles for every route; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MoodRepository>,
    pub billing: Arc<dyn BillingProvider>,
    pub insights: Arc<dyn InsightProvider>,
    pub webhooks: WebhookVerifier,
}
