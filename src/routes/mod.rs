use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub mod billing;
pub mod entries;
pub mod events;
pub mod experiments;
pub mod insights;
pub mod stats;
pub mod subscription;
pub mod users;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::routes(state.clone()))
        .merge(entries::routes(state.clone()))
        .merge(stats::routes(state.clone()))
        .merge(insights::routes(state.clone()))
        .merge(subscription::routes(state.clone()))
        .merge(billing::routes(state.clone()))
        .merge(experiments::routes())
        .merge(events::routes(state))
        .route("/health", get(|| async { "✅ Backend up" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
