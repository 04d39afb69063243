use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use tracing::{info, warn};

use super::AppState;
use crate::payments::crypto::parse_query;
use crate::payments::types::FieldMap;

/// Form bodies that do not parse are handled as empty forms, which the receiver rejects.
fn parse_form(body: &str) -> FieldMap {
    parse_query(body).unwrap_or_else(|e| {
        warn!(error = %e, "Unparseable callback body");
        FieldMap::new()
    })
}

/// POST /payuni/notify
///
/// The gateway only needs a 2xx; the outcome is logged, never returned.
pub async fn notify(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let form = parse_form(&body);
    let outcome = state.callbacks.receive_notify(&form).await;
    info!(outcome = ?outcome, "PAYUNi notify handled");
    StatusCode::OK
}

/// POST /payuni/return
pub async fn payment_return(State(state): State<AppState>, body: String) -> Redirect {
    let form = parse_form(&body);
    let redirect = state.callbacks.receive_return(&form).await;
    info!(
        outcome = ?redirect.outcome,
        location = %redirect.location,
        "PAYUNi return handled"
    );
    Redirect::to(&redirect.location)
}
