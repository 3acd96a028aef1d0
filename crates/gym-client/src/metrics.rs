//! Client metrics
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.
//!
//! - `gym_client_requests_total` (counter): labels `method`, `status`
//! - `gym_client_refresh_total` (counter): label `outcome`
//! - `gym_client_session_lost_total` (counter): label `reason`

use crate::attempt::SessionLoss;

/// Record a finished send. Transport failures use status `"error"`.
pub fn record_request(method: &str, status: Option<u16>) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    metrics::counter!("gym_client_requests_total", "method" => method.to_string(), "status" => status)
        .increment(1);
}

/// Record a refresh decision: `success`, `reused`, `missing`, `rejected`, `failed`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gym_client_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_session_lost(reason: SessionLoss) {
    metrics::counter!("gym_client_session_lost_total", "reason" => reason.label()).increment(1);
}
