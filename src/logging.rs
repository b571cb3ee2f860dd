//! Activity and metrics sinks.
//!
//! Both sinks are fire-and-forget: a failing or absent logger never changes the
//! outcome of a protocol operation. Diagnostic output goes through `tracing`
//! independently of these sinks.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

pub const LOG_TYPE_CREDENTIAL_ACTIVITY: &str = "credential-activity";
pub const ACTIVITY_STATUS_SUCCESS: &str = "success";

/// A user-facing record of a completed interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds since the Unix epoch.
    pub time: u64,
    pub data: ActivityData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActivityData {
    pub client: String,
    pub operation: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Json>,
}

impl Activity {
    /// A successful credential activity for `client` (issuer or verifier).
    pub fn credential_success(
        client: impl Into<String>,
        operation: impl Into<String>,
        params: Map<String, Json>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: LOG_TYPE_CREDENTIAL_ACTIVITY.to_owned(),
            time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            data: ActivityData {
                client: client.into(),
                operation: operation.into(),
                status: ACTIVITY_STATUS_SUCCESS.to_owned(),
                params,
            },
        }
    }
}

/// A timed step of an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsEvent {
    pub event: String,
    /// Empty for top-level events.
    pub parent_event: String,
    pub duration: Duration,
}

pub trait ActivityLogger: Send + Sync {
    fn log(&self, activity: &Activity);
}

pub trait MetricsLogger: Send + Sync {
    fn log(&self, event: &MetricsEvent);
}

/// Discards everything. Used when the host supplies no logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl ActivityLogger for NoopLogger {
    fn log(&self, _activity: &Activity) {}
}

impl MetricsLogger for NoopLogger {
    fn log(&self, _event: &MetricsEvent) {}
}

/// Forwards metrics events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsLogger;

impl MetricsLogger for TracingMetricsLogger {
    fn log(&self, event: &MetricsEvent) {
        tracing::debug!(
            event = %event.event,
            parent_event = %event.parent_event,
            duration_ms = event.duration.as_millis() as u64,
            "metrics event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_serialization() {
        let mut params = Map::new();
        params.insert("subjectIDs".into(), json!(["did:example:123"]));

        let activity = Activity::credential_success("https://issuer.example", "oidc-issuance", params);
        let value = serde_json::to_value(&activity).unwrap();

        assert_eq!(value["type"], "credential-activity");
        assert_eq!(value["data"]["status"], "success");
        assert_eq!(value["data"]["operation"], "oidc-issuance");
        assert_eq!(value["data"]["params"]["subjectIDs"][0], "did:example:123");

        let parsed: Activity = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, activity);
    }
}
