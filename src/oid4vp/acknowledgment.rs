use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::{
    core::util::{AsyncHttpClient, Call, Transport, SUCCESS},
    error::{ErrorKind, Module, WalletError, WalletErrorContext, WalletResult},
    logging::NoopLogger,
    trace::Trace,
};

pub const ACCESS_DENIED: &str = "access_denied";
pub const NO_CONSENT: &str = "no_consent";
pub const NO_MATCH_FOUND: &str = "no_match_found";

/// Why the wallet did not present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationOutcome {
    /// The user declined.
    Rejected,
    /// The wallet holds no credential satisfying the request.
    NoMatch,
    Custom { code: String, description: String },
}

impl PresentationOutcome {
    fn error(&self) -> (&str, &str) {
        match self {
            Self::Rejected => (ACCESS_DENIED, NO_CONSENT),
            Self::NoMatch => (ACCESS_DENIED, NO_MATCH_FOUND),
            Self::Custom { code, description } => (code.as_str(), description.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    error_description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interaction_details: Option<String>,
}

/// Tells the verifier that the wallet will not present.
///
/// Serializable so it can be sent after a process restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresentationAcknowledgment {
    #[serde(alias = "redirect_uri")]
    pub response_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub interaction_details: Map<String, Json>,
}

impl PresentationAcknowledgment {
    pub fn serialize(&self) -> WalletResult<String> {
        serde_json::to_string(self).wallet_err(Module::Presentation, ErrorKind::InvalidSdkUsage)
    }

    pub fn parse(json: &str) -> WalletResult<Self> {
        serde_json::from_str(json)
            .context("failed to parse acknowledgment")
            .wallet_err(Module::Presentation, ErrorKind::InvalidSdkUsage)
    }

    pub fn set_interaction_details(&mut self, details: Map<String, Json>) {
        self.interaction_details = details;
    }

    /// Post the error response to the verifier.
    pub async fn acknowledge(
        &self,
        outcome: &PresentationOutcome,
        http_client: &dyn AsyncHttpClient,
    ) -> WalletResult<()> {
        let trace = Trace::new();
        let (error, error_description) = outcome.error();

        let interaction_details = match self.interaction_details.is_empty() {
            true => None,
            false => Some(
                serde_json::to_string(&self.interaction_details)
                    .wallet_err(Module::Presentation, ErrorKind::InvalidSdkUsage)?,
            ),
        };

        let body = ErrorResponse {
            error,
            error_description,
            state: self.state.as_deref(),
            interaction_details,
        };

        debug!(error, error_description, "acknowledging presentation request");

        Transport::new(http_client, &NoopLogger, &trace)
            .post_form(
                &self.response_uri,
                &body,
                Call {
                    event: format!(
                        "Acknowledge verifier via an HTTP POST request to {}",
                        self.response_uri
                    ),
                    parent_event: "",
                    endpoint: "verifier's response endpoint",
                    accept: SUCCESS,
                },
            )
            .await
            .context("failed to send acknowledgment to verifier")
            .map_err(|e| {
                WalletError::new(Module::Presentation, ErrorKind::AcknowledgmentFailed, e)
                    .with_trace_id(trace.trace_id())
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn round_trip_keeps_fields() {
        let mut details = Map::new();
        details.insert("reason".into(), json!("user closed the dialog"));

        let ack = PresentationAcknowledgment {
            response_uri: "https://verifier.example/cb".into(),
            state: Some("s-1".into()),
            interaction_details: details,
        };

        let parsed = PresentationAcknowledgment::parse(&ack.serialize().unwrap()).unwrap();
        assert_eq!(parsed, ack);
    }

    #[test]
    fn outcome_errors() {
        assert_eq!(PresentationOutcome::Rejected.error(), ("access_denied", "no_consent"));
        assert_eq!(PresentationOutcome::NoMatch.error(), ("access_denied", "no_match_found"));
        let custom = PresentationOutcome::Custom {
            code: "temporarily_unavailable".into(),
            description: "try later".into(),
        };
        assert_eq!(custom.error(), ("temporarily_unavailable", "try later"));
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = PresentationAcknowledgment::parse("{").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSdkUsage);
        assert!(err.code().starts_with("OVP3"));
    }
}
