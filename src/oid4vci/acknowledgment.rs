use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::debug;

use super::token::AuthToken;
use crate::{
    core::util::{AsyncHttpClient, Call, Transport, SUCCESS},
    error::{ErrorKind, Module, WalletError, WalletErrorContext, WalletResult},
    logging::NoopLogger,
    trace::Trace,
};

const CREDENTIAL_ACCEPTED: &str = "credential_accepted";
const CREDENTIAL_FAILURE: &str = "credential_failure";

/// How the user answered the issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Accepted,
    Rejected,
    /// Any other notification event, e.g. `credential_deleted`.
    Custom {
        event: String,
        description: Option<String>,
    },
}

impl IssuanceOutcome {
    fn event(&self) -> (&str, Option<&str>) {
        match self {
            Self::Accepted => (CREDENTIAL_ACCEPTED, None),
            Self::Rejected => (CREDENTIAL_FAILURE, None),
            Self::Custom { event, description } => (event.as_str(), description.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
struct NotificationRequest<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_description: Option<&'a str>,
    issuer_identifier: &'a str,
    notification_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    interaction_details: Option<&'a Map<String, Json>>,
}

/// Notifies the issuer, after the interaction, whether the user kept the
/// credentials.
///
/// Serializable so the notification can be sent after a process restart:
/// ```
/// # use openid4vc_wallet::oid4vci::IssuanceAcknowledgment;
/// let json = r#"{"ack_ids":["n-1"],"notification_endpoint":"https://issuer.example/notify","issuer_uri":"https://issuer.example"}"#;
/// let ack = IssuanceAcknowledgment::parse(json).unwrap();
/// assert_eq!(IssuanceAcknowledgment::parse(&ack.serialize().unwrap()).unwrap(), ack);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IssuanceAcknowledgment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ack_ids: Vec<String>,
    #[serde(alias = "credential_ack_endpoint")]
    pub notification_endpoint: String,
    pub issuer_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<AuthToken>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub interaction_details: Map<String, Json>,
}

impl IssuanceAcknowledgment {
    pub fn serialize(&self) -> WalletResult<String> {
        serde_json::to_string(self).wallet_err(Module::Issuance, ErrorKind::InvalidSdkUsage)
    }

    pub fn parse(json: &str) -> WalletResult<Self> {
        serde_json::from_str(json)
            .context("failed to parse acknowledgment")
            .wallet_err(Module::Issuance, ErrorKind::InvalidSdkUsage)
    }

    pub fn set_interaction_details(&mut self, details: Map<String, Json>) {
        self.interaction_details = details;
    }

    /// Notify the issuer about the first remaining notification id.
    ///
    /// The id is consumed even if the issuer rejects the notification. A
    /// failure here does not invalidate credentials already received.
    pub async fn acknowledge(
        &mut self,
        outcome: &IssuanceOutcome,
        http_client: &dyn AsyncHttpClient,
    ) -> WalletResult<()> {
        if self.ack_ids.is_empty() {
            return Err(WalletError::new(
                Module::Issuance,
                ErrorKind::InvalidSdkUsage,
                anyhow!("ack list is empty"),
            ));
        }
        let notification_id = self.ack_ids.remove(0);

        let trace = Trace::new();
        let (event, event_description) = outcome.event();
        let request = NotificationRequest {
            event,
            event_description,
            issuer_identifier: &self.issuer_uri,
            notification_id: &notification_id,
            interaction_details: (!self.interaction_details.is_empty())
                .then_some(&self.interaction_details),
        };

        debug!(%notification_id, event, "acknowledging issuance");

        Transport::new(http_client, &NoopLogger, &trace)
            .post_json(
                &self.notification_endpoint,
                &request,
                self.auth_token.as_ref().map(|t| t.access_token.as_str()),
                Call {
                    event: format!(
                        "Acknowledge issuer via an HTTP POST request to {}",
                        self.notification_endpoint
                    ),
                    parent_event: "",
                    endpoint: "issuer's notification endpoint",
                    accept: SUCCESS,
                },
            )
            .await
            .with_context(|| format!("send acknowledge request id {notification_id}"))
            .map_err(|e| {
                WalletError::new(Module::Issuance, ErrorKind::AcknowledgmentFailed, e)
                    .with_trace_id(trace.trace_id())
            })?;

        Ok(())
    }
}
