use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{IssuerTrustInfo, VerifierTrustInfo};
use crate::{
    core::util::{AsyncHttpClient, Call, Transport, SUCCESS},
    credential::Credential,
    error::{ErrorKind, Module, WalletError, WalletResult},
    logging::{MetricsLogger, NoopLogger},
    trace::Trace,
};

const EVALUATE_ISSUANCE_EVENT: &str = "Evaluate issuance";
const EVALUATE_PRESENTATION_EVENT: &str = "Evaluate presentation";

/// Policy decision of the trust registry.
///
/// `allowed: false` is a regular answer, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default, alias = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_reasons: Vec<String>,
    #[serde(default, alias = "payload", skip_serializing_if = "Option::is_none")]
    pub data: Option<EvaluationData>,
}

impl EvaluationResult {
    pub fn attestations_required(&self) -> &[String] {
        self.data
            .as_ref()
            .map(|d| d.attestations_required.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attestations_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_reasons: Vec<String>,
    #[serde(default, alias = "multiple_credential_allowed")]
    pub multiple_credentials_allowed: bool,
}

/// A credential type offered in an issuance request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfferedCredential {
    pub credential_type: String,
    pub credential_format: String,
    pub client_attestation_requested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuanceRequest {
    pub issuer_did: String,
    pub issuer_domain: String,
    pub credential_offers: Vec<OfferedCredential>,
}

impl From<&IssuerTrustInfo> for IssuanceRequest {
    fn from(info: &IssuerTrustInfo) -> Self {
        Self {
            issuer_did: info.did.clone(),
            issuer_domain: info.domain.clone(),
            credential_offers: info.credential_offers.clone(),
        }
    }
}

/// Summary of a credential the wallet is about to present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialClaims {
    pub credential_id: String,
    pub credential_types: Vec<String>,
    pub issuer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    pub credential_claim_keys: Vec<String>,
}

impl From<&Credential> for CredentialClaims {
    fn from(credential: &Credential) -> Self {
        Self {
            credential_id: credential.id().unwrap_or_default().to_owned(),
            credential_types: credential.types(),
            issuer_id: credential.issuer_id().unwrap_or_default().to_owned(),
            issuance_date: credential.issuance_date().map(str::to_owned),
            expiration_date: credential.expiration_date().map(str::to_owned),
            credential_claim_keys: credential.claim_keys(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationRequest {
    pub verifier_did: String,
    pub verifier_domain: String,
    #[serde(rename = "credential_metadata")]
    pub credential_claims: Vec<CredentialClaims>,
}

impl PresentationRequest {
    pub fn new(info: &VerifierTrustInfo, credentials: &[Credential]) -> Self {
        Self {
            verifier_did: info.did.clone(),
            verifier_domain: info.domain.clone(),
            credential_claims: credentials.iter().map(CredentialClaims::from).collect(),
        }
    }
}

/// Endpoints of the trust registry policy API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustRegistryConfig {
    pub evaluate_issuance_url: String,
    pub evaluate_presentation_url: String,
}

/// Client of an external trust registry.
///
/// Results are never cached: every call asks the registry again.
#[derive(Clone)]
pub struct TrustRegistry {
    config: TrustRegistryConfig,
    http_client: Arc<dyn AsyncHttpClient>,
    metrics_logger: Arc<dyn MetricsLogger>,
}

impl TrustRegistry {
    pub fn new(config: TrustRegistryConfig, http_client: Arc<dyn AsyncHttpClient>) -> Self {
        Self {
            config,
            http_client,
            metrics_logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_metrics_logger(mut self, metrics_logger: Arc<dyn MetricsLogger>) -> Self {
        self.metrics_logger = metrics_logger;
        self
    }

    pub async fn evaluate_issuance(&self, request: &IssuanceRequest) -> WalletResult<EvaluationResult> {
        self.evaluate(
            &self.config.evaluate_issuance_url,
            request,
            EVALUATE_ISSUANCE_EVENT,
        )
        .await
    }

    pub async fn evaluate_presentation(
        &self,
        request: &PresentationRequest,
    ) -> WalletResult<EvaluationResult> {
        self.evaluate(
            &self.config.evaluate_presentation_url,
            request,
            EVALUATE_PRESENTATION_EVENT,
        )
        .await
    }

    async fn evaluate(
        &self,
        url: &str,
        request: &impl Serialize,
        event: &str,
    ) -> WalletResult<EvaluationResult> {
        let trace = Trace::new();
        let transport = Transport::new(
            self.http_client.as_ref(),
            self.metrics_logger.as_ref(),
            &trace,
        );

        let result = async {
            let body = transport
                .post_json(
                    url,
                    request,
                    None,
                    Call {
                        event: format!("{event} via an HTTP POST request to {url}"),
                        parent_event: event,
                        endpoint: "trust registry",
                        accept: SUCCESS,
                    },
                )
                .await
                .with_context(|| format!("{} endpoint", event.to_lowercase()))?;

            serde_json::from_slice::<EvaluationResult>(&body)
                .with_context(|| format!("failed to unmarshal {} response", event.to_lowercase()))
        }
        .await
        .map_err(|e| {
            WalletError::new(Module::TrustRegistry, ErrorKind::TrustRegistryFetchFailed, e)
                .with_trace_id(trace.trace_id())
        })?;

        info!(allowed = result.allowed, %url, "trust registry evaluation");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn evaluation_result_field_names() {
        let result: EvaluationResult = serde_json::from_value(json!({
            "allowed": false,
            "errorCode": "unknown_issuer",
            "errorMessage": "issuer is not registered",
            "deny_reasons": ["unknown issuer"],
            "payload": {"attestations_required": ["wallet_authentication"], "multiple_credentials_allowed": true}
        }))
        .unwrap();

        assert!(!result.allowed);
        assert_eq!(result.error_code.as_deref(), Some("unknown_issuer"));
        assert_eq!(result.deny_reasons, vec!["unknown issuer"]);
        assert_eq!(result.attestations_required(), ["wallet_authentication"]);
        assert!(result.data.unwrap().multiple_credentials_allowed);

        let result: EvaluationResult = serde_json::from_value(json!({
            "allowed": true,
            "error_code": "",
            "data": {"multiple_credential_allowed": false}
        }))
        .unwrap();
        assert!(result.allowed);
        assert!(result.attestations_required().is_empty());
    }

    #[test]
    fn issuance_request_from_trust_info() {
        let info = IssuerTrustInfo {
            did: "did:example:issuer".into(),
            domain: "issuer.example".into(),
            credential_offers: vec![OfferedCredential {
                credential_type: "UniversityDegree".into(),
                credential_format: "jwt_vc_json".into(),
                client_attestation_requested: true,
            }],
        };

        let value = serde_json::to_value(IssuanceRequest::from(&info)).unwrap();
        assert_eq!(
            value,
            json!({
                "issuer_did": "did:example:issuer",
                "issuer_domain": "issuer.example",
                "credential_offers": [{
                    "credential_type": "UniversityDegree",
                    "credential_format": "jwt_vc_json",
                    "client_attestation_requested": true
                }]
            })
        );
    }
}
