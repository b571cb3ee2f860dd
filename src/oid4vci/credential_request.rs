use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::{
    core::{
        credential_format::ClaimFormatDesignation,
        util::{Call, Transport},
    },
    error::ServerError,
};

const FETCH_CREDENTIAL_EVENT: &str = "Fetch credential";

/// One credential the wallet asks the issuer for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestedCredential {
    pub format: ClaimFormatDesignation,
    pub types: Vec<String>,
    /// JSON-LD contexts, `ldp_vc` only.
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Proof {
    proof_type: String,
    jwt: String,
}

/// Body of a credential request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CredentialRequest {
    format: ClaimFormatDesignation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential_definition: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    doctype: Option<String>,
    proof: Proof,
}

impl CredentialRequest {
    pub fn new(requested: &RequestedCredential, proof_jwt: &str) -> Self {
        let leaf_type = requested.types.last().cloned();

        let (credential_definition, vct, doctype) = match &requested.format {
            ClaimFormatDesignation::VcSdJwt => (None, leaf_type, None),
            ClaimFormatDesignation::MsoMDoc => (None, None, leaf_type),
            ClaimFormatDesignation::LdpVc if !requested.contexts.is_empty() => (
                Some(json!({"@context": requested.contexts, "type": requested.types})),
                None,
                None,
            ),
            _ => (Some(json!({"type": requested.types})), None, None),
        };

        Self {
            format: requested.format.clone(),
            credential_definition,
            vct,
            doctype,
            proof: Proof {
                proof_type: "jwt".to_owned(),
                jwt: proof_jwt.to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct BatchCredentialRequest {
    credential_requests: Vec<CredentialRequest>,
}

/// A credential endpoint response (or one entry of a batch response).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct CredentialResponse {
    /// Absent for deferred issuance.
    #[serde(default)]
    pub credential: Option<Json>,
    #[serde(default)]
    pub format: Option<ClaimFormatDesignation>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default, alias = "ack_id")]
    pub notification_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct BatchCredentialResponse {
    #[serde(default)]
    credential_responses: Vec<CredentialResponse>,
    #[serde(default)]
    c_nonce: Option<String>,
}

/// Where and how credential requests are sent.
pub(crate) struct CredentialEndpoints<'a> {
    pub credential_endpoint: &'a str,
    pub batch_credential_endpoint: Option<&'a str>,
}

/// Request every credential in `requested` with the same proof.
///
/// A batch request is used when more than one credential is requested and the
/// issuer advertises a batch endpoint; otherwise one request per credential.
pub(crate) async fn request_credentials(
    requested: &[RequestedCredential],
    proof_jwt: &str,
    access_token: &str,
    endpoints: &CredentialEndpoints<'_>,
    transport: Transport<'_>,
    parent_event: &str,
) -> Result<Vec<CredentialResponse>> {
    let total = requested.len();

    if let Some(batch_endpoint) = endpoints.batch_credential_endpoint.filter(|_| total > 1) {
        debug!(total, %batch_endpoint, "using batch credential endpoint");

        let request = BatchCredentialRequest {
            credential_requests: requested
                .iter()
                .map(|r| CredentialRequest::new(r, proof_jwt))
                .collect(),
        };

        let body = transport
            .post_json(
                batch_endpoint,
                &request,
                Some(access_token),
                Call {
                    event: format!(
                        "{FETCH_CREDENTIAL_EVENT} {total} of {total} via an HTTP POST request to {batch_endpoint}"
                    ),
                    parent_event,
                    endpoint: "issuer's batch credential endpoint",
                    accept: &[200, 201],
                },
            )
            .await?;

        let response: BatchCredentialResponse = serde_json::from_slice(&body)
            .context("failed to unmarshal response from the issuer's batch credential endpoint")?;

        if response.credential_responses.len() != total {
            bail!(
                "issuer's batch credential endpoint returned {} credential responses, expected {total}",
                response.credential_responses.len()
            );
        }

        return Ok(response
            .credential_responses
            .into_iter()
            .map(|mut r| {
                r.c_nonce = r.c_nonce.or_else(|| response.c_nonce.clone());
                r
            })
            .collect());
    }

    let mut responses = Vec::with_capacity(total);
    for (index, r) in requested.iter().enumerate() {
        let endpoint = endpoints.credential_endpoint;

        let body = transport
            .post_json(
                endpoint,
                &CredentialRequest::new(r, proof_jwt),
                Some(access_token),
                Call {
                    event: format!(
                        "{FETCH_CREDENTIAL_EVENT} {} of {total} via an HTTP POST request to {endpoint}",
                        index + 1
                    ),
                    parent_event,
                    endpoint: "issuer's credential endpoint",
                    accept: &[200, 201],
                },
            )
            .await?;

        responses.push(
            serde_json::from_slice(&body)
                .context("failed to unmarshal response from the issuer's credential endpoint")?,
        );
    }

    Ok(responses)
}

/// The fresh nonce to retry with, if `err` is an `invalid_or_missing_proof` rejection.
pub(crate) fn proof_retry_nonce(err: &anyhow::Error) -> Option<Option<String>> {
    err.chain()
        .find_map(|e| e.downcast_ref::<ServerError>())
        .filter(|server| server.is_invalid_proof())
        .map(|server| server.c_nonce.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(format: ClaimFormatDesignation, types: &[&str]) -> RequestedCredential {
        RequestedCredential {
            format,
            types: types.iter().map(|t| t.to_string()).collect(),
            contexts: vec![],
        }
    }

    #[test]
    fn request_body_per_format() {
        let body = serde_json::to_value(CredentialRequest::new(
            &requested(
                ClaimFormatDesignation::JwtVcJson,
                &["VerifiableCredential", "UniversityDegree"],
            ),
            "proof.jwt",
        ))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "format": "jwt_vc_json",
                "credential_definition": {"type": ["VerifiableCredential", "UniversityDegree"]},
                "proof": {"proof_type": "jwt", "jwt": "proof.jwt"}
            })
        );

        let body = serde_json::to_value(CredentialRequest::new(
            &requested(ClaimFormatDesignation::VcSdJwt, &["PID"]),
            "p",
        ))
        .unwrap();
        assert_eq!(body["vct"], "PID");
        assert!(body.get("credential_definition").is_none());

        let mut ldp = requested(ClaimFormatDesignation::LdpVc, &["VerifiableCredential"]);
        ldp.contexts = vec!["https://www.w3.org/2018/credentials/v1".into()];
        let body = serde_json::to_value(CredentialRequest::new(&ldp, "p")).unwrap();
        assert_eq!(
            body["credential_definition"]["@context"][0],
            "https://www.w3.org/2018/credentials/v1"
        );
    }

    #[test]
    fn legacy_ack_id() {
        let response: CredentialResponse =
            serde_json::from_str(r#"{"credential":"a.b.c","ack_id":"ack-1"}"#).unwrap();
        assert_eq!(response.notification_id.as_deref(), Some("ack-1"));
    }

    #[test]
    fn retry_nonce_only_for_proof_errors() {
        let proof_error: anyhow::Error = ServerError::from_response(
            400,
            "issuer's credential endpoint",
            br#"{"error":"invalid_or_missing_proof","c_nonce":"fresh"}"#,
        )
        .into();
        assert_eq!(
            proof_retry_nonce(&proof_error.context("request failed")),
            Some(Some("fresh".to_owned()))
        );

        let other: anyhow::Error = ServerError::from_response(
            400,
            "issuer's credential endpoint",
            br#"{"error":"invalid_token"}"#,
        )
        .into();
        assert_eq!(proof_retry_nonce(&other), None);
    }
}
