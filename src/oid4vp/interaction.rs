use std::time::Instant;

use anyhow::{anyhow, Context};
use serde_json::{json, Map};
use tracing::{debug, info};

use super::{
    acknowledgment::PresentationAcknowledgment,
    config::{PresentCredentialOptions, PresentationConfig},
    presentation::ResponseBuilder,
    request_object::{verify_request_object, RequestObject, VerifierDisplayData, REQUEST_URI_PREFIX},
};
use crate::{
    core::{
        credential_format::ClaimFormatDesignation,
        presentation_definition::{Candidate, PresentationDefinition},
        util::{Call, Transport, SUCCESS},
    },
    credential::{load_contexts, Credential},
    error::{ErrorKind, Module, WalletError, WalletResult},
    logging::{Activity, MetricsEvent},
    oid4vci::attestation_vp,
    trace::Trace,
    trust::VerifierTrustInfo,
};

const GET_QUERY_EVENT: &str = "Get query";
const PRESENT_CREDENTIAL_EVENT: &str = "Present credential";
const PRESENTATION_OPERATION: &str = "oidc-presentation";

/// A single presentation to a verifier, started by its authorization request.
///
/// Construction fetches and verifies the request. Present once with
/// [Interaction::present_credential], or decline through
/// [Interaction::acknowledgment]. Not meant to be shared between tasks.
pub struct Interaction {
    request: RequestObject,
    config: PresentationConfig,
    trace: Trace,
    /// Set once a response was sent to the verifier, successfully or not.
    presented: bool,
}

impl Interaction {
    /// `authorization_request` is either a request object JWT or an
    /// `openid-vc://?request_uri=` URI pointing at one.
    pub async fn new(authorization_request: &str, config: PresentationConfig) -> WalletResult<Self> {
        let started = Instant::now();
        let trace = Trace::new();
        let error = |kind: ErrorKind, e: anyhow::Error| {
            WalletError::new(Module::Presentation, kind, e).with_trace_id(trace.trace_id())
        };

        let jwt = match authorization_request.strip_prefix(REQUEST_URI_PREFIX) {
            None => authorization_request.trim().to_owned(),
            Some(uri) => {
                let transport = Transport::new(
                    config.http_client.as_ref(),
                    config.metrics_logger.as_ref(),
                    &trace,
                );
                let body = transport
                    .get(
                        uri,
                        Call {
                            event: format!("Fetch request object via an HTTP GET request to {uri}"),
                            parent_event: GET_QUERY_EVENT,
                            endpoint: "verifier's request object endpoint",
                            accept: &[200],
                        },
                    )
                    .await
                    .context("fetch request object")
                    .map_err(|e| error(ErrorKind::RequestObjectFetchFailed, e))?;

                String::from_utf8(body)
                    .context("request object is not UTF-8")
                    .map_err(|e| error(ErrorKind::RequestObjectFetchFailed, e))?
                    .trim()
                    .to_owned()
            }
        };

        let request = verify_request_object(&jwt, config.did_resolver.as_ref())
            .await
            .context("verify authorization request")
            .map_err(|e| error(ErrorKind::InvalidAuthorizationRequest, e))?;
        info!(client_id = request.client_id(), "verified authorization request");

        config.metrics_logger.log(&MetricsEvent {
            event: GET_QUERY_EVENT.to_owned(),
            parent_event: String::new(),
            duration: started.elapsed(),
        });

        Ok(Self {
            request,
            config,
            trace,
            presented: false,
        })
    }

    /// The presentation definition of the verified request.
    pub fn get_query(&self) -> &PresentationDefinition {
        self.request.presentation_definition()
    }

    pub fn request_object(&self) -> &RequestObject {
        &self.request
    }

    /// Present `credentials`, which must satisfy the presentation definition.
    ///
    /// Credentials not selected by any input descriptor are left out of the
    /// response. An interaction presents at most once; a failed submission
    /// is retried with a new interaction.
    pub async fn present_credential(
        &mut self,
        credentials: &[Option<Credential>],
        opts: &PresentCredentialOptions,
    ) -> WalletResult<()> {
        if credentials.is_empty() {
            return Err(self.error(
                ErrorKind::InvalidSdkUsage,
                anyhow!("expected at least one credential to present to verifier"),
            ));
        }

        let credentials = credentials
            .iter()
            .enumerate()
            .map(|(index, c)| {
                c.clone().ok_or_else(|| {
                    self.error(
                        ErrorKind::InvalidSdkUsage,
                        anyhow!("credential objects cannot be nil (credential at index {index} is nil)"),
                    )
                })
            })
            .collect::<WalletResult<Vec<_>>>()?;

        self.present(&credentials, opts).await
    }

    /// Present a single credential the caller already checked against the
    /// presentation definition.
    pub async fn present_credential_unsafe(
        &mut self,
        credential: Credential,
        opts: &PresentCredentialOptions,
    ) -> WalletResult<()> {
        self.present(std::slice::from_ref(&credential), opts).await
    }

    async fn present(
        &mut self,
        credentials: &[Credential],
        opts: &PresentCredentialOptions,
    ) -> WalletResult<()> {
        let started = Instant::now();

        if self.presented {
            return Err(self.error(
                ErrorKind::InvalidSdkUsage,
                anyhow!("credentials were already presented in this interaction"),
            ));
        }

        opts.validate()
            .map_err(|e| self.error(ErrorKind::InvalidSdkUsage, e))?;
        let scope_claims = opts
            .parsed_scope_claims()
            .map_err(|e| self.error(ErrorKind::ScopeClaimParseFailed, e))?;

        if let Some(loader) = self.config.document_loader.as_deref() {
            for credential in credentials
                .iter()
                .filter(|c| *c.format() == ClaimFormatDesignation::LdpVc)
            {
                load_contexts(credential.claims(), loader)
                    .await
                    .map_err(|e| self.error(ErrorKind::CredentialParseFailed, e))?;
            }
        }

        let candidates: Vec<Candidate<'_>> = credentials
            .iter()
            .map(|c| Candidate {
                format: c.format(),
                claims: c.claims(),
            })
            .collect();
        let matches = self
            .request
            .presentation_definition()
            .match_candidates(&candidates)
            .context("credentials do not satisfy the presentation definition")
            .map_err(|e| self.error(ErrorKind::NoMatchingCredential, e))?;

        let attestation = match (&opts.attestation_vc, &opts.attestation_signer) {
            (Some(vc), Some(attestation_signer)) => Some(
                attestation_vp(
                    vc,
                    &attestation_signer.method,
                    attestation_signer.signer.as_ref(),
                    Some(self.request.client_id()),
                    Some(self.request.nonce()),
                )
                .await
                .map_err(|e| self.error(ErrorKind::SigningFailed, e))?,
            ),
            _ => None,
        };

        let mut response = ResponseBuilder {
            request: &self.request,
            resolver: self.config.did_resolver.as_ref(),
            signer: self.config.signer.as_ref(),
            signing_method: opts.signing_method.as_ref(),
        }
        .build(credentials, &matches, scope_claims, attestation)
        .await
        .context("create authorized response failed")
        .map_err(|e| self.error(ErrorKind::SigningFailed, e))?;

        if !opts.interaction_details.is_empty() {
            response.interaction_details = Some(
                serde_json::to_string(&opts.interaction_details)
                    .map_err(|e| self.error(ErrorKind::InvalidSdkUsage, e))?,
            );
        }

        let response_uri = self.request.response_uri().as_str();
        debug!(%response_uri, "sending authorized response");

        self.presented = true;
        self.transport()
            .post_form(
                response_uri,
                &response,
                Call {
                    event: format!(
                        "Send authorized response via an HTTP POST request to {response_uri}"
                    ),
                    parent_event: PRESENT_CREDENTIAL_EVENT,
                    endpoint: "verifier's response endpoint",
                    accept: SUCCESS,
                },
            )
            .await
            .context("send authorized response")
            .map_err(|e| self.error(ErrorKind::PresentationSubmitFailed, e))?;

        self.config.metrics_logger.log(&MetricsEvent {
            event: PRESENT_CREDENTIAL_EVENT.to_owned(),
            parent_event: String::new(),
            duration: started.elapsed(),
        });

        let subject_ids: Vec<String> = matches
            .selected()
            .into_iter()
            .filter_map(|i| credentials.get(i))
            .flat_map(Credential::subject_ids)
            .collect();
        let mut params = Map::new();
        params.insert("subjectIDs".into(), json!(subject_ids));

        self.config.activity_logger.log(&Activity::credential_success(
            self.request.display().name.clone().unwrap_or_default(),
            PRESENTATION_OPERATION,
            params,
        ));

        info!("presented credentials to verifier");
        Ok(())
    }

    /// Verifier identity for trust decisions. No network access.
    pub fn trust_info(&self) -> VerifierTrustInfo {
        VerifierTrustInfo {
            did: self.request.signer_did().to_owned(),
            domain: self
                .request
                .response_uri()
                .host_str()
                .unwrap_or_default()
                .to_owned(),
        }
    }

    pub fn verifier_display_data(&self) -> VerifierDisplayData {
        self.request.display().clone()
    }

    /// Declining the request, to be sent instead of presenting.
    pub fn acknowledgment(&self) -> PresentationAcknowledgment {
        PresentationAcknowledgment {
            response_uri: self.request.response_uri().to_string(),
            state: self.request.state().map(str::to_owned),
            interaction_details: Map::new(),
        }
    }

    /// Id shared by every request and error of this interaction.
    pub fn trace_id(&self) -> String {
        self.trace.trace_id()
    }

    fn transport(&self) -> Transport<'_> {
        Transport::new(
            self.config.http_client.as_ref(),
            self.config.metrics_logger.as_ref(),
            &self.trace,
        )
    }

    fn error(&self, kind: ErrorKind, cause: impl Into<anyhow::Error>) -> WalletError {
        WalletError::new(Module::Presentation, kind, cause).with_trace_id(self.trace.trace_id())
    }
}
