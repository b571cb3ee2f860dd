use std::time::Instant;

use anyhow::{anyhow, Context};
use serde_json::{json, Map};
use tracing::{debug, info};
use url::Url;

use super::{
    acknowledgment::IssuanceAcknowledgment,
    authorization::{AuthorizationState, AuthorizationTarget},
    config::ClientConfig,
    credential_request::{
        proof_retry_nonce, request_credentials, CredentialEndpoints, CredentialResponse,
        RequestedCredential,
    },
    metadata::{fetch_issuer_metadata, fetch_openid_config, IssuerMetadata, OpenIdConfig},
    proof::ProofBuilder,
    token::{AuthToken, TokenRequest, TokenResponse},
};
use crate::{
    core::util::Transport,
    credential::{Credential, ParseContext},
    error::{ErrorKind, Module, WalletError, WalletResult},
    logging::{Activity, MetricsEvent},
    signer::{Signer, VerificationMethod},
    trace::Trace,
    trust::{check_linked_domains, LinkedDomainsValidation},
};

pub(crate) const REQUEST_CREDENTIAL_EVENT: &str = "Request credential(s) from issuer";
pub(crate) const NEW_INTERACTION_EVENT: &str = "Instantiating OpenID4CI interaction object";
const GET_ISSUER_METADATA_EVENT: &str = "Get issuer metadata";
const ISSUANCE_OPERATION: &str = "oidc-issuance";

/// State shared by issuer- and wallet-initiated issuance.
///
/// Moves forward only: metadata, then (optionally) the authorization URL,
/// then the access token, then credentials and notification ids.
pub(crate) struct IssuanceSession {
    issuer_uri: String,
    config: ClientConfig,
    trace: Trace,
    metadata: Option<IssuerMetadata>,
    openid_config: Option<OpenIdConfig>,
    authorization: Option<AuthorizationState>,
    token: Option<TokenResponse>,
    notification_ids: Vec<String>,
}

impl IssuanceSession {
    pub fn new(issuer_uri: impl Into<String>, config: ClientConfig, trace: Trace) -> Self {
        Self {
            issuer_uri: issuer_uri.into(),
            config,
            trace,
            metadata: None,
            openid_config: None,
            authorization: None,
            token: None,
            notification_ids: Vec::new(),
        }
    }

    pub fn issuer_uri(&self) -> &str {
        &self.issuer_uri
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn transport(&self) -> Transport<'_> {
        Transport::new(
            self.config.http_client.as_ref(),
            self.config.metrics_logger.as_ref(),
            &self.trace,
        )
    }

    /// An issuance error tagged with this interaction's trace id.
    pub fn error(&self, kind: ErrorKind, cause: impl Into<anyhow::Error>) -> WalletError {
        WalletError::new(Module::Issuance, kind, cause).with_trace_id(self.trace.trace_id())
    }

    pub fn tag(&self, err: WalletError) -> WalletError {
        err.with_trace_id(self.trace.trace_id())
    }

    /// Fail early on a key the wallet cannot sign proofs with.
    pub fn check_signing_method(&self, method: &VerificationMethod) -> WalletResult<()> {
        method
            .did()
            .map_err(|e| self.error(ErrorKind::KeyIdMissingDidPart, e))?;
        method
            .algorithm()
            .map_err(|e| self.error(ErrorKind::UnsupportedAlgorithm, e))?;
        Ok(())
    }

    pub fn log_metrics(&self, event: &str, parent_event: &str, started: Instant) {
        self.config.metrics_logger.log(&MetricsEvent {
            event: event.to_owned(),
            parent_event: parent_event.to_owned(),
            duration: started.elapsed(),
        });
    }

    /// Issuer metadata, fetched on first use and kept for the interaction's lifetime.
    pub async fn metadata(&mut self, parent_event: &str) -> WalletResult<&IssuerMetadata> {
        let metadata = match self.metadata.take() {
            Some(metadata) => metadata,
            None => fetch_issuer_metadata(
                &self.issuer_uri,
                self.transport(),
                self.config.did_resolver.as_ref(),
                parent_event,
            )
            .await
            .map_err(|e| {
                self.error(
                    ErrorKind::MetadataFetchFailed,
                    e.context("failed to fetch issuer metadata"),
                )
            })?,
        };

        Ok(self.metadata.insert(metadata))
    }

    pub async fn issuer_metadata(&mut self) -> WalletResult<IssuerMetadata> {
        self.metadata(GET_ISSUER_METADATA_EVENT).await.cloned()
    }

    /// The authorization server's OpenID configuration, fetched on first use.
    pub async fn openid_config(&mut self, parent_event: &str) -> WalletResult<&OpenIdConfig> {
        let config = match self.openid_config.take() {
            Some(config) => config,
            None => {
                let base_url = self
                    .metadata(parent_event)
                    .await?
                    .authorization_server_url()
                    .to_owned();

                fetch_openid_config(&base_url, self.transport(), parent_event)
                    .await
                    .map_err(|e| {
                        self.error(
                            ErrorKind::IssuerOpenIdConfigFetchFailed,
                            e.context("failed to fetch issuer's OpenID configuration"),
                        )
                    })?
            }
        };

        Ok(self.openid_config.insert(config))
    }

    pub async fn dynamic_client_registration_supported(&mut self) -> WalletResult<bool> {
        Ok(self
            .openid_config(GET_ISSUER_METADATA_EVENT)
            .await?
            .registration_endpoint
            .is_some())
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> WalletResult<String> {
        let endpoint = self
            .openid_config(GET_ISSUER_METADATA_EVENT)
            .await?
            .registration_endpoint
            .clone();

        endpoint.ok_or_else(|| {
            self.error(
                ErrorKind::InvalidSdkUsage,
                anyhow!("issuer does not support dynamic client registration"),
            )
        })
    }

    /// Build the URL that starts the authorization code flow.
    ///
    /// Calling this again replaces the stored state, so only the redirect of
    /// the most recent URL is accepted.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        requested: &RequestedCredential,
        issuer_state: Option<&str>,
        scopes: &[String],
    ) -> WalletResult<String> {
        let metadata = self.metadata(REQUEST_CREDENTIAL_EVENT).await?;
        let location = (metadata.authorization_server.is_some()
            || !metadata.authorization_servers.is_empty())
        .then(|| metadata.credential_issuer.clone());
        let fallback_endpoint = metadata.authorization_server.clone();

        let discovered = self
            .openid_config(REQUEST_CREDENTIAL_EVENT)
            .await?
            .authorization_endpoint
            .clone();

        let authorization_endpoint = discovered.or(fallback_endpoint).ok_or_else(|| {
            self.error(
                ErrorKind::IssuerOpenIdConfigFetchFailed,
                anyhow!("issuer's OpenID configuration has no authorization endpoint"),
            )
        })?;

        let state = AuthorizationState::new(client_id, redirect_uri);
        let url = state
            .authorization_url(
                &authorization_endpoint,
                &AuthorizationTarget {
                    format: &requested.format,
                    types: &requested.types,
                    location: location.as_deref(),
                },
                issuer_state,
                scopes,
            )
            .map_err(|e| self.error(ErrorKind::InvalidSdkUsage, e))?;

        debug!(%authorization_endpoint, "created authorization URL");
        self.authorization = Some(state);

        Ok(url.to_string())
    }

    /// Exchange the authorization code carried by the redirect for an access token.
    pub async fn request_access_token(&mut self, redirect_uri_with_params: &str) -> WalletResult<()> {
        let Some(authorization) = self.authorization.clone() else {
            return Err(self.error(
                ErrorKind::AuthorizationUrlMustBeCreatedFirst,
                anyhow!("authorization URL must be created first"),
            ));
        };

        let code = authorization
            .code_from_redirect(redirect_uri_with_params)
            .map_err(|e| self.error(ErrorKind::TokenFetchFailed, e))?;

        let token_endpoint = self.token_endpoint().await?;

        let token = TokenRequest::authorization_code(
            &code,
            &authorization.redirect_uri,
            &authorization.client_id,
            &authorization.code_verifier,
        )
        .send(&token_endpoint, self.transport(), REQUEST_CREDENTIAL_EVENT)
        .await
        .map_err(|e| self.error(ErrorKind::TokenFetchFailed, e))?;

        self.token = Some(token);
        Ok(())
    }

    /// Exchange a pre-authorized code (and PIN) for an access token.
    pub async fn request_pre_authorized_token(
        &mut self,
        pre_authorized_code: &str,
        pin: Option<&str>,
        attestation_vp: Option<&str>,
    ) -> WalletResult<()> {
        let token_endpoint = self.token_endpoint().await?;

        let token = TokenRequest::pre_authorized(pre_authorized_code, pin, attestation_vp)
            .send(&token_endpoint, self.transport(), REQUEST_CREDENTIAL_EVENT)
            .await
            .map_err(|e| self.error(ErrorKind::TokenFetchFailed, e))?;

        self.token = Some(token);
        Ok(())
    }

    async fn token_endpoint(&mut self) -> WalletResult<String> {
        if let Some(endpoint) = &self.metadata(REQUEST_CREDENTIAL_EVENT).await?.token_endpoint {
            return Ok(endpoint.clone());
        }

        let endpoint = self
            .openid_config(REQUEST_CREDENTIAL_EVENT)
            .await?
            .token_endpoint
            .clone();

        endpoint.ok_or_else(|| {
            self.error(
                ErrorKind::TokenFetchFailed,
                anyhow!("issuer advertises no token endpoint"),
            )
        })
    }

    /// Request, receive and parse the credentials, then record the activity.
    ///
    /// Either every requested credential is returned or none is.
    pub async fn request_credentials(
        &mut self,
        requested: &[RequestedCredential],
        method: &VerificationMethod,
        signer: &dyn Signer,
    ) -> WalletResult<Vec<Credential>> {
        let started = Instant::now();

        let Some(token) = self.token.clone() else {
            return Err(self.error(
                ErrorKind::InvalidSdkUsage,
                anyhow!("no access token was obtained for this interaction"),
            ));
        };

        let metadata = self.metadata(REQUEST_CREDENTIAL_EVENT).await?;
        let credential_issuer = metadata.credential_issuer.clone();
        let credential_endpoint = metadata.credential_endpoint.clone();
        let batch_credential_endpoint = metadata.batch_credential_endpoint.clone();

        let client_id = self.authorization.as_ref().map(|a| a.client_id.clone());
        let proof = ProofBuilder {
            method,
            signer,
            audience: &self.issuer_uri,
            client_id: client_id.as_deref(),
        };
        let endpoints = CredentialEndpoints {
            credential_endpoint: &credential_endpoint,
            batch_credential_endpoint: batch_credential_endpoint.as_deref(),
        };

        let proof_jwt = proof
            .build(token.c_nonce.as_deref())
            .await
            .map_err(|e| self.error(ErrorKind::SigningFailed, e.context("failed to create JWT")))?;

        let responses = match request_credentials(
            requested,
            &proof_jwt,
            &token.access_token,
            &endpoints,
            self.transport(),
            REQUEST_CREDENTIAL_EVENT,
        )
        .await
        {
            Ok(responses) => responses,
            Err(e) => {
                let Some(fresh_nonce) = proof_retry_nonce(&e) else {
                    return Err(self.error(
                        ErrorKind::CredentialRequestFailed,
                        e.context("failed to get credential response"),
                    ));
                };

                info!("issuer rejected the proof, retrying once with a new nonce");
                let nonce = fresh_nonce.or_else(|| token.c_nonce.clone());
                let proof_jwt = proof.build(nonce.as_deref()).await.map_err(|e| {
                    self.error(ErrorKind::SigningFailed, e.context("failed to create JWT"))
                })?;

                request_credentials(
                    requested,
                    &proof_jwt,
                    &token.access_token,
                    &endpoints,
                    self.transport(),
                    REQUEST_CREDENTIAL_EVENT,
                )
                .await
                .map_err(|e| {
                    self.error(
                        ErrorKind::CredentialRequestFailed,
                        e.context("failed to get credential response"),
                    )
                })?
            }
        };

        let credentials = self.parse_credentials(requested, &responses).await?;

        self.notification_ids.extend(
            responses
                .iter()
                .filter_map(|r| r.notification_id.clone())
                .filter(|id| !id.is_empty()),
        );

        let subject_ids: Vec<String> = credentials.iter().flat_map(Credential::subject_ids).collect();

        self.log_metrics(REQUEST_CREDENTIAL_EVENT, "", started);

        let mut params = Map::new();
        params.insert("subjectIDs".to_owned(), json!(subject_ids));
        self.config.activity_logger.log(&Activity::credential_success(
            credential_issuer,
            ISSUANCE_OPERATION,
            params,
        ));

        info!(count = credentials.len(), "received credentials");
        Ok(credentials)
    }

    async fn parse_credentials(
        &self,
        requested: &[RequestedCredential],
        responses: &[CredentialResponse],
    ) -> WalletResult<Vec<Credential>> {
        let ctx = ParseContext {
            resolver: self.config.did_resolver.as_ref(),
            document_loader: self.config.document_loader.as_deref(),
            disable_proof_checks: self.config.disable_vc_proof_checks,
        };

        let total = responses.len();
        let mut credentials = Vec::with_capacity(total);

        for (index, response) in responses.iter().enumerate() {
            let started = Instant::now();

            let format = response
                .format
                .as_ref()
                .or(requested.get(index).map(|r| &r.format))
                .ok_or_else(|| {
                    self.error(
                        ErrorKind::CredentialParseFailed,
                        anyhow!("credential response at index {index} has no format"),
                    )
                })?;

            let credential = async {
                let value = response
                    .credential
                    .as_ref()
                    .context("credential response carries no credential")?;
                Credential::parse(format, value, ctx).await
            }
            .await
            .with_context(|| {
                format!("failed to parse credential from credential response at index {index}")
            })
            .map_err(|e| self.error(ErrorKind::CredentialParseFailed, e))?;

            self.log_metrics(
                &format!(
                    "Parsing and checking proof for received credential {} of {total}",
                    index + 1
                ),
                REQUEST_CREDENTIAL_EVENT,
                started,
            );

            credentials.push(credential);
        }

        Ok(credentials)
    }

    pub fn requires_acknowledgment(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.notification_endpoint.is_some())
            && !self.notification_ids.is_empty()
    }

    pub fn acknowledgment(&self) -> WalletResult<IssuanceAcknowledgment> {
        let notification_endpoint = self
            .metadata
            .as_ref()
            .and_then(|m| m.notification_endpoint.clone())
            .filter(|_| !self.notification_ids.is_empty())
            .ok_or_else(|| {
                self.error(
                    ErrorKind::InvalidSdkUsage,
                    anyhow!("issuer not support credential acknowledgement"),
                )
            })?;

        Ok(IssuanceAcknowledgment {
            ack_ids: self.notification_ids.clone(),
            notification_endpoint,
            issuer_uri: self.issuer_uri.clone(),
            auth_token: self.token.as_ref().map(AuthToken::from),
            interaction_details: Map::new(),
        })
    }

    /// Validate the linked domain of the DID that signed the issuer metadata.
    pub async fn verify_issuer(&mut self) -> WalletResult<String> {
        let did = self
            .metadata(GET_ISSUER_METADATA_EVENT)
            .await?
            .issuer_did()
            .map(str::to_owned)
            .ok_or_else(|| {
                self.error(
                    ErrorKind::DidServiceValidationFailed,
                    anyhow!("issuer metadata is not signed, so the issuer has no DID to verify"),
                )
            })?;

        let validation =
            check_linked_domains(&did, self.config.did_resolver.as_ref(), self.transport())
                .await
                .map_err(|e| self.tag(e))?;

        match validation {
            LinkedDomainsValidation {
                is_valid: true,
                service_url: Some(service_url),
            } => Ok(service_url),
            _ => Err(WalletError::new(
                Module::Did,
                ErrorKind::DidServiceValidationFailed,
                anyhow!("DID service validation failed: {did} is not linked to its domain"),
            )
            .with_trace_id(self.trace.trace_id())),
        }
    }

    /// Host of the credential issuer URL.
    pub fn issuer_domain(&self) -> String {
        Url::parse(&self.issuer_uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default()
    }
}
