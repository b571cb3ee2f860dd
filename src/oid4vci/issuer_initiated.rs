use std::time::Instant;

use anyhow::{anyhow, Context};
use tracing::{debug, info};

use super::{
    acknowledgment::IssuanceAcknowledgment,
    config::{ClientConfig, CreateAuthorizationUrlOptions, RequestCredentialOptions},
    credential_request::RequestedCredential,
    grants::{AuthorizationCodeGrantParams, PreAuthorizedCodeGrantParams},
    interaction::{IssuanceSession, NEW_INTERACTION_EVENT, REQUEST_CREDENTIAL_EVENT},
    metadata::{IssuerCapabilities, IssuerMetadata},
    offer::{CredentialOffer, OfferIndirection},
    proof::attestation_vp,
};
use crate::{
    core::util::{Call, Transport},
    credential::Credential,
    error::{ErrorKind, Module, WalletError, WalletResult},
    signer::{Signer, VerificationMethod},
    trace::Trace,
    trust::{IssuerTrustInfo, OfferedCredential},
};

/// A single issuance, started by a credential offer the issuer sent to the wallet.
///
/// Drive it through one flow (pre-authorized or authorization code) and then
/// discard it. Not meant to be shared between tasks.
pub struct IssuerInitiatedInteraction {
    session: IssuanceSession,
    offer: CredentialOffer,
    requested: Vec<RequestedCredential>,
}

impl IssuerInitiatedInteraction {
    /// Parse the offer in `initiate_issuance_uri`, fetch the issuer metadata,
    /// and check that every offered configuration can be issued.
    pub async fn new(initiate_issuance_uri: &str, config: ClientConfig) -> WalletResult<Self> {
        let started = Instant::now();
        let trace = Trace::new();

        let offer = fetch_offer(initiate_issuance_uri, &config, &trace).await?;
        debug!(issuer = %offer.credential_issuer, "parsed credential offer");

        let mut session = IssuanceSession::new(offer.credential_issuer.clone(), config, trace);

        let metadata = session.metadata(NEW_INTERACTION_EVENT).await?;
        let requested =
            requested_credentials(&offer, metadata).map_err(|(kind, e)| session.error(kind, e))?;

        session.log_metrics(NEW_INTERACTION_EVENT, "", started);

        Ok(Self {
            session,
            offer,
            requested,
        })
    }

    /// First step of the authorization code flow: the URL to open in a browser.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        opts: &CreateAuthorizationUrlOptions,
    ) -> WalletResult<String> {
        self.require_authorization_code_grant()?;

        let issuer_state = self
            .offer
            .grants
            .resolve_issuer_state(opts.issuer_state.as_deref())
            .map_err(|e| self.session.tag(e))?;

        let Some(first) = self.requested.first().cloned() else {
            return Err(self.session.error(
                ErrorKind::InvalidCredentialOffer,
                anyhow!("credential offer names no credential configurations"),
            ));
        };

        self.session
            .create_authorization_url(
                client_id,
                redirect_uri,
                &first,
                issuer_state.as_deref(),
                &opts.scopes,
            )
            .await
    }

    /// Redeem the pre-authorized code and request every offered credential.
    pub async fn request_credential_with_pre_auth(
        &mut self,
        method: &VerificationMethod,
        signer: &dyn Signer,
        opts: &RequestCredentialOptions,
    ) -> WalletResult<Vec<Credential>> {
        let grant = self
            .offer
            .grants
            .pre_authorized_code_params()
            .map_err(|e| self.session.tag(e))?;

        if grant.pin_required() && opts.pin().is_none() {
            return Err(self.session.error(
                ErrorKind::PinRequired,
                anyhow!("the credential offer requires a user PIN, but none was provided"),
            ));
        }

        opts.validate()
            .map_err(|e| self.session.error(ErrorKind::InvalidSdkUsage, e))?;
        self.session.check_signing_method(method)?;

        let attestation = match (&opts.attestation_vc, &opts.attestation_signer) {
            (Some(vc), Some(attestation_signer)) => {
                let audience = self
                    .session
                    .metadata(REQUEST_CREDENTIAL_EVENT)
                    .await?
                    .issuer_did()
                    .map(str::to_owned);

                Some(
                    attestation_vp(
                        vc,
                        &attestation_signer.method,
                        attestation_signer.signer.as_ref(),
                        audience.as_deref(),
                        Some(grant.pre_authorized_code()),
                    )
                    .await
                    .map_err(|e| self.session.error(ErrorKind::SigningFailed, e))?,
                )
            }
            _ => None,
        };

        self.session
            .request_pre_authorized_token(
                grant.pre_authorized_code(),
                opts.pin(),
                attestation.as_deref(),
            )
            .await?;

        info!("redeemed pre-authorized code");
        self.session
            .request_credentials(&self.requested, method, signer)
            .await
    }

    /// Final step of the authorization code flow.
    ///
    /// `redirect_uri_with_params` is the redirect URI the authorization server
    /// sent the user back to, with its `code` and `state` query parameters.
    pub async fn request_credential_with_auth(
        &mut self,
        method: &VerificationMethod,
        signer: &dyn Signer,
        redirect_uri_with_params: &str,
    ) -> WalletResult<Vec<Credential>> {
        self.require_authorization_code_grant()?;
        self.session.check_signing_method(method)?;

        self.session
            .request_access_token(redirect_uri_with_params)
            .await?;

        self.session
            .request_credentials(&self.requested, method, signer)
            .await
    }

    fn require_authorization_code_grant(&self) -> WalletResult<()> {
        match self.offer.grants.authorization_code_supported() {
            true => Ok(()),
            false => Err(self.session.error(
                ErrorKind::IssuerDoesNotSupportAuthCodeGrant,
                anyhow!("issuer does not support the authorization code grant type"),
            )),
        }
    }

    pub fn issuer_uri(&self) -> &str {
        self.session.issuer_uri()
    }

    pub fn pre_authorized_code_grant_type_supported(&self) -> bool {
        self.offer.grants.pre_authorized_code_supported()
    }

    pub fn pre_authorized_code_grant_params(&self) -> WalletResult<PreAuthorizedCodeGrantParams> {
        self.offer
            .grants
            .pre_authorized_code_params()
            .map_err(|e| self.session.tag(e))
    }

    pub fn authorization_code_grant_type_supported(&self) -> bool {
        self.offer.grants.authorization_code_supported()
    }

    pub fn authorization_code_grant_params(&self) -> WalletResult<AuthorizationCodeGrantParams> {
        self.offer
            .grants
            .authorization_code_params()
            .map_err(|e| self.session.tag(e))
    }

    pub fn capabilities(&self) -> IssuerCapabilities {
        IssuerCapabilities {
            pre_authorized_code_supported: self.pre_authorized_code_grant_type_supported(),
            authorization_code_supported: self.authorization_code_grant_type_supported(),
        }
    }

    pub fn credential_configuration_ids(&self) -> &[String] {
        &self.offer.credential_configuration_ids
    }

    /// Types of each offered credential, in offer order.
    pub fn offered_credentials_types(&self) -> Vec<Vec<String>> {
        self.requested.iter().map(|r| r.types.clone()).collect()
    }

    pub async fn dynamic_client_registration_supported(&mut self) -> WalletResult<bool> {
        self.session.dynamic_client_registration_supported().await
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> WalletResult<String> {
        self.session.dynamic_client_registration_endpoint().await
    }

    /// Issuer metadata. Fetched once per interaction.
    pub async fn issuer_metadata(&mut self) -> WalletResult<IssuerMetadata> {
        self.session.issuer_metadata().await
    }

    /// Validate the issuer's linked domain; returns the verified service URL.
    pub async fn verify_issuer(&mut self) -> WalletResult<String> {
        self.session.verify_issuer().await
    }

    pub async fn issuer_trust_info(&mut self) -> WalletResult<IssuerTrustInfo> {
        let metadata = self.session.metadata(REQUEST_CREDENTIAL_EVENT).await?;
        let did = metadata.issuer_did().unwrap_or_default().to_owned();
        let client_attestation_requested = metadata.client_attestation_requested();

        Ok(IssuerTrustInfo {
            did,
            domain: self.session.issuer_domain(),
            credential_offers: self
                .requested
                .iter()
                .map(|r| OfferedCredential {
                    credential_type: r.types.last().cloned().unwrap_or_default(),
                    credential_format: r.format.name().to_owned(),
                    client_attestation_requested,
                })
                .collect(),
        })
    }

    /// Whether the issuer expects to be told if the credentials were accepted.
    pub fn requires_acknowledgment(&self) -> bool {
        self.session.requires_acknowledgment()
    }

    pub fn acknowledgment(&self) -> WalletResult<IssuanceAcknowledgment> {
        self.session.acknowledgment()
    }

    /// Id shared by every request and error of this interaction.
    pub fn trace_id(&self) -> String {
        self.session.trace().trace_id()
    }
}

async fn fetch_offer(
    initiate_issuance_uri: &str,
    config: &ClientConfig,
    trace: &Trace,
) -> WalletResult<CredentialOffer> {
    let error = |kind: ErrorKind, e: anyhow::Error| {
        WalletError::new(Module::Issuance, kind, e).with_trace_id(trace.trace_id())
    };

    let json = match OfferIndirection::from_uri(initiate_issuance_uri)
        .map_err(|e| error(ErrorKind::InvalidIssuanceUri, e))?
    {
        OfferIndirection::ByValue(json) => json.into_bytes(),
        OfferIndirection::ByReference(uri) => {
            let transport = Transport::new(
                config.http_client.as_ref(),
                config.metrics_logger.as_ref(),
                trace,
            );

            transport
                .get(
                    &uri,
                    Call {
                        event: format!("Fetch credential offer via an HTTP GET request to {uri}"),
                        parent_event: NEW_INTERACTION_EVENT,
                        endpoint: "credential offer endpoint",
                        accept: &[200],
                    },
                )
                .await
                .context(
                    "failed to get credential offer from the endpoint specified in the \
                     credential_offer_uri URL query parameter",
                )
                .map_err(|e| error(ErrorKind::InvalidCredentialOffer, e))?
        }
    };

    CredentialOffer::from_json(&json).map_err(|e| error(ErrorKind::InvalidCredentialOffer, e))
}

/// Resolve every offered configuration id against the issuer's metadata.
fn requested_credentials(
    offer: &CredentialOffer,
    metadata: &IssuerMetadata,
) -> Result<Vec<RequestedCredential>, (ErrorKind, anyhow::Error)> {
    offer
        .credential_configuration_ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let configuration = metadata.credential_configurations_supported.get(id).ok_or_else(|| {
                (
                    ErrorKind::InvalidCredentialConfigurationId,
                    anyhow!("invalid credential configuration ID ({id}) in credential offer"),
                )
            })?;

            if !configuration.format.is_issuable() {
                return Err((
                    ErrorKind::UnsupportedCredentialFormat,
                    anyhow!(
                        "unsupported credential format ({}) in credential offer at index {index} \
                         of credential_configurations_supported",
                        configuration.format
                    ),
                ));
            }

            Ok(RequestedCredential {
                format: configuration.format.clone(),
                types: configuration.types(),
                contexts: configuration.contexts(),
            })
        })
        .collect()
}
