use std::time::Instant;

use anyhow::anyhow;

use super::{
    config::{ClientConfig, CreateAuthorizationUrlOptions},
    credential_request::RequestedCredential,
    interaction::{IssuanceSession, NEW_INTERACTION_EVENT},
    metadata::IssuerMetadata,
};
use crate::{
    core::credential_format::ClaimFormatDesignation,
    credential::Credential,
    error::{ErrorKind, WalletResult},
    signer::{Signer, VerificationMethod},
    trace::Trace,
};

/// A credential type the issuer can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedCredential {
    pub format: ClaimFormatDesignation,
    pub types: Vec<String>,
}

/// Issuance started by the wallet, without a credential offer.
///
/// Only the authorization code flow is available: pick a credential from
/// [WalletInitiatedInteraction::supported_credentials], open the URL from
/// [WalletInitiatedInteraction::create_authorization_url], then call
/// [WalletInitiatedInteraction::request_credential] with the redirect.
pub struct WalletInitiatedInteraction {
    session: IssuanceSession,
    requested: Option<RequestedCredential>,
}

impl WalletInitiatedInteraction {
    /// Issuer metadata is only fetched once an operation needs it.
    pub fn new(issuer_uri: &str, config: ClientConfig) -> Self {
        let started = Instant::now();
        let session = IssuanceSession::new(issuer_uri, config, Trace::new());
        session.log_metrics(NEW_INTERACTION_EVENT, "", started);

        Self {
            session,
            requested: None,
        }
    }

    pub async fn supported_credentials(&mut self) -> WalletResult<Vec<SupportedCredential>> {
        let metadata = self.session.metadata(NEW_INTERACTION_EVENT).await?;

        Ok(metadata
            .credential_configurations_supported
            .values()
            .map(|configuration| SupportedCredential {
                format: configuration.format.clone(),
                types: configuration.types(),
            })
            .collect())
    }

    /// The URL to open in a browser to log in at the issuer.
    ///
    /// `format` and `types` select the credential that
    /// [WalletInitiatedInteraction::request_credential] will ask for.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        format: ClaimFormatDesignation,
        types: Vec<String>,
        opts: &CreateAuthorizationUrlOptions,
    ) -> WalletResult<String> {
        if !format.is_issuable() {
            return Err(self.session.error(
                ErrorKind::UnsupportedCredentialFormat,
                anyhow!("unsupported credential format ({format})"),
            ));
        }

        let contexts = self
            .session
            .metadata(NEW_INTERACTION_EVENT)
            .await?
            .credential_configurations_supported
            .values()
            .find(|c| c.format == format && c.types() == types)
            .map(|c| c.contexts())
            .unwrap_or_default();

        let requested = RequestedCredential {
            format,
            types,
            contexts,
        };

        let url = self
            .session
            .create_authorization_url(
                client_id,
                redirect_uri,
                &requested,
                opts.issuer_state.as_deref(),
                &opts.scopes,
            )
            .await?;

        self.requested = Some(requested);
        Ok(url)
    }

    /// Exchange the authorization code in `redirect_uri_with_params` and
    /// request the credential chosen in `create_authorization_url`.
    pub async fn request_credential(
        &mut self,
        method: &VerificationMethod,
        signer: &dyn Signer,
        redirect_uri_with_params: &str,
    ) -> WalletResult<Vec<Credential>> {
        let Some(requested) = self.requested.clone() else {
            return Err(self.session.error(
                ErrorKind::AuthorizationUrlMustBeCreatedFirst,
                anyhow!("authorization URL must be created first"),
            ));
        };

        self.session.check_signing_method(method)?;
        self.session
            .request_access_token(redirect_uri_with_params)
            .await?;

        self.session
            .request_credentials(std::slice::from_ref(&requested), method, signer)
            .await
    }

    pub async fn dynamic_client_registration_supported(&mut self) -> WalletResult<bool> {
        self.session.dynamic_client_registration_supported().await
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> WalletResult<String> {
        self.session.dynamic_client_registration_endpoint().await
    }

    pub async fn issuer_metadata(&mut self) -> WalletResult<IssuerMetadata> {
        self.session.issuer_metadata().await
    }

    pub fn issuer_uri(&self) -> &str {
        self.session.issuer_uri()
    }

    pub fn trace_id(&self) -> String {
        self.session.trace().trace_id()
    }
}
