use std::sync::Arc;

use anyhow::{bail, Result};

use crate::{
    core::util::AsyncHttpClient,
    credential::DocumentLoader,
    did::DidResolver,
    logging::{ActivityLogger, MetricsLogger, NoopLogger},
    signer::MethodSigner,
};

/// Collaborators of an issuance interaction.
///
/// ```ignore
/// let config = ClientConfig {
///     activity_logger: Arc::new(my_activity_log),
///     ..ClientConfig::new(resolver, http_client)
/// };
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub did_resolver: Arc<dyn DidResolver>,
    pub http_client: Arc<dyn AsyncHttpClient>,
    /// Defaults to [NoopLogger].
    pub activity_logger: Arc<dyn ActivityLogger>,
    /// Defaults to [NoopLogger].
    pub metrics_logger: Arc<dyn MetricsLogger>,
    /// Needed to resolve JSON-LD contexts of `ldp_vc` credentials.
    pub document_loader: Option<Arc<dyn DocumentLoader>>,
    /// Skip signature checks on received credentials.
    pub disable_vc_proof_checks: bool,
}

impl ClientConfig {
    pub fn new(did_resolver: Arc<dyn DidResolver>, http_client: Arc<dyn AsyncHttpClient>) -> Self {
        Self {
            did_resolver,
            http_client,
            activity_logger: Arc::new(NoopLogger),
            metrics_logger: Arc::new(NoopLogger),
            document_loader: None,
            disable_vc_proof_checks: false,
        }
    }
}

/// Options of `create_authorization_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateAuthorizationUrlOptions {
    /// OAuth2 scopes, joined with spaces in the `scope` parameter.
    pub scopes: Vec<String>,
    /// Only needed when the issuer requires one and the offer does not carry it.
    pub issuer_state: Option<String>,
}

/// Options of the credential request operations.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentialOptions {
    /// Transaction code shown to the user out of band.
    pub pin: Option<String>,
    /// Wallet attestation VC (JWT) used for client authentication at the token endpoint.
    pub attestation_vc: Option<String>,
    /// Signs the VP wrapping `attestation_vc`.
    pub attestation_signer: Option<MethodSigner>,
}

impl RequestCredentialOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.attestation_vc.is_some() && self.attestation_signer.is_none() {
            bail!("an attestation VC was provided without an attestation signer")
        }
        Ok(())
    }

    pub(crate) fn pin(&self) -> Option<&str> {
        self.pin.as_deref().filter(|p| !p.is_empty())
    }
}
