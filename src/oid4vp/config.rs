use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value as Json};

use crate::{
    core::util::AsyncHttpClient,
    credential::DocumentLoader,
    did::DidResolver,
    logging::{ActivityLogger, MetricsLogger, NoopLogger},
    signer::{MethodSigner, Signer, VerificationMethod},
};

/// Collaborators of a presentation interaction.
#[derive(Clone)]
pub struct PresentationConfig {
    /// Resolves the verifier's DID and the holders' DIDs.
    pub did_resolver: Arc<dyn DidResolver>,
    /// Signs the presentations and the ID token.
    pub signer: Arc<dyn Signer>,
    pub http_client: Arc<dyn AsyncHttpClient>,
    /// Defaults to [NoopLogger].
    pub activity_logger: Arc<dyn ActivityLogger>,
    /// Defaults to [NoopLogger].
    pub metrics_logger: Arc<dyn MetricsLogger>,
    /// Resolves the JSON-LD contexts of `ldp_vc` credentials before they are presented.
    pub document_loader: Option<Arc<dyn DocumentLoader>>,
}

impl PresentationConfig {
    pub fn new(
        did_resolver: Arc<dyn DidResolver>,
        signer: Arc<dyn Signer>,
        http_client: Arc<dyn AsyncHttpClient>,
    ) -> Self {
        Self {
            did_resolver,
            signer,
            http_client,
            activity_logger: Arc::new(NoopLogger),
            metrics_logger: Arc::new(NoopLogger),
            document_loader: None,
        }
    }
}

/// Options of `present_credential`.
#[derive(Debug, Clone, Default)]
pub struct PresentCredentialOptions {
    /// Claims answering custom scopes of the request, keyed by scope. Each
    /// value is JSON text.
    pub scope_claims: HashMap<String, String>,
    /// Wallet attestation VC (JWT) sent along with the ID token.
    pub attestation_vc: Option<String>,
    /// Signs the VP wrapping `attestation_vc`.
    pub attestation_signer: Option<MethodSigner>,
    /// Kept for the acknowledgment of this interaction.
    pub interaction_details: Map<String, Json>,
    /// Key used to sign for the holder. When absent, the first assertion
    /// method of the holder's DID document is used.
    pub signing_method: Option<VerificationMethod>,
}

impl PresentCredentialOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.attestation_vc.is_some() && self.attestation_signer.is_none() {
            bail!("an attestation VC was provided without an attestation signer")
        }
        Ok(())
    }

    /// Scope claims as JSON values.
    pub(crate) fn parsed_scope_claims(&self) -> Result<Map<String, Json>> {
        let mut claims = Map::new();
        for (key, value) in &self.scope_claims {
            let json: Json = serde_json::from_str(value)
                .map_err(|e| anyhow!("fail to parse \"{key}\" claim json: {e}"))?;
            claims.insert(key.clone(), json);
        }
        Ok(claims)
    }
}
