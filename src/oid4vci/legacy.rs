#![allow(deprecated)]

use super::{
    acknowledgment::IssuanceAcknowledgment,
    config::{ClientConfig, RequestCredentialOptions},
    issuer_initiated::IssuerInitiatedInteraction,
    metadata::IssuerMetadata,
};
use crate::{
    credential::Credential,
    error::WalletResult,
    signer::{Signer, VerificationMethod},
};

/// Pre-authorized issuance under its former name.
#[deprecated(note = "use IssuerInitiatedInteraction")]
pub struct Interaction(IssuerInitiatedInteraction);

impl Interaction {
    pub async fn new(initiate_issuance_uri: &str, config: ClientConfig) -> WalletResult<Self> {
        IssuerInitiatedInteraction::new(initiate_issuance_uri, config)
            .await
            .map(Self)
    }

    /// Pre-authorized flow for offers that need no PIN.
    pub async fn request_credential(
        &mut self,
        method: &VerificationMethod,
        signer: &dyn Signer,
    ) -> WalletResult<Vec<Credential>> {
        self.0
            .request_credential_with_pre_auth(method, signer, &RequestCredentialOptions::default())
            .await
    }

    pub async fn request_credential_with_pin(
        &mut self,
        method: &VerificationMethod,
        signer: &dyn Signer,
        pin: &str,
    ) -> WalletResult<Vec<Credential>> {
        let opts = RequestCredentialOptions {
            pin: Some(pin.to_owned()),
            ..Default::default()
        };
        self.0
            .request_credential_with_pre_auth(method, signer, &opts)
            .await
    }

    pub fn issuer_uri(&self) -> &str {
        self.0.issuer_uri()
    }

    pub async fn issuer_metadata(&mut self) -> WalletResult<IssuerMetadata> {
        self.0.issuer_metadata().await
    }

    pub fn acknowledgment(&self) -> WalletResult<IssuanceAcknowledgment> {
        self.0.acknowledgment()
    }

    pub fn into_inner(self) -> IssuerInitiatedInteraction {
        self.0
    }
}
