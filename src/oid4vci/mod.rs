//! OpenID for Verifiable Credential Issuance, wallet side.
//!
//! [IssuerInitiatedInteraction] starts from a credential offer and supports the
//! pre-authorized code and authorization code grants.
//! [WalletInitiatedInteraction] starts from an issuer URI and only supports the
//! authorization code grant.

mod acknowledgment;
mod authorization;
mod config;
mod credential_request;
mod grants;
mod interaction;
mod issuer_initiated;
mod legacy;
mod metadata;
mod offer;
mod proof;
mod token;
mod wallet_initiated;

pub use acknowledgment::{IssuanceAcknowledgment, IssuanceOutcome};
pub use config::{ClientConfig, CreateAuthorizationUrlOptions, RequestCredentialOptions};
pub use grants::{AuthorizationCodeGrantParams, PreAuthorizedCodeGrantParams};
pub use issuer_initiated::IssuerInitiatedInteraction;
#[allow(deprecated)]
pub use legacy::Interaction;
pub use metadata::{
    CredentialConfiguration, CredentialDefinition, CredentialDisplay, IssuerCapabilities,
    IssuerDisplay, IssuerMetadata, Logo, OpenIdConfig,
};
pub use offer::{
    AuthorizationCodeGrant, CredentialOffer, Grants, PreAuthorizedCodeGrant, TxCode,
    AUTHORIZATION_CODE_GRANT_TYPE, CREDENTIAL_OFFER_SCHEME, PRE_AUTHORIZED_CODE_GRANT_TYPE,
};
pub use token::{AuthToken, TokenResponse};
pub(crate) use proof::attestation_vp;
pub use wallet_initiated::{SupportedCredential, WalletInitiatedInteraction};
