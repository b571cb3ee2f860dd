//! Counterparty trust: linked domain validation and trust registry policy checks.

mod linked_domains;
mod registry;

pub use linked_domains::{validate_linked_domains, LinkedDomainsValidation};
pub(crate) use linked_domains::check_linked_domains;
pub use registry::{
    CredentialClaims, EvaluationData, EvaluationResult, IssuanceRequest, OfferedCredential,
    PresentationRequest, TrustRegistry, TrustRegistryConfig,
};

/// What the wallet knows about an issuer before accepting its offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerTrustInfo {
    /// DID that signed the issuer metadata, empty when the metadata is unsigned.
    pub did: String,
    /// Host of the credential issuer URL.
    pub domain: String,
    pub credential_offers: Vec<OfferedCredential>,
}

/// What the wallet knows about a verifier from its authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierTrustInfo {
    pub did: String,
    /// Host of the response URI.
    pub domain: String,
}
