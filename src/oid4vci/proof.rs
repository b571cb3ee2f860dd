use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    jwt::{decode_unverified, sign_jwt},
    signer::{Signer, VerificationMethod},
    utils::now_secs,
};

pub(crate) const PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";

/// Claims of a proof of possession (OpenID4VCI, section 7.2.1).
#[derive(Debug, Clone, Serialize)]
struct ProofClaims<'a> {
    /// Client id, only sent in the authorization code flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    aud: &'a str,
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

/// Builds `proof` objects for credential requests.
pub(crate) struct ProofBuilder<'a> {
    pub method: &'a VerificationMethod,
    pub signer: &'a dyn Signer,
    /// Credential issuer identifier.
    pub audience: &'a str,
    pub client_id: Option<&'a str>,
}

impl ProofBuilder<'_> {
    /// A freshly signed proof JWT over `nonce`.
    pub async fn build(&self, nonce: Option<&str>) -> Result<String> {
        let claims = ProofClaims {
            iss: self.client_id,
            aud: self.audience,
            iat: now_secs(),
            nonce,
        };

        sign_jwt(&claims, Some(PROOF_JWT_TYPE), self.method, self.signer).await
    }
}

/// Wrap an attestation VC (a JWT) in a VP JWT for wallet attestation client
/// authentication at the token endpoint.
pub(crate) async fn attestation_vp(
    attestation_vc: &str,
    method: &VerificationMethod,
    signer: &dyn Signer,
    audience: Option<&str>,
    nonce: Option<&str>,
) -> Result<String> {
    decode_unverified(attestation_vc).context("attestation VC must be a JWT")?;

    let holder = method.did()?;
    let now = now_secs();
    let id = format!("urn:uuid:{}", Uuid::new_v4());

    let mut claims = json!({
        "iss": holder,
        "jti": id,
        "iat": now,
        "nbf": now,
        "vp": {
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiablePresentation"],
            "id": id,
            "holder": holder,
            "verifiableCredential": [attestation_vc],
        },
    });
    if let Some(audience) = audience.filter(|a| !a.is_empty()) {
        claims["aud"] = json!([audience]);
    }
    if let Some(nonce) = nonce.filter(|n| !n.is_empty()) {
        claims["nonce"] = json!(nonce);
        claims["vp"]["nonce"] = json!(nonce);
    }

    sign_jwt(&claims, Some(PROOF_JWT_TYPE), method, signer).await
}
