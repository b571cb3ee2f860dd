use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use ssi::jwk::JWK;
use tracing::debug;

use crate::jwt::{decode_unverified, header_str};

/// Resolves a DID to its DID document.
///
/// Implementations may return either a bare DID document or a DID resolution
/// result wrapping it under `didDocument`.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<Vec<u8>>;
}

/// The subset of a DID document the wallet relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<DidVerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<VerificationRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<VerificationRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidVerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,
}

/// A verification relationship entry, either a reference to a method or an embedded method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VerificationRelationship {
    Reference(String),
    Embedded(DidVerificationMethod),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Json,
    pub service_endpoint: Json,
}

impl DidDocument {
    /// Parse the output of a [DidResolver].
    pub fn from_resolution(bytes: &[u8]) -> Result<Self> {
        let mut value: Map<String, Json> =
            serde_json::from_slice(bytes).context("DID resolution result is not a JSON object")?;

        let document = match value.remove("didDocument") {
            Some(document) => document,
            None => Json::Object(value),
        };

        serde_json::from_value(document).context("failed to parse DID document")
    }

    /// Find a verification method by DID URL.
    ///
    /// Relative ids (`#key-1`) in the document are matched against the fragment
    /// of `key_id`.
    pub fn find_method(&self, key_id: &str) -> Option<&DidVerificationMethod> {
        let fragment = key_id.split_once('#').map(|(_, f)| f);

        let matches = |m: &DidVerificationMethod| {
            m.id == key_id
                || match (m.id.strip_prefix('#'), fragment) {
                    (Some(relative), Some(f)) => relative == f,
                    _ => false,
                }
        };

        self.verification_method.iter().find(|m| matches(m)).or_else(|| {
            self.assertion_method
                .iter()
                .chain(self.authentication.iter())
                .find_map(|r| match r {
                    VerificationRelationship::Embedded(m) if matches(m) => Some(m),
                    _ => None,
                })
        })
    }

    /// Assertion methods in document order, with references resolved.
    pub fn assertion_methods(&self) -> Vec<&DidVerificationMethod> {
        self.assertion_method
            .iter()
            .filter_map(|r| match r {
                VerificationRelationship::Embedded(m) => Some(m),
                VerificationRelationship::Reference(id) => self.find_method(id),
            })
            .collect()
    }

    /// The public JWK of the verification method named by `key_id`.
    pub fn public_jwk(&self, key_id: &str) -> Result<JWK> {
        let method = self
            .find_method(key_id)
            .with_context(|| format!("verification method '{key_id}' not found in DID document"))?;

        let jwk = method
            .public_key_jwk
            .clone()
            .with_context(|| format!("verification method '{key_id}' has no publicKeyJwk"))?;

        serde_json::from_value(jwk).context("publicKeyJwk is not a valid JWK")
    }
}

pub(crate) async fn resolve_document(resolver: &dyn DidResolver, did: &str) -> Result<DidDocument> {
    let bytes = resolver
        .resolve(did)
        .await
        .with_context(|| format!("failed to resolve DID '{did}'"))?;

    DidDocument::from_resolution(&bytes)
}

/// A JWT whose signature was checked against the signer's DID document.
#[derive(Debug, Clone)]
pub(crate) struct VerifiedJwt {
    pub kid: String,
    pub did: String,
    pub claims: Json,
}

/// Verify a JWS signed by a DID verification method.
///
/// The `kid` header must be a DID URL. When `expected_did` is given, the DID of
/// the `kid` must equal it.
pub(crate) async fn verify_jwt(
    jwt: &str,
    resolver: &dyn DidResolver,
    expected_did: Option<&str>,
) -> Result<VerifiedJwt> {
    let (header, _) = decode_unverified(jwt)?;

    let alg = header_str(&header, "alg")?;
    if alg.eq_ignore_ascii_case("none") {
        bail!("unsigned jwt is not accepted")
    }

    let kid = header_str(&header, "kid")?;
    let (did, _f) = kid.split_once('#').context(format!(
        "expected a DID verification method in 'kid' header, received '{kid}'"
    ))?;

    if let Some(expected) = expected_did {
        if expected != did {
            bail!("DIDs from 'kid' ({did}) and 'client_id' ({expected}) do not match")
        }
    }

    debug!(%kid, %alg, "verifying jwt signature");

    let document = resolve_document(resolver, did).await?;
    let jwk = document
        .public_jwk(kid)
        .context("unable to fetch JWK from 'kid' header")?;

    let claims: Json = ssi::claims::jwt::decode_verify(jwt, &jwk)
        .context("signature could not be verified")?;

    Ok(VerifiedJwt {
        kid: kid.to_owned(),
        did: did.to_owned(),
        claims,
    })
}
