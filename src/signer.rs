use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use serde_json::Value as Json;
use ssi::jwk::JWK;

use crate::did::DidVerificationMethod;

/// Signs on behalf of the wallet.
///
/// The engine never holds private key material: every signature is produced by
/// the host through this capability, addressed by the verification method's key id.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>>;

    async fn verify(&self, signature: &[u8], payload: &[u8], key_id: &str) -> Result<()>;
}

/// Public key material of a [VerificationMethod].
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Jwk(JWK),
    /// Encoded public key exactly as published by the DID document.
    RawBytes(Vec<u8>),
}

/// A DID-relative key the wallet signs with, supplied by the caller.
#[derive(Debug, Clone)]
pub struct VerificationMethod {
    /// DID URL, e.g. `did:example:123#key-1`.
    pub key_id: String,
    /// Verification method type, e.g. `Ed25519VerificationKey2018` or `JsonWebKey2020`.
    pub proof_type: String,
    pub key: KeyMaterial,
}

impl VerificationMethod {
    pub fn new(key_id: impl Into<String>, proof_type: impl Into<String>, key: KeyMaterial) -> Self {
        Self {
            key_id: key_id.into(),
            proof_type: proof_type.into(),
            key,
        }
    }

    /// The DID part of the key id.
    pub fn did(&self) -> Result<&str> {
        match self.key_id.split_once('#') {
            Some((did, fragment)) if !did.is_empty() && !fragment.is_empty() => Ok(did),
            _ => bail!("key ID ({}) is missing the DID part", self.key_id),
        }
    }

    /// JOSE `alg` used for signatures made with this method.
    pub fn algorithm(&self) -> Result<&'static str> {
        match self.proof_type.as_str() {
            "Ed25519VerificationKey2018" | "Ed25519VerificationKey2020" => Ok("EdDSA"),
            "EcdsaSecp256k1VerificationKey2019" => Ok("ES256K"),
            "EcdsaSecp256r1VerificationKey2019" | "P256Key2021" => Ok("ES256"),
            "JsonWebKey2020" | "JsonWebKey" => match &self.key {
                KeyMaterial::Jwk(jwk) => jwk_algorithm(jwk),
                KeyMaterial::RawBytes(_) => {
                    bail!("{} verification method has no JWK", self.proof_type)
                }
            },
            other => bail!("no signature algorithm for verification method type '{other}'"),
        }
    }

    /// Build from a DID document entry.
    pub fn from_did_method(method: &DidVerificationMethod) -> Result<Self> {
        let key = match (&method.public_key_jwk, &method.public_key_multibase) {
            (Some(jwk), _) => KeyMaterial::Jwk(
                serde_json::from_value(jwk.clone()).context("invalid publicKeyJwk")?,
            ),
            (None, Some(encoded)) => KeyMaterial::RawBytes(encoded.as_bytes().to_vec()),
            (None, None) => match &method.public_key_base58 {
                Some(encoded) => KeyMaterial::RawBytes(encoded.as_bytes().to_vec()),
                None => bail!("verification method {} has no public key", method.id),
            },
        };

        Ok(Self::new(method.id.clone(), method.kind.clone(), key))
    }
}

/// A verification method paired with the signer that holds its private key.
#[derive(Clone)]
pub struct MethodSigner {
    pub method: VerificationMethod,
    pub signer: Arc<dyn Signer>,
}

impl MethodSigner {
    pub fn new(method: VerificationMethod, signer: Arc<dyn Signer>) -> Self {
        Self { method, signer }
    }
}

impl std::fmt::Debug for MethodSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSigner")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

fn jwk_algorithm(jwk: &JWK) -> Result<&'static str> {
    let value = serde_json::to_value(jwk).context("failed to serialize JWK")?;
    let field = |name: &str| value.get(name).and_then(Json::as_str);

    if let Some(alg) = field("alg") {
        return match alg {
            "EdDSA" => Ok("EdDSA"),
            "ES256" => Ok("ES256"),
            "ES256K" => Ok("ES256K"),
            "ES384" => Ok("ES384"),
            "PS256" => Ok("PS256"),
            "RS256" => Ok("RS256"),
            other => bail!("unsupported JWK algorithm '{other}'"),
        };
    }

    match (field("kty"), field("crv")) {
        (Some("OKP"), Some("Ed25519")) => Ok("EdDSA"),
        (Some("EC"), Some("P-256")) => Ok("ES256"),
        (Some("EC"), Some("P-384")) => Ok("ES384"),
        (Some("EC"), Some("secp256k1")) => Ok("ES256K"),
        (Some("RSA"), _) => Ok("RS256"),
        (kty, crv) => bail!("unsupported JWK key type {kty:?} with curve {crv:?}"),
    }
}

/// ES256 signer over a single P-256 key.
#[derive(Debug)]
pub struct P256Signer {
    key: SigningKey,
    jwk: JWK,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Result<Self> {
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = serde_json::from_str(&pk.to_jwk_string())?;
        Ok(Self { key, jwk })
    }

    /// The public JWK of the signer.
    pub fn jwk(&self) -> &JWK {
        &self.jwk
    }

    /// A `JsonWebKey2020` verification method for this key under `key_id`.
    pub fn verification_method(&self, key_id: impl Into<String>) -> VerificationMethod {
        VerificationMethod::new(key_id, "JsonWebKey2020", KeyMaterial::Jwk(self.jwk.clone()))
    }
}

#[async_trait]
impl Signer for P256Signer {
    async fn sign(&self, payload: &[u8], _key_id: &str) -> Result<Vec<u8>> {
        let sig: Signature = self.key.sign(payload);
        Ok(sig.to_vec())
    }

    async fn verify(&self, signature: &[u8], payload: &[u8], _key_id: &str) -> Result<()> {
        let signature = Signature::from_slice(signature).context("malformed ES256 signature")?;
        let verifying_key: &VerifyingKey = self.key.verifying_key();
        verifying_key
            .verify(payload, &signature)
            .context("signature verification failed")
    }
}
