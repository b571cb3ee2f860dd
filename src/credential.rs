//! Verifiable credentials as received from issuers and held by the wallet.
//!
//! Every supported format is normalized into a JSON claims graph following the
//! W3C VC data model (`@context`, `type`, `issuer`, `credentialSubject`, ...)
//! so that presentation definitions and trust registry requests can be
//! evaluated uniformly. The original encoding is kept for re-presentation.

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use ciborium::Value as Cbor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    core::credential_format::ClaimFormatDesignation,
    did::{resolve_document, verify_jwt, DidResolver},
    jwt::decode_unverified,
};

/// A JSON-LD document fetched by a [DocumentLoader].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocument {
    pub document_url: String,
    pub context_url: Option<String>,
    pub document: Json,
}

/// Loads JSON-LD contexts referenced by `ldp_vc` credentials.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<RemoteDocument>;
}

/// Collaborators needed to parse (and optionally verify) a received credential.
#[derive(Clone, Copy)]
pub(crate) struct ParseContext<'a> {
    pub resolver: &'a dyn DidResolver,
    pub document_loader: Option<&'a dyn DocumentLoader>,
    pub disable_proof_checks: bool,
}

/// A parsed verifiable credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    format: ClaimFormatDesignation,
    /// As received: a compact JWT/SD-JWT, a base64url CBOR document, or JSON text.
    raw: String,
    claims: Json,
}

impl Credential {
    /// Parse a credential the wallet already holds without checking its proof.
    ///
    /// `raw` is the string returned by [Credential::serialize].
    pub fn parse_stored(format: ClaimFormatDesignation, raw: &str) -> Result<Self> {
        match &format {
            ClaimFormatDesignation::LdpVc => Self::from_ldp(
                serde_json::from_str(raw).context("stored ldp_vc credential is not JSON")?,
            ),
            ClaimFormatDesignation::VcSdJwt => Self::from_sd_jwt(raw, None),
            ClaimFormatDesignation::MsoMDoc => Self::from_mdoc(raw),
            f if f.is_jwt_vc() => Self::from_jwt(f, raw, None),
            other => bail!("unsupported credential format '{other}'"),
        }
    }

    /// Parse a credential received from an issuer in the given format.
    pub(crate) async fn parse(
        format: &ClaimFormatDesignation,
        credential: &Json,
        ctx: ParseContext<'_>,
    ) -> Result<Self> {
        match format {
            ClaimFormatDesignation::LdpVc => {
                let credential = match credential {
                    Json::String(s) => serde_json::from_str(s).context("ldp_vc credential is not JSON")?,
                    other => other.clone(),
                };
                if let Some(loader) = ctx.document_loader {
                    load_contexts(&credential, loader).await?;
                }
                if !ctx.disable_proof_checks {
                    check_ldp_proof_binding(&credential, ctx.resolver).await?;
                }
                Self::from_ldp(credential)
            }
            ClaimFormatDesignation::VcSdJwt => {
                let raw = credential
                    .as_str()
                    .context("vc+sd-jwt credential must be a string")?;
                let verified = match ctx.disable_proof_checks {
                    true => None,
                    false => {
                        let (jwt, _) = split_sd_jwt(raw);
                        Some(verify_jwt(jwt, ctx.resolver, None).await?.claims)
                    }
                };
                Self::from_sd_jwt(raw, verified)
            }
            ClaimFormatDesignation::MsoMDoc => {
                let raw = credential
                    .as_str()
                    .context("mso_mdoc credential must be a base64url string")?;
                Self::from_mdoc(raw)
            }
            f if f.is_jwt_vc() => {
                let raw = credential
                    .as_str()
                    .context("JWT credential must be a string")?;
                let verified = match ctx.disable_proof_checks {
                    true => None,
                    false => Some(verify_jwt(raw, ctx.resolver, None).await?.claims),
                };
                Self::from_jwt(f, raw, verified)
            }
            other => bail!("unsupported credential format '{other}'"),
        }
    }

    fn from_jwt(
        format: &ClaimFormatDesignation,
        raw: &str,
        verified_claims: Option<Json>,
    ) -> Result<Self> {
        let claims = match verified_claims {
            Some(claims) => claims,
            None => decode_unverified(raw)?.1,
        };

        Ok(Self {
            format: format.clone(),
            raw: raw.to_owned(),
            claims: vc_from_jwt_claims(claims)?,
        })
    }

    fn from_ldp(credential: Json) -> Result<Self> {
        if !credential.is_object() {
            bail!("ldp_vc credential must be a JSON object")
        }
        if credential.get("@context").is_none() {
            bail!("ldp_vc credential has no @context")
        }

        Ok(Self {
            format: ClaimFormatDesignation::LdpVc,
            raw: serde_json::to_string(&credential)?,
            claims: credential,
        })
    }

    fn from_sd_jwt(raw: &str, verified_claims: Option<Json>) -> Result<Self> {
        let (jwt, disclosures) = split_sd_jwt(raw);

        let mut claims = match verified_claims {
            Some(claims) => claims,
            None => decode_unverified(jwt)?.1,
        };

        let disclosed = decode_disclosures(&disclosures)?;
        reveal(&mut claims, &disclosed);

        let claims = match claims.get("vc") {
            Some(_) => vc_from_jwt_claims(claims)?,
            None => vc_from_sd_jwt_vc_claims(claims)?,
        };

        Ok(Self {
            format: ClaimFormatDesignation::VcSdJwt,
            raw: raw.to_owned(),
            claims,
        })
    }

    fn from_mdoc(raw: &str) -> Result<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(raw.trim_end_matches('='))
            .context("mso_mdoc credential is not base64url")?;
        let issuer_signed: Cbor =
            ciborium::from_reader(Cursor::new(&bytes)).context("mso_mdoc credential is not CBOR")?;

        let name_spaces = cbor_map_get(&issuer_signed, "nameSpaces")
            .context("mso_mdoc credential has no nameSpaces")?;

        let mut subject = Map::new();
        for (ns, items) in cbor_map_entries(name_spaces)? {
            let Cbor::Text(ns) = ns else {
                bail!("mso_mdoc namespace is not a string")
            };
            let Cbor::Array(items) = items else {
                bail!("mso_mdoc namespace {ns} is not an array")
            };

            let mut elements = Map::new();
            for item in items {
                let item = untag24(item)?;
                let identifier = match cbor_map_get(&item, "elementIdentifier") {
                    Some(Cbor::Text(id)) => id.clone(),
                    _ => bail!("mso_mdoc item in {ns} has no elementIdentifier"),
                };
                let value = cbor_map_get(&item, "elementValue")
                    .map(cbor_to_json)
                    .transpose()?
                    .unwrap_or(Json::Null);
                elements.insert(identifier, value);
            }
            subject.insert(ns.clone(), Json::Object(elements));
        }

        let claims = serde_json::json!({
            "type": ["VerifiableCredential", "mso_mdoc"],
            "credentialSubject": subject,
        });

        Ok(Self {
            format: ClaimFormatDesignation::MsoMDoc,
            raw: raw.to_owned(),
            claims,
        })
    }

    pub fn format(&self) -> &ClaimFormatDesignation {
        &self.format
    }

    /// The credential in its received encoding, suitable for storage.
    pub fn serialize(&self) -> &str {
        &self.raw
    }

    /// The normalized W3C data model view.
    pub fn claims(&self) -> &Json {
        &self.claims
    }

    /// Whether the credential is carried as a compact JWT.
    pub fn is_jwt(&self) -> bool {
        self.format.is_jwt_vc() || self.format == ClaimFormatDesignation::VcSdJwt
    }

    /// The value placed in a presentation's `verifiableCredential` array.
    pub(crate) fn presentation_value(&self) -> Json {
        match self.format {
            ClaimFormatDesignation::LdpVc => self.claims.clone(),
            _ => Json::String(self.raw.clone()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.claims.get("id").and_then(Json::as_str)
    }

    pub fn types(&self) -> Vec<String> {
        string_or_array(self.claims.get("type"))
    }

    pub fn issuer_id(&self) -> Option<&str> {
        match self.claims.get("issuer")? {
            Json::String(s) => Some(s),
            Json::Object(o) => o.get("id").and_then(Json::as_str),
            _ => None,
        }
    }

    pub fn issuance_date(&self) -> Option<&str> {
        self.claims
            .get("issuanceDate")
            .or_else(|| self.claims.get("validFrom"))
            .and_then(Json::as_str)
    }

    pub fn expiration_date(&self) -> Option<&str> {
        self.claims
            .get("expirationDate")
            .or_else(|| self.claims.get("validUntil"))
            .and_then(Json::as_str)
    }

    /// `id` of every credential subject.
    pub fn subject_ids(&self) -> Vec<String> {
        subjects(&self.claims)
            .filter_map(|s| s.get("id").and_then(Json::as_str))
            .map(str::to_owned)
            .collect()
    }

    /// Claim names of the credential subjects, excluding `id`.
    pub fn claim_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = subjects(&self.claims)
            .filter_map(Json::as_object)
            .flat_map(|o| o.keys().filter(|k| *k != "id").cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

fn subjects(claims: &Json) -> impl Iterator<Item = &Json> {
    let subjects: Vec<&Json> = match claims.get("credentialSubject") {
        Some(Json::Array(a)) => a.iter().collect(),
        Some(s @ Json::Object(_)) => vec![s],
        _ => vec![],
    };
    subjects.into_iter()
}

fn string_or_array(value: Option<&Json>) -> Vec<String> {
    match value {
        Some(Json::String(s)) => vec![s.clone()],
        Some(Json::Array(a)) => a
            .iter()
            .filter_map(Json::as_str)
            .map(str::to_owned)
            .collect(),
        _ => vec![],
    }
}

/// Lift the `vc` claim of a JWT VC, filling data model members from the
/// registered JWT claims where the `vc` object leaves them out.
fn vc_from_jwt_claims(claims: Json) -> Result<Json> {
    let Json::Object(mut claims) = claims else {
        bail!("JWT claims are not an object")
    };

    let mut vc = match claims.remove("vc") {
        Some(Json::Object(vc)) => vc,
        Some(_) => bail!("'vc' claim is not an object"),
        None => claims.clone(),
    };

    if let Some(iss) = claims.get("iss") {
        vc.entry("issuer").or_insert_with(|| iss.clone());
    }
    if let Some(jti) = claims.get("jti") {
        vc.entry("id").or_insert_with(|| jti.clone());
    }
    if let Some(Json::String(sub)) = claims.get("sub") {
        match vc.get_mut("credentialSubject") {
            Some(Json::Object(subject)) => {
                subject
                    .entry("id")
                    .or_insert_with(|| Json::String(sub.clone()));
            }
            None => {
                vc.insert("credentialSubject".into(), serde_json::json!({ "id": sub }));
            }
            Some(_) => {}
        }
    }

    Ok(Json::Object(vc))
}

const SD_JWT_REGISTERED: &[&str] = &[
    "iss", "sub", "iat", "nbf", "exp", "jti", "vct", "cnf", "status", "_sd_alg",
];

/// Map an IETF SD-JWT VC payload onto the data model.
fn vc_from_sd_jwt_vc_claims(claims: Json) -> Result<Json> {
    let Json::Object(claims) = claims else {
        bail!("SD-JWT claims are not an object")
    };

    let mut subject: Map<String, Json> = claims
        .iter()
        .filter(|(k, _)| !SD_JWT_REGISTERED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(sub) = claims.get("sub") {
        subject.insert("id".into(), sub.clone());
    }

    let mut types = vec![Json::String("VerifiableCredential".into())];
    if let Some(vct) = claims.get("vct") {
        types.push(vct.clone());
    }

    let mut vc = Map::new();
    vc.insert("type".into(), Json::Array(types));
    if let Some(iss) = claims.get("iss") {
        vc.insert("issuer".into(), iss.clone());
    }
    if let Some(jti) = claims.get("jti") {
        vc.insert("id".into(), jti.clone());
    }
    vc.insert("credentialSubject".into(), Json::Object(subject));

    Ok(Json::Object(vc))
}

/// Split `<jwt>~<disclosure>~...~[<kb-jwt>]` into the issuer JWT and its disclosures.
fn split_sd_jwt(raw: &str) -> (&str, Vec<&str>) {
    let mut parts = raw.split('~');
    let jwt = parts.next().unwrap_or_default();
    // The key binding JWT, when present, is the only part containing dots.
    let disclosures = parts
        .filter(|p| !p.is_empty() && !p.contains('.'))
        .collect();
    (jwt, disclosures)
}

enum Disclosure {
    Property(String, Json),
    Element(Json),
}

fn decode_disclosures(encoded: &[&str]) -> Result<HashMap<String, Disclosure>> {
    encoded
        .iter()
        .map(|d| {
            let digest = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(d.as_bytes()));
            let bytes = BASE64_URL_SAFE_NO_PAD
                .decode(d)
                .context("disclosure is not base64url")?;
            let parts: Vec<Json> =
                serde_json::from_slice(&bytes).context("disclosure is not a JSON array")?;

            let disclosure = match <[Json; 3]>::try_from(parts) {
                Ok([_salt, Json::String(name), value]) => Disclosure::Property(name, value),
                Ok(_) => bail!("disclosure claim name is not a string"),
                Err(parts) => match <[Json; 2]>::try_from(parts) {
                    Ok([_salt, value]) => Disclosure::Element(value),
                    Err(_) => bail!("disclosure must have two or three elements"),
                },
            };

            Ok((digest, disclosure))
        })
        .collect()
}

/// Replace `_sd` digests and `{"...": digest}` array entries with the disclosed values.
fn reveal(value: &mut Json, disclosures: &HashMap<String, Disclosure>) {
    match value {
        Json::Object(object) => {
            if let Some(Json::Array(digests)) = object.remove("_sd") {
                for digest in digests.iter().filter_map(Json::as_str) {
                    if let Some(Disclosure::Property(name, v)) = disclosures.get(digest) {
                        object.insert(name.clone(), v.clone());
                    }
                }
            }
            object.remove("_sd_alg");
            for v in object.values_mut() {
                reveal(v, disclosures);
            }
        }
        Json::Array(items) => {
            items.retain_mut(|item| {
                let digest = item
                    .as_object()
                    .filter(|o| o.len() == 1)
                    .and_then(|o| o.get("..."))
                    .and_then(Json::as_str)
                    .map(str::to_owned);

                match digest {
                    Some(digest) => match disclosures.get(&digest) {
                        Some(Disclosure::Element(v)) => {
                            *item = v.clone();
                            true
                        }
                        _ => false,
                    },
                    None => true,
                }
            });
            for item in items {
                reveal(item, disclosures);
            }
        }
        _ => {}
    }
}

pub(crate) async fn load_contexts(credential: &Json, loader: &dyn DocumentLoader) -> Result<()> {
    for url in string_or_array(credential.get("@context")) {
        debug!(%url, "loading JSON-LD context");
        loader
            .load(&url)
            .await
            .with_context(|| format!("failed to load JSON-LD context {url}"))?;
    }
    Ok(())
}

/// Check that the proof of an `ldp_vc` credential names a verification method
/// published by the issuer's DID document.
async fn check_ldp_proof_binding(credential: &Json, resolver: &dyn DidResolver) -> Result<()> {
    let proof = match credential.get("proof") {
        Some(Json::Array(proofs)) => proofs.first(),
        other => other,
    }
    .context("ldp_vc credential has no proof")?;

    let method = proof
        .get("verificationMethod")
        .and_then(Json::as_str)
        .context("proof has no verificationMethod")?;
    let (did, _) = method
        .split_once('#')
        .context("proof verificationMethod is not a DID URL")?;

    let document = resolve_document(resolver, did).await?;
    if document.find_method(method).is_none() {
        bail!("verification method {method} is not part of the issuer's DID document")
    }

    Ok(())
}

fn cbor_map_entries(value: &Cbor) -> Result<&Vec<(Cbor, Cbor)>> {
    match value {
        Cbor::Map(entries) => Ok(entries),
        _ => bail!("expected a CBOR map"),
    }
}

fn cbor_map_get<'a>(value: &'a Cbor, key: &str) -> Option<&'a Cbor> {
    match value {
        Cbor::Map(entries) => entries
            .iter()
            .find(|(k, _)| matches!(k, Cbor::Text(t) if t == key))
            .map(|(_, v)| v),
        _ => None,
    }
}

fn untag24(value: &Cbor) -> Result<Cbor> {
    match value {
        Cbor::Tag(24, inner) => match inner.as_ref() {
            Cbor::Bytes(bytes) => {
                ciborium::from_reader(Cursor::new(bytes)).context("invalid tag 24 payload")
            }
            _ => bail!("tag 24 does not wrap a byte string"),
        },
        other => Ok(other.clone()),
    }
}

fn cbor_to_json(value: &Cbor) -> Result<Json> {
    Ok(match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(*b),
        Cbor::Text(s) => Json::String(s.clone()),
        Cbor::Integer(i) => {
            let i = i128::from(*i);
            match i64::try_from(i) {
                Ok(i) => Json::from(i),
                Err(_) => Json::String(i.to_string()),
            }
        }
        Cbor::Float(f) => Json::from(*f),
        Cbor::Bytes(b) => Json::String(BASE64_URL_SAFE_NO_PAD.encode(b)),
        Cbor::Tag(_, inner) => cbor_to_json(inner)?,
        Cbor::Array(items) => Json::Array(items.iter().map(cbor_to_json).collect::<Result<_>>()?),
        Cbor::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match k {
                    Cbor::Text(s) => s.clone(),
                    other => cbor_to_json(other)?.to_string(),
                };
                map.insert(key, cbor_to_json(v)?);
            }
            Json::Object(map)
        }
        _ => bail!("unsupported CBOR value"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn unsigned_jwt(claims: &Json) -> String {
        let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","kid":"did:example:issuer#k"}"#);
        let body = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{body}.c2ln")
    }

    #[test]
    fn jwt_vc_registered_claims() {
        let jwt = unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "sub": "did:example:holder",
            "jti": "urn:uuid:1",
            "vc": {
                "@context": ["https://www.w3.org/2018/credentials/v1"],
                "type": ["VerifiableCredential", "VerifiedEmployee"],
                "credentialSubject": {"displayName": "Alice"},
                "issuanceDate": "2024-01-01T00:00:00Z"
            }
        }));

        let vc = Credential::parse_stored(ClaimFormatDesignation::JwtVcJson, &jwt).unwrap();
        assert_eq!(vc.issuer_id(), Some("did:example:issuer"));
        assert_eq!(vc.id(), Some("urn:uuid:1"));
        assert_eq!(vc.subject_ids(), vec!["did:example:holder"]);
        assert_eq!(vc.types(), vec!["VerifiableCredential", "VerifiedEmployee"]);
        assert_eq!(vc.claim_keys(), vec!["displayName"]);
        assert_eq!(vc.issuance_date(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(vc.serialize(), jwt);
        assert!(vc.is_jwt());
    }

    #[test]
    fn sd_jwt_disclosures_are_revealed() {
        let disclosure =
            BASE64_URL_SAFE_NO_PAD.encode(br#"["salt-1","given_name","Alice"]"#);
        let element = BASE64_URL_SAFE_NO_PAD.encode(br#"["salt-2","FR"]"#);
        let digest = |d: &str| BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(d.as_bytes()));

        let jwt = unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "sub": "did:example:holder",
            "vct": "Identity",
            "_sd_alg": "sha-256",
            "_sd": [digest(&disclosure), "undisclosed"],
            "nationalities": [{"...": digest(&element)}, {"...": "hidden"}]
        }));
        let raw = format!("{jwt}~{disclosure}~{element}~");

        let vc = Credential::parse_stored(ClaimFormatDesignation::VcSdJwt, &raw).unwrap();
        let subject = &vc.claims()["credentialSubject"];
        assert_eq!(subject["given_name"], "Alice");
        assert_eq!(subject["nationalities"], json!(["FR"]));
        assert!(subject.get("_sd").is_none());
        assert_eq!(vc.types(), vec!["VerifiableCredential", "Identity"]);
        assert_eq!(vc.subject_ids(), vec!["did:example:holder"]);
    }

    #[test]
    fn mdoc_namespaces() {
        let item = Cbor::Map(vec![
            (Cbor::Text("digestID".into()), Cbor::Integer(0.into())),
            (Cbor::Text("elementIdentifier".into()), Cbor::Text("family_name".into())),
            (Cbor::Text("elementValue".into()), Cbor::Text("Doe".into())),
        ]);
        let mut item_bytes = Vec::new();
        ciborium::into_writer(&item, &mut item_bytes).unwrap();

        let issuer_signed = Cbor::Map(vec![(
            Cbor::Text("nameSpaces".into()),
            Cbor::Map(vec![(
                Cbor::Text("org.iso.18013.5.1".into()),
                Cbor::Array(vec![Cbor::Tag(24, Box::new(Cbor::Bytes(item_bytes)))]),
            )]),
        )]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&issuer_signed, &mut bytes).unwrap();

        let vc = Credential::parse_stored(
            ClaimFormatDesignation::MsoMDoc,
            &BASE64_URL_SAFE_NO_PAD.encode(bytes),
        )
        .unwrap();
        assert_eq!(
            vc.claims()["credentialSubject"]["org.iso.18013.5.1"]["family_name"],
            "Doe"
        );
        assert!(vc.subject_ids().is_empty());
    }

    #[test]
    fn ldp_requires_context() {
        let err = Credential::parse_stored(ClaimFormatDesignation::LdpVc, r#"{"type":"VerifiableCredential"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("@context"));
    }
}
