use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use tracing::debug;
use uuid::Uuid;

use super::request_object::RequestObject;
use crate::{
    core::{
        presentation_definition::MatchedInputs,
        presentation_submission::{CredentialPosition, PresentationSubmission},
    },
    credential::Credential,
    did::{resolve_document, DidResolver},
    jwt::sign_jwt,
    signer::{Signer, VerificationMethod},
    utils::now_secs,
};

/// Validity of the VP tokens and the ID token.
pub(crate) const TOKEN_LIFETIME_SECS: i64 = 600;

const SELF_ISSUED_ISSUER: &str = "https://self-issued.me/v2/openid-vc";
const JWT_TYPE: &str = "JWT";
const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Form body of the authorization response.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuthorizedResponse {
    pub id_token: String,
    /// A VP JWT, or a JSON array of VP JWTs when several holders sign.
    pub vp_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// JSON object passed through from the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_details: Option<String>,
}

/// Credentials of one holder, presented together in one VP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HolderPresentation {
    pub did: String,
    /// Indexes into the presented credentials, in presentation order.
    pub credentials: Vec<usize>,
}

/// Group the selected credentials by the DID of their first subject.
pub(crate) fn group_by_holder(
    credentials: &[Credential],
    selected: &[usize],
) -> Result<Vec<HolderPresentation>> {
    let mut holders: Vec<HolderPresentation> = Vec::new();

    for &index in selected {
        let credential = credentials
            .get(index)
            .with_context(|| format!("no credential at index {index}"))?;
        let did = credential
            .subject_ids()
            .into_iter()
            .next()
            .context("VC does not have a subject ID")?;

        match holders.iter_mut().find(|h| h.did == did) {
            Some(holder) => holder.credentials.push(index),
            None => holders.push(HolderPresentation {
                did,
                credentials: vec![index],
            }),
        }
    }

    Ok(holders)
}

#[derive(Serialize)]
struct VpTokenClaims<'a> {
    vp: Json,
    nonce: &'a str,
    exp: i64,
    iss: &'a str,
    aud: &'a str,
    nbf: i64,
    iat: i64,
    jti: String,
}

#[derive(Serialize)]
struct IdTokenVpToken {
    presentation_submission: Json,
}

#[derive(Serialize)]
struct IdTokenClaims<'a> {
    #[serde(rename = "_scope", skip_serializing_if = "Map::is_empty")]
    scope: Map<String, Json>,
    #[serde(rename = "_vp_token")]
    vp_token: IdTokenVpToken,
    #[serde(rename = "_attestation_vp", skip_serializing_if = "Option::is_none")]
    attestation_vp: Option<String>,
    nonce: &'a str,
    exp: i64,
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    nbf: i64,
    iat: i64,
    jti: String,
}

/// Builds the signed authorization response for a verified request.
pub(crate) struct ResponseBuilder<'a> {
    pub request: &'a RequestObject,
    pub resolver: &'a dyn DidResolver,
    pub signer: &'a dyn Signer,
    /// Used for the holder it belongs to. Other holders sign with their first
    /// assertion method.
    pub signing_method: Option<&'a VerificationMethod>,
}

impl ResponseBuilder<'_> {
    pub async fn build(
        &self,
        credentials: &[Credential],
        matches: &MatchedInputs,
        scope_claims: Map<String, Json>,
        attestation_vp: Option<String>,
    ) -> Result<AuthorizedResponse> {
        let holders = group_by_holder(credentials, &matches.selected())?;
        if holders.is_empty() {
            bail!("no credential matched the presentation definition")
        }

        let positions: HashMap<usize, CredentialPosition> = holders
            .iter()
            .enumerate()
            .flat_map(|(presentation, holder)| {
                holder
                    .credentials
                    .iter()
                    .enumerate()
                    .map(move |(credential, &index)| {
                        (
                            index,
                            CredentialPosition {
                                presentation,
                                credential,
                            },
                        )
                    })
            })
            .collect();

        let submission = PresentationSubmission::for_presentations(
            self.request.presentation_definition(),
            matches,
            holders.len(),
            |index| {
                let at = positions.get(&index)?;
                let credential = credentials.get(index)?;
                Some((*at, credential.format().clone()))
            },
        )
        .context("failed to build presentation submission")?;
        let submission = Json::from(submission);

        let mut methods = Vec::with_capacity(holders.len());
        let mut vp_tokens = Vec::with_capacity(holders.len());
        for holder in &holders {
            let method = self.holder_method(&holder.did).await?;
            let presented: Vec<Json> = holder
                .credentials
                .iter()
                .filter_map(|&i| credentials.get(i))
                .map(Credential::presentation_value)
                .collect();

            let embedded_submission = (holders.len() == 1).then_some(&submission);
            vp_tokens.push(
                self.vp_token(&holder.did, presented, embedded_submission, &method)
                    .await?,
            );
            methods.push(method);
        }

        let vp_token = match vp_tokens.as_slice() {
            [single] => single.clone(),
            _ => serde_json::to_string(&vp_tokens)?,
        };

        let Some(first_method) = methods.first() else {
            bail!("no holder to sign the ID token")
        };
        let id_token = self
            .id_token(
                &holders[0].did,
                first_method,
                submission,
                scope_claims,
                attestation_vp,
            )
            .await?;

        debug!(holders = holders.len(), "built authorization response");

        Ok(AuthorizedResponse {
            id_token,
            vp_token,
            state: self.request.state().map(str::to_owned),
            interaction_details: None,
        })
    }

    async fn holder_method(&self, did: &str) -> Result<VerificationMethod> {
        if let Some(method) = self.signing_method.filter(|m| m.did().ok() == Some(did)) {
            return Ok(method.clone());
        }

        let document = resolve_document(self.resolver, did).await?;
        let entry = document
            .assertion_methods()
            .into_iter()
            .next()
            .context("holder DID has no assertion method for signing")?;

        let mut method = VerificationMethod::from_did_method(entry)?;
        if method.key_id.starts_with('#') {
            method.key_id = format!("{did}{}", method.key_id);
        }
        Ok(method)
    }

    async fn vp_token(
        &self,
        holder: &str,
        credentials: Vec<Json>,
        submission: Option<&Json>,
        method: &VerificationMethod,
    ) -> Result<String> {
        let now = now_secs();
        let id = format!("urn:uuid:{}", Uuid::new_v4());

        let mut vp = json!({
            "@context": [CREDENTIALS_CONTEXT],
            "type": ["VerifiablePresentation"],
            "id": id,
            "holder": holder,
            "verifiableCredential": credentials,
        });
        if let Some(submission) = submission {
            vp["presentation_submission"] = submission.clone();
        }

        let claims = VpTokenClaims {
            vp,
            nonce: self.request.nonce(),
            exp: now + TOKEN_LIFETIME_SECS,
            iss: holder,
            aud: self.request.client_id(),
            nbf: now,
            iat: now,
            jti: id,
        };

        sign_jwt(&claims, Some(JWT_TYPE), method, self.signer)
            .await
            .context("failed to sign vp_token")
    }

    async fn id_token(
        &self,
        holder: &str,
        method: &VerificationMethod,
        submission: Json,
        scope: Map<String, Json>,
        attestation_vp: Option<String>,
    ) -> Result<String> {
        let now = now_secs();

        let claims = IdTokenClaims {
            scope,
            vp_token: IdTokenVpToken {
                presentation_submission: submission,
            },
            attestation_vp,
            nonce: self.request.nonce(),
            exp: now + TOKEN_LIFETIME_SECS,
            iss: SELF_ISSUED_ISSUER,
            sub: holder,
            aud: self.request.client_id(),
            nbf: now,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        sign_jwt(&claims, Some(JWT_TYPE), method, self.signer)
            .await
            .context("failed to sign id_token")
    }
}
