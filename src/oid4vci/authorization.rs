use anyhow::{bail, Context, Result};
use base64::prelude::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::core::credential_format::ClaimFormatDesignation;

const CODE_CHALLENGE_METHOD: &str = "S256";
const AUTHORIZATION_DETAILS_TYPE: &str = "openid_credential";

/// The credential a wallet asks the authorization server to authorize.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuthorizationTarget<'a> {
    pub format: &'a ClaimFormatDesignation,
    pub types: &'a [String],
    /// Set when the issuer delegates to a separate authorization server.
    pub location: Option<&'a str>,
}

/// Entry of the `authorization_details` request parameter (RFC 9396).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AuthorizationDetails {
    #[serde(rename = "type")]
    kind: String,
    format: ClaimFormatDesignation,
    types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<String>,
}

/// Query parameters of an authorization code request with PKCE.
#[derive(Debug, Clone, Serialize)]
struct AuthorizationCodeRequest<'a> {
    response_type: &'static str,
    client_id: &'a str,
    redirect_uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    state: &'a str,
    code_challenge: String,
    code_challenge_method: &'static str,
    authorization_details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_state: Option<&'a str>,
}

/// What the wallet remembers between creating the authorization URL and
/// receiving the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthorizationState {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub code_verifier: String,
}

impl AuthorizationState {
    pub fn new(client_id: &str, redirect_uri: &str) -> Self {
        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);

        Self {
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            state: Uuid::new_v4().to_string(),
            code_verifier: BASE64_URL_SAFE_NO_PAD.encode(random),
        }
    }

    /// S256 PKCE challenge for the stored verifier.
    pub fn code_challenge(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(self.code_verifier.as_bytes()))
    }

    /// The URL the user opens to log in at the authorization server.
    pub fn authorization_url(
        &self,
        authorization_endpoint: &str,
        target: &AuthorizationTarget<'_>,
        issuer_state: Option<&str>,
        scopes: &[String],
    ) -> Result<Url> {
        let mut url = Url::parse(authorization_endpoint)
            .with_context(|| format!("invalid authorization endpoint '{authorization_endpoint}'"))?;

        let details = vec![AuthorizationDetails {
            kind: AUTHORIZATION_DETAILS_TYPE.to_owned(),
            format: target.format.clone(),
            types: target.types.to_vec(),
            locations: target.location.map(str::to_owned).into_iter().collect(),
        }];

        let request = AuthorizationCodeRequest {
            response_type: "code",
            client_id: &self.client_id,
            redirect_uri: &self.redirect_uri,
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
            state: &self.state,
            code_challenge: self.code_challenge(),
            code_challenge_method: CODE_CHALLENGE_METHOD,
            authorization_details: serde_json::to_string(&details)
                .context("failed to serialize authorization details")?,
            issuer_state,
        };

        let query = serde_urlencoded::to_string(&request)?;
        url.set_query(Some(&query));
        Ok(url)
    }

    /// Extract the authorization code from the redirect the user came back with.
    pub fn code_from_redirect(&self, redirect_uri_with_params: &str) -> Result<String> {
        let url = Url::parse(redirect_uri_with_params).context("failed to parse redirect URI")?;

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let Some(code) = param("code") else {
            bail!("redirect URI is missing an authorization code")
        };
        let Some(state) = param("state") else {
            bail!("redirect URI is missing a state value")
        };

        if state != self.state {
            bail!("state in redirect URI does not match the state from the authorization URL")
        }

        Ok(code)
    }
}
