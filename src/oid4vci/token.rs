use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::offer::{AUTHORIZATION_CODE_GRANT_TYPE, PRE_AUTHORIZED_CODE_GRANT_TYPE};
use crate::{
    core::util::{Call, Transport},
    utils::now_secs,
};

pub(crate) const ATTEST_JWT_CLIENT_AUTH: &str = "attest_jwt_client_auth";
const FETCH_TOKEN_EVENT: &str = "Fetch token via an HTTP POST request to";

/// Successful response of the token endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<i64>,
}

/// Access token kept for calls made after the interaction, e.g. acknowledgments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Unix time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<&TokenResponse> for AuthToken {
    fn from(token: &TokenResponse) -> Self {
        Self {
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            expires_at: token
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now_secs() + secs),
            refresh_token: token.refresh_token.clone(),
        }
    }
}

/// Form body of a token request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum TokenRequest<'a> {
    PreAuthorized {
        grant_type: &'static str,
        #[serde(rename = "pre-authorized_code")]
        pre_authorized_code: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_code: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_assertion_type: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_assertion: Option<&'a str>,
    },
    AuthorizationCode {
        grant_type: &'static str,
        code: &'a str,
        redirect_uri: &'a str,
        client_id: &'a str,
        code_verifier: &'a str,
    },
}

impl<'a> TokenRequest<'a> {
    pub fn pre_authorized(
        pre_authorized_code: &'a str,
        pin: Option<&'a str>,
        attestation_vp: Option<&'a str>,
    ) -> Self {
        Self::PreAuthorized {
            grant_type: PRE_AUTHORIZED_CODE_GRANT_TYPE,
            pre_authorized_code,
            tx_code: pin.filter(|p| !p.is_empty()),
            client_assertion_type: attestation_vp.map(|_| ATTEST_JWT_CLIENT_AUTH),
            client_assertion: attestation_vp,
        }
    }

    pub fn authorization_code(
        code: &'a str,
        redirect_uri: &'a str,
        client_id: &'a str,
        code_verifier: &'a str,
    ) -> Self {
        Self::AuthorizationCode {
            grant_type: AUTHORIZATION_CODE_GRANT_TYPE,
            code,
            redirect_uri,
            client_id,
            code_verifier,
        }
    }

    /// POST the request to the token endpoint.
    pub async fn send(
        &self,
        token_endpoint: &str,
        transport: Transport<'_>,
        parent_event: &str,
    ) -> Result<TokenResponse> {
        debug!(%token_endpoint, "requesting access token");

        let body = transport
            .post_form(
                token_endpoint,
                self,
                Call {
                    event: format!("{FETCH_TOKEN_EVENT} {token_endpoint}"),
                    parent_event,
                    endpoint: "issuer's token endpoint",
                    accept: &[200],
                },
            )
            .await
            .context("failed to get token response")?;

        serde_json::from_slice(&body)
            .context("failed to unmarshal response from the issuer's token endpoint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_authorized_form() {
        let form =
            serde_urlencoded::to_string(TokenRequest::pre_authorized("abc", Some("1234"), None))
                .unwrap();
        assert_eq!(
            form,
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Apre-authorized_code\
             &pre-authorized_code=abc&tx_code=1234"
        );

        let form = serde_urlencoded::to_string(TokenRequest::pre_authorized(
            "abc",
            Some(""),
            Some("vp.jwt"),
        ))
        .unwrap();
        assert!(!form.contains("tx_code"));
        assert!(form.contains("client_assertion_type=attest_jwt_client_auth"));
        assert!(form.contains("client_assertion=vp.jwt"));
    }

    #[test]
    fn authorization_code_form() {
        let form = serde_urlencoded::to_string(TokenRequest::authorization_code(
            "code-1",
            "https://wallet.example/cb",
            "wallet",
            "verifier",
        ))
        .unwrap();
        assert_eq!(
            form,
            "grant_type=authorization_code&code=code-1\
             &redirect_uri=https%3A%2F%2Fwallet.example%2Fcb&client_id=wallet&code_verifier=verifier"
        );
    }

    #[test]
    fn auth_token_expiry() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"at","token_type":"Bearer","expires_in":300,"c_nonce":"n"}"#,
        )
        .unwrap();
        let auth = AuthToken::from(&token);
        assert_eq!(auth.access_token, "at");
        assert!(auth.expires_at.unwrap() >= now_secs() + 299);

        let token = TokenResponse {
            access_token: "at".into(),
            ..Default::default()
        };
        assert_eq!(AuthToken::from(&token).expires_at, None);
    }
}
