use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};
use url::Url;

use super::parameters::{
    Claims, ClientId, ClientIdScheme, ClientMetadata, Expiry, Nonce,
    PresentationDefinition as PresentationDefinitionParameter, RedirectUri, Registration,
    ResponseMode, ResponseType, ResponseUri, Scope, State,
};
use crate::{
    core::{
        object::{ParsingErrorContext, TypedParameter, UntypedObject},
        presentation_definition::PresentationDefinition,
    },
    did::{verify_jwt, DidResolver},
    jwt::decode_unverified,
    utils::now_secs,
};

/// Prefix of an authorization request passed by reference.
pub const REQUEST_URI_PREFIX: &str = "openid-vc://?request_uri=";

/// Verifier identity shown to the user before presenting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierDisplayData {
    pub did: String,
    pub name: Option<String>,
    pub purpose: Option<String>,
    pub logo_uri: Option<String>,
}

/// A verified authorization request.
#[derive(Debug, Clone)]
pub struct RequestObject {
    claims: UntypedObject,
    client_id: String,
    client_id_scheme: Option<ClientIdScheme>,
    signer_did: String,
    response_uri: Url,
    nonce: String,
    state: Option<String>,
    scope: Vec<String>,
    expires_at: Option<i64>,
    presentation_definition: PresentationDefinition,
    display: VerifierDisplayData,
}

impl RequestObject {
    /// Parse the claims of a request object whose signature was checked
    /// against `signer_did`.
    pub(crate) fn from_claims(claims: Json, signer_did: String) -> Result<Self> {
        let claims = UntypedObject::from_json(claims).context("request object claims")?;

        let client_id = claims.get::<ClientId>().parsing_error()?.0;
        let client_id_scheme = optional::<ClientIdScheme>(&claims)?;

        let response_uri = match claims.get::<ResponseUri>() {
            Some(uri) => uri.parsing_error()?.0,
            None => {
                claims
                    .get::<RedirectUri>()
                    .context("'response_uri' is missing")?
                    .parsing_error()?
                    .0
            }
        };

        if let Some(mode) = optional::<ResponseMode>(&claims)? {
            if mode != ResponseMode::DirectPost {
                warn!(%mode, "unexpected response mode, responding with direct_post");
            }
        }
        if let Some(ResponseType::Unsupported(kind)) = optional::<ResponseType>(&claims)? {
            bail!("unsupported response type '{kind}'")
        }

        let nonce = claims.get::<Nonce>().parsing_error()?.0;
        let state = optional::<State>(&claims)?.map(|s| s.0);
        let scope = claims.get_or_default::<Scope>()?.0;
        let expires_at = optional::<Expiry>(&claims)?.map(|e| e.0);

        let definition = match claims.get::<PresentationDefinitionParameter>() {
            Some(definition) => definition.parsing_error()?.0,
            None => optional::<Claims>(&claims)?
                .and_then(|c| c.presentation_definition().cloned())
                .context("'presentation_definition' is missing")?,
        };
        let presentation_definition: PresentationDefinition = serde_json::from_value(definition)
            .context("'presentation_definition' could not be parsed")?;

        let metadata = match claims.get::<ClientMetadata>() {
            Some(metadata) => Some(metadata.parsing_error()?.0),
            None => optional::<Registration>(&claims)?.map(|r| r.0),
        }
        .unwrap_or_default();

        let display = VerifierDisplayData {
            did: signer_did.clone(),
            name: metadata.get_str("client_name").map(str::to_owned),
            purpose: metadata.get_str("client_purpose").map(str::to_owned),
            logo_uri: metadata.get_str("logo_uri").map(str::to_owned),
        };

        Ok(Self {
            claims,
            client_id,
            client_id_scheme,
            signer_did,
            response_uri,
            nonce,
            state,
            scope,
            expires_at,
            presentation_definition,
            display,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_id_scheme(&self) -> Option<&ClientIdScheme> {
        self.client_id_scheme.as_ref()
    }

    /// DID whose key signed the request.
    pub fn signer_did(&self) -> &str {
        &self.signer_did
    }

    /// Where the authorization response is posted.
    pub fn response_uri(&self) -> &Url {
        &self.response_uri
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn presentation_definition(&self) -> &PresentationDefinition {
        &self.presentation_definition
    }

    pub fn display(&self) -> &VerifierDisplayData {
        &self.display
    }

    /// The raw claims, including members this library does not read.
    pub fn claims(&self) -> &UntypedObject {
        &self.claims
    }

    pub(crate) fn check_expiry(&self, now: i64) -> Result<()> {
        match self.expires_at {
            Some(exp) if exp < now => bail!("request object expired at {exp}"),
            _ => Ok(()),
        }
    }
}

fn optional<T: TypedParameter>(claims: &UntypedObject) -> Result<Option<T>> {
    claims
        .get::<T>()
        .map(ParsingErrorContext::parsing_error)
        .transpose()
}

/// Verify a request object JWT and parse its claims.
///
/// The `kid` header must name a verification method of the DID in `client_id`.
pub(crate) async fn verify_request_object(
    jwt: &str,
    resolver: &dyn DidResolver,
) -> Result<RequestObject> {
    let (_, unverified) = decode_unverified(jwt).context("request object is not a JWT")?;
    let client_id = unverified
        .get("client_id")
        .and_then(Json::as_str)
        .context("'client_id' is missing")?
        .to_owned();

    let verified = verify_jwt(jwt, resolver, Some(&client_id))
        .await
        .context("invalid request object signature")?;
    debug!(kid = %verified.kid, "verified request object");

    let request = RequestObject::from_claims(verified.claims, verified.did)?;
    request.check_expiry(now_secs())?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition() -> Json {
        json!({
            "id": "pd-1",
            "input_descriptors": [{
                "id": "employment",
                "constraints": {"fields": [{"path": ["$.type"]}]}
            }]
        })
    }

    #[test]
    fn current_parameters() {
        let request = RequestObject::from_claims(
            json!({
                "client_id": "did:example:verifier",
                "client_id_scheme": "did",
                "response_type": "vp_token id_token",
                "response_mode": "direct_post",
                "response_uri": "https://verifier.example/cb",
                "nonce": "n-1",
                "state": "s-1",
                "scope": "openid",
                "exp": 4_000_000_000i64,
                "presentation_definition": definition(),
                "client_metadata": {
                    "client_name": "Verifier",
                    "client_purpose": "Check employment",
                    "logo_uri": "https://verifier.example/logo.png"
                }
            }),
            "did:example:verifier".into(),
        )
        .unwrap();

        assert_eq!(request.client_id(), "did:example:verifier");
        assert_eq!(request.client_id_scheme(), Some(&ClientIdScheme::Did));
        assert_eq!(request.response_uri().as_str(), "https://verifier.example/cb");
        assert_eq!(request.state(), Some("s-1"));
        assert_eq!(request.scope(), ["openid"]);
        assert_eq!(request.presentation_definition().id(), "pd-1");
        assert_eq!(request.display().name.as_deref(), Some("Verifier"));
        assert_eq!(request.display().did, "did:example:verifier");
        assert!(request.check_expiry(now_secs()).is_ok());
    }

    #[test]
    fn legacy_parameters() {
        let request = RequestObject::from_claims(
            json!({
                "client_id": "did:example:verifier",
                "redirect_uri": "https://verifier.example/legacy",
                "nonce": "n-1",
                "claims": {"vp_token": {"presentation_definition": definition()}},
                "registration": {"client_name": "Legacy verifier"}
            }),
            "did:example:verifier".into(),
        )
        .unwrap();

        assert_eq!(request.response_uri().as_str(), "https://verifier.example/legacy");
        assert_eq!(request.presentation_definition().id(), "pd-1");
        assert_eq!(request.display().name.as_deref(), Some("Legacy verifier"));
        assert!(request.state().is_none());
        assert!(request.scope().is_empty());
    }

    #[test]
    fn missing_members() {
        let err = RequestObject::from_claims(
            json!({"client_id": "did:example:verifier", "nonce": "n", "presentation_definition": definition()}),
            "did:example:verifier".into(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "'response_uri' is missing");

        let err = RequestObject::from_claims(
            json!({"client_id": "did:example:verifier", "nonce": "n", "response_uri": "https://v.example"}),
            "did:example:verifier".into(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "'presentation_definition' is missing");
    }

    #[test]
    fn expired() {
        let request = RequestObject::from_claims(
            json!({
                "client_id": "did:example:verifier",
                "response_uri": "https://verifier.example/cb",
                "nonce": "n-1",
                "exp": 1_000,
                "presentation_definition": definition()
            }),
            "did:example:verifier".into(),
        )
        .unwrap();
        assert!(request.check_expiry(now_secs()).is_err());
    }
}
