use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use super::token::ATTEST_JWT_CLIENT_AUTH;
use crate::{
    core::{
        credential_format::ClaimFormatDesignation,
        util::{Call, Transport},
    },
    did::{verify_jwt, DidResolver},
};

const FETCH_ISSUER_METADATA_EVENT: &str = "Fetch issuer metadata via an HTTP GET request to";
const FETCH_OPENID_CONFIG_EVENT: &str = "Fetch issuer's OpenID configuration via an HTTP GET request to";

/// Credential Issuer Metadata.
///
/// For more information, see: [https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-issuer-metadata](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-issuer-metadata)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IssuerMetadata {
    pub credential_issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,
    #[serde(default)]
    pub credential_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_credential_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_credential_endpoint: Option<String>,
    #[serde(
        default,
        alias = "credential_ack_endpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default)]
    pub credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<IssuerDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_metadata: Option<String>,
    /// `kid` of the verified `signed_metadata` JWT.
    #[serde(skip)]
    signed_metadata_kid: Option<String>,
}

impl IssuerMetadata {
    /// Key id that signed the metadata, when it was served signed.
    pub fn signed_metadata_kid(&self) -> Option<&str> {
        self.signed_metadata_kid.as_deref()
    }

    /// The issuer's DID, taken from the signed metadata key id.
    pub fn issuer_did(&self) -> Option<&str> {
        self.signed_metadata_kid
            .as_deref()
            .map(|kid| kid.split('#').next().unwrap_or(kid))
    }

    /// Base URL of the authorization server for OpenID configuration discovery.
    pub fn authorization_server_url(&self) -> &str {
        self.authorization_server
            .as_deref()
            .or(self.authorization_servers.first().map(String::as_str))
            .unwrap_or(&self.credential_issuer)
    }

    /// Whether the token endpoint expects wallet attestation client authentication.
    pub fn client_attestation_requested(&self) -> bool {
        self.token_endpoint_auth_methods_supported
            .iter()
            .any(|m| m == ATTEST_JWT_CLIENT_AUTH)
    }

    /// The display entry for `locale`, falling back to the first entry.
    pub fn localized_issuer_display(&self, locale: Option<&str>) -> Option<&IssuerDisplay> {
        locale
            .and_then(|l| {
                self.display
                    .iter()
                    .find(|d| d.locale.as_deref().is_some_and(|dl| dl.eq_ignore_ascii_case(l)))
            })
            .or(self.display.first())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialConfiguration {
    pub format: ClaimFormatDesignation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<CredentialDefinition>,
    /// `vc+sd-jwt` credential type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    /// `mso_mdoc` document type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_signing_alg_values_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_types_supported: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<CredentialDisplay>,
}

impl CredentialConfiguration {
    /// Credential types requested for this configuration.
    pub fn types(&self) -> Vec<String> {
        match (&self.credential_definition, &self.vct, &self.doctype) {
            (Some(definition), _, _) if !definition.types.is_empty() => definition.types.clone(),
            (_, Some(vct), _) => vec![vct.clone()],
            (_, _, Some(doctype)) => vec![doctype.clone()],
            _ => vec![],
        }
    }

    /// JSON-LD contexts, only meaningful for `ldp_vc`.
    pub fn contexts(&self) -> Vec<String> {
        match (&self.format, &self.credential_definition) {
            (ClaimFormatDesignation::LdpVc, Some(definition)) => definition.context.clone(),
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialDefinition {
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(rename = "type", alias = "types", default)]
    pub types: Vec<String>,
    #[serde(
        rename = "credentialSubject",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential_subject: Option<Json>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Logo {
    #[serde(alias = "url", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuerDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Logo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Logo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

/// Authorization server metadata from `/.well-known/openid-configuration`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenIdConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
}

/// Grant types the issuer offers for the current interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerCapabilities {
    pub pre_authorized_code_supported: bool,
    pub authorization_code_supported: bool,
}

/// Fetch `{issuer}/.well-known/openid-credential-issuer`.
///
/// When the document carries `signed_metadata`, its signature is checked
/// against the DID named by the JWT `kid`, and the signed claims replace the
/// unsigned document.
pub(crate) async fn fetch_issuer_metadata(
    issuer_uri: &str,
    transport: Transport<'_>,
    resolver: &dyn DidResolver,
    parent_event: &str,
) -> Result<IssuerMetadata> {
    let endpoint = format!(
        "{}/.well-known/openid-credential-issuer",
        issuer_uri.trim_end_matches('/')
    );

    let body = transport
        .get(
            &endpoint,
            Call {
                event: format!("{FETCH_ISSUER_METADATA_EVENT} {endpoint}"),
                parent_event,
                endpoint: "issuer's metadata endpoint",
                accept: &[200],
            },
        )
        .await
        .context("failed to get response from the issuer's metadata endpoint")?;

    let metadata: IssuerMetadata =
        serde_json::from_slice(&body).context("failed to decode issuer metadata")?;

    match &metadata.signed_metadata {
        Some(signed) => {
            debug!("verifying signed issuer metadata");
            let verified = verify_jwt(signed, resolver, None)
                .await
                .context("failed to verify signed issuer metadata")?;

            let mut signed_metadata: IssuerMetadata = serde_json::from_value(verified.claims)
                .context("failed to decode signed issuer metadata")?;
            signed_metadata.signed_metadata = metadata.signed_metadata.clone();
            signed_metadata.signed_metadata_kid = Some(verified.kid);
            Ok(signed_metadata)
        }
        None => Ok(metadata),
    }
}

/// Fetch the authorization server's OpenID configuration.
pub(crate) async fn fetch_openid_config(
    base_url: &str,
    transport: Transport<'_>,
    parent_event: &str,
) -> Result<OpenIdConfig> {
    let endpoint = format!(
        "{}/.well-known/openid-configuration",
        base_url.trim_end_matches('/')
    );

    let body = transport
        .get(
            &endpoint,
            Call {
                event: format!("{FETCH_OPENID_CONFIG_EVENT} {endpoint}"),
                parent_event,
                endpoint: "issuer's OpenID configuration endpoint",
                accept: &[200],
            },
        )
        .await
        .context("openid configuration endpoint")?;

    serde_json::from_slice(&body).context(
        "failed to unmarshal response from the issuer's OpenID configuration endpoint",
    )
}
