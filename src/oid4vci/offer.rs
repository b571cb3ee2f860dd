use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const CREDENTIAL_OFFER_SCHEME: &str = "openid-credential-offer";
pub const PRE_AUTHORIZED_CODE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:pre-authorized_code";
pub const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";

/// A Credential Offer, as deep-linked to the wallet by an issuer.
///
/// For more information, see: [https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-offer-parameters](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-offer-parameters)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialOffer {
    pub credential_issuer: String,
    #[serde(default)]
    pub credential_configuration_ids: Vec<String>,
    #[serde(default)]
    pub grants: Grants,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grants {
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    /// Present when the issuer expects a transaction code (PIN).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    /// Pre-`tx_code` drafts.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub user_pin_required: bool,
}

impl PreAuthorizedCodeGrant {
    pub fn pin_required(&self) -> bool {
        self.tx_code.is_some() || self.user_pin_required
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

/// Where the offer JSON lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OfferIndirection {
    ByValue(String),
    ByReference(String),
}

impl OfferIndirection {
    /// Read the `credential_offer` or `credential_offer_uri` parameter of an
    /// `openid-credential-offer://` URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).context("failed to parse issuance URI")?;

        if url.scheme() != CREDENTIAL_OFFER_SCHEME {
            bail!("{} is not a supported issuance URL scheme", url.scheme())
        }

        let mut by_value = None;
        let mut by_reference = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "credential_offer" => by_value = Some(value.into_owned()),
                "credential_offer_uri" => by_reference = Some(value.into_owned()),
                _ => {}
            }
        }

        match (by_value, by_reference) {
            (Some(json), _) => Ok(Self::ByValue(json)),
            (None, Some(uri)) => Ok(Self::ByReference(uri)),
            (None, None) => {
                bail!("credential offer query parameter missing from initiate issuance URI")
            }
        }
    }
}

impl CredentialOffer {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let offer: Self =
            serde_json::from_slice(bytes).context("failed to unmarshal credential offer JSON")?;

        if offer.grants.pre_authorized_code.is_none() && offer.grants.authorization_code.is_none()
        {
            bail!("no supported grant types found")
        }

        Ok(offer)
    }
}
