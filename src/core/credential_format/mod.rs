use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VC_JSON_LD: &str = "jwt_vc_json-ld";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_LDP_VP: &str = "ldp_vp";
const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";
const FORMAT_MSO_MDOC: &str = "mso_mdoc";

/// A Json object of claim formats, as found in presentation definitions and
/// verifier metadata (`vp_formats`).
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// The credential type that may be requested in a presentation request.
// NOTE: Credential types can be presented in a number of formats and therefore
// an alias of a String is used.
pub type CredentialType = String;

/// Claim format payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    #[serde(rename = "alg_values_supported")]
    AlgValuesSupported(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Registered names of credential and presentation formats.
///
/// Issuance uses the credential formats (`jwt_vc_json`, `jwt_vc_json-ld`,
/// `ldp_vc`, `vc+sd-jwt`, `mso_mdoc`); presentation definitions additionally
/// name the presentation formats (`jwt_vp`, `jwt_vp_json`, `ldp_vp`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    JwtVc,
    JwtVp,
    /// W3C credential secured as a JWT, with a plain JSON payload.
    JwtVcJson,
    /// W3C credential secured as a JWT, with a JSON-LD payload.
    JwtVcJsonLd,
    JwtVpJson,
    /// W3C credential secured with a Linked Data proof, submitted as a JSON object.
    LdpVc,
    LdpVp,
    /// IETF SD-JWT credential: an issuer-signed JWT followed by `~`-separated disclosures.
    VcSdJwt,
    /// ISO/IEC 18013-5 mobile document, base64url-encoded CBOR `IssuerSigned` structure.
    MsoMDoc,
    /// Other claim format designations not covered by the above.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VC_JSON_LD => Self::JwtVcJsonLd,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_LDP_VP => Self::LdpVp,
            FORMAT_VC_SD_JWT => Self::VcSdJwt,
            FORMAT_MSO_MDOC => Self::MsoMDoc,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVcJsonLd => FORMAT_JWT_VC_JSON_LD,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::LdpVp => FORMAT_LDP_VP,
            Self::VcSdJwt => FORMAT_VC_SD_JWT,
            Self::MsoMDoc => FORMAT_MSO_MDOC,
            Self::Other(other) => other,
        }
    }

    /// Whether the wallet can receive credentials of this format from an issuer.
    pub fn is_issuable(&self) -> bool {
        matches!(
            self,
            Self::JwtVcJson | Self::JwtVcJsonLd | Self::LdpVc | Self::VcSdJwt | Self::MsoMDoc
        )
    }

    /// Whether credentials of this format are JWT-secured W3C credentials.
    pub fn is_jwt_vc(&self) -> bool {
        matches!(self, Self::JwtVc | Self::JwtVcJson | Self::JwtVcJsonLd)
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(format: ClaimFormatDesignation) -> Self {
        format.name().to_owned()
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}
