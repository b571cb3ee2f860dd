use std::fmt;

use serde::{Deserialize, Serialize};

/// Component that produced a [WalletError].
///
/// The module prefix is the first part of every error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Module {
    /// Credential issuance.
    Issuance,
    /// Credential presentation.
    Presentation,
    /// DID resolution and linked domain validation.
    Did,
    /// Trust registry evaluation.
    TrustRegistry,
}

impl Module {
    pub fn prefix(&self) -> &'static str {
        match self {
            Module::Issuance => "OCI",
            Module::Presentation => "OVP",
            Module::Did => "DID",
            Module::TrustRegistry => "TRR",
        }
    }
}

/// Broad class of an error, encoded as the digit following the module prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Validation = 0,
    Execution = 1,
    System = 2,
    InvalidSdkUsage = 3,
}

/// Machine-readable error kinds.
///
/// Every kind has a stable number and name. Together with the producing [Module]
/// and the kind's [Category] they form the code returned by [WalletError::code].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller violated a precondition: missing argument, wrong call order, or conflicting options.
    InvalidSdkUsage,
    MetadataFetchFailed,
    TokenFetchFailed,
    CredentialRequestFailed,
    TrustRegistryFetchFailed,
    AcknowledgmentFailed,
    /// Signature or schema verification failed on an inbound authorization request.
    InvalidAuthorizationRequest,
    UnsupportedAlgorithm,
    SigningFailed,
    CredentialParseFailed,
    PinRequired,
    GrantNotSupported,
    AuthorizationUrlMustBeCreatedFirst,
    InvalidIssuanceUri,
    InvalidCredentialOffer,
    InvalidCredentialConfigurationId,
    UnsupportedCredentialFormat,
    KeyIdMissingDidPart,
    IssuerOpenIdConfigFetchFailed,
    IssuerDoesNotSupportAuthCodeGrant,
    DidServiceValidationFailed,
    ScopeClaimParseFailed,
    RequestObjectFetchFailed,
    PresentationSubmitFailed,
    NoMatchingCredential,
}

impl ErrorKind {
    pub fn category(&self) -> Category {
        use ErrorKind::*;

        match self {
            InvalidSdkUsage
            | PinRequired
            | GrantNotSupported
            | AuthorizationUrlMustBeCreatedFirst
            | IssuerDoesNotSupportAuthCodeGrant => Category::InvalidSdkUsage,
            InvalidIssuanceUri
            | InvalidCredentialOffer
            | InvalidCredentialConfigurationId
            | UnsupportedCredentialFormat
            | InvalidAuthorizationRequest
            | ScopeClaimParseFailed => Category::Validation,
            UnsupportedAlgorithm | SigningFailed => Category::System,
            _ => Category::Execution,
        }
    }

    /// Stable per-kind number, the last four digits of the code.
    pub fn number(&self) -> u16 {
        use ErrorKind::*;

        match self {
            InvalidSdkUsage => 0,
            InvalidIssuanceUri => 2,
            InvalidCredentialOffer => 3,
            UnsupportedCredentialFormat => 4,
            PinRequired => 5,
            IssuerOpenIdConfigFetchFailed => 6,
            MetadataFetchFailed => 7,
            TokenFetchFailed => 8,
            SigningFailed => 9,
            CredentialRequestFailed => 10,
            KeyIdMissingDidPart => 11,
            CredentialParseFailed => 12,
            InvalidCredentialConfigurationId => 13,
            GrantNotSupported => 14,
            AuthorizationUrlMustBeCreatedFirst => 15,
            IssuerDoesNotSupportAuthCodeGrant => 16,
            UnsupportedAlgorithm => 17,
            AcknowledgmentFailed => 18,
            InvalidAuthorizationRequest => 20,
            RequestObjectFetchFailed => 21,
            PresentationSubmitFailed => 22,
            ScopeClaimParseFailed => 23,
            NoMatchingCredential => 24,
            DidServiceValidationFailed => 30,
            TrustRegistryFetchFailed => 40,
        }
    }

    pub fn name(&self) -> &'static str {
        use ErrorKind::*;

        match self {
            InvalidSdkUsage => "INVALID_SDK_USAGE",
            MetadataFetchFailed => "METADATA_FETCH_FAILED",
            TokenFetchFailed => "TOKEN_FETCH_FAILED",
            CredentialRequestFailed => "CREDENTIAL_FETCH_FAILED",
            TrustRegistryFetchFailed => "TRUST_REGISTRY_FETCH_FAILED",
            AcknowledgmentFailed => "ACKNOWLEDGMENT_FAILED",
            InvalidAuthorizationRequest => "INVALID_AUTHORIZATION_REQUEST",
            UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            SigningFailed => "JWT_SIGNING_FAILED",
            CredentialParseFailed => "CREDENTIAL_PARSE_FAILED",
            PinRequired => "PIN_REQUIRED",
            GrantNotSupported => "GRANT_NOT_SUPPORTED",
            AuthorizationUrlMustBeCreatedFirst => "AUTHORIZATION_URL_MUST_BE_CREATED_FIRST",
            InvalidIssuanceUri => "INVALID_ISSUANCE_URI",
            InvalidCredentialOffer => "INVALID_CREDENTIAL_OFFER",
            InvalidCredentialConfigurationId => "INVALID_CREDENTIAL_CONFIGURATION_ID",
            UnsupportedCredentialFormat => "UNSUPPORTED_CREDENTIAL_TYPE_IN_OFFER",
            KeyIdMissingDidPart => "KEY_ID_MISSING_DID_PART",
            IssuerOpenIdConfigFetchFailed => "ISSUER_OPENID_FETCH_FAILED",
            IssuerDoesNotSupportAuthCodeGrant => "ISSUER_DOES_NOT_SUPPORT_AUTH_CODE_GRANT",
            DidServiceValidationFailed => "DID_SERVICE_VALIDATION_FAILED",
            ScopeClaimParseFailed => "SCOPE_CLAIM_PARSE_FAILED",
            RequestObjectFetchFailed => "REQUEST_OBJECT_FETCH_FAILED",
            PresentationSubmitFailed => "SEND_AUTHORIZED_RESPONSE_FAILED",
            NoMatchingCredential => "NO_MATCHING_CREDENTIAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error body returned by an OAuth2 style endpoint (token, credential, notification).
///
/// Attached to the cause chain so that [WalletError] can surface the server's
/// own code and description.
#[derive(Debug, Clone, thiserror::Error)]
#[error("received status code [{status}] with body [{body}] from {endpoint}")]
pub struct ServerError {
    pub status: u16,
    pub endpoint: String,
    pub body: String,
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// Fresh nonce offered alongside an `invalid_or_missing_proof` error.
    pub c_nonce: Option<String>,
}

impl ServerError {
    pub fn from_response(status: u16, endpoint: impl Into<String>, body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: Option<String>,
            error_description: Option<String>,
            c_nonce: Option<String>,
        }

        let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
        let (error, error_description, c_nonce) = match parsed {
            Some(b) => (b.error, b.error_description, b.c_nonce),
            None => (None, None, None),
        };

        Self {
            status,
            endpoint: endpoint.into(),
            body: String::from_utf8_lossy(body).into_owned(),
            error,
            error_description,
            c_nonce,
        }
    }

    /// Whether the server rejected the proof of possession and asked for a new one.
    pub fn is_invalid_proof(&self) -> bool {
        self.error.as_deref() == Some("invalid_or_missing_proof")
    }
}

/// Error returned by every public wallet operation.
///
/// Carries a stable machine-readable [code](WalletError::code), a category name
/// suitable for choosing a remediation, and a human-readable detail string.
#[derive(Debug, thiserror::Error)]
#[error("{kind}({code}): {details}")]
pub struct WalletError {
    kind: ErrorKind,
    module: Module,
    code: String,
    details: String,
    server_code: Option<String>,
    server_message: Option<String>,
    trace_id: Option<String>,
}

impl WalletError {
    pub fn new(module: Module, kind: ErrorKind, cause: impl Into<anyhow::Error>) -> Self {
        let cause = cause.into();

        let server = cause
            .chain()
            .find_map(|e| e.downcast_ref::<ServerError>())
            .cloned();

        Self {
            kind,
            module,
            code: format!(
                "{}{}-{:04}",
                module.prefix(),
                kind.category() as u8,
                kind.number()
            ),
            details: format!("{cause:#}"),
            server_code: server.as_ref().and_then(|s| s.error.clone()),
            server_message: server.and_then(|s| s.error_description),
            trace_id: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn module(&self) -> Module {
        self.module
    }

    /// Stable code, e.g. `OCI3-0005`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn category(&self) -> &'static str {
        self.kind.name()
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn server_code(&self) -> Option<&str> {
        self.server_code.as_deref()
    }

    pub fn server_message(&self) -> Option<&str> {
        self.server_message.as_deref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub(crate) fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// Converts an internal `anyhow` failure into a [WalletError] of the given kind.
pub trait WalletErrorContext<T> {
    fn wallet_err(self, module: Module, kind: ErrorKind) -> WalletResult<T>;
}

impl<T, E: Into<anyhow::Error>> WalletErrorContext<T> for Result<T, E> {
    fn wallet_err(self, module: Module, kind: ErrorKind) -> WalletResult<T> {
        self.map_err(|e| WalletError::new(module, kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn code_layout() {
        let err = WalletError::new(
            Module::Issuance,
            ErrorKind::PinRequired,
            anyhow::anyhow!("missing pin"),
        );
        assert_eq!(err.code(), "OCI3-0005");
        assert_eq!(err.category(), "PIN_REQUIRED");
        assert_eq!(err.to_string(), "PIN_REQUIRED(OCI3-0005): missing pin");

        let err = WalletError::new(
            Module::Presentation,
            ErrorKind::InvalidAuthorizationRequest,
            anyhow::anyhow!("bad signature"),
        );
        assert_eq!(err.code(), "OVP0-0020");
    }

    #[test]
    fn server_error_is_surfaced() {
        let server = ServerError::from_response(
            400,
            "issuer's token endpoint",
            br#"{"error":"invalid_grant","error_description":"code expired"}"#,
        );
        let res: anyhow::Result<()> = Err(server).context("failed to get token response");
        let err = res
            .wallet_err(Module::Issuance, ErrorKind::TokenFetchFailed)
            .unwrap_err();

        assert_eq!(err.server_code(), Some("invalid_grant"));
        assert_eq!(err.server_message(), Some("code expired"));
        assert!(err.details().contains("failed to get token response"));
        assert!(err.details().contains("invalid_grant"));
    }

    #[test]
    fn unparsable_server_body() {
        let server = ServerError::from_response(500, "issuer's credential endpoint", b"oops");
        assert!(server.error.is_none());
        assert!(!server.is_invalid_proof());
        assert_eq!(server.body, "oops");
    }
}
