use anyhow::anyhow;

use super::offer::{Grants, TxCode};
use crate::error::{ErrorKind, Module, WalletError, WalletResult};

/// Parameters of the pre-authorized code grant of a credential offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrantParams {
    pre_authorized_code: String,
    pin_required: bool,
    tx_code: Option<TxCode>,
}

impl PreAuthorizedCodeGrantParams {
    /// Whether a PIN must be supplied when requesting credentials.
    pub fn pin_required(&self) -> bool {
        self.pin_required
    }

    /// Input hints for the PIN, when the issuer sent any.
    pub fn tx_code(&self) -> Option<&TxCode> {
        self.tx_code.as_ref()
    }

    pub(crate) fn pre_authorized_code(&self) -> &str {
        &self.pre_authorized_code
    }
}

/// Parameters of the authorization code grant of a credential offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationCodeGrantParams {
    issuer_state: Option<String>,
}

impl AuthorizationCodeGrantParams {
    pub fn issuer_state(&self) -> Option<&str> {
        self.issuer_state.as_deref()
    }
}

impl Grants {
    pub fn pre_authorized_code_supported(&self) -> bool {
        self.pre_authorized_code.is_some()
    }

    /// Fails with [ErrorKind::GrantNotSupported] when the offer has no
    /// pre-authorized code grant.
    pub fn pre_authorized_code_params(&self) -> WalletResult<PreAuthorizedCodeGrantParams> {
        let grant = self.pre_authorized_code.as_ref().ok_or_else(|| {
            WalletError::new(
                Module::Issuance,
                ErrorKind::GrantNotSupported,
                anyhow!("issuer does not support the pre-authorized code grant"),
            )
        })?;

        Ok(PreAuthorizedCodeGrantParams {
            pre_authorized_code: grant.pre_authorized_code.clone(),
            pin_required: grant.pin_required(),
            tx_code: grant.tx_code.clone(),
        })
    }

    pub fn authorization_code_supported(&self) -> bool {
        self.authorization_code.is_some()
    }

    /// Fails with [ErrorKind::GrantNotSupported] when the offer has no
    /// authorization code grant.
    pub fn authorization_code_params(&self) -> WalletResult<AuthorizationCodeGrantParams> {
        let grant = self.authorization_code.as_ref().ok_or_else(|| {
            WalletError::new(
                Module::Issuance,
                ErrorKind::GrantNotSupported,
                anyhow!("issuer does not support the authorization code grant"),
            )
        })?;

        Ok(AuthorizationCodeGrantParams {
            issuer_state: grant.issuer_state.clone(),
        })
    }

    /// Pick the issuer state to send with the authorization request.
    ///
    /// An issuer state fixed by the offer always wins. Supplying a different one
    /// is a usage error; supplying the same one is accepted.
    pub(crate) fn resolve_issuer_state(
        &self,
        requested: Option<&str>,
    ) -> WalletResult<Option<String>> {
        let offered = self
            .authorization_code
            .as_ref()
            .and_then(|g| g.issuer_state.as_deref());

        match (offered, requested) {
            (Some(offered), Some(requested)) if offered != requested => Err(WalletError::new(
                Module::Issuance,
                ErrorKind::InvalidSdkUsage,
                anyhow!(
                    "the credential offer already specifies an issuer state, and a conflicting \
                     issuer state value was provided. An issuer state should only be provided if \
                     required by the issuer and the credential offer does not specify one already"
                ),
            )),
            (Some(offered), _) => Ok(Some(offered.to_owned())),
            (None, requested) => Ok(requested.map(str::to_owned)),
        }
    }
}
