//! This library provides the wallet side of [OID4VCI] and [OID4VP].
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//! [OID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! The host application supplies the capabilities the protocols need: a
//! [`DidResolver`], a [`Signer`], an [`AsyncHttpClient`] and, optionally,
//! activity and metrics loggers. Every interaction is single use and carries
//! its own [`Trace`], whose id is attached to every outbound request and to
//! every [`WalletError`] it returns.
//!
//! # Issuance
//!
//! ```ignore
//! use openid4vc_wallet::oid4vci::{ClientConfig, IssuerInitiatedInteraction, RequestCredentialOptions};
//!
//! let config = ClientConfig::new(resolver, http_client);
//! let mut interaction = IssuerInitiatedInteraction::new(offer_uri, config).await?;
//!
//! if interaction.pre_authorized_code_grant_params()?.pin_required() {
//!     // Ask the user for the transaction code.
//! }
//!
//! let credentials = interaction
//!     .request_credential_with_pre_auth(&method, &signer, &RequestCredentialOptions {
//!         pin: Some(pin),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! if interaction.requires_acknowledgment() {
//!     let mut ack = interaction.acknowledgment()?;
//!     ack.acknowledge(&IssuanceOutcome::Accepted, http_client.as_ref()).await?;
//! }
//! ```
//!
//! # Presentation
//!
//! ```ignore
//! use openid4vc_wallet::oid4vp::{Interaction, PresentCredentialOptions, PresentationConfig};
//!
//! let config = PresentationConfig::new(resolver, signer, http_client);
//! let mut interaction = Interaction::new(authorization_request, config).await?;
//!
//! let definition = interaction.get_query();
//! let display = interaction.verifier_display_data();
//!
//! interaction
//!     .present_credential(&[Some(credential)], &PresentCredentialOptions::default())
//!     .await?;
//! ```
//!
//! [`DidResolver`]: crate::did::DidResolver
//! [`Signer`]: crate::signer::Signer
//! [`AsyncHttpClient`]: crate::core::util::AsyncHttpClient
//! [`Trace`]: crate::trace::Trace
//! [`WalletError`]: crate::error::WalletError

pub mod core;
pub mod credential;
pub mod did;
pub mod error;
mod jwt;
pub mod logging;
pub mod oid4vci;
pub mod oid4vp;
pub mod signer;
pub mod trace;
pub mod trust;
pub mod utils;

pub use serde_json_path::JsonPath;
