//! OpenID for Verifiable Presentations, wallet side.
//!
//! An [Interaction] is created from the verifier's authorization request,
//! which it fetches and verifies up front. The wallet then either presents
//! matching credentials or declines through a [PresentationAcknowledgment].

mod acknowledgment;
mod config;
mod interaction;
pub mod parameters;
mod presentation;
mod request_object;

pub use acknowledgment::{
    PresentationAcknowledgment, PresentationOutcome, ACCESS_DENIED, NO_CONSENT, NO_MATCH_FOUND,
};
pub use config::{PresentCredentialOptions, PresentationConfig};
pub use interaction::Interaction;
pub use request_object::{RequestObject, VerifierDisplayData, REQUEST_URI_PREFIX};
