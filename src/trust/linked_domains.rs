//! DID to web domain binding through the DIF Well Known DID Configuration.
//!
//! For more information, see: [https://identity.foundation/.well-known/resources/did-configuration/](https://identity.foundation/.well-known/resources/did-configuration/)

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, warn};
use url::Url;

use crate::{
    core::util::{AsyncHttpClient, Call, Transport},
    did::{resolve_document, verify_jwt, DidDocument, DidResolver},
    error::{ErrorKind, Module, WalletError, WalletResult},
    logging::NoopLogger,
    trace::Trace,
};

const LINKED_DOMAINS_SERVICE_TYPE: &str = "LinkedDomains";
const DID_CONFIGURATION_PATH: &str = "/.well-known/did-configuration.json";

/// Outcome of a linked domain check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedDomainsValidation {
    pub is_valid: bool,
    /// The first URL of the DID's `LinkedDomains` service, when it has one.
    pub service_url: Option<String>,
}

impl LinkedDomainsValidation {
    fn invalid(service_url: Option<String>) -> Self {
        Self {
            is_valid: false,
            service_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DidConfiguration {
    #[serde(default)]
    linked_dids: Vec<Json>,
}

/// Check that `did` and the domain named by its `LinkedDomains` service
/// point at each other.
///
/// A DID without such a service, or a domain whose DID configuration does not
/// vouch for the DID, is reported as invalid. Resolver and network faults are
/// errors.
pub async fn validate_linked_domains(
    did: &str,
    resolver: &dyn DidResolver,
    http_client: &dyn AsyncHttpClient,
) -> WalletResult<LinkedDomainsValidation> {
    let trace = Trace::new();
    check_linked_domains(did, resolver, Transport::new(http_client, &NoopLogger, &trace))
        .await
        .map_err(|e| e.with_trace_id(trace.trace_id()))
}

pub(crate) async fn check_linked_domains(
    did: &str,
    resolver: &dyn DidResolver,
    transport: Transport<'_>,
) -> WalletResult<LinkedDomainsValidation> {
    let fault = |e: anyhow::Error| {
        WalletError::new(
            Module::Did,
            ErrorKind::DidServiceValidationFailed,
            e.context("DID service validation failed"),
        )
    };

    let document = resolve_document(resolver, did).await.map_err(fault)?;

    let Some(service_url) = linked_domains_service_url(&document).map_err(fault)? else {
        debug!(%did, "DID document has no Linked Domains service");
        return Ok(LinkedDomainsValidation::invalid(None));
    };

    let origin = Url::parse(&service_url)
        .with_context(|| format!("invalid Linked Domains service URL '{service_url}'"))
        .map_err(fault)?
        .origin()
        .ascii_serialization();

    let configuration_url = format!("{origin}{DID_CONFIGURATION_PATH}");
    let body = transport
        .get(
            &configuration_url,
            Call {
                event: format!("Fetch DID configuration via an HTTP GET request to {configuration_url}"),
                parent_event: "",
                endpoint: "DID configuration endpoint",
                accept: &[200],
            },
        )
        .await
        .map_err(fault)?;

    let configuration: DidConfiguration = serde_json::from_slice(&body)
        .context("failed to parse DID configuration")
        .map_err(fault)?;

    for linked_did in &configuration.linked_dids {
        match verify_domain_linkage(linked_did, did, &origin, resolver).await {
            Ok(()) => {
                return Ok(LinkedDomainsValidation {
                    is_valid: true,
                    service_url: Some(service_url),
                })
            }
            Err(e) => debug!("domain linkage credential rejected: {e:#}"),
        }
    }

    warn!(%did, %origin, "no domain linkage credential matched");
    Ok(LinkedDomainsValidation::invalid(Some(service_url)))
}

/// The first URL of the DID document's single `LinkedDomains` service.
fn linked_domains_service_url(document: &DidDocument) -> Result<Option<String>> {
    let mut services = document.service.iter().filter(|s| match &s.kind {
        Json::String(kind) => kind.eq_ignore_ascii_case(LINKED_DOMAINS_SERVICE_TYPE),
        Json::Array(kinds) => kinds.iter().any(|k| {
            k.as_str()
                .is_some_and(|k| k.eq_ignore_ascii_case(LINKED_DOMAINS_SERVICE_TYPE))
        }),
        _ => false,
    });

    let Some(service) = services.next() else {
        return Ok(None);
    };
    if services.next().is_some() {
        bail!("validating multiple Linked Domains services not supported")
    }

    let url = match &service.service_endpoint {
        Json::String(url) => Some(url.clone()),
        Json::Array(urls) => urls.first().and_then(Json::as_str).map(str::to_owned),
        Json::Object(endpoint) => endpoint
            .get("origins")
            .and_then(Json::as_array)
            .and_then(|origins| origins.first())
            .and_then(Json::as_str)
            .map(str::to_owned),
        _ => None,
    };

    url.map(Some)
        .ok_or_else(|| anyhow!("Linked Domains service '{}' has no URL", service.id))
}

/// Check one `linked_dids` entry: a JWT domain linkage credential signed by
/// `did` for `origin`.
async fn verify_domain_linkage(
    entry: &Json,
    did: &str,
    origin: &str,
    resolver: &dyn DidResolver,
) -> Result<()> {
    let Json::String(jwt) = entry else {
        bail!("only JWT domain linkage credentials are supported")
    };

    let verified = verify_jwt(jwt, resolver, Some(did)).await?;
    let claims = &verified.claims;

    for claim in ["iss", "sub"] {
        if claims.get(claim).and_then(Json::as_str) != Some(did) {
            bail!("'{claim}' of domain linkage credential does not match {did}")
        }
    }

    let linked_origin = claims
        .pointer("/vc/credentialSubject/origin")
        .and_then(Json::as_str)
        .context("domain linkage credential has no origin")?;

    let linked_origin = Url::parse(linked_origin)
        .context("invalid origin in domain linkage credential")?
        .origin()
        .ascii_serialization();

    if linked_origin != origin {
        bail!("domain linkage credential is for {linked_origin}, expected {origin}")
    }

    Ok(())
}
