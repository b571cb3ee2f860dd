use anyhow::{bail, Context, Result};
use base64::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};

use crate::signer::{Signer, VerificationMethod};

/// Compact JWS signed by the host's [Signer] under the given verification method.
///
/// `typ` is added to the protected header when present. The header always
/// carries `alg` (from the method's type) and `kid` (the method's key id).
pub(crate) async fn sign_jwt(
    claims: &impl Serialize,
    typ: Option<&str>,
    method: &VerificationMethod,
    signer: &dyn Signer,
) -> Result<String> {
    let alg = method.algorithm()?;

    let mut header = json!({
        "alg": alg,
        "kid": method.key_id,
    });
    if let Some(typ) = typ {
        header["typ"] = Json::String(typ.to_owned());
    }

    let header_b64: String =
        serde_json::to_vec(&header).map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))?;
    let body_b64 = serde_json::to_vec(claims).map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))?;
    let payload = [header_b64.as_bytes(), b".", body_b64.as_bytes()].concat();
    let signature = signer
        .sign(&payload, &method.key_id)
        .await
        .context("signer failed")?;
    let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{header_b64}.{body_b64}.{signature_b64}"))
}

/// Decodes header and claims of a compact JWS without checking the signature.
pub(crate) fn decode_unverified(jwt: &str) -> Result<(Map<String, Json>, Json)> {
    let (header_b64, claims_b64, _) = ssi::claims::jws::split_jws(jwt)?;

    let header_bytes = BASE64_URL_SAFE_NO_PAD
        .decode(header_b64)
        .context("jwt headers were not valid base64url")?;
    let header = serde_json::from_slice::<Map<String, Json>>(&header_bytes)
        .context("jwt headers were not valid json")?;

    let claims_bytes = BASE64_URL_SAFE_NO_PAD
        .decode(claims_b64)
        .context("jwt claims were not valid base64url")?;
    let claims = serde_json::from_slice::<Json>(&claims_bytes)
        .context("jwt claims were not valid json")?;

    Ok((header, claims))
}

/// The string value of a JWS header, e.g. `kid`.
pub(crate) fn header_str<'a>(header: &'a Map<String, Json>, name: &str) -> Result<&'a str> {
    match header.get(name) {
        Some(Json::String(s)) => Ok(s),
        Some(_) => bail!("'{name}' header was not a string"),
        None => bail!("'{name}' was missing from jwt headers"),
    }
}
