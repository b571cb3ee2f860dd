#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use http::{HeaderMap, Method, Request, Response};
use openid4vc_wallet::{
    core::util::AsyncHttpClient,
    did::DidResolver,
    logging::{Activity, ActivityLogger, MetricsEvent, MetricsLogger},
    signer::{KeyMaterial, P256Signer, Signer, VerificationMethod},
};
use p256::ecdsa::SigningKey;
use serde_json::{json, Value as Json};
use ssi::{
    claims::jws::{sign_bytes, verify_bytes},
    jwk::{Algorithm, JWK},
};

pub const ISSUER: &str = "https://issuer.example";
pub const VERIFIER_DID: &str = "did:example:verifier";
pub const HOLDER_DID: &str = "did:example:holder";
pub const ISSUER_DID: &str = "did:example:issuer";
pub const RESPONSE_URI: &str = "https://verifier.example/response";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> Json {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn form(&self) -> HashMap<String, String> {
        serde_urlencoded::from_bytes(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Reply = (u16, Vec<u8>);

enum Route {
    /// Served for every request.
    Always(Reply),
    /// Served once each, in order; 404 once exhausted.
    InOrder(VecDeque<Reply>),
}

/// Serves canned responses by method and URL (query ignored).
///
/// Unknown routes, and sequences that ran out, answer 404.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request to the route with this response, replacing
    /// whatever the route served before.
    pub fn respond(&self, method: Method, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_owned()), Route::Always((status, body.into())));
    }

    /// Answer the next requests to the route with `replies`, one each.
    pub fn respond_in_order(&self, method: Method, url: &str, replies: Vec<(u16, Json)>) {
        let replies = replies
            .into_iter()
            .map(|(status, body)| (status, body.to_string().into_bytes()))
            .collect();
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_owned()), Route::InOrder(replies));
    }

    pub fn respond_json(&self, method: Method, url: &str, status: u16, body: Json) {
        self.respond(method, url, status, body.to_string())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.uri.split('?').next() == Some(url))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AsyncHttpClient for MockHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let uri = request.uri().to_string();
        let route = (
            request.method().clone(),
            uri.split('?').next().unwrap_or_default().to_owned(),
        );

        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method().clone(),
            uri: uri.clone(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        });

        let (status, body) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&route) {
                Some(Route::Always(reply)) => reply.clone(),
                Some(Route::InOrder(replies)) => replies
                    .pop_front()
                    .unwrap_or_else(|| (404, b"no more responses".to_vec())),
                None => (404, b"not found".to_vec()),
            }
        };

        Response::builder()
            .status(status)
            .body(body)
            .context("failed to build mock response")
    }
}

/// Serves DID documents registered by the test.
#[derive(Default)]
pub struct MockResolver {
    documents: Mutex<HashMap<String, Json>>,
}

impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, did: &str, document: Json) {
        self.documents
            .lock()
            .unwrap()
            .insert(did.to_owned(), document);
    }

    /// A document with a single `#key-1` assertion method for `key`.
    pub fn insert_key(&self, did: &str, key: &TestKey) {
        self.insert(did, key.document(did, json!([])));
    }
}

#[async_trait]
impl DidResolver for MockResolver {
    async fn resolve(&self, did: &str) -> Result<Vec<u8>> {
        let document = self
            .documents
            .lock()
            .unwrap()
            .get(did)
            .cloned()
            .with_context(|| format!("unknown DID {did}"))?;

        Ok(serde_json::to_vec(&json!({ "didDocument": document }))?)
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub activities: Mutex<Vec<Activity>>,
    pub events: Mutex<Vec<MetricsEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

impl ActivityLogger for RecordingLogger {
    fn log(&self, activity: &Activity) {
        self.activities.lock().unwrap().push(activity.clone());
    }
}

impl MetricsLogger for RecordingLogger {
    fn log(&self, event: &MetricsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A P-256 key published as `{did}#key-1`.
pub struct TestKey {
    pub signer: Arc<P256Signer>,
}

impl TestKey {
    pub fn new() -> Self {
        let key = SigningKey::random(&mut rand::thread_rng());
        Self {
            signer: Arc::new(P256Signer::new(key).unwrap()),
        }
    }

    pub fn method(&self, did: &str) -> VerificationMethod {
        self.signer.verification_method(format!("{did}#key-1"))
    }

    pub fn document(&self, did: &str, services: Json) -> Json {
        json!({
            "id": did,
            "verificationMethod": [{
                "id": format!("{did}#key-1"),
                "type": "JsonWebKey2020",
                "controller": did,
                "publicKeyJwk": serde_json::to_value(self.signer.jwk()).unwrap(),
            }],
            "assertionMethod": [format!("{did}#key-1")],
            "service": services,
        })
    }

    /// An ES256 compact JWS with `kid` = `{did}#key-1`.
    pub async fn sign_jwt(&self, did: &str, claims: &Json) -> String {
        let kid = format!("{did}#key-1");
        let header = json!({"alg": "ES256", "kid": kid, "typ": "JWT"});

        let header = BASE64_URL_SAFE_NO_PAD.encode(header.to_string());
        let claims = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
        let payload = format!("{header}.{claims}");
        let signature = self.signer.sign(payload.as_bytes(), &kid).await.unwrap();

        format!("{payload}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature))
    }
}

/// An Ed25519 key published as an `Ed25519VerificationKey2020` method.
pub struct Ed25519Key {
    jwk: JWK,
}

impl Ed25519Key {
    pub fn new() -> Self {
        Self {
            jwk: JWK::generate_ed25519().unwrap(),
        }
    }

    pub fn public_jwk(&self) -> JWK {
        self.jwk.to_public()
    }

    pub fn method(&self, did: &str) -> VerificationMethod {
        VerificationMethod::new(
            format!("{did}#key-1"),
            "Ed25519VerificationKey2020",
            KeyMaterial::Jwk(self.public_jwk()),
        )
    }
}

#[async_trait]
impl Signer for Ed25519Key {
    async fn sign(&self, payload: &[u8], _key_id: &str) -> Result<Vec<u8>> {
        Ok(sign_bytes(Algorithm::EdDSA, payload, &self.jwk)?)
    }

    async fn verify(&self, signature: &[u8], payload: &[u8], _key_id: &str) -> Result<()> {
        Ok(verify_bytes(Algorithm::EdDSA, payload, &self.jwk, signature)?)
    }
}

/// Claims of the JWT of a `jwt_vc_json` credential about `subject`.
pub fn degree_claims(subject: &str) -> Json {
    json!({
        "iss": ISSUER_DID,
        "sub": subject,
        "jti": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        "nbf": 1_700_000_000,
        "vc": {
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuanceDate": "2023-11-14T22:13:20Z",
            "credentialSubject": {
                "degree": {"type": "BachelorDegree", "name": "Bachelor of Science"}
            }
        }
    })
}

/// Decode the claims of a compact JWS without checking it.
pub fn jwt_claims(jwt: &str) -> Json {
    let claims = jwt.split('.').nth(1).unwrap();
    serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(claims).unwrap()).unwrap()
}

pub fn jwt_header(jwt: &str) -> Json {
    let header = jwt.split('.').next().unwrap();
    serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap()
}
