use std::sync::Arc;

use http::Method;
use openid4vc_wallet::{
    core::credential_format::ClaimFormatDesignation,
    error::ErrorKind,
    oid4vci::{
        ClientConfig, CreateAuthorizationUrlOptions, IssuanceAcknowledgment, IssuanceOutcome,
        IssuerInitiatedInteraction, RequestCredentialOptions, WalletInitiatedInteraction,
    },
};
use serde_json::{json, Value as Json};
use url::Url;

mod mock;

use mock::{
    degree_claims, jwt_claims, jwt_header, Ed25519Key, MockHttpClient, MockResolver,
    RecordingLogger, TestKey, HOLDER_DID, ISSUER, ISSUER_DID,
};

const CONFIGURATION_ID: &str = "UniversityDegree_jwt";

fn url(path: &str) -> String {
    format!("{ISSUER}{path}")
}

struct Issuer {
    http: Arc<MockHttpClient>,
    resolver: Arc<MockResolver>,
    logger: Arc<RecordingLogger>,
    holder: TestKey,
    key: TestKey,
}

impl Issuer {
    fn new() -> Self {
        let issuer = Self {
            http: MockHttpClient::new(),
            resolver: MockResolver::new(),
            logger: RecordingLogger::new(),
            holder: TestKey::new(),
            key: TestKey::new(),
        };
        issuer.resolver.insert_key(ISSUER_DID, &issuer.key);
        issuer.resolver.insert_key(HOLDER_DID, &issuer.holder);
        issuer.serve_metadata(json!({}));
        issuer
    }

    /// Metadata with the token, credential and notification endpoints, plus
    /// `extra` members.
    fn serve_metadata(&self, extra: Json) {
        let mut metadata = json!({
            "credential_issuer": ISSUER,
            "credential_endpoint": url("/credential"),
            "token_endpoint": url("/token"),
            "notification_endpoint": url("/notification"),
            "credential_configurations_supported": {
                CONFIGURATION_ID: {
                    "format": "jwt_vc_json",
                    "credential_definition": {
                        "type": ["VerifiableCredential", "UniversityDegreeCredential"]
                    }
                },
                "Unsupported_ldp": {
                    "format": "ldp_vp",
                    "credential_definition": {"type": ["VerifiableCredential"]}
                }
            }
        });
        if let (Some(metadata), Json::Object(extra)) = (metadata.as_object_mut(), extra) {
            metadata.extend(extra);
        }

        self.http.respond_json(
            Method::GET,
            &url("/.well-known/openid-credential-issuer"),
            200,
            metadata,
        );
    }

    fn serve_token(&self) {
        self.http.respond_json(
            Method::POST,
            &url("/token"),
            200,
            json!({
                "access_token": "at-1",
                "token_type": "Bearer",
                "expires_in": 300,
                "c_nonce": "nonce-1"
            }),
        );
    }

    async fn serve_credential(&self) {
        let credential = self.key.sign_jwt(ISSUER_DID, &degree_claims(HOLDER_DID)).await;
        self.http.respond_json(
            Method::POST,
            &url("/credential"),
            200,
            json!({
                "credential": credential,
                "format": "jwt_vc_json",
                "c_nonce": "nonce-2",
                "notification_id": "notification-1"
            }),
        );
    }

    fn config(&self) -> ClientConfig {
        ClientConfig {
            activity_logger: self.logger.clone(),
            metrics_logger: self.logger.clone(),
            ..ClientConfig::new(self.resolver.clone(), self.http.clone())
        }
    }
}

fn offer_uri(grants: Json, configuration_ids: &[&str]) -> String {
    let offer = json!({
        "credential_issuer": ISSUER,
        "credential_configuration_ids": configuration_ids,
        "grants": grants,
    });

    Url::parse_with_params(
        "openid-credential-offer://",
        &[("credential_offer", offer.to_string())],
    )
    .unwrap()
    .to_string()
}

fn pre_authorized(tx_code: Option<Json>) -> Json {
    let mut grant = json!({"pre-authorized_code": "code-1"});
    if let Some(tx_code) = tx_code {
        grant["tx_code"] = tx_code;
    }
    json!({ "urn:ietf:params:oauth:grant-type:pre-authorized_code": grant })
}

#[tokio::test]
async fn pre_authorized_flow_issues_credential() {
    let issuer = Issuer::new();
    issuer.serve_token();
    issuer.serve_credential().await;

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    assert!(interaction.pre_authorized_code_grant_type_supported());
    assert!(!interaction.authorization_code_grant_type_supported());
    assert!(!interaction.pre_authorized_code_grant_params().unwrap().pin_required());
    assert_eq!(
        interaction.offered_credentials_types(),
        vec![vec![
            "VerifiableCredential".to_owned(),
            "UniversityDegreeCredential".to_owned()
        ]]
    );

    let credentials = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].subject_ids(), vec![HOLDER_DID.to_owned()]);
    assert_eq!(credentials[0].issuer_id(), Some(ISSUER_DID));

    let token = issuer.http.requests_to(&url("/token"));
    assert_eq!(token.len(), 1);
    let form = token[0].form();
    assert_eq!(
        form["grant_type"],
        "urn:ietf:params:oauth:grant-type:pre-authorized_code"
    );
    assert_eq!(form["pre-authorized_code"], "code-1");
    assert!(!form.contains_key("tx_code"));

    let requests = issuer.http.requests_to(&url("/credential"));
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("authorization"), Some("Bearer at-1"));
    assert!(requests[0].header("traceparent").is_some());

    let body = requests[0].json();
    assert_eq!(body["format"], "jwt_vc_json");
    assert_eq!(
        body["credential_definition"]["type"],
        json!(["VerifiableCredential", "UniversityDegreeCredential"])
    );
    assert_eq!(body["proof"]["proof_type"], "jwt");

    let proof = body["proof"]["jwt"].as_str().unwrap();
    assert_eq!(jwt_header(proof)["kid"], format!("{HOLDER_DID}#key-1"));
    assert_eq!(jwt_header(proof)["typ"], "openid4vci-proof+jwt");
    assert_eq!(jwt_claims(proof)["nonce"], "nonce-1");
    assert_eq!(jwt_claims(proof)["aud"], ISSUER);

    let activities = issuer.logger.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].data.operation, "oidc-issuance");
    assert_eq!(activities[0].data.status, "success");
    assert_eq!(activities[0].data.client, ISSUER);
    assert_eq!(activities[0].data.params["subjectIDs"], json!([HOLDER_DID]));

    assert!(issuer
        .logger
        .event_names()
        .contains(&"Request credential(s) from issuer".to_owned()));
}

#[tokio::test]
async fn ed25519_holder_with_pin() {
    let holder_did = "did:example:ed25519-holder";
    let holder = Ed25519Key::new();

    let issuer = Issuer::new();
    issuer.serve_token();
    let credential = issuer.key.sign_jwt(ISSUER_DID, &degree_claims(holder_did)).await;
    issuer.http.respond_json(
        Method::POST,
        &url("/credential"),
        200,
        json!({"credential": credential, "format": "jwt_vc_json"}),
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(
            pre_authorized(Some(json!({"input_mode": "numeric", "length": 4}))),
            &[CONFIGURATION_ID],
        ),
        issuer.config(),
    )
    .await
    .unwrap();

    let credentials = interaction
        .request_credential_with_pre_auth(
            &holder.method(holder_did),
            &holder,
            &RequestCredentialOptions {
                pin: Some("1234".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].subject_ids(), vec![holder_did.to_owned()]);
    assert_eq!(issuer.http.requests_to(&url("/token"))[0].form()["tx_code"], "1234");

    let body = issuer.http.requests_to(&url("/credential"))[0].json();
    let proof = body["proof"]["jwt"].as_str().unwrap();
    assert_eq!(jwt_header(proof)["alg"], "EdDSA");
    assert_eq!(jwt_header(proof)["kid"], format!("{holder_did}#key-1"));
    let claims: Json = ssi::claims::jwt::decode_verify(proof, &holder.public_jwk()).unwrap();
    assert_eq!(claims["nonce"], "nonce-1");

    let activities = issuer.logger.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].data.operation, "oidc-issuance");
    assert_eq!(activities[0].data.status, "success");
}

#[tokio::test]
async fn pin_required_before_any_request() {
    let issuer = Issuer::new();

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(
            pre_authorized(Some(json!({"input_mode": "numeric", "length": 4}))),
            &[CONFIGURATION_ID],
        ),
        issuer.config(),
    )
    .await
    .unwrap();

    let params = interaction.pre_authorized_code_grant_params().unwrap();
    assert!(params.pin_required());
    assert_eq!(params.tx_code().and_then(|t| t.length), Some(4));

    let calls = issuer.http.call_count();
    let err = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PinRequired);
    assert_eq!(err.trace_id(), Some(interaction.trace_id().as_str()));
    assert_eq!(issuer.http.call_count(), calls);
}

#[tokio::test]
async fn pin_is_sent_as_tx_code() {
    let issuer = Issuer::new();
    issuer.serve_token();
    issuer.serve_credential().await;

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(
            json!({
                "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                    "pre-authorized_code": "code-1",
                    "user_pin_required": true
                }
            }),
            &[CONFIGURATION_ID],
        ),
        issuer.config(),
    )
    .await
    .unwrap();

    interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions {
                pin: Some("1234".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let form = issuer.http.requests_to(&url("/token"))[0].form();
    assert_eq!(form["tx_code"], "1234");
}

#[tokio::test]
async fn offer_validation() {
    let issuer = Issuer::new();

    let err = IssuerInitiatedInteraction::new("https://wallet.example/?x=1", issuer.config())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidIssuanceUri);

    let err = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &["Unknown"]),
        issuer.config(),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidCredentialConfigurationId);

    let err = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &["Unsupported_ldp"]),
        issuer.config(),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCredentialFormat);
    assert!(err.code().starts_with("OCI"));
}

#[tokio::test]
async fn offer_by_reference() {
    let issuer = Issuer::new();
    let offer = json!({
        "credential_issuer": ISSUER,
        "credential_configuration_ids": [CONFIGURATION_ID],
        "grants": {"authorization_code": {"issuer_state": "state-from-offer"}},
    });
    issuer
        .http
        .respond_json(Method::GET, &url("/offers/1"), 200, offer);

    let uri = Url::parse_with_params(
        "openid-credential-offer://",
        &[("credential_offer_uri", url("/offers/1"))],
    )
    .unwrap();

    let interaction = IssuerInitiatedInteraction::new(uri.as_str(), issuer.config())
        .await
        .unwrap();

    assert!(interaction.authorization_code_grant_type_supported());
    assert!(!interaction.pre_authorized_code_grant_type_supported());
    assert_eq!(
        interaction
            .authorization_code_grant_params()
            .unwrap()
            .issuer_state(),
        Some("state-from-offer")
    );
    assert_eq!(
        interaction
            .pre_authorized_code_grant_params()
            .err()
            .unwrap()
            .kind(),
        ErrorKind::GrantNotSupported
    );
}

#[tokio::test]
async fn metadata_fetched_once() {
    let issuer = Issuer::new();

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let first = interaction.issuer_metadata().await.unwrap();
    let second = interaction.issuer_metadata().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.credential_issuer, ISSUER);

    let metadata_requests =
        issuer.http.requests_to(&url("/.well-known/openid-credential-issuer"));
    assert_eq!(metadata_requests.len(), 1);
}

#[tokio::test]
async fn invalid_proof_is_retried_with_new_nonce() {
    let issuer = Issuer::new();
    issuer.serve_token();
    let credential = issuer.key.sign_jwt(ISSUER_DID, &degree_claims(HOLDER_DID)).await;
    issuer.http.respond_in_order(
        Method::POST,
        &url("/credential"),
        vec![
            (
                400,
                json!({"error": "invalid_or_missing_proof", "c_nonce": "nonce-fresh"}),
            ),
            (200, json!({"credential": credential, "format": "jwt_vc_json"})),
        ],
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let credentials = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(credentials.len(), 1);

    let requests = issuer.http.requests_to(&url("/credential"));
    assert_eq!(requests.len(), 2);
    let nonce = |i: usize| {
        let body = requests[i].json();
        jwt_claims(body["proof"]["jwt"].as_str().unwrap())["nonce"].clone()
    };
    assert_eq!(nonce(0), "nonce-1");
    assert_eq!(nonce(1), "nonce-fresh");
}

#[tokio::test]
async fn credential_endpoint_error_is_reported() {
    let issuer = Issuer::new();
    issuer.serve_token();
    issuer.http.respond_json(
        Method::POST,
        &url("/credential"),
        400,
        json!({"error": "unsupported_credential_type", "error_description": "no such type"}),
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let err = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRequestFailed);
    assert_eq!(err.server_code(), Some("unsupported_credential_type"));
    assert_eq!(err.server_message(), Some("no such type"));
    assert_eq!(issuer.http.requests_to(&url("/credential")).len(), 1);
    assert!(issuer.logger.activities().is_empty());
}

#[tokio::test]
async fn batch_endpoint_for_several_credentials() {
    let issuer = Issuer::new();
    issuer.serve_metadata(json!({"batch_credential_endpoint": url("/batch")}));
    issuer.serve_token();

    let first = issuer.key.sign_jwt(ISSUER_DID, &degree_claims(HOLDER_DID)).await;
    let second = issuer.key.sign_jwt(ISSUER_DID, &degree_claims(HOLDER_DID)).await;
    issuer.http.respond_json(
        Method::POST,
        &url("/batch"),
        200,
        json!({
            "credential_responses": [
                {"credential": first, "format": "jwt_vc_json", "notification_id": "n-1"},
                {"credential": second, "format": "jwt_vc_json", "notification_id": "n-2"}
            ],
            "c_nonce": "nonce-2"
        }),
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID, CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let credentials = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(credentials.len(), 2);
    assert!(issuer.http.requests_to(&url("/credential")).is_empty());

    let batch = issuer.http.requests_to(&url("/batch"));
    assert_eq!(batch.len(), 1);
    assert_eq!(
        batch[0].json()["credential_requests"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );

    let ack = interaction.acknowledgment().unwrap();
    assert_eq!(ack.ack_ids, vec!["n-1".to_owned(), "n-2".to_owned()]);
}

#[tokio::test]
async fn short_batch_response_is_an_error() {
    let issuer = Issuer::new();
    issuer.serve_metadata(json!({"batch_credential_endpoint": url("/batch")}));
    issuer.serve_token();

    let only = issuer.key.sign_jwt(ISSUER_DID, &degree_claims(HOLDER_DID)).await;
    issuer.http.respond_json(
        Method::POST,
        &url("/batch"),
        200,
        json!({
            "credential_responses": [
                {"credential": only, "format": "jwt_vc_json", "notification_id": "n-1"}
            ]
        }),
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID, CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let err = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRequestFailed);
    assert!(!interaction.requires_acknowledgment());
    assert!(issuer.logger.activities().is_empty());
}

#[tokio::test]
async fn second_proof_rejection_is_terminal() {
    let issuer = Issuer::new();
    issuer.serve_token();
    let rejection = json!({"error": "invalid_or_missing_proof", "c_nonce": "nonce-fresh"});
    issuer.http.respond_in_order(
        Method::POST,
        &url("/credential"),
        vec![(400, rejection.clone()), (400, rejection)],
    );

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let err = interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRequestFailed);
    assert_eq!(err.server_code(), Some("invalid_or_missing_proof"));
    assert_eq!(issuer.http.requests_to(&url("/credential")).len(), 2);
}

#[tokio::test]
async fn notification_answered_with_200_succeeds() {
    let issuer = Issuer::new();
    issuer
        .http
        .respond(Method::POST, &url("/notification"), 200, Vec::new());

    let mut ack = IssuanceAcknowledgment {
        ack_ids: vec!["a".into()],
        notification_endpoint: url("/notification"),
        issuer_uri: ISSUER.into(),
        ..Default::default()
    };

    ack.acknowledge(&IssuanceOutcome::Accepted, issuer.http.as_ref())
        .await
        .unwrap();
    assert!(ack.ack_ids.is_empty());
}

#[tokio::test]
async fn acknowledgment_after_restart() {
    let issuer = Issuer::new();
    issuer.serve_token();
    issuer.serve_credential().await;
    issuer
        .http
        .respond(Method::POST, &url("/notification"), 204, Vec::new());

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();
    assert!(!interaction.requires_acknowledgment());

    interaction
        .request_credential_with_pre_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap();
    assert!(interaction.requires_acknowledgment());

    let saved = interaction.acknowledgment().unwrap().serialize().unwrap();
    let mut ack = IssuanceAcknowledgment::parse(&saved).unwrap();
    assert_eq!(ack.ack_ids, vec!["notification-1".to_owned()]);

    ack.acknowledge(&IssuanceOutcome::Accepted, issuer.http.as_ref())
        .await
        .unwrap();

    let notifications = issuer.http.requests_to(&url("/notification"));
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].header("authorization"), Some("Bearer at-1"));
    let body = notifications[0].json();
    assert_eq!(body["event"], "credential_accepted");
    assert_eq!(body["notification_id"], "notification-1");
    assert_eq!(body["issuer_identifier"], ISSUER);

    let err = ack
        .acknowledge(&IssuanceOutcome::Rejected, issuer.http.as_ref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSdkUsage);
}

#[tokio::test]
async fn rejected_acknowledgment_consumes_id() {
    let issuer = Issuer::new();
    issuer
        .http
        .respond(Method::POST, &url("/notification"), 500, "boom");

    let mut ack = IssuanceAcknowledgment {
        ack_ids: vec!["a".into(), "b".into()],
        notification_endpoint: url("/notification"),
        issuer_uri: ISSUER.into(),
        ..Default::default()
    };

    let err = ack
        .acknowledge(&IssuanceOutcome::Rejected, issuer.http.as_ref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcknowledgmentFailed);
    assert!(err.trace_id().is_some());
    assert_eq!(ack.ack_ids, vec!["b".to_owned()]);

    let body = issuer.http.requests_to(&url("/notification"))[0].json();
    assert_eq!(body["event"], "credential_failure");
    assert_eq!(body["notification_id"], "a");
}

async fn authorization_flow() -> (Issuer, IssuerInitiatedInteraction) {
    let issuer = Issuer::new();
    issuer.http.respond_json(
        Method::GET,
        &url("/.well-known/openid-configuration"),
        200,
        json!({
            "authorization_endpoint": url("/authorize"),
            "token_endpoint": url("/token"),
        }),
    );
    issuer.serve_token();
    issuer.serve_credential().await;

    let interaction = IssuerInitiatedInteraction::new(
        &offer_uri(
            json!({"authorization_code": {"issuer_state": "issuer-state-1"}}),
            &[CONFIGURATION_ID],
        ),
        issuer.config(),
    )
    .await
    .unwrap();

    (issuer, interaction)
}

#[tokio::test]
async fn authorization_code_flow() {
    let (issuer, mut interaction) = authorization_flow().await;

    let authorization_url = interaction
        .create_authorization_url(
            "wallet-client",
            "https://wallet.example/cb",
            &CreateAuthorizationUrlOptions {
                scopes: vec!["openid".into()],
                issuer_state: None,
            },
        )
        .await
        .unwrap();

    let authorization_url = Url::parse(&authorization_url).unwrap();
    assert_eq!(authorization_url.path(), "/authorize");
    let query: std::collections::HashMap<String, String> =
        authorization_url.query_pairs().into_owned().collect();
    assert_eq!(query["issuer_state"], "issuer-state-1");
    assert_eq!(query["client_id"], "wallet-client");
    assert_eq!(query["code_challenge_method"], "S256");

    let redirect = format!(
        "https://wallet.example/cb?code=auth-code-1&state={}",
        query["state"]
    );
    let credentials = interaction
        .request_credential_with_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &redirect,
        )
        .await
        .unwrap();
    assert_eq!(credentials.len(), 1);

    let form = issuer.http.requests_to(&url("/token"))[0].form();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "auth-code-1");
    assert_eq!(form["client_id"], "wallet-client");
    assert!(!form["code_verifier"].is_empty());

    let proof = issuer.http.requests_to(&url("/credential"))[0].json();
    assert_eq!(
        jwt_claims(proof["proof"]["jwt"].as_str().unwrap())["iss"],
        "wallet-client"
    );
}

#[tokio::test]
async fn authorization_requires_url_first() {
    let (issuer, mut interaction) = authorization_flow().await;

    let err = interaction
        .request_credential_with_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            "https://wallet.example/cb?code=c&state=s",
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthorizationUrlMustBeCreatedFirst);
    assert!(issuer.http.requests_to(&url("/token")).is_empty());
}

#[tokio::test]
async fn state_mismatch_stops_before_token_request() {
    let (issuer, mut interaction) = authorization_flow().await;

    interaction
        .create_authorization_url(
            "wallet-client",
            "https://wallet.example/cb",
            &CreateAuthorizationUrlOptions::default(),
        )
        .await
        .unwrap();

    let err = interaction
        .request_credential_with_auth(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            "https://wallet.example/cb?code=auth-code-1&state=forged",
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TokenFetchFailed);
    assert!(issuer.http.requests_to(&url("/token")).is_empty());
    assert!(issuer.http.requests_to(&url("/credential")).is_empty());
}

#[tokio::test]
async fn pre_authorized_only_offer_rejects_authorization_flow() {
    let issuer = Issuer::new();

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let err = interaction
        .create_authorization_url(
            "wallet-client",
            "https://wallet.example/cb",
            &CreateAuthorizationUrlOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IssuerDoesNotSupportAuthCodeGrant);
}

#[tokio::test]
async fn wallet_initiated_flow() {
    let issuer = Issuer::new();
    issuer.http.respond_json(
        Method::GET,
        &url("/.well-known/openid-configuration"),
        200,
        json!({
            "authorization_endpoint": url("/authorize"),
            "registration_endpoint": url("/register"),
        }),
    );
    issuer.serve_token();
    issuer.serve_credential().await;

    let mut interaction = WalletInitiatedInteraction::new(ISSUER, issuer.config());
    assert_eq!(issuer.http.call_count(), 0);

    let supported = interaction.supported_credentials().await.unwrap();
    assert!(supported
        .iter()
        .any(|c| c.format == ClaimFormatDesignation::JwtVcJson));

    assert!(interaction
        .dynamic_client_registration_supported()
        .await
        .unwrap());
    assert_eq!(
        interaction
            .dynamic_client_registration_endpoint()
            .await
            .unwrap(),
        url("/register")
    );

    let err = interaction
        .create_authorization_url(
            "wallet-client",
            "https://wallet.example/cb",
            ClaimFormatDesignation::LdpVp,
            vec!["VerifiableCredential".into()],
            &CreateAuthorizationUrlOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCredentialFormat);

    let authorization_url = interaction
        .create_authorization_url(
            "wallet-client",
            "https://wallet.example/cb",
            ClaimFormatDesignation::JwtVcJson,
            vec![
                "VerifiableCredential".into(),
                "UniversityDegreeCredential".into(),
            ],
            &CreateAuthorizationUrlOptions::default(),
        )
        .await
        .unwrap();

    let state = Url::parse(&authorization_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let credentials = interaction
        .request_credential(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
            &format!("https://wallet.example/cb?code=c-1&state={state}"),
        )
        .await
        .unwrap();
    assert_eq!(credentials.len(), 1);
}

#[tokio::test]
async fn signing_method_needs_did() {
    let issuer = Issuer::new();
    issuer.serve_token();

    let mut interaction = IssuerInitiatedInteraction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();

    let method = issuer.holder.signer.verification_method("key-without-did");
    let err = interaction
        .request_credential_with_pre_auth(
            &method,
            issuer.holder.signer.as_ref(),
            &RequestCredentialOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::KeyIdMissingDidPart);
    assert!(issuer.http.requests_to(&url("/token")).is_empty());
}

#[tokio::test]
#[allow(deprecated)]
async fn legacy_interaction() {
    let issuer = Issuer::new();
    issuer.serve_token();
    issuer.serve_credential().await;

    let mut interaction = openid4vc_wallet::oid4vci::Interaction::new(
        &offer_uri(pre_authorized(None), &[CONFIGURATION_ID]),
        issuer.config(),
    )
    .await
    .unwrap();
    assert_eq!(interaction.issuer_uri(), ISSUER);

    let credentials = interaction
        .request_credential(
            &issuer.holder.method(HOLDER_DID),
            issuer.holder.signer.as_ref(),
        )
        .await
        .unwrap();
    assert_eq!(credentials.len(), 1);
}
