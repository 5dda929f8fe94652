//! Signed API client against a mock OCI endpoint

use crate::support::keys;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use oci_capacity_hunter::poller::IntervalPacer;
use oci_capacity_hunter::provider::http::ApiClient;
use oci_capacity_hunter::provider::models::{ImageSource, LaunchTemplate};
use oci_capacity_hunter::provider::response_log::ResponseLog;
use oci_capacity_hunter::provider::{ComputeProvider, ProviderError};
use oci_capacity_hunter::{ErrorClass, LifecycleState};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn template() -> LaunchTemplate {
    LaunchTemplate {
        compartment_id: keys::TENANCY.to_string(),
        shape: "VM.Standard.A1.Flex".to_string(),
        ocpus: 4,
        memory_in_gbs: 24,
        subnet_id: "ocid1.subnet.oc1..subnet".to_string(),
        ssh_public_key: "ssh-ed25519 AAAA test".to_string(),
        source: ImageSource::Image {
            image_id: "ocid1.image.oc1..image".to_string(),
            boot_volume_size_gbs: None,
        },
    }
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        keys::signer(),
        Arc::new(IntervalPacer::new(Duration::ZERO, Duration::ZERO)),
        template(),
        server.uri(),
        server.uri(),
    )
    .unwrap()
}

fn instance_json(ad: &str) -> serde_json::Value {
    json!({
        "id": "ocid1.instance.oc1..new",
        "availabilityDomain": ad,
        "compartmentId": keys::TENANCY,
        "displayName": "instance-20240101-1200",
        "shape": "VM.Standard.A1.Flex",
        "lifecycleState": "PROVISIONING"
    })
}

/// Pull `name="value"` out of an Authorization header
fn auth_param<'a>(authorization: &'a str, name: &str) -> &'a str {
    let marker = format!("{name}=\"");
    let start = authorization.find(&marker).unwrap() + marker.len();
    let end = authorization[start..].find('"').unwrap() + start;
    &authorization[start..end]
}

#[tokio::test]
async fn test_list_instances_parses_and_signs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/"))
        .and(query_param("compartmentId", keys::TENANCY))
        .and(header_exists("authorization"))
        .and(header_exists("date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            instance_json("AD-1"),
            {
                "id": "ocid1.instance.oc1..old",
                "shape": "VM.Standard.E2.1.Micro",
                "lifecycleState": "TERMINATED"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let instances = client(&server).list_instances().await.unwrap();

    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].availability_domain, "AD-1");
    assert_eq!(instances[1].lifecycle_state, LifecycleState::Terminated);
}

#[tokio::test]
async fn test_get_signature_verifies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/availabilityDomains/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Uocm:EU-FRANKFURT-1-AD-1", "id": "ocid1.ad..1", "compartmentId": keys::TENANCY}
        ])))
        .mount(&server)
        .await;

    let domains = client(&server).list_availability_domains().await.unwrap();
    assert_eq!(domains[0].name, "Uocm:EU-FRANKFURT-1-AD-1");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let headers = &request.headers;
    let authorization = headers.get("authorization").unwrap().to_str().unwrap();

    assert!(authorization.starts_with("Signature version=\"1\","));
    assert_eq!(auth_param(authorization, "keyId"), keys::key_id());
    assert_eq!(auth_param(authorization, "algorithm"), "rsa-sha256");
    assert_eq!(auth_param(authorization, "headers"), "(request-target) date host");
    assert!(headers.get("x-content-sha256").is_none());

    let signing_string = format!(
        "(request-target): get {}?{}\ndate: {}\nhost: {}",
        request.url.path(),
        request.url.query().unwrap(),
        headers.get("date").unwrap().to_str().unwrap(),
        headers.get("host").unwrap().to_str().unwrap(),
    );
    let signature_bytes = STANDARD
        .decode(auth_param(authorization, "signature"))
        .unwrap();
    let signature = Signature::try_from(signature_bytes.as_slice()).unwrap();
    VerifyingKey::<Sha256>::new(keys::public_key())
        .verify(signing_string.as_bytes(), &signature)
        .unwrap();
}

#[tokio::test]
async fn test_create_instance_posts_signed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instances/"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-content-sha256"))
        .and(body_partial_json(json!({
            "availabilityDomain": "AD-2",
            "compartmentId": keys::TENANCY,
            "shape": "VM.Standard.A1.Flex",
            "sourceDetails": {"sourceType": "image", "imageId": "ocid1.image.oc1..image"},
            "createVnicDetails": {"assignPublicIp": false},
            "shapeConfig": {"ocpus": 4, "memoryInGBs": 24}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json("AD-2")))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server).create_instance("AD-2").await.unwrap();
    assert_eq!(created.lifecycle_state, LifecycleState::Provisioning);

    let requests = server.received_requests().await.unwrap();
    let authorization = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(
        auth_param(authorization, "headers"),
        "(request-target) date host x-content-sha256 content-type content-length"
    );
}

#[tokio::test]
async fn test_capacity_error_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "code": "InternalError",
            "message": "Out of host capacity."
        })))
        .mount(&server)
        .await;

    let err = client(&server).create_instance("AD-1").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::CapacityExhausted);
}

#[tokio::test]
async fn test_throttle_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "code": "TooManyRequests",
            "message": "Too many requests for the user"
        })))
        .mount(&server)
        .await;

    let err = client(&server).list_instances().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Throttled);
}

#[tokio::test]
async fn test_non_json_error_keeps_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    match client(&server).list_instances().await.unwrap_err() {
        ProviderError::Api(api) => {
            assert_eq!(api.status, 502);
            assert_eq!(api.message, "Bad Gateway");
            assert_eq!(api.class(), ErrorClass::Fatal);
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_instances().await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
    assert_eq!(err.class(), ErrorClass::Fatal);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let client = ApiClient::new(
        keys::signer(),
        Arc::new(IntervalPacer::new(Duration::ZERO, Duration::ZERO)),
        template(),
        "http://127.0.0.1:1",
        "http://127.0.0.1:1",
    )
    .unwrap();

    let err = client.list_instances().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_response_log_records_creates_and_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/availabilityDomains/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "NotAuthenticated",
            "message": "The required information to complete authentication was not provided."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/instances/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json("AD-1")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("responses.log");
    let client = client(&server).with_response_log(ResponseLog::new(&log_path));

    client.list_instances().await.unwrap();
    client.list_availability_domains().await.unwrap_err();
    client.create_instance("AD-1").await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("--- ").count(), 2);
    assert!(log.contains("[GET]"));
    assert!(log.contains("| Status: 401\n"));
    assert!(log.contains("[POST]"));
    assert!(log.contains("| Status: 200\n"));
    assert!(log.contains("\"NotAuthenticated\""));
}
