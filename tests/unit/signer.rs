//! Unit tests for request signing

use crate::support::keys;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use oci_capacity_hunter::provider::signer::{
    parse_private_key, signing_string, Credentials, Signer, SignerError, SigningContext,
};
use reqwest::Method;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;

fn verify(signing: &str, authorization: &str) {
    let start = authorization.find("signature=\"").unwrap() + "signature=\"".len();
    let encoded = &authorization[start..authorization.len() - 1];
    let bytes = STANDARD.decode(encoded).unwrap();
    let signature = Signature::try_from(bytes.as_slice()).unwrap();

    VerifyingKey::<Sha256>::new(keys::public_key())
        .verify(signing.as_bytes(), &signature)
        .unwrap();
}

#[test]
fn test_pkcs1_and_pkcs8_load_the_same_key() {
    let from_pkcs1 = parse_private_key(&keys::pkcs1_pem()).unwrap();
    let from_pkcs8 = parse_private_key(&keys::pkcs8_pem()).unwrap();
    assert_eq!(from_pkcs1, from_pkcs8);
}

#[test]
fn test_missing_key_file() {
    let err = Signer::from_pem_file(
        keys::TENANCY,
        keys::USER,
        keys::FINGERPRINT,
        std::path::Path::new("/nonexistent/oci.pem"),
    )
    .unwrap_err();
    assert!(matches!(err, SignerError::KeyFile { .. }));
}

#[test]
fn test_authorization_header_layout() {
    let signer = Signer::new(Credentials::new(
        keys::TENANCY,
        keys::USER,
        keys::FINGERPRINT,
        keys::private_key(),
    ));
    let ctx = SigningContext {
        method: Method::GET,
        request_uri: "/20160918/instances/?compartmentId=ocid1.tenancy.oc1..tenancy".to_string(),
        host: "iaas.eu-frankfurt-1.oraclecloud.com".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        body: None,
    };
    let signing = signing_string(&ctx);
    let authorization = signer.authorization(&signing).unwrap();

    let expected_prefix = format!(
        "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"(request-target) date host\",signature=\"",
        keys::key_id()
    );
    assert!(authorization.starts_with(&expected_prefix));
    assert!(authorization.ends_with('"'));
    verify(&signing.text, &authorization);
}

#[test]
fn test_signature_changes_with_body() {
    let signer = keys::signer();
    let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
    let context = |body: &'static [u8]| SigningContext {
        method: Method::POST,
        request_uri: "/20160918/instances/".to_string(),
        host: "iaas.eu-frankfurt-1.oraclecloud.com".to_string(),
        timestamp: ts,
        body: Some(body),
    };

    let a = signing_string(&context(&br#"{"shape":"A"}"#[..]));
    let b = signing_string(&context(&br#"{"shape":"B"}"#[..]));
    assert_ne!(a.text, b.text);

    let auth_a = signer.authorization(&a).unwrap();
    let auth_b = signer.authorization(&b).unwrap();
    assert_ne!(auth_a, auth_b);
    verify(&a.text, &auth_a);
}

#[test]
fn test_sign_sets_headers_on_post() {
    let signer = keys::signer();
    let body = br#"{"availabilityDomain":"AD-1"}"#.to_vec();
    let mut request = reqwest::Client::new()
        .post("https://iaas.eu-frankfurt-1.oraclecloud.com/20160918/instances/")
        .body(body.clone())
        .build()
        .unwrap();
    let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();

    signer.sign_at(&mut request, &body, ts).unwrap();

    let headers = request.headers();
    assert_eq!(headers["date"], "Mon, 15 Jan 2024 10:30:00 GMT");
    assert_eq!(headers["host"], "iaas.eu-frankfurt-1.oraclecloud.com");
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["content-length"], body.len().to_string().as_str());
    assert!(headers.contains_key("x-content-sha256"));

    let ctx = SigningContext::from_request(&request, Some(body.as_slice()), ts).unwrap();
    let authorization = headers["authorization"].to_str().unwrap();
    verify(&signing_string(&ctx).text, authorization);
}

#[test]
fn test_sign_get_keeps_query_and_port() {
    let signer = keys::signer();
    let mut request = reqwest::Client::new()
        .get("http://127.0.0.1:8080/20160918/availabilityDomains/?compartmentId=ocid1.tenancy")
        .build()
        .unwrap();

    signer.sign(&mut request, &[]).unwrap();

    let headers = request.headers();
    assert_eq!(headers["host"], "127.0.0.1:8080");
    assert!(!headers.contains_key("x-content-sha256"));
    assert!(!headers.contains_key("content-type"));

    let ctx = SigningContext::from_request(&request, None, Utc::now()).unwrap();
    assert_eq!(
        ctx.request_uri,
        "/20160918/availabilityDomains/?compartmentId=ocid1.tenancy"
    );
}
