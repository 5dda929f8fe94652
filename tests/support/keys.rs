//! Test RSA key, generated once per test binary

use once_cell::sync::Lazy;
use oci_capacity_hunter::provider::signer::Signer;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

pub const TENANCY: &str = "ocid1.tenancy.oc1..tenancy";
pub const USER: &str = "ocid1.user.oc1..user";
pub const FINGERPRINT: &str = "12:34:56:78:9a:bc:de:f0";

static KEY: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate test key")
});

pub fn private_key() -> RsaPrivateKey {
    KEY.clone()
}

pub fn public_key() -> RsaPublicKey {
    KEY.to_public_key()
}

pub fn pkcs1_pem() -> String {
    KEY.to_pkcs1_pem(LineEnding::LF)
        .expect("encode pkcs1")
        .to_string()
}

pub fn pkcs8_pem() -> String {
    KEY.to_pkcs8_pem(LineEnding::LF)
        .expect("encode pkcs8")
        .to_string()
}

pub fn signer() -> Signer {
    Signer::from_pem(TENANCY, USER, FINGERPRINT, &pkcs8_pem()).expect("test signer")
}

pub fn key_id() -> String {
    format!("{TENANCY}/{USER}/{FINGERPRINT}")
}
