//! OCI request signing (HTTP Signatures, `rsa-sha256`)
//!
//! Produces the `Authorization` header the OCI API expects without pulling in
//! an SDK. The canonical signing string is built from a [`SigningContext`],
//! hashed with SHA-256 and signed with RSA PKCS#1 v1.5.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST};
use reqwest::{Method, Request};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Header carrying the base64 SHA-256 digest of the request body
pub const CONTENT_SHA256: &str = "x-content-sha256";

/// Content type declared for every signed body
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Signing errors. All of them are configuration problems and never retried.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Key file could not be read
    #[error("could not read private key file {path}: {reason}")]
    KeyFile {
        /// Path that was attempted
        path: String,
        /// Underlying IO error
        reason: String,
    },

    /// PEM data parsed as neither PKCS#1 nor PKCS#8
    #[error("failed to parse private key: (pkcs1: {pkcs1}), (pkcs8: {pkcs8})")]
    InvalidKey {
        /// PKCS#1 parse error
        pkcs1: String,
        /// PKCS#8 parse error
        pkcs8: String,
    },

    /// PKCS#8 key for an algorithm other than RSA
    #[error("key is not an RSA private key")]
    UnsupportedKeyType,

    /// Request URL has no host to sign
    #[error("request URL has no host: {0}")]
    MissingHost(String),

    /// Header value could not be encoded
    #[error("invalid header value for {name}: {reason}")]
    InvalidHeader {
        /// Header name
        name: &'static str,
        /// Encoding failure
        reason: String,
    },

    /// RSA signing failed
    #[error("failed to sign string: {0}")]
    Signing(String),
}

/// Identity of the API caller. Immutable once loaded.
pub struct Credentials {
    tenancy_id: String,
    user_id: String,
    fingerprint: String,
    key: RsaPrivateKey,
}

impl Credentials {
    /// Bundle an already-parsed key with its identity
    pub fn new(
        tenancy_id: impl Into<String>,
        user_id: impl Into<String>,
        fingerprint: impl Into<String>,
        key: RsaPrivateKey,
    ) -> Self {
        Self {
            tenancy_id: tenancy_id.into(),
            user_id: user_id.into(),
            fingerprint: fingerprint.into(),
            key,
        }
    }

    /// `keyId` signature parameter: `<tenancy>/<user>/<fingerprint>`
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy_id, self.user_id, self.fingerprint)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenancy_id", &self.tenancy_id)
            .field("user_id", &self.user_id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Parse a PEM private key, trying PKCS#1 first and PKCS#8 second.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, SignerError> {
    let pkcs1_err = match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(key) => return Ok(key),
        Err(e) => e,
    };

    match RsaPrivateKey::from_pkcs8_pem(pem) {
        Ok(key) => Ok(key),
        // Well-formed PKCS#8 whose algorithm OID is not rsaEncryption
        Err(rsa::pkcs8::Error::PublicKey(_)) => Err(SignerError::UnsupportedKeyType),
        Err(pkcs8_err) => Err(SignerError::InvalidKey {
            pkcs1: pkcs1_err.to_string(),
            pkcs8: pkcs8_err.to_string(),
        }),
    }
}

/// Everything that goes into one signature. Built per request.
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    /// HTTP method
    pub method: Method,
    /// Path plus optional `?query`
    pub request_uri: String,
    /// Host, with `:port` when the URL carries a non-default port
    pub host: String,
    /// Signing time
    pub timestamp: DateTime<Utc>,
    /// Request body, hashed for POST and PUT
    pub body: Option<&'a [u8]>,
}

impl<'a> SigningContext<'a> {
    /// Derive the context from a prepared request
    pub fn from_request(
        request: &Request,
        body: Option<&'a [u8]>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, SignerError> {
        let url = request.url();
        let host = url
            .host_str()
            .ok_or_else(|| SignerError::MissingHost(url.to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let request_uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self {
            method: request.method().clone(),
            request_uri,
            host,
            timestamp,
            body,
        })
    }

    /// Whether the body headers take part in the signature
    pub fn signs_body(&self) -> bool {
        self.method == Method::POST || self.method == Method::PUT
    }

    /// RFC 1123 date as sent in the `date` header
    pub fn http_date(&self) -> String {
        self.timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Base64 SHA-256 of the body (empty body when none was given)
    pub fn content_sha256(&self) -> String {
        let digest = Sha256::digest(self.body.unwrap_or_default());
        STANDARD.encode(digest)
    }

    /// Decimal body length
    pub fn content_length(&self) -> usize {
        self.body.map(<[u8]>::len).unwrap_or(0)
    }
}

/// Canonical signing string plus the ordered header names it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningString {
    /// Newline-joined `name: value` lines
    pub text: String,
    /// Header names in signing order
    pub headers: Vec<&'static str>,
}

/// Build the canonical signing string for a context
pub fn signing_string(ctx: &SigningContext<'_>) -> SigningString {
    let mut lines = vec![
        format!(
            "(request-target): {} {}",
            ctx.method.as_str().to_lowercase(),
            ctx.request_uri
        ),
        format!("date: {}", ctx.http_date()),
        format!("host: {}", ctx.host),
    ];
    let mut headers = vec!["(request-target)", "date", "host"];

    if ctx.signs_body() {
        lines.push(format!("{CONTENT_SHA256}: {}", ctx.content_sha256()));
        lines.push(format!("content-type: {JSON_CONTENT_TYPE}"));
        lines.push(format!("content-length: {}", ctx.content_length()));
        headers.extend([CONTENT_SHA256, "content-type", "content-length"]);
    }

    SigningString {
        text: lines.join("\n"),
        headers,
    }
}

/// Signs outbound OCI requests
pub struct Signer {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl Signer {
    /// Create a signer from loaded credentials
    pub fn new(credentials: Credentials) -> Self {
        Self {
            key_id: credentials.key_id(),
            signing_key: SigningKey::<Sha256>::new(credentials.key),
        }
    }

    /// Create a signer from PEM text
    pub fn from_pem(
        tenancy_id: &str,
        user_id: &str,
        fingerprint: &str,
        pem: &str,
    ) -> Result<Self, SignerError> {
        let key = parse_private_key(pem)?;
        Ok(Self::new(Credentials::new(tenancy_id, user_id, fingerprint, key)))
    }

    /// Create a signer from a PEM key file
    pub fn from_pem_file(
        tenancy_id: &str,
        user_id: &str,
        fingerprint: &str,
        path: &Path,
    ) -> Result<Self, SignerError> {
        let pem = std::fs::read_to_string(path).map_err(|e| SignerError::KeyFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_pem(tenancy_id, user_id, fingerprint, &pem)
    }

    /// `keyId` used in every signature
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign the string and render the full `Authorization` header value
    pub fn authorization(&self, signing: &SigningString) -> Result<String, SignerError> {
        let signature = self
            .signing_key
            .try_sign(signing.text.as_bytes())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let encoded = STANDARD.encode(signature.to_bytes());

        Ok(format!(
            r#"Signature version="1",keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
            self.key_id,
            signing.headers.join(" "),
            encoded
        ))
    }

    /// Sign a request in place using the current time
    pub fn sign(&self, request: &mut Request, body: &[u8]) -> Result<(), SignerError> {
        self.sign_at(request, body, Utc::now())
    }

    /// Sign a request in place as of `timestamp`
    pub fn sign_at(
        &self,
        request: &mut Request,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<(), SignerError> {
        let ctx = SigningContext::from_request(request, Some(body), timestamp)?;
        let signing = signing_string(&ctx);
        let authorization = self.authorization(&signing)?;

        let headers = request.headers_mut();
        headers.insert(DATE, header_value("date", ctx.http_date())?);
        headers.insert(HOST, header_value("host", ctx.host.clone())?);

        if ctx.signs_body() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            headers.insert(
                CONTENT_LENGTH,
                header_value("content-length", ctx.content_length().to_string())?,
            );
            headers.insert(
                HeaderName::from_static(CONTENT_SHA256),
                header_value(CONTENT_SHA256, ctx.content_sha256())?,
            );
        }

        headers.insert(AUTHORIZATION, header_value("authorization", authorization)?);

        debug!(
            method = %ctx.method,
            uri = %ctx.request_uri,
            headers = %signing.headers.join(" "),
            "Signed request"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

fn header_value(name: &'static str, value: String) -> Result<HeaderValue, SignerError> {
    HeaderValue::from_str(&value).map_err(|e| SignerError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}
