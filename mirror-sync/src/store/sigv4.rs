//! AWS Signature Version 4 request signing for S3.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// SHA-256 of an empty body.
pub(crate) const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Marker for a streamed body that is not hashed up front.
pub(crate) const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Unreserved characters per RFC 3986 stay literal; everything else is encoded.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Object key paths keep `/` as a separator.
const PATH_SET: &AsciiSet = &QUERY_SET.remove(b'/');

pub(crate) fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SET).to_string()
}

pub(crate) fn encode_query_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_SET).to_string()
}

/// Canonical (sorted, encoded) query string; also used verbatim in the URL.
pub(crate) fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode_query_component(k), encode_query_component(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) struct Credentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
}

/// One request to sign. `headers` are extra headers that must be covered by
/// the signature (e.g. `x-amz-meta-*`); `host` is always signed.
pub(crate) struct RequestParts<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub canonical_uri: &'a str,
    pub canonical_query: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub payload_hash: &'a str,
}

/// Returns every header the caller must send, `Authorization` included.
pub(crate) fn sign(
    request: &RequestParts<'_>,
    credentials: &Credentials<'_>,
    region: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut signed: Vec<(String, String)> = vec![
        ("host".to_string(), request.host.to_string()),
        (
            "x-amz-content-sha256".to_string(),
            request.payload_hash.to_string(),
        ),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = credentials.session_token {
        signed.push(("x-amz-security-token".to_string(), token.to_string()));
    }
    for (name, value) in request.headers {
        signed.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }
    signed.sort();

    let canonical = canonical_request(request, &signed);
    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let key = signing_key(credentials.secret_access_key, &date, region);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));
    let signed_names = signed_header_names(&signed);

    let mut out: Vec<(String, String)> = signed
        .into_iter()
        .filter(|(name, _)| name != "host")
        .collect();
    out.push((
        "Authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
            credentials.access_key_id
        ),
    ));
    out
}

fn canonical_request(request: &RequestParts<'_>, signed: &[(String, String)]) -> String {
    let headers: String = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.canonical_uri,
        request.canonical_query,
        headers,
        signed_header_names(signed),
        request.payload_hash
    )
}

fn signed_header_names(signed: &[(String, String)]) -> String {
    signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

fn signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, SERVICE.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
