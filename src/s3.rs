//! Upload pipeline output to S3.
//!
//! `litc push` sends every file under the output directory plus the
//! SQLite database to `s3://<bucket>/<prefix>/...` with signed `PutObject`
//! requests. Signing is AWS Signature V4 implemented on `hmac` + `sha2`.
//!
//! ```toml
//! [s3]
//! bucket = "literary-companion"
//! prefix = "000879/"
//! region = "ap-northeast-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, path-style
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
//! the optional `AWS_SESSION_TOKEN`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, S3Config};

type HmacSha256 = Hmac<Sha256>;

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// A local file and the object key it is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub path: PathBuf,
    pub key: String,
}

/// `litc push`: upload outputs and the database.
pub async fn run_push(config: &Config, dry_run: bool) -> Result<()> {
    let Some(s3) = &config.s3 else {
        bail!("no [s3] section in the config");
    };

    let uploads = collect_uploads(&config.output.dir, &config.db.path, &s3.prefix)?;

    if dry_run {
        println!("push s3://{} (dry-run)", s3.bucket);
        for upload in &uploads {
            println!("  {} -> {}", upload.path.display(), upload.key);
        }
        println!("  objects: {}", uploads.len());
        return Ok(());
    }

    let creds = AwsCredentials::from_env()?;
    let client = reqwest::Client::new();
    let mut bytes_sent = 0u64;

    for upload in &uploads {
        let body = std::fs::read(&upload.path)
            .with_context(|| format!("failed to read {}", upload.path.display()))?;
        bytes_sent += body.len() as u64;
        put_object(s3, &creds, &client, &upload.key, body).await?;
        tracing::debug!(key = %upload.key, "uploaded");
    }

    println!("push s3://{}", s3.bucket);
    println!("  objects uploaded: {}", uploads.len());
    println!("  bytes: {}", bytes_sent);
    println!("ok");
    Ok(())
}

/// Files under `output_dir` (sorted, relative keys) followed by the database.
pub fn collect_uploads(output_dir: &Path, db_path: &Path, prefix: &str) -> Result<Vec<Upload>> {
    let mut uploads = Vec::new();

    if output_dir.is_dir() {
        for entry in WalkDir::new(output_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(output_dir).unwrap_or(entry.path());
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            uploads.push(Upload {
                path: entry.path().to_path_buf(),
                key: object_key(prefix, &relative),
            });
        }
    }

    if db_path.is_file() {
        let name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "db.sqlite".to_string());
        uploads.push(Upload {
            path: db_path.to_path_buf(),
            key: object_key(prefix, &format!("db/{}", name)),
        });
    }

    Ok(uploads)
}

fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Where a request for `key` goes: `(url, host, canonical_uri)`.
///
/// AWS uses virtual-hosted style; a custom endpoint uses path style.
fn object_location(s3: &S3Config, key: &str) -> (String, String, String) {
    let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");

    match &s3.endpoint_url {
        Some(endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .to_string();
            let canonical_uri = format!("/{}/{}", uri_encode(&s3.bucket), encoded_key);
            (format!("{}{}", endpoint, canonical_uri), host, canonical_uri)
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", s3.bucket, s3.region);
            let canonical_uri = format!("/{}", encoded_key);
            (
                format!("https://{}{}", host, canonical_uri),
                host,
                canonical_uri,
            )
        }
    }
}

async fn put_object(
    s3: &S3Config,
    creds: &AwsCredentials,
    client: &reqwest::Client,
    key: &str,
    body: Vec<u8>,
) -> Result<()> {
    let (url, host, canonical_uri) = object_location(s3, key);
    let payload_hash = hex_sha256(&body);
    let content_type = content_type_for(key);

    let signed = sign_request(
        creds,
        &s3.region,
        "PUT",
        &canonical_uri,
        &host,
        &payload_hash,
        content_type,
        Utc::now(),
    );

    let mut req_builder = client
        .put(&url)
        .header("Authorization", &signed.authorization)
        .header("Content-Type", content_type)
        .header("x-amz-content-sha256", &payload_hash)
        .header("x-amz-date", &signed.amz_date);
    if let Some(ref token) = creds.session_token {
        req_builder = req_builder.header("x-amz-security-token", token);
    }

    let resp = req_builder
        .body(body)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to put s3://{}/{}: {}", s3.bucket, key, e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!(
            "S3 PutObject failed (HTTP {}) for key '{}': {}",
            status,
            key,
            text.chars().take(500).collect::<String>()
        );
    }
    Ok(())
}

struct SignedRequest {
    authorization: String,
    amz_date: String,
}

#[allow(clippy::too_many_arguments)]
fn sign_request(
    creds: &AwsCredentials,
    region: &str,
    method: &str,
    canonical_uri: &str,
    host: &str,
    payload_hash: &str,
    content_type: &str,
    now: DateTime<Utc>,
) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("content-type".to_string(), content_type.to_string()),
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedRequest {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("tsv") => "text/tab-separated-values; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("sqlite" | "db") => "application/vnd.sqlite3",
        _ => "application/octet-stream",
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
