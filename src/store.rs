//! S3 diagram mirror.
//!
//! Once resolved, an artifact's bytes are optionally mirrored to an S3
//! bucket under a stable key derived from the canonical filename. The
//! read side (listing, retrieval) treats the bucket as primary and the
//! local directory as fallback; the merge lives in the server's listing
//! façade.
//!
//! Uses the S3 REST API with AWS Signature V4 (see [`crate::sigv4`]) —
//! no AWS SDK. Supports custom endpoints for S3-compatible services
//! (MinIO, LocalStack). Mirror failures are logged and absorbed: the
//! mirror is an enhancement, never on the critical path.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::MirrorConfig;
use crate::sigv4::{self, AwsCredentials};

/// Metadata for one stored diagram, from either source.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub filename: String,
    pub size: i64,
    /// Unix epoch seconds.
    pub created: i64,
}

/// Remote artifact store seam. The production implementation is
/// [`S3Mirror`]; tests substitute their own.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload bytes under the given filename. Returns the storage key.
    async fn put(&self, filename: &str, bytes: &[u8]) -> Result<String>;
    /// Download by filename. `Ok(None)` when the object does not exist.
    async fn get(&self, filename: &str) -> Result<Option<Vec<u8>>>;
    /// List stored diagrams.
    async fn list(&self) -> Result<Vec<StoredObject>>;
    /// Public-ish identifier for diagnostics (e.g. `s3://bucket/prefix`).
    fn location(&self) -> String;
}

/// S3-backed [`ArtifactStore`].
pub struct S3Mirror {
    config: MirrorConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Mirror {
    /// Create a mirror from configuration. Fails only when credentials are
    /// missing from the environment.
    pub fn new(config: MirrorConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        Ok(Self {
            config,
            creds,
            client: reqwest::Client::new(),
        })
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    fn scheme(&self) -> &'static str {
        match self.config.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    fn key_for(&self, filename: &str) -> String {
        if self.config.prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), filename)
        }
    }

    fn signed_request(
        &self,
        method: &str,
        key: &str,
        query: &str,
        body: &[u8],
    ) -> reqwest::RequestBuilder {
        let host = self.host();
        let encoded_key = key
            .split('/')
            .map(sigv4::uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let signed = sigv4::sign_request(
            &self.creds,
            method,
            &host,
            &canonical_uri,
            query,
            &self.config.region,
            "s3",
            body,
        );

        let url = if query.is_empty() {
            format!("{}://{}{}", self.scheme(), host, canonical_uri)
        } else {
            format!("{}://{}{}?{}", self.scheme(), host, canonical_uri, query)
        };

        let mut req = match method {
            "PUT" => self.client.put(&url).body(body.to_vec()),
            _ => self.client.get(&url),
        };
        req = req
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(ref token) = signed.session_token {
            req = req.header("x-amz-security-token", token);
        }
        req
    }
}

#[async_trait]
impl ArtifactStore for S3Mirror {
    async fn put(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let key = self.key_for(filename);
        let resp = self
            .signed_request("PUT", &key, "", bytes)
            .header("Content-Type", "image/png")
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(300).collect::<String>()
            );
        }
        println!("Mirrored diagram to s3://{}/{}", self.config.bucket, key);
        Ok(key)
    }

    async fn get(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        let key = self.key_for(filename);
        let resp = self.signed_request("GET", &key, "", b"").send().await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn list(&self) -> Result<Vec<StoredObject>> {
        let host = self.host();
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query_params = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                query_params.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query_params.push(("continuation-token".to_string(), token.clone()));
            }

            // Canonical query string must be sorted by key.
            query_params.sort_by(|a, b| a.0.cmp(&b.0));
            let canonical_querystring: String = query_params
                .iter()
                .map(|(k, v)| format!("{}={}", sigv4::uri_encode(k), sigv4::uri_encode(v)))
                .collect::<Vec<_>>()
                .join("&");

            let signed = sigv4::sign_request(
                &self.creds,
                "GET",
                &host,
                "/",
                &canonical_querystring,
                &self.config.region,
                "s3",
                b"",
            );

            let url = format!(
                "{}://{}/?{}",
                self.scheme(),
                host,
                canonical_querystring
            );
            let mut req = self
                .client
                .get(&url)
                .header("Authorization", &signed.authorization)
                .header("x-amz-content-sha256", &signed.payload_hash)
                .header("x-amz-date", &signed.amz_date);
            if let Some(ref token) = signed.session_token {
                req = req.header("x-amz-security-token", token);
            }

            let resp = req.send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(300).collect::<String>()
                );
            }

            let xml = resp.text().await?;
            let (batch, is_truncated, next_token) = parse_list_response(&xml);
            objects.extend(batch);

            if is_truncated {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.config.bucket, self.config.prefix)
    }
}

// ============ XML Parsing (minimal, no extra deps) ============

/// Parse a `ListObjectsV2` XML response. Returns the objects, whether the
/// listing is truncated, and the next continuation token.
fn parse_list_response(xml: &str) -> (Vec<StoredObject>, bool, Option<String>) {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut objects = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }
        let filename = key.rsplit('/').next().unwrap_or(&key).to_string();

        let created = extract_xml_value(block, "LastModified")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0);

        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        objects.push(StoredObject {
            filename,
            size,
            created,
        });
    }

    (objects, is_truncated, next_token)
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)?;
    let value_start = start + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}
