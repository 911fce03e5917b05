use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::MinioConfig;
use crate::types::{AppError, Result};

use super::{ObjectStream, RawStorage};

type HmacSha256 = Hmac<Sha256>;

/// S3-compatible `RawStorage` adapter, selected when `MINIO_ENDPOINT` is set
/// (spec.md §4.5). Signs requests with AWS SigV4 so it works against MinIO
/// and any other S3-compatible deployment that requires authentication,
/// using `reqwest` the same way this codebase's HTTP-based LLM adapter does
/// (see `llm/http.rs`) rather than pulling in a dedicated S3 SDK — no such
/// crate appears anywhere in the reference pack.
pub struct S3RawStorage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl S3RawStorage {
    pub fn new(config: MinioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket,
            access_key: config.access_key,
            secret_key: config.secret_key,
            region: "us-east-1".to_string(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, path)
    }

    fn host(&self) -> String {
        self.endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }

    /// Computes the `Authorization` header value for a SigV4-signed request.
    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        method: &str,
        path: &str,
        payload_hash: &str,
        amz_date: &str,
        date_stamp: &str,
    ) -> String {
        let canonical_uri = format!("/{}/{}", self.bucket, path);
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            self.host(),
            payload_hash,
            amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "{method}\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.derive_signing_key(date_stamp);
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        )
    }

    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sign(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sign(&k_date, self.region.as_bytes());
        let k_service = hmac_sign(&k_region, b"s3");
        hmac_sign(&k_service, b"aws4_request")
    }
}

impl S3RawStorage {
    /// Lists object keys under `prefix` via `ListObjectsV2`, handling
    /// pagination via `continuation-token`. Parses the minimal XML fields
    /// this adapter needs (`<Key>`, `<NextContinuationToken>`,
    /// `<IsTruncated>`) without a full XML parser dependency.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = format!("list-type=2&prefix={}", urlencode(prefix));
            if let Some(token) = &continuation {
                query.push_str(&format!("&continuation-token={}", urlencode(token)));
            }

            let now = Utc::now();
            let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
            let date_stamp = now.format("%Y%m%d").to_string();
            let empty_hash = hex::encode(Sha256::digest(b""));
            let auth = self.sign_list(&query, &empty_hash, &amz_date, &date_stamp);

            let url = format!("{}/{}?{}", self.endpoint, self.bucket, query);
            let response = self
                .client
                .get(url)
                .header("x-amz-date", amz_date)
                .header("x-amz-content-sha256", empty_hash)
                .header("Authorization", auth)
                .send()
                .await
                .map_err(|e| AppError::Transient(format!("S3 list failed: {e}")))?;

            if !response.status().is_success() {
                return Err(AppError::Transient(format!(
                    "S3 list returned {}",
                    response.status()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| AppError::Transient(format!("S3 list body read failed: {e}")))?;

            keys.extend(extract_tag_values(&body, "Key"));

            let truncated = extract_tag_values(&body, "IsTruncated")
                .first()
                .map(|v| v == "true")
                .unwrap_or(false);
            if !truncated {
                break;
            }
            continuation = extract_tag_values(&body, "NextContinuationToken")
                .into_iter()
                .next();
            if continuation.is_none() {
                break;
            }
        }

        Ok(keys)
    }

    fn sign_list(
        &self,
        query: &str,
        payload_hash: &str,
        amz_date: &str,
        date_stamp: &str,
    ) -> String {
        let canonical_uri = format!("/{}", self.bucket);
        let canonical_query = canonicalize_query(query);
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            self.host(),
            payload_hash,
            amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.derive_signing_key(date_stamp);
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        )
    }
}

/// Sorts query parameters by key, as SigV4 canonicalization requires.
fn canonicalize_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').collect();
    pairs.sort_unstable();
    pairs.join("&")
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Extracts the text content of every `<tag>...</tag>` occurrence in `xml`.
/// `ListObjectsV2` responses are flat enough that this is sufficient
/// without pulling in a full XML parser.
fn extract_tag_values(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after_open = &rest[start + open.len()..];
        if let Some(end) = after_open.find(&close) {
            out.push(after_open[..end].to_string());
            rest = &after_open[end + close.len()..];
        } else {
            break;
        }
    }
    out
}

fn hmac_sign(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[async_trait]
impl RawStorage for S3RawStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        if self.exists(path).await? {
            return Err(AppError::Internal(format!(
                "raw storage path collision at {path}"
            )));
        }

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(&bytes));
        let auth = self.sign("PUT", path, &payload_hash, &amz_date, &date_stamp);

        let response = self
            .client
            .put(self.object_url(path))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", auth)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("S3 put failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Transient(format!(
                "S3 put returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<ObjectStream> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let empty_hash = hex::encode(Sha256::digest(b""));
        let auth = self.sign("GET", path, &empty_hash, &amz_date, &date_stamp);

        let response = self
            .client
            .get(self.object_url(path))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", empty_hash)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("S3 get failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("no object at {path}")));
        }
        if !response.status().is_success() {
            return Err(AppError::Transient(format!(
                "S3 get returned {}",
                response.status()
            )));
        }

        let size = response.content_length().unwrap_or(0);
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Transient(format!("S3 body read failed: {e}")))?;
        let stream = stream::once(async move { Ok(body) });
        Ok(ObjectStream {
            size,
            stream: Box::pin(stream),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let empty_hash = hex::encode(Sha256::digest(b""));
        let auth = self.sign("DELETE", path, &empty_hash, &amz_date, &date_stamp);

        let response = self
            .client
            .delete(self.object_url(path))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", empty_hash)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("S3 delete failed: {e}")))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::Transient(format!(
                "S3 delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        for key in self.list_keys(prefix).await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let empty_hash = hex::encode(Sha256::digest(b""));
        let auth = self.sign("HEAD", path, &empty_hash, &amz_date, &date_stamp);

        let response = self
            .client
            .head(self.object_url(path))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", empty_hash)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("S3 head failed: {e}")))?;

        Ok(response.status().is_success())
    }
}
