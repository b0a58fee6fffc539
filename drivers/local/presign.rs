//! HMAC-SHA256 presigned URLs for the local driver / 本地驱动预签名URL

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::error::{Result, StorageError};
use crate::utils::encode_key;

type HmacSha256 = Hmac<Sha256>;

pub const EXPIRES_PARAM: &str = "X-Objstore-Expires";
pub const SIGNATURE_PARAM: &str = "X-Objstore-Signature";

/// Signs and verifies GET URLs with the client's secret key / 签名与校验
#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: String,
}

impl UrlSigner {
    /// Fails with `Config` on an empty secret / 密钥不能为空
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(StorageError::Config("presign secret key is empty".to_string()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        })
    }

    fn mac(&self, bucket: &str, key: &str, expires_at: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StorageError::transport(format!("签名密钥无效: {}", e)))?;
        mac.update(format!("GET\n/{}/{}\n{}", bucket, key, expires_at).as_bytes());
        Ok(mac)
    }

    /// Build a GET URL valid until `expires_at` / 生成预签名URL
    pub fn sign(&self, bucket: &str, key: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(bucket, key, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}/{}/{}?{}={}&{}={}",
            self.base_url,
            bucket,
            encode_key(key),
            EXPIRES_PARAM,
            expires,
            SIGNATURE_PARAM,
            signature
        ))
    }

    /// True when the URL was issued by this signer and has not expired at `now` / 校验签名与有效期
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> bool {
        let Some(prefix) = url.split('?').next() else {
            return false;
        };
        if !prefix.starts_with(&self.base_url) {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                EXPIRES_PARAM => expires = value.parse::<i64>().ok(),
                SIGNATURE_PARAM => signature = hex::decode(value.as_bytes()).ok(),
                _ => {}
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return false;
        };
        if now.timestamp() >= expires {
            return false;
        }

        let path = &prefix[self.base_url.len()..];
        let Some((bucket, encoded_key)) = path.trim_start_matches('/').split_once('/') else {
            return false;
        };
        let mut segments = Vec::new();
        for segment in encoded_key.split('/') {
            match urlencoding::decode(segment) {
                Ok(s) => segments.push(s.into_owned()),
                Err(_) => return false,
            }
        }
        let key = segments.join("/");

        match self.mac(bucket, &key, expires) {
            Ok(mac) => mac.verify_slice(&signature).is_ok(),
            Err(_) => false,
        }
    }
}
