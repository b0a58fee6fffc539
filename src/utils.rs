use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{Result, StorageError};

/// S3 presigned URLs may live at most 7 days / 预签名URL最长有效期
pub const MAX_PRESIGN_SECS: u64 = 7 * 24 * 3600;

/// Normalize an object key: strip leading slashes, reject empty and dot segments / 规范化对象键
///
/// `/path1/path2/readme.txt` and `path1/path2/readme.txt` address the same object.
pub fn normalize_key(key: &str) -> Result<String> {
    let key = key.trim_start_matches('/');
    if key.is_empty() {
        return Err(StorageError::invalid("object key is empty"));
    }
    if key.ends_with('/') {
        return Err(StorageError::invalid(format!("object key ends with '/': {}", key)));
    }
    for segment in key.split('/') {
        if segment == "." || segment == ".." {
            return Err(StorageError::invalid(format!("object key contains '{}' segment: {}", segment, key)));
        }
    }
    Ok(key.to_string())
}

/// Listing prefixes only lose their leading slashes / 规范化列举前缀
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_start_matches('/').to_string()
}

/// Check S3 bucket naming rules / 校验存储桶名称
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let bad = |reason: &str| Err(StorageError::invalid(format!("bucket name '{}' {}", name, reason)));

    if name.len() < 3 || name.len() > 63 {
        return bad("must be between 3 and 63 characters");
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return bad("may only contain lowercase letters, digits, '.' and '-'");
    }
    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return bad("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return bad("must not contain '..'");
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return bad("must not be formatted as an IP address");
    }
    Ok(())
}

/// Build the service URL from `host:port` and the TLS flag / 构建端点URL
pub fn endpoint_url(endpoint: &str, use_ssl: bool) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(StorageError::Config("endpoint is empty".to_string()));
    }
    if endpoint.contains("://") {
        return Err(StorageError::Config(format!(
            "endpoint must be host[:port] without a scheme: {}",
            endpoint
        )));
    }

    let scheme = if use_ssl { "https" } else { "http" };
    let url = Url::parse(&format!("{}://{}", scheme, endpoint))
        .map_err(|e| StorageError::Config(format!("malformed endpoint '{}': {}", endpoint, e)))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(StorageError::Config(format!("endpoint has no host: {}", endpoint)));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(StorageError::Config(format!(
            "endpoint must not contain a path or query: {}",
            endpoint
        )));
    }
    Ok(url)
}

/// Endpoint URL as a string without the trailing slash `Url` adds / 去掉末尾斜杠
pub fn endpoint_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// Parse S3 timestamps: ListObjects uses RFC 3339, HEAD uses RFC 2822 / 解析时间戳
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Guess content type from the key's extension / 根据扩展名推断MIME类型
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().to_string()
}

/// Encode each key segment for use in a URL path, keeping '/' separators / URL编码对象键
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
