//! URL canonicalization for upstream requests and operator input.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(parsed)
}

/// Canonicalize operator input that may be a bare path.
///
/// Paths starting with `/` are joined onto `origin`, scheme-relative input
/// takes the origin scheme, and anything else goes
/// through [`canonicalize`].
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.starts_with("//") {
        return canonicalize(&format!("{}:{trimmed}", origin.scheme()));
    }
    if trimmed.starts_with('/') {
        let joined = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        return normalize(joined);
    }
    canonicalize(trimmed)
}

/// Check that an already-parsed URL can go upstream and drop its fragment.
pub fn normalize(mut url: Url) -> Result<Url, UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        if lower != host {
            url.set_host(Some(&lower))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    url.set_fragment(None);
    Ok(url)
}
