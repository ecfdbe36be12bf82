use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::TokenMetadata;

/// Off-chain metadata lookup for tokens and wallet profiles.
///
/// The production impl scrapes the marketplace's HTML — brittle by nature,
/// so it lives behind this trait and can be swapped for a structured API
/// without touching the scheduler or extractor.
#[async_trait]
pub trait Enrich: Send + Sync {
    /// Title, author, and image URI for a token. Non-200 from the site is
    /// an `Enrichment` error; individual fields degrade to `None`.
    async fn token_metadata(&self, token_id: i64) -> Result<TokenMetadata>;

    /// Display alias for a wallet. Falls back to the address itself on any
    /// failure — degradation is the designed default here, not an error.
    async fn profile_alias(&self, address: &str) -> String;
}

pub struct FxhashEnricher {
    client: reqwest::Client,
    site_url: String,
}

impl FxhashEnricher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Enrichment(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            site_url: cfg.fxhash_site_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_page(&self, url: &str) -> Result<String> {
        debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Enrichment(format!("'{url}' unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Enrichment(format!(
                "'{url}' returned status '{status}'"
            )));
        }
        resp.text()
            .await
            .map_err(|e| AppError::Enrichment(format!("'{url}' body read failed: {e}")))
    }
}

#[async_trait]
impl Enrich for FxhashEnricher {
    async fn token_metadata(&self, token_id: i64) -> Result<TokenMetadata> {
        let url = format!("{}/objkt/{token_id}", self.site_url);
        let html = self.get_page(&url).await?;

        let title = parse_token_title(&html);
        if title.is_none() {
            warn!("no title found for token '{token_id}'");
        }
        let author = parse_token_author(&html);
        if author.is_none() {
            warn!("no author found for token '{token_id}'");
        }
        let ipfs_uri = parse_token_ipfs(&html);
        if ipfs_uri.is_none() {
            warn!("no ipfs link found for token '{token_id}'");
        }
        let content_hash = ipfs_uri
            .as_deref()
            .and_then(|uri| uri.rsplit("ipfs/").next())
            .map(str::to_string);

        Ok(TokenMetadata {
            title,
            author,
            ipfs_uri,
            content_hash,
        })
    }

    async fn profile_alias(&self, address: &str) -> String {
        let url = format!("{}/pkh/{address}/collection", self.site_url);
        let html = match self.get_page(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("unable to pull profile '{address}': {e}");
                return address.to_string();
            }
        };
        match parse_profile_alias(&html) {
            Some(alias) => {
                debug!("profile '{address}' has alias '{alias}'");
                alias
            }
            None => {
                debug!("profile '{address}' has no alias");
                address.to_string()
            }
        }
    }
}

/// Substring of `text` strictly between the first `open` and the next `close`.
fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)?;
    Some(&text[start..start + end])
}

/// Token title from the page's `<title>` tag, with the site prefix stripped.
pub fn parse_token_title(html: &str) -> Option<String> {
    let raw = between(html, "<title>", "</title>")?;
    let title = raw.trim_start_matches("fxhash — ").trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Token image URI from the Open Graph meta tag. Only URIs on the site's
/// ipfs gateway with a plausible content hash (32+ word characters) are
/// accepted — anything else on the page is some other og:image.
pub fn parse_token_ipfs(html: &str) -> Option<String> {
    const GATEWAY: &str = "https://gateway.fxhash.xyz/ipfs/";
    let mut rest = html;
    while let Some(idx) = rest.find("<meta property=\"og:image\" content=\"") {
        let start = idx + "<meta property=\"og:image\" content=\"".len();
        let tail = &rest[start..];
        let end = tail.find('"')?;
        let uri = &tail[..end];
        if let Some(hash) = uri.strip_prefix(GATEWAY) {
            if hash.len() >= 32 && hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Some(uri.to_string());
            }
        }
        rest = &tail[end..];
    }
    None
}

/// Token author from the "created by" label. The closing span is matched
/// non-greedily so only the author element is captured.
pub fn parse_token_author(html: &str) -> Option<String> {
    let idx = html.find("created by</span>")?;
    let rest = &html[idx + "created by</span>".len()..];
    if !rest.starts_with("<span") {
        return None;
    }
    let open_end = rest.find('>')?;
    let author = between(&rest[open_end..], ">", "</span>")?.trim();
    if author.is_empty() {
        None
    } else {
        Some(author.to_string())
    }
}

/// Wallet alias from a profile page's `<title>` tag, if one is set.
pub fn parse_profile_alias(html: &str) -> Option<String> {
    let raw = between(html, "<title>fxhash — ", " profile</title>")?;
    let alias = raw.trim();
    if alias.is_empty() {
        None
    } else {
        Some(alias.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_PAGE: &str = concat!(
        "<html><head><title>fxhash — Ringers #471</title>",
        "<meta property=\"og:image\" content=\"https://gateway.fxhash.xyz/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG\">",
        "</head><body>",
        "<span>created by</span><span class=\"\">dmitri cherniak</span>",
        "</body></html>",
    );

    #[test]
    fn parses_all_token_fields() {
        assert_eq!(
            parse_token_title(TOKEN_PAGE).as_deref(),
            Some("Ringers #471")
        );
        assert_eq!(
            parse_token_ipfs(TOKEN_PAGE).as_deref(),
            Some("https://gateway.fxhash.xyz/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG")
        );
        assert_eq!(
            parse_token_author(TOKEN_PAGE).as_deref(),
            Some("dmitri cherniak")
        );
    }

    #[test]
    fn field_failures_are_independent() {
        // Title present, image off-gateway, no author label.
        let html = concat!(
            "<title>fxhash — Solo Title</title>",
            "<meta property=\"og:image\" content=\"https://example.com/preview.png\">",
        );
        assert_eq!(parse_token_title(html).as_deref(), Some("Solo Title"));
        assert_eq!(parse_token_ipfs(html), None);
        assert_eq!(parse_token_author(html), None);
    }

    #[test]
    fn ipfs_rejects_short_or_foreign_hashes() {
        let short = "<meta property=\"og:image\" content=\"https://gateway.fxhash.xyz/ipfs/abc\">";
        assert_eq!(parse_token_ipfs(short), None);
        // A later on-gateway image is still found after a foreign one.
        let mixed = concat!(
            "<meta property=\"og:image\" content=\"https://cdn.other.io/x.png\">",
            "<meta property=\"og:image\" content=\"https://gateway.fxhash.xyz/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG\">",
        );
        assert!(parse_token_ipfs(mixed).is_some());
    }

    #[test]
    fn profile_alias_pattern() {
        let html = "<title>fxhash — zancan profile</title>";
        assert_eq!(parse_profile_alias(html).as_deref(), Some("zancan"));
        assert_eq!(parse_profile_alias("<title>fxhash — marketplace</title>"), None);
    }

    #[test]
    fn author_requires_adjacent_span() {
        let html = "created by</span><div>not a span</div>";
        assert_eq!(parse_token_author(html), None);
    }
}
