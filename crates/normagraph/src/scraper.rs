use crate::parser::{self, ParseError};

use reqwest::{Client, StatusCode};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
}

// Normattiva serves empty pages to clients without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Lookup path for the normattiva URN resolver, asking for the current
/// ("vigente") consolidation of the act.
pub fn lookup_path(urn: &str) -> String {
    format!("/uri-res/N2Ls?{}!vig=", urn)
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScrapeError> {
        // The resolver chain is stateful server-side, so the cookie jar has
        // to survive across the permalink hops.
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: crate::BASE_URL.to_string(),
        })
    }

    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }

    pub fn relative_url(&self, url: &str) -> String {
        url.replace(&self.base_url, "")
    }

    async fn get_html(&self, url: &str) -> Result<Option<String>, ScrapeError> {
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let html = response.error_for_status()?.text().await?;
        Ok(Some(html))
    }

    /// Resolves a URN lookup path to the permalink hrefs of every matching
    /// act. A lookup can land on a single act, on a disambiguation page
    /// listing several candidate acts (each resolved independently), or on
    /// nothing at all (404 or not-found page), which yields no permalinks.
    pub async fn resolve_permalinks(&self, path: &str) -> Result<Vec<String>, ScrapeError> {
        let url = self.absolute_url(path);
        let Some(html) = self.get_html(&url).await? else {
            log::debug!("404 for lookup {}", path);
            return Ok(Vec::new());
        };

        let results = parser::parse_search_results(&html);

        let mut permalinks = Vec::new();
        if results.is_empty() {
            if let Some(permalink) = self.resolve_permalink(&url).await? {
                permalinks.push(permalink);
            }
        } else {
            log::debug!("Lookup {} disambiguates into {} acts", path, results.len());
            for href in results {
                if let Some(permalink) = self.resolve_permalink(&self.absolute_url(&href)).await? {
                    permalinks.push(permalink);
                }
            }
        }

        Ok(permalinks)
    }

    /// Follows the permanent-link anchor of a single act page and returns
    /// the canonical permalink href carrying the full URN, or `None` when
    /// the act is not in the database.
    async fn resolve_permalink(&self, url: &str) -> Result<Option<String>, ScrapeError> {
        let Some(html) = self.get_html(url).await? else {
            return Ok(None);
        };
        if parser::is_not_found(&html) {
            log::debug!("Act not in database: {}", url);
            return Ok(None);
        }

        let permalink_href = parser::parse_permalink_href(&html)?;
        let Some(permalink_html) = self.get_html(&self.absolute_url(&permalink_href)).await? else {
            return Ok(None);
        };

        Ok(Some(parser::parse_canonical_href(&permalink_html)?))
    }

    /// Fetches an act page from its permalink href.
    pub async fn fetch_norm_page(&self, permalink: &str) -> Result<Option<String>, ScrapeError> {
        self.get_html(&self.absolute_url(permalink)).await
    }

    /// Per-article URN-reference endpoints from the act's table of contents,
    /// which lives in a separate iframe document.
    pub async fn fetch_article_urls(&self, norm_html: &str) -> Result<Vec<String>, ScrapeError> {
        let toc_src = parser::parse_toc_src(norm_html)?;
        let Some(toc_html) = self.get_html(&self.absolute_url(&toc_src)).await? else {
            return Ok(Vec::new());
        };
        Ok(parser::parse_article_urls(&toc_html))
    }

    /// Hrefs of the norms referenced by one article.
    pub async fn fetch_article_references(
        &self,
        article_url: &str,
    ) -> Result<BTreeSet<String>, ScrapeError> {
        let Some(html) = self.get_html(&self.absolute_url(article_url)).await? else {
            return Ok(BTreeSet::new());
        };
        Ok(parser::parse_reference_hrefs(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_prefixes_relative_paths() {
        let scraper = WebScraper::new().expect("Failed to build scraper");
        assert_eq!(
            scraper.absolute_url("/uri-res/N2Ls?urn:nir:2016;249!vig="),
            "https://www.normattiva.it/uri-res/N2Ls?urn:nir:2016;249!vig="
        );
    }

    #[test]
    fn test_absolute_url_keeps_absolute_urls() {
        let scraper = WebScraper::new().expect("Failed to build scraper");
        assert_eq!(
            scraper.absolute_url("https://www.normattiva.it/atto/vediPermalink"),
            "https://www.normattiva.it/atto/vediPermalink"
        );
    }

    #[test]
    fn test_relative_url_strips_base() {
        let scraper = WebScraper::new().expect("Failed to build scraper");
        assert_eq!(
            scraper.relative_url("https://www.normattiva.it/atto/vediPermalink"),
            "/atto/vediPermalink"
        );
    }

    #[test]
    fn test_lookup_path() {
        assert_eq!(
            lookup_path("urn:nir:2016;249"),
            "/uri-res/N2Ls?urn:nir:2016;249!vig="
        );
    }
}
