use std::str::FromStr;

use serde::Serialize;

use crate::parser;
use crate::scraper::{ScrapeError, WebScraper, lookup_path};
use crate::store::{Edge, GraphStore, Node, REFERS_TO, StoreError};
use crate::urn::Urn;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One year of the enumeration pass: acts 1..=count of `year` are looked up
/// through the URN resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearSpec {
    pub year: i32,
    pub count: u32,
}

impl FromStr for YearSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, count) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected YEAR:COUNT, got '{}'", s))?;
        let year = year
            .parse()
            .map_err(|_| format!("Invalid year in '{}'", s))?;
        let count = count
            .parse()
            .map_err(|_| format!("Invalid count in '{}'", s))?;
        if count == 0 {
            return Err(format!("Count must be greater than 0 in '{}'", s));
        }
        Ok(YearSpec { year, count })
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CrawlStats {
    pub lookups: usize,
    pub norms: usize,
    pub stubs: usize,
    pub edges: usize,
    pub skipped: usize,
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nCrawl summary:")?;
        writeln!(f, "  Lookups resolved:   {}", self.lookups)?;
        writeln!(f, "  Norms scraped:      {}", self.norms)?;
        writeln!(f, "  Reference stubs:    {}", self.stubs)?;
        writeln!(f, "  Edges added:        {}", self.edges)?;
        writeln!(f, "  Records skipped:    {}", self.skipped)
    }
}

pub struct Crawler<'a> {
    scraper: &'a WebScraper,
    store: &'a GraphStore,
}

impl<'a> Crawler<'a> {
    pub fn new(scraper: &'a WebScraper, store: &'a GraphStore) -> Self {
        Self { scraper, store }
    }

    /// Runs the full crawl: the (year, count) enumeration pass, then one
    /// pass over every referenced norm that was stored unscraped. Failures
    /// on a single record are logged and skipped; only storage failures and
    /// scraper construction are fatal.
    pub async fn run(
        &self,
        years: &[YearSpec],
        follow_references: bool,
    ) -> Result<CrawlStats, CrawlError> {
        let mut stats = CrawlStats::default();

        for spec in years {
            log::info!("Crawling year {} ({} acts)", spec.year, spec.count);
            for number in 1..=spec.count {
                let path = lookup_path(&Urn::partial(spec.year, number));
                self.process_lookup(&path, &mut stats).await?;
            }
        }

        if follow_references {
            let references = self.store.unscraped_references()?;
            log::info!("Resolving {} referenced norms", references.len());
            for reference in references {
                let path = self.scraper.relative_url(&reference);
                self.process_lookup(&path, &mut stats).await?;
            }
        }

        Ok(stats)
    }

    /// Resolves one lookup path and processes every permalink it maps to.
    pub async fn process_lookup(
        &self,
        path: &str,
        stats: &mut CrawlStats,
    ) -> Result<(), CrawlError> {
        log::info!("Resolving {}", path);

        let permalinks = match self.scraper.resolve_permalinks(path).await {
            Ok(permalinks) => permalinks,
            Err(e) => {
                log::warn!("Skipping lookup {}: {}", path, e);
                stats.skipped += 1;
                return Ok(());
            }
        };
        stats.lookups += 1;

        for permalink in permalinks {
            if let Err(e) = self.process_permalink(&permalink, stats).await {
                match e {
                    CrawlError::Scrape(e) => {
                        log::warn!("Skipping permalink {}: {}", permalink, e);
                        stats.skipped += 1;
                    }
                    // Storage failures abort the crawl.
                    CrawlError::Store(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Scrapes one norm from its permalink: stores the node with its head
    /// metadata, then walks every article collecting referenced norms into
    /// stub nodes and REFERS_TO edges.
    async fn process_permalink(
        &self,
        permalink: &str,
        stats: &mut CrawlStats,
    ) -> Result<(), CrawlError> {
        let Some(urn_str) = extract_urn(permalink) else {
            log::warn!("Permalink without a URN query: {}", permalink);
            stats.skipped += 1;
            return Ok(());
        };
        let urn = match Urn::from_str(urn_str) {
            Ok(urn) => urn,
            Err(e) => {
                log::warn!("Skipping unparseable URN '{}': {}", urn_str, e);
                stats.skipped += 1;
                return Ok(());
            }
        };

        log::info!("Scraping {} ({})", urn.name(), permalink);

        let Some(norm_html) = self.scraper.fetch_norm_page(permalink).await? else {
            stats.skipped += 1;
            return Ok(());
        };
        let head = parser::parse_norm_head(&norm_html);

        self.store.upsert_node(&Node {
            norm_type: urn.act_type.clone(),
            name: urn.name(),
            title: head.title,
            description: head.description,
            image: String::new(),
            reference: self.scraper.absolute_url(permalink),
            urn: urn_str.to_string(),
            year: urn.year().to_string(),
            scraped: true,
        })?;
        stats.norms += 1;

        // Union of the references of all articles; the same act cited from
        // several articles yields a single edge.
        let mut references = std::collections::BTreeSet::new();
        for article_url in self.scraper.fetch_article_urls(&norm_html).await? {
            references.extend(self.scraper.fetch_article_references(&article_url).await?);
        }

        for href in references {
            let Some(ref_urn_str) = extract_urn(&href) else {
                continue;
            };
            let ref_urn = match Urn::from_str(ref_urn_str) {
                Ok(ref_urn) => ref_urn,
                Err(e) => {
                    log::debug!("Skipping unparseable reference '{}': {}", ref_urn_str, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let inserted = self.store.insert_reference_node(&Node {
                norm_type: ref_urn.act_type.clone(),
                name: ref_urn.name(),
                title: String::new(),
                description: String::new(),
                image: String::new(),
                reference: self.scraper.absolute_url(&href),
                urn: ref_urn_str.to_string(),
                year: ref_urn.year().to_string(),
                scraped: false,
            })?;
            if inserted {
                stats.stubs += 1;
            }

            let added = self.store.insert_edge(&Edge {
                from_type: urn.act_type.clone(),
                from_name: urn.name(),
                edge: REFERS_TO.to_string(),
                to_type: ref_urn.act_type.clone(),
                to_name: ref_urn.name(),
            })?;
            if added {
                stats.edges += 1;
            }
        }

        Ok(())
    }
}

/// URN from the query string of a resolver href, with the `!vig=` version
/// suffix stripped. `None` when the href carries no URN query.
pub fn extract_urn(href: &str) -> Option<&str> {
    let query = href.split('?').nth(1)?;
    let urn = query.split('!').next()?;
    urn.contains("urn").then_some(urn)
}
