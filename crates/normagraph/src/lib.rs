pub mod crawl;
mod parser;
pub mod scraper;
pub mod store;
pub mod urn;

pub use crawl::Crawler;
pub use scraper::WebScraper;
pub use store::GraphStore;

pub(crate) const BASE_URL: &str = "https://www.normattiva.it";
