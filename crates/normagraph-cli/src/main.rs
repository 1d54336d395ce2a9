use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::Serialize;

use normagraph::crawl::{Crawler, YearSpec, extract_urn};
use normagraph::scraper::{WebScraper, lookup_path};
use normagraph::store::GraphStore;
use normagraph::urn::Urn;

#[derive(Parser)]
#[command(name = "normagraph")]
#[command(about = "A normattiva.it reference graph scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more years of norms and persist the reference graph
    Crawl {
        #[arg(
            required = true,
            value_name = "YEAR:COUNT",
            value_parser = parse_year_spec,
            help = "Years to enumerate, as YEAR:COUNT pairs (e.g. 2016:249)"
        )]
        years: Vec<YearSpec>,

        #[arg(
            long,
            default_value = "normagraph.sqlite",
            help = "Path of the SQLite database"
        )]
        db: PathBuf,

        #[arg(
            long,
            help = "Do not run the second pass over referenced, unscraped norms"
        )]
        skip_references: bool,
    },
    /// Resolve a single partial URN to its permanent permalink(s)
    Resolve {
        #[arg(help = "Partial or full URN, e.g. urn:nir:2016;249")]
        urn: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Dump the stored graph as JSON for visualization tools
    Export {
        #[arg(
            long,
            default_value = "normagraph.sqlite",
            help = "Path of the SQLite database"
        )]
        db: PathBuf,
    },
    /// Show node and edge counts of the stored graph
    Stats {
        #[arg(
            long,
            default_value = "normagraph.sqlite",
            help = "Path of the SQLite database"
        )]
        db: PathBuf,
    },
}

fn parse_year_spec(s: &str) -> Result<YearSpec, String> {
    YearSpec::from_str(s)
}

#[derive(Debug, Serialize)]
struct ResolvedAct {
    permalink: String,
    urn: String,
    act_type: String,
    name: String,
    year: i32,
}

#[derive(Debug, Serialize)]
struct GraphExport {
    nodes: Vec<normagraph::store::Node>,
    edges: Vec<normagraph::store::Edge>,
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn open_store(db: &PathBuf) -> GraphStore {
    GraphStore::open(db).unwrap_or_else(|e| {
        log::error!("Error opening database {}: {}", db.display(), e);
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Crawl {
            years,
            db,
            skip_references,
        } => {
            let scraper = WebScraper::new().unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });
            let store = open_store(&db);

            log::info!(
                "Crawling {} year(s) into {}",
                years.len(),
                db.display()
            );

            let crawler = Crawler::new(&scraper, &store);
            let stats = crawler
                .run(&years, !skip_references)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Crawl failed: {}", e);
                    process::exit(1);
                });

            print!("{}", stats);
        }

        Commands::Resolve { urn, format } => {
            let scraper = WebScraper::new().unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });

            let path = if urn.starts_with('/') {
                urn.clone()
            } else {
                lookup_path(&urn)
            };

            log::info!("Resolving {}...", path);

            let permalinks = scraper.resolve_permalinks(&path).await.unwrap_or_else(|e| {
                log::error!("Error resolving {}: {}", urn, e);
                process::exit(1);
            });

            let resolved: Vec<ResolvedAct> = permalinks
                .into_iter()
                .filter_map(|permalink| {
                    let urn_str = extract_urn(&permalink)?.to_string();
                    let parsed = match Urn::from_str(&urn_str) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            log::warn!("Unparseable URN '{}': {}", urn_str, e);
                            return None;
                        }
                    };
                    Some(ResolvedAct {
                        permalink: scraper.absolute_url(&permalink),
                        urn: urn_str,
                        act_type: parsed.act_type.clone(),
                        name: parsed.name(),
                        year: parsed.year(),
                    })
                })
                .collect();

            match format {
                OutputFormat::Json => serialize_json(&resolved),
                OutputFormat::Text => {
                    if resolved.is_empty() {
                        println!("No act found for {}", urn);
                    } else {
                        for (i, act) in resolved.iter().enumerate() {
                            println!("{:>3}. {} [{}]", i + 1, act.name, act.act_type);
                            println!("     {}", act.urn);
                            println!("     {}", act.permalink);
                        }
                    }
                }
            }
        }

        Commands::Export { db } => {
            let store = open_store(&db);

            let export = GraphExport {
                nodes: store.nodes().unwrap_or_else(|e| {
                    log::error!("Error reading nodes: {}", e);
                    process::exit(1);
                }),
                edges: store.edges().unwrap_or_else(|e| {
                    log::error!("Error reading edges: {}", e);
                    process::exit(1);
                }),
            };

            serialize_json(&export);
        }

        Commands::Stats { db } => {
            let store = open_store(&db);
            let stats = store.stats().unwrap_or_else(|e| {
                log::error!("Error reading stats: {}", e);
                process::exit(1);
            });
            print!("{}", stats);
        }
    }
}
