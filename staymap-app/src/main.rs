use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use staymap_common::observability::{LogConfig, LogFormat, init_logging};
use staymap_config::{FeedFormat, StaymapConfig, StaymapConfigLoader, to_yaml};
use staymap_web::extract_coordinates;
use std::path::PathBuf;

mod crawl;

#[derive(Parser, Debug)]
#[command(name = "staymap")]
#[command(about = "Crawl hotel search results into a geolocated feed")]
#[command(version)]
struct Cli {
    /// YAML configuration file; missing is fine, env vars still apply
    #[arg(short, long, default_value = "staymap.yaml", env = "STAYMAP_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the crawl and write the feed (default)
    Crawl(CrawlArgs),
    /// Print the effective configuration as YAML
    Config,
    /// Extract coordinates from a saved detail page
    Coords {
        /// HTML file to inspect
        file: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct CrawlArgs {
    /// Feed output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Feed format: json or jsonlines
    #[arg(short, long)]
    format: Option<FeedFormat>,

    /// Search query, repeatable; replaces the configured list
    #[arg(short, long = "query")]
    queries: Vec<String>,

    /// Bypass the on-disk HTTP cache
    #[arg(long)]
    no_cache: bool,

    /// Disable adaptive request spacing
    #[arg(long)]
    no_throttle: bool,
}

impl CrawlArgs {
    fn apply(&self, cfg: &mut StaymapConfig) {
        if let Some(path) = &self.output {
            cfg.feed.path = path.clone();
        }
        if let Some(format) = self.format {
            cfg.feed.format = format;
        }
        if !self.queries.is_empty() {
            cfg.search.queries = self.queries.clone();
        }
        if self.no_cache {
            cfg.http_cache.enabled = false;
        }
        if self.no_throttle {
            cfg.autothrottle.enabled = false;
        }
    }
}

fn log_config(cfg: &StaymapConfig) -> LogConfig {
    LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: LogFormat::from_name(&cfg.logging.format),
        default_filter: cfg.logging.filter.clone(),
        ..LogConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Env wins over the file.
    let cfg = StaymapConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Some(Command::Config) => {
            print!("{}", to_yaml(&cfg)?);
            Ok(())
        }
        Some(Command::Coords { file }) => {
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            match extract_coordinates(&html) {
                Some(c) => println!("{},{}", c.latitude, c.longitude),
                None => println!("not found"),
            }
            Ok(())
        }
        Some(Command::Crawl(args)) => run_crawl(cfg, &args).await,
        None => run_crawl(cfg, &CrawlArgs::default()).await,
    }
}

async fn run_crawl(mut cfg: StaymapConfig, args: &CrawlArgs) -> Result<()> {
    args.apply(&mut cfg);
    cfg.validate()?;

    let log_path = init_logging(log_config(&cfg))?;
    tracing::info!(log = %log_path.display(), "staymap.start");

    let summary = crawl::run(&cfg).await?;
    eprintln!(
        "{} hotels from {} searches written to {}{}",
        summary.records,
        summary.searches,
        cfg.feed.path.display(),
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_is_the_default_command() {
        let cli = Cli::try_parse_from(["staymap"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("staymap.yaml"));
    }

    #[test]
    fn crawl_flags_override_config() {
        let cli = Cli::try_parse_from([
            "staymap",
            "--config",
            "other.yaml",
            "crawl",
            "--output",
            "out/hotels.jsonl",
            "--format",
            "jsonl",
            "--query",
            "Lyon",
            "--query",
            "St+Malo",
            "--no-cache",
            "--no-throttle",
        ])
        .unwrap();
        let Some(Command::Crawl(args)) = cli.command else {
            panic!("expected crawl");
        };

        let mut cfg = StaymapConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.feed.path, PathBuf::from("out/hotels.jsonl"));
        assert_eq!(cfg.feed.format, FeedFormat::Jsonlines);
        assert_eq!(cfg.search.queries, vec!["Lyon", "St+Malo"]);
        assert!(!cfg.http_cache.enabled);
        assert!(!cfg.autothrottle.enabled);
    }

    #[test]
    fn no_flags_leave_config_alone() {
        let mut cfg = StaymapConfig::default();
        CrawlArgs::default().apply(&mut cfg);
        assert_eq!(cfg.search.queries.len(), StaymapConfig::default().search.queries.len());
        assert!(cfg.http_cache.enabled);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = Cli::try_parse_from(["staymap", "crawl", "--format", "csv"]).unwrap_err();
        assert!(err.to_string().contains("csv"));
    }

    #[test]
    fn logging_section_maps_onto_log_config() {
        let mut cfg = StaymapConfig::default();
        cfg.logging.format = "json".into();
        cfg.logging.stderr = false;
        cfg.logging.filter = "staymap=debug".into();
        let lc = log_config(&cfg);
        assert_eq!(lc.format, LogFormat::Json);
        assert!(!lc.emit_stderr);
        assert_eq!(lc.default_filter, "staymap=debug");
        assert_eq!(lc.app_name, "staymap");
    }
}
