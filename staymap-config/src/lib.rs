//! Loader for crawl configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are attached, with `STAYMAP_`
//! environment variables applied last (`__` separates nested keys, e.g.
//! `STAYMAP_FEED__PATH=out.json`). Every string value then has `${VAR}`
//! placeholders expanded. Missing keys fall back to the defaults below, so
//! an empty file reproduces the stock Booking.com crawl.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Placeholder substituted with each query in [`SearchConfig::url_template`].
pub const QUERY_PLACEHOLDER: &str = "{query}";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.99 Safari/537.36";

const DEFAULT_QUERIES: &[&str] = &[
    "Mont+Saint+Michel",
    "St+Malo",
    "Bayeux",
    "Le+Havre",
    "Rouen",
    "Paris",
    "Amiens",
    "Lille",
    "Strasbourg",
    "Chateau+du+Haut+Koenigsbourg",
    "Colmar",
    "Eguisheim",
    "Besancon",
    "Dijon",
    "Annecy",
    "Grenoble",
    "Lyon",
    "Gorges+du+Verdon",
    "Bormes+les+Mimosas",
    "Cassis",
    "Marseille",
    "Aix+en+Provence",
    "Avignon",
    "Uzes",
    "Nimes",
    "Aigues+Mortes",
    "Saintes+Maries+de+la+mer",
    "Collioure",
    "Carcassonne",
    "Ariege",
    "Toulouse",
    "Montauban",
    "Biarritz",
    "Bayonne",
    "La+Rochelle",
];

/// Complete crawl configuration, handed to the fetch engine and spider at
/// construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaymapConfig {
    /// Identifying string sent with every request.
    pub user_agent: String,
    /// Search URLs outside these domains (and their subdomains) are skipped.
    pub allowed_domains: Vec<String>,
    pub search: SearchConfig,
    pub selectors: SelectorConfig,
    pub autothrottle: AutoThrottleConfig,
    pub http_cache: HttpCacheConfig,
    pub http: HttpConfig,
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

impl Default for StaymapConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_domains: vec!["booking.com".to_string()],
            search: SearchConfig::default(),
            selectors: SelectorConfig::default(),
            autothrottle: AutoThrottleConfig::default(),
            http_cache: HttpCacheConfig::default(),
            http: HttpConfig::default(),
            feed: FeedConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StaymapConfig {
    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("user_agent must not be empty".into()));
        }
        if !self.search.url_template.contains(QUERY_PLACEHOLDER) {
            return Err(ConfigError::Message(format!(
                "search.url_template must contain {QUERY_PLACEHOLDER}"
            )));
        }
        if self.search.query_param.is_empty() {
            return Err(ConfigError::Message(
                "search.query_param must not be empty".into(),
            ));
        }
        let t = &self.autothrottle;
        if !(t.target_concurrency > 0.0) {
            return Err(ConfigError::Message(
                "autothrottle.target_concurrency must be positive".into(),
            ));
        }
        if t.min_delay_ms > t.max_delay_ms {
            return Err(ConfigError::Message(
                "autothrottle.min_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search results URL with a `{query}` placeholder.
    pub url_template: String,
    /// Query-string key whose value names the city.
    pub query_param: String,
    /// Raw query strings, as a search form would submit them.
    pub queries: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url_template: "https://www.booking.com/searchresults.html?ss={query}".to_string(),
            query_param: "ss".to_string(),
            queries: DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// CSS selectors applied to search result pages. Field selectors are
/// evaluated relative to each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub entry: String,
    pub name: String,
    pub link: String,
    pub link_attr: String,
    pub score: String,
    pub description: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            entry: r#"div[data-testid="property-card"]"#.to_string(),
            name: r#"div[data-testid="title"]"#.to_string(),
            link: r#"a[data-testid="title-link"]"#.to_string(),
            link_attr: "href".to_string(),
            score: r#"div[data-testid="review-score"] div[class="a3b8729ab1 d86cee9b25"]"#
                .to_string(),
            description: r#"div[class="abf093bdfe"]"#.to_string(),
        }
    }
}

/// Adaptive request pacing, tuned per host from observed latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoThrottleConfig {
    pub enabled: bool,
    pub start_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Average number of requests that should be in flight per host.
    pub target_concurrency: f64,
}

impl Default for AutoThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_ms: 5_000,
            min_delay_ms: 0,
            max_delay_ms: 60_000,
            target_concurrency: 1.0,
        }
    }
}

impl AutoThrottleConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Entries older than this are refetched; `0` keeps them forever.
    pub expiration_secs: u64,
    /// Responses with these status codes are never stored.
    pub ignore_http_codes: Vec<u16>,
}

impl Default for HttpCacheConfig {
    fn default() -> Self {
        let dir = dirs::cache_dir()
            .map(|d| d.join("staymap").join("httpcache"))
            .unwrap_or_else(|| PathBuf::from(".staymap").join("httpcache"));
        Self {
            enabled: true,
            dir,
            expiration_secs: 0,
            ignore_http_codes: Vec::new(),
        }
    }
}

impl HttpCacheConfig {
    pub fn expiration(&self) -> Option<Duration> {
        (self.expiration_secs > 0).then(|| Duration::from_secs(self.expiration_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            retries: 2,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Serialization used for the output feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    /// A single JSON array of records.
    Json,
    /// One JSON object per line.
    Jsonlines,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown feed format `{0}` (expected json or jsonlines)")]
pub struct UnknownFeedFormat(String);

impl FromStr for FeedFormat {
    type Err = UnknownFeedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(FeedFormat::Json),
            "jsonlines" | "jsonl" => Ok(FeedFormat::Jsonlines),
            other => Err(UnknownFeedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub path: PathBuf,
    pub format: FeedFormat,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("hotels.json"),
            format: FeedFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    /// `text` or `json`.
    pub format: String,
    pub stderr: bool,
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: "text".to_string(),
            stderr: true,
            filter: "info".to_string(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct StaymapConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for StaymapConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StaymapConfigLoader {
    /// Start with no file sources; `STAYMAP_` env overrides are applied on load.
    ///
    /// ```
    /// use staymap_config::StaymapConfigLoader;
    ///
    /// let config = StaymapConfigLoader::new()
    ///     .with_yaml_str("search:\n  queries: [\"St+Malo\"]")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.search.queries, vec!["St+Malo".to_string()]);
    /// assert!(config.autothrottle.enabled);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "STAYMAP",
        }
    }

    /// Use a different environment prefix (tests use this to stay isolated).
    pub fn with_env_prefix(mut self, prefix: &'static str) -> Self {
        self.env_prefix = prefix;
        self
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`Self::with_file`], but a missing file is not an error.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use staymap_config::{FeedFormat, StaymapConfigLoader};
    ///
    /// unsafe { std::env::set_var("FEED_DIR", "/tmp/staymap-doc"); }
    ///
    /// let config = StaymapConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// feed:
    ///   path: "${FEED_DIR}/hotels.jsonl"
    ///   format: jsonlines
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.feed.format, FeedFormat::Jsonlines);
    /// assert_eq!(config.feed.path.to_str(), Some("/tmp/staymap-doc/hotels.jsonl"));
    ///
    /// unsafe { std::env::remove_var("FEED_DIR"); }
    /// ```
    pub fn load(self) -> Result<StaymapConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("search.queries")
                    .with_list_parse_key("allowed_domains")
                    .with_list_parse_key("http_cache.ignore_http_codes"),
            )
            .build()?;

        // Convert to serde_json::Value first
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: StaymapConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}

/// Render the effective configuration as YAML.
pub fn to_yaml(config: &StaymapConfig) -> Result<String, ConfigError> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::Message(e.to_string()))
}
