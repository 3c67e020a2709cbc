use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use wind_harvest_core::lookup::steps_for_days;
use wind_harvest_core::stamp::Interval;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/grib-data")
}
fn default_archive_dir() -> PathBuf {
    PathBuf::from("./data/json-data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default)]
    pub interval_hours: Interval,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default = "default_backfill_depth")]
    pub backfill_depth: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            interval_hours: Interval::default(),
            tick_secs: default_tick_secs(),
            max_age_days: default_max_age_days(),
            backfill_depth: default_backfill_depth(),
        }
    }
}

impl HarvestConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

fn default_tick_secs() -> u64 {
    900
}
fn default_max_age_days() -> u32 {
    30
}
fn default_backfill_depth() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_levels")]
    pub levels: Vec<String>,
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
    #[serde(default)]
    pub left_lon: f64,
    #[serde(default = "default_right_lon")]
    pub right_lon: f64,
    #[serde(default = "default_top_lat")]
    pub top_lat: f64,
    #[serde(default = "default_bottom_lat")]
    pub bottom_lat: f64,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            levels: default_levels(),
            variables: default_variables(),
            left_lon: 0.0,
            right_lon: default_right_lon(),
            top_lat: default_top_lat(),
            bottom_lat: default_bottom_lat(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_1p00.pl".to_string()
}
fn default_levels() -> Vec<String> {
    vec![
        "lev_10_m_above_ground".to_string(),
        "lev_surface".to_string(),
    ]
}
fn default_variables() -> Vec<String> {
    vec![
        "var_TMP".to_string(),
        "var_UGRD".to_string(),
        "var_VGRD".to_string(),
    ]
}
fn default_right_lon() -> f64 {
    360.0
}
fn default_top_lat() -> f64 {
    90.0
}
fn default_bottom_lat() -> f64 {
    -90.0
}
fn default_upstream_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default = "default_converter_command")]
    pub command: String,
    /// Arguments; `{input}` and `{output}` are substituted per run.
    #[serde(default = "default_converter_args")]
    pub args: Vec<String>,
    #[serde(default = "default_converter_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_validate_json")]
    pub validate_json: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
            args: default_converter_args(),
            timeout_secs: default_converter_timeout_secs(),
            validate_json: default_validate_json(),
        }
    }
}

fn default_converter_command() -> String {
    "java".to_string()
}
fn default_converter_args() -> Vec<String> {
    [
        "-Xmx512M",
        "-jar",
        "./converter/lib/grib2json-0.8.0-SNAPSHOT.jar",
        "--data",
        "--output",
        "{output}",
        "--names",
        "--compact",
        "{input}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_converter_timeout_secs() -> u64 {
    600
}
fn default_validate_json() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u32,
    #[serde(default = "default_max_search_limit_days")]
    pub max_search_limit_days: u32,
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_lookback_days: default_max_lookback_days(),
            max_search_limit_days: default_max_search_limit_days(),
            timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

fn default_max_lookback_days() -> u32 {
    30
}
fn default_max_search_limit_days() -> u32 {
    365
}
fn default_lookup_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Expected `X-API-KEY` value. Falls back to `WINDH_API_KEY` only when
    /// absent; an empty value (here or in the environment) leaves the API open.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("WINDH_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }
}

fn default_bind() -> String {
    "0.0.0.0:7000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Config {
    pub fn interval(&self) -> Interval {
        self.harvest.interval_hours
    }

    /// Step budget for unbounded lookups.
    pub fn lookup_max_steps(&self) -> u32 {
        steps_for_days(self.lookup.max_lookback_days, self.interval())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate harvest
    if config.harvest.tick_secs == 0 {
        anyhow::bail!("harvest.tick_secs must be > 0");
    }
    if config.harvest.max_age_days == 0 {
        anyhow::bail!("harvest.max_age_days must be > 0");
    }

    // Validate upstream
    if config.upstream.base_url.trim().is_empty() {
        anyhow::bail!("upstream.base_url must not be empty");
    }
    if config.upstream.timeout_secs == 0 {
        anyhow::bail!("upstream.timeout_secs must be > 0");
    }

    // Validate converter
    if config.converter.command.trim().is_empty() {
        anyhow::bail!("converter.command must not be empty");
    }
    for placeholder in ["{input}", "{output}"] {
        if !config.converter.args.iter().any(|a| a.contains(placeholder)) {
            anyhow::bail!("converter.args must contain a '{}' placeholder", placeholder);
        }
    }
    if config.converter.timeout_secs == 0 {
        anyhow::bail!("converter.timeout_secs must be > 0");
    }

    // Validate lookup
    if config.lookup.max_lookback_days == 0 {
        anyhow::bail!("lookup.max_lookback_days must be > 0");
    }
    if config.lookup.timeout_secs == 0 {
        anyhow::bail!("lookup.timeout_secs must be > 0");
    }

    Ok(())
}
