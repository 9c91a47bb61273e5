//! Runtime configuration.
//!
//! Values are resolved as built-in defaults, then an optional TOML file given with
//! `--config`, then command line flags (which may also come from `UT_*` env vars).

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

use crate::domain::UTError;
use crate::record::FieldPath;
use crate::table::TableColumn;

pub const DEFAULT_URL: &str = "https://jsonplaceholder.typicode.com/users";

#[derive(Parser, Debug, Default)]
#[command(version, about = "Browse user records from a REST endpoint in the terminal")]
pub struct Args {
    /// Endpoint returning a JSON array of user records
    #[arg(short, long, env = "UT_URL")]
    pub url: Option<String>,

    /// Read records from a local JSON file instead of the endpoint
    #[arg(short, long, env = "UT_FILE")]
    pub file: Option<String>,

    /// Number of rows per page
    #[arg(short, long, env = "UT_PAGE_SIZE")]
    pub page_size: Option<usize>,

    /// Field matched by the search, e.g. `name`
    #[arg(long)]
    pub search_field: Option<String>,

    /// Field used for sorting, e.g. `company.name`
    #[arg(long)]
    pub sort_field: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// TOML configuration file
    #[arg(short, long, env = "UT_CONFIG")]
    pub config: Option<String>,

    /// Log file, the terminal is used by the table
    #[arg(long, env = "UT_LOG_FILE")]
    pub log_file: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[serde(default)]
pub struct UTConfig {
    pub url: String,
    #[setters(strip_option)]
    pub file: Option<PathBuf>,
    pub page_size: usize,
    pub search_field: FieldPath,
    pub sort_field: FieldPath,
    pub columns: Vec<TableColumn>,
    pub request_timeout_secs: u64,
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub log_file: PathBuf,
}

impl Default for UTConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            file: None,
            page_size: 8,
            search_field: FieldPath::from_segments(&["name"]),
            sort_field: FieldPath::from_segments(&["name"]),
            columns: TableColumn::user_columns(),
            request_timeout_secs: 30,
            event_poll_time: 100,
            max_column_width: 40,
            log_file: std::env::temp_dir().join("ut.log"),
        }
    }
}

impl UTConfig {
    pub fn load(args: &Args) -> Result<Self, UTError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(&expand_path(path)?)?,
            None => Self::default(),
        };

        if let Some(url) = &args.url {
            config = config.url(url.clone());
        }
        if let Some(file) = &args.file {
            config = config.file(expand_path(file)?);
        }
        if let Some(page_size) = args.page_size {
            config = config.page_size(page_size);
        }
        if let Some(field) = &args.search_field {
            config = config.search_field(field.parse()?);
        }
        if let Some(field) = &args.sort_field {
            config = config.sort_field(field.parse()?);
        }
        if let Some(timeout) = args.timeout {
            config = config.request_timeout_secs(timeout);
        }
        if let Some(log_file) = &args.log_file {
            config = config.log_file(expand_path(log_file)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, UTError> {
        let content = fs::read_to_string(path)
            .map_err(|e| UTError::config(format!("Unable to read {}: {e}", path.display())))?;
        let mut config: UTConfig = toml::from_str(&content)?;
        if let Some(file) = &config.file {
            config.file = Some(expand_path(&file.to_string_lossy())?);
        }
        config.log_file = expand_path(&config.log_file.to_string_lossy())?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), UTError> {
        if self.page_size == 0 {
            return Err(UTError::config("page size must be at least 1"));
        }
        if self.columns.is_empty() {
            return Err(UTError::config("at least one column is required"));
        }
        if self.request_timeout_secs == 0 {
            return Err(UTError::config("timeout must be at least one second"));
        }
        if self.file.is_none() && self.url.trim().is_empty() {
            return Err(UTError::config("either an url or a file is required"));
        }
        Ok(())
    }
}

fn expand_path(path: &str) -> Result<PathBuf, UTError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| UTError::config(format!("Unable to expand '{path}': {e}")))
}
