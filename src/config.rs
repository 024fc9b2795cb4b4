use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::club_mapping::ClubMapping;
use crate::resolver::{DEFAULT_CONFIDENCE_THRESHOLD, ResolverConfig};
use crate::store;

pub const DB_PATH_ENV: &str = "LEAGUE_DB_PATH";
pub const MAPPING_PATH_ENV: &str = "CLUB_MAPPING_PATH";
pub const THRESHOLD_ENV: &str = "RESOLVER_CONFIDENCE_THRESHOLD";
pub const DRY_RUN_ENV: &str = "CONSOLIDATE_DRY_RUN";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub db_path: Option<PathBuf>,
    pub mapping_path: Option<PathBuf>,
    pub confidence_threshold: f64,
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            mapping_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    /// Reads `.env.local` then `.env` (existing variables win), then the
    /// process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let confidence_threshold = non_blank(THRESHOLD_ENV)
            .and_then(|val| val.trim().parse::<f64>().ok())
            .map(|val| ResolverConfig::with_threshold(val).confidence_threshold)
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        Self {
            db_path: non_blank(DB_PATH_ENV).map(PathBuf::from),
            mapping_path: non_blank(MAPPING_PATH_ENV).map(PathBuf::from),
            confidence_threshold,
            dry_run: non_blank(DRY_RUN_ENV).is_some_and(|val| parse_flag(&val)),
        }
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig::with_threshold(self.confidence_threshold)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        self.db_path
            .clone()
            .or_else(store::default_db_path)
            .context("unable to resolve sqlite path")
    }

    /// No mapping file configured means nothing to consolidate.
    pub fn mapping(&self) -> Result<ClubMapping> {
        match &self.mapping_path {
            Some(path) => ClubMapping::load(path),
            None => Ok(ClubMapping::default()),
        }
    }
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
