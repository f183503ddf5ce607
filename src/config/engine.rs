//! Engine Configuration
//!
//! Storage location, commission fan-out and withdrawal fee. Loaded from a TOML
//! file when present, then overridden by `LEDGER_*` environment variables.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ledger_constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_COMMISSION_BATCH_SIZE, DEFAULT_DB_PATH,
    DEFAULT_WITHDRAWAL_FEE_PCT, MAX_COMMISSION_DEPTH,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file shared by every worker/process
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long a writer waits for another writer's transaction (ms)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Referral levels that receive a purchase commission (1..=10)
    #[serde(default = "default_commission_max_depth")]
    pub commission_max_depth: usize,

    /// Referrers credited per write batch
    #[serde(default = "default_commission_batch_size")]
    pub commission_batch_size: usize,

    /// Fee taken from PACKAGE and REFERRAL withdrawals, in percent
    #[serde(default = "default_withdrawal_fee_pct")]
    pub withdrawal_fee_pct: f64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_commission_max_depth() -> usize {
    MAX_COMMISSION_DEPTH
}
fn default_commission_batch_size() -> usize {
    DEFAULT_COMMISSION_BATCH_SIZE
}
fn default_withdrawal_fee_pct() -> f64 {
    DEFAULT_WITHDRAWAL_FEE_PCT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            commission_max_depth: default_commission_max_depth(),
            commission_batch_size: default_commission_batch_size(),
            withdrawal_fee_pct: default_withdrawal_fee_pct(),
        }
    }
}

impl EngineConfig {
    /// Config for a given database file, everything else default.
    pub fn with_database<P: AsRef<Path>>(path: P) -> Self {
        Self {
            database_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        let cfg: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse engine config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// File (if it exists) plus environment overrides.
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::debug!(
                "[CONFIG] {} not found, using defaults",
                path.display()
            );
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        // LEDGER_DB_PATH
        if let Ok(val) = env::var("LEDGER_DB_PATH") {
            let val = val.trim();
            if !val.is_empty() {
                self.database_path = PathBuf::from(val);
            }
        }

        // LEDGER_BUSY_TIMEOUT_MS
        if let Ok(val) = env::var("LEDGER_BUSY_TIMEOUT_MS") {
            if let Ok(num) = val.trim().parse::<u64>() {
                self.busy_timeout_ms = num;
            }
        }

        // LEDGER_COMMISSION_MAX_DEPTH
        if let Ok(val) = env::var("LEDGER_COMMISSION_MAX_DEPTH") {
            if let Ok(num) = val.trim().parse::<usize>() {
                self.commission_max_depth = num;
            }
        }

        // LEDGER_COMMISSION_BATCH_SIZE
        if let Ok(val) = env::var("LEDGER_COMMISSION_BATCH_SIZE") {
            if let Ok(num) = val.trim().parse::<usize>() {
                self.commission_batch_size = num;
            }
        }

        // LEDGER_WITHDRAWAL_FEE_PCT
        if let Ok(val) = env::var("LEDGER_WITHDRAWAL_FEE_PCT") {
            if let Ok(num) = val.trim().parse::<f64>() {
                self.withdrawal_fee_pct = num;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(anyhow!("database_path must not be empty"));
        }
        if self.commission_max_depth == 0 || self.commission_max_depth > MAX_COMMISSION_DEPTH {
            return Err(anyhow!(
                "commission_max_depth must be within 1..={}",
                MAX_COMMISSION_DEPTH
            ));
        }
        if self.commission_batch_size == 0 {
            return Err(anyhow!("commission_batch_size must be at least 1"));
        }
        if !(0.0..100.0).contains(&self.withdrawal_fee_pct) {
            return Err(anyhow!("withdrawal_fee_pct must be within [0, 100)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    // process environment is shared by every test thread
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    const ENV_KEYS: [&str; 5] = [
        "LEDGER_DB_PATH",
        "LEDGER_BUSY_TIMEOUT_MS",
        "LEDGER_COMMISSION_MAX_DEPTH",
        "LEDGER_COMMISSION_BATCH_SIZE",
        "LEDGER_WITHDRAWAL_FEE_PCT",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.commission_max_depth, 10);
        assert_eq!(config.commission_batch_size, 100);
        assert_eq!(config.withdrawal_fee_pct, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let deep = EngineConfig {
            commission_max_depth: 11,
            ..Default::default()
        };
        assert!(deep.validate().is_err());

        let no_batch = EngineConfig {
            commission_batch_size: 0,
            ..Default::default()
        };
        assert!(no_batch.validate().is_err());

        let fee = EngineConfig {
            withdrawal_fee_pct: 100.0,
            ..Default::default()
        };
        assert!(fee.validate().is_err());
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(
            &path,
            "database_path = \"/var/lib/ledger/main.db\"\ncommission_batch_size = 25\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/ledger/main.db"));
        assert_eq!(config.commission_batch_size, 25);
        assert_eq!(config.commission_max_depth, 10);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "commission_max_depth = 0\n").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_overrides_file_and_defaults() {
        let _guard = ENV_LOCK.lock();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(
            &path,
            "commission_batch_size = 25\nwithdrawal_fee_pct = 5.0\nbusy_timeout_ms = 900\n",
        )
        .unwrap();

        env::set_var("LEDGER_COMMISSION_BATCH_SIZE", " 7 ");
        env::set_var("LEDGER_WITHDRAWAL_FEE_PCT", "2.5");
        env::set_var("LEDGER_BUSY_TIMEOUT_MS", "soon");
        env::set_var("LEDGER_DB_PATH", "/srv/ledger/env.db");

        let config = EngineConfig::load_or_env(&path).unwrap();
        assert_eq!(config.commission_batch_size, 7);
        assert_eq!(config.withdrawal_fee_pct, 2.5);
        // unparsable values leave the file setting in place
        assert_eq!(config.busy_timeout_ms, 900);
        assert_eq!(config.database_path, PathBuf::from("/srv/ledger/env.db"));

        let missing = EngineConfig::load_or_env(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.commission_batch_size, 7);
        assert_eq!(missing.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(missing.commission_max_depth, MAX_COMMISSION_DEPTH);

        env::set_var("LEDGER_COMMISSION_MAX_DEPTH", "12");
        assert!(EngineConfig::from_env().is_err());

        clear_env();
        let defaults = EngineConfig::from_env().unwrap();
        assert_eq!(defaults.database_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(defaults.withdrawal_fee_pct, DEFAULT_WITHDRAWAL_FEE_PCT);
    }
}
