// src/config.rs
use serde::Deserialize;
use std::{fs, path::Path};

/// Optional tuning file looked up in the working directory. The CLI stays
/// `mbo2mbp <input> [output]`; everything here has a sane default.
pub const DEFAULT_CONFIG_PATH: &str = "mbo2mbp.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: General,
    pub output: Output,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct General {
    pub json_logs: bool,            // structured JSON log lines
    pub log_every_records: u64,     // progress cadence; 0 disables
}

impl Default for General {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_every_records: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Output {
    pub flush_bytes: usize,         // output buffer flush threshold
    pub validate: bool,             // check each row before writing
}

impl Default for Output {
    fn default() -> Self {
        Self {
            flush_bytes: 64 * 1024,
            validate: true,
        }
    }
}

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults when the file does not exist; a present-but-broken file is
    /// still fatal.
    pub fn load_or_default(p: &Path) -> anyhow::Result<Self> {
        if p.exists() {
            Self::from_file(p)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.output.flush_bytes == 0 {
            anyhow::bail!("output.flush_bytes must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert!(!cfg.general.json_logs);
        assert_eq!(cfg.general.log_every_records, 1_000_000);
        assert_eq!(cfg.output.flush_bytes, 64 * 1024);
        assert!(cfg.output.validate);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str("[output]\nflush_bytes = 1024\n").unwrap();
        assert_eq!(cfg.output.flush_bytes, 1024);
        assert!(cfg.output.validate);
        assert_eq!(cfg.general.log_every_records, 1_000_000);
    }

    #[test]
    fn zero_flush_rejected() {
        let cfg: AppConfig = toml::from_str("[output]\nflush_bytes = 0\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
