use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_occupancy_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Recorded as the actor on every change-log entry.
    pub actor: String,
    /// Years past today's year that delete counts project into.
    pub horizon_years: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    pub log_level: String,
    /// JSONL file receiving pushed setpoints, relative to the home dir.
    pub outbox: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            actor: "cli".to_string(),
            horizon_years: 1,
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            outbox: "outbox.jsonl".to_string(),
        }
    }
}

impl Config {
    pub fn outbox_path(&self) -> Result<PathBuf> {
        Ok(ensure_occupancy_home()?.join(&self.output.outbox))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_occupancy_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
