use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use occupancy_core::{ResolvedSetpoints, SetpointSink, Zone};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One applied setpoint set, as written to the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub at: DateTime<Utc>,
    pub site_id: String,
    pub zone_id: String,
    pub profile_id: Option<String>,
    pub setpoints: ResolvedSetpoints,
}

/// Appends every applied zone to a JSONL file for the actuation layer to
/// pick up.
pub struct OutboxSink {
    path: PathBuf,
}

impl OutboxSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SetpointSink for OutboxSink {
    fn apply(&self, zone: &Zone, setpoints: &ResolvedSetpoints) -> Result<()> {
        let record = OutboxRecord {
            at: Utc::now(),
            site_id: zone.site_id.clone(),
            zone_id: zone.id.clone(),
            profile_id: zone.profile_id.clone(),
            setpoints: setpoints.clone(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        // One write per record keeps lines whole under concurrent appends.
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        f.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

pub fn read_outbox(path: &Path) -> Result<Vec<OutboxRecord>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(v) = serde_json::from_str::<OutboxRecord>(&line) {
            rows.push(v);
        }
    }
    Ok(rows)
}
