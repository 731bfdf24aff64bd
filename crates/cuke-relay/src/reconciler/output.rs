//! Report outputs written once the run is finished.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::messages::{write_envelopes, Envelope};

/// Consumer of the final envelope log.
///
/// JSON, HTML and usage renderers live outside this crate and plug in here.
pub trait ReportFormatter: Send {
    fn name(&self) -> &str;

    fn write(&mut self, envelopes: &[Envelope]) -> anyhow::Result<()>;
}

/// Writes the log as newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct NdjsonReport {
    path: PathBuf,
}

impl NdjsonReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportFormatter for NdjsonReport {
    fn name(&self) -> &str {
        "messages"
    }

    fn write(&mut self, envelopes: &[Envelope]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        write_envelopes(BufWriter::new(file), envelopes)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        info!(path = %self.path.display(), envelopes = envelopes.len(), "wrote messages report");
        Ok(())
    }
}
