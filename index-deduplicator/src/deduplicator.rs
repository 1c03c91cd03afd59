use tracing::info;

use crate::bulk::{build_actions, execute, ExecutionReport};
use crate::config::{DedupSettings, JobConfig};
use crate::dedup::detect;
use crate::error::{ConfigError, DedupError};
use crate::index::IndexClient;

/// What one run did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub scanned: u64,
    pub duplicates: u64,
    pub removed: u64,
    pub dry_run: bool,
}

pub struct Deduplicator {
    client: IndexClient,
    settings: DedupSettings,
}

impl Deduplicator {
    pub fn new(config: JobConfig) -> Result<Self, ConfigError> {
        let client = IndexClient::new(&config.index)?;

        Ok(Self {
            client,
            settings: config.settings,
        })
    }

    /// Scan the index once, schedule every duplicate past the first occurrence
    /// of each comparison key for deletion, and apply (or, in dry-run mode,
    /// report) the batch.
    ///
    /// Keeps exactly one document per distinct key value: the first one in
    /// scan order as the cluster delivers it. The cluster does not promise a
    /// stable scan order across runs, so a deterministic keep choice requires
    /// sorting upstream.
    pub async fn run_once(&self) -> Result<RunReport, DedupError> {
        let index = self.settings.index.as_str();
        let dry_run = self.settings.dry_run;

        let mut scan = self.client.scan(index);
        let outcome = detect(&mut scan, &self.settings.comparison_field).await?;
        info!("found '{}' documents inside '{index}' index", outcome.scanned);
        info!("found '{}' duplicated documents", outcome.duplicates.len());

        let scanned = outcome.scanned;
        let duplicates = outcome.duplicates.len() as u64;
        let actions = build_actions(outcome, index)?;

        if actions.is_empty() {
            info!("no duplicates found in '{index}'");
            return Ok(RunReport {
                scanned,
                duplicates,
                removed: 0,
                dry_run,
            });
        }

        let report = execute(&self.client, actions, index, dry_run).await?;
        let removed = match report {
            ExecutionReport::DryRun { .. } => 0,
            ExecutionReport::Applied { deleted } => deleted as u64,
        };

        Ok(RunReport {
            scanned,
            duplicates,
            removed,
            dry_run,
        })
    }
}
