use serde::Serialize;
use tracing::{info, warn};

use crate::dedup::DedupOutcome;
use crate::error::{AggregatedBulkError, AggregatedExtractionError, DedupError};
use crate::index::IndexClient;

/// The only operation this job ever applies to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOp {
    Delete,
}

/// One scheduled deletion. Serializable both for the bulk request and for the
/// dry-run audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAction {
    #[serde(rename = "_op_type")]
    pub op: BulkOp,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
}

impl DeleteAction {
    pub fn new(index: &str, id: impl Into<String>) -> Self {
        Self {
            op: BulkOp::Delete,
            index: index.to_string(),
            id: id.into(),
        }
    }
}

/// Turn a finished scan into delete actions, one per duplicate.
///
/// Fails with the aggregated extraction error if any document could not be
/// classified; by then the whole scan has completed, so the error carries
/// every malformed document at once.
pub fn build_actions(
    outcome: DedupOutcome,
    index: &str,
) -> Result<Vec<DeleteAction>, AggregatedExtractionError> {
    if !outcome.failures.is_empty() {
        return Err(AggregatedExtractionError {
            failures: outcome.failures,
        });
    }

    Ok(outcome
        .duplicates
        .into_iter()
        .map(|id| DeleteAction::new(index, id))
        .collect())
}

/// What `execute` did with the actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionReport {
    /// Nothing was sent to the cluster; `actions` deletions were reported.
    DryRun { actions: usize },
    /// The batch was applied and the index refreshed.
    Applied { deleted: usize },
}

/// Apply the delete actions, or report them without applying in dry-run mode.
///
/// In the live path the refresh runs before per-action failures are raised,
/// so the deletions that did succeed are already visible to readers when the
/// error surfaces.
pub async fn execute(
    client: &IndexClient,
    actions: Vec<DeleteAction>,
    index: &str,
    dry_run: bool,
) -> Result<ExecutionReport, DedupError> {
    if dry_run {
        info!("dry run, bulk actions:");
        for action in &actions {
            match serde_json::to_string_pretty(action) {
                Ok(rendered) => info!("{rendered}"),
                Err(error) => warn!(
                    "could not render the action for document '{}': {error}",
                    action.id
                ),
            }
        }
        return Ok(ExecutionReport::DryRun {
            actions: actions.len(),
        });
    }

    let failures = client.bulk_delete(index, &actions).await?;
    info!("removed '{}' duplicates from '{index}'", actions.len());

    client.refresh(index).await?;

    if !failures.is_empty() {
        return Err(AggregatedBulkError {
            attempted: actions.len(),
            failures,
        }
        .into());
    }

    Ok(ExecutionReport::Applied {
        deleted: actions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{ExtractionFailure, MissingKeyError};

    fn failure(id: &str) -> ExtractionFailure {
        ExtractionFailure {
            document_id: id.to_string(),
            path: "job.build_id".to_string(),
            error: MissingKeyError::Missing {
                segment: "build_id".to_string(),
            },
        }
    }

    #[test]
    fn build_actions_maps_each_duplicate_to_a_delete() {
        let outcome = DedupOutcome {
            duplicates: vec!["3".to_string(), "4".to_string()],
            failures: vec![],
            scanned: 4,
        };

        let actions = build_actions(outcome, "jobs").unwrap();

        assert_eq!(
            actions,
            vec![DeleteAction::new("jobs", "3"), DeleteAction::new("jobs", "4")]
        );
    }

    #[test]
    fn build_actions_returns_nothing_for_a_clean_scan() {
        let outcome = DedupOutcome {
            duplicates: vec![],
            failures: vec![],
            scanned: 2,
        };

        assert!(build_actions(outcome, "jobs").unwrap().is_empty());
    }

    #[test]
    fn build_actions_aggregates_extraction_failures() {
        let outcome = DedupOutcome {
            duplicates: vec!["3".to_string()],
            failures: vec![failure("2"), failure("5")],
            scanned: 5,
        };

        let error = build_actions(outcome, "jobs").unwrap_err();

        assert_eq!(error.failures.len(), 2);
        assert_eq!(error.failures[0].document_id, "2");
    }

    #[test]
    fn build_actions_fails_even_when_no_duplicates_were_found() {
        let outcome = DedupOutcome {
            duplicates: vec![],
            failures: vec![failure("2")],
            scanned: 3,
        };

        assert!(build_actions(outcome, "jobs").is_err());
    }

    #[test]
    fn delete_actions_serialize_in_the_audit_shape() {
        let action = DeleteAction::new("jobs", "42");
        let rendered = serde_json::to_string(&action).unwrap();

        assert_eq!(
            rendered,
            r#"{"_op_type":"delete","_index":"jobs","_id":"42"}"#
        );
    }
}
