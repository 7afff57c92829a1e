use tracing::{info, warn};
use uuid::Uuid;

use super::ComputationOrchestrator;
use crate::domain::ComputationType;
use crate::error::StudyResult;

impl ComputationOrchestrator {
    /// Number of records holding a result of `computation`
    pub fn count_results(&self, computation: ComputationType) -> usize {
        self.repos.root_networks.entries_with_result(computation).len()
    }

    /// Deletes every result of `computation` remotely, then empties the slots
    /// still holding the deleted ids. Report deletion is best effort. A dry
    /// run only counts.
    pub async fn delete_all_results(&self, computation: ComputationType, dry_run: bool) -> StudyResult<usize> {
        let entries = self.repos.root_networks.entries_with_result(computation);
        if dry_run || entries.is_empty() {
            return Ok(entries.len());
        }
        let result_ids: Vec<Uuid> = entries.iter().map(|(_, run)| run.result_id).collect();
        let report_ids: Vec<Uuid> = entries.iter().filter_map(|(_, run)| run.report_id).collect();

        self.engines
            .get(computation)?
            .delete_results(&result_ids)
            .await?;

        let cleared = entries
            .iter()
            .filter(|((node_id, rn), run)| {
                self.repos
                    .root_networks
                    .clear_if_matches(*node_id, *rn, computation, run.result_id)
            })
            .count();
        if let Err(error) = self.reports.delete_reports(&report_ids).await {
            warn!(computation = %computation, reports = report_ids.len(), %error, "supervision reports not deleted");
        }
        info!(computation = %computation, deleted = result_ids.len(), cleared, "supervision cleanup");
        Ok(result_ids.len())
    }
}
