use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{EventRow, UpsertOutcome};
use crate::storage::EventStore;

/// Result of writing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl UpsertSummary {
    /// Rows successfully written
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Write every row, keyed by id. A row that fails is logged and skipped; the
/// rest of the batch still goes through.
pub async fn upsert_events(store: &dyn EventStore, rows: &[EventRow]) -> UpsertSummary {
    let mut summary = UpsertSummary::default();

    for row in rows {
        match store.upsert_event(row).await {
            Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                warn!(event_id = %row.id, "Skipping event after failed write: {}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        failed = summary.failed,
        "Upserted {} of {} events",
        summary.written(),
        rows.len()
    );
    summary
}
