pub mod sqlite;

use crate::domain::{EventRow, UpsertOutcome};
use crate::error::Result;
use crate::pipeline::filter::FilterPlan;
use async_trait::async_trait;

pub use sqlite::SqliteEventStore;

/// Storage trait for flattened event rows
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert the row, or refresh the mutable columns of an existing row with the same id
    async fn upsert_event(&self, row: &EventRow) -> Result<UpsertOutcome>;

    /// Rows matching the plan, ordered and paged as the plan says
    async fn query(&self, plan: &FilterPlan) -> Result<Vec<EventRow>>;

    /// Total rows matching the plan's predicates, ignoring paging
    async fn count(&self, plan: &FilterPlan) -> Result<u64>;

    /// Administrative drop of a whole table. `false` if the table is unknown or absent.
    async fn drop_table(&self, name: &str) -> Result<bool>;
}
