pub mod ticketmaster;

use crate::error::Result;
use async_trait::async_trait;

pub use ticketmaster::{PageInfo, RawEventPage, SearchCriteria, TicketmasterClient};

/// A remote source of raw ticketing event records
#[async_trait]
pub trait EventSearch: Send + Sync {
    /// Short identifier used in logs
    fn source_name(&self) -> &'static str;

    /// Fetch a single page of results for the criteria
    async fn search(&self, criteria: &SearchCriteria) -> Result<RawEventPage>;
}
