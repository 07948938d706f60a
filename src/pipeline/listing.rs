use serde::Serialize;
use tracing::debug;

use crate::domain::Event;
use crate::error::Result;
use crate::pipeline::filter::{EventFilter, FilterPlan, Pagination};
use crate::storage::EventStore;

/// One page of stored events plus its pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct EventListing {
    pub events: Vec<Event>,
    pub pagination: Pagination,
}

/// Run the filter against the store and reshape the rows for the response.
///
/// Any store failure fails the whole listing; no partial page is returned.
pub async fn list_events(store: &dyn EventStore, filter: &EventFilter) -> Result<EventListing> {
    let plan = FilterPlan::from_filter(filter);
    debug!(?plan, "Listing events");

    let rows = store.query(&plan).await?;
    let total_count = store.count(&plan).await?;

    let events: Vec<Event> = rows.into_iter().map(Event::from).collect();
    let pagination = Pagination::new(total_count, plan.page, events.len());

    Ok(EventListing { events, pagination })
}
