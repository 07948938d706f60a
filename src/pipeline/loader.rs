use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::apis::{EventSearch, SearchCriteria};
use crate::domain::EventRow;
use crate::error::Result;
use crate::pipeline::normalize::to_storage_row;
use crate::pipeline::upsert::{upsert_events, UpsertSummary};
use crate::storage::EventStore;

/// Outcome of a multi-page load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub pages: u32,
    /// Raw records received
    pub fetched: usize,
    /// Records dropped by the normalizer
    pub skipped: usize,
    pub summary: UpsertSummary,
}

/// Pulls pages from a remote search into the store
pub struct EventLoader {
    search: Arc<dyn EventSearch>,
    store: Arc<dyn EventStore>,
}

impl EventLoader {
    pub fn new(search: Arc<dyn EventSearch>, store: Arc<dyn EventStore>) -> Self {
        Self { search, store }
    }

    /// Fetch pages starting at 0 until a page comes back empty, the remote
    /// reports the last page, or `max_pages` pages have been read. Each page is
    /// written before the next one is requested, so a remote failure keeps
    /// whatever was already stored.
    #[instrument(skip(self, criteria), fields(source = self.search.source_name()))]
    pub async fn load(&self, criteria: &SearchCriteria, max_pages: u32) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for page_number in 0..max_pages {
            let page = self.search.search(&criteria.with_page(page_number)).await?;
            report.pages += 1;

            if page.events.is_empty() {
                info!(page = page_number, "Empty page, stopping");
                break;
            }
            report.fetched += page.events.len();

            let mut rows: Vec<EventRow> = Vec::with_capacity(page.events.len());
            for raw in &page.events {
                match to_storage_row(raw) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        warn!(page = page_number, "Skipping event: {}", e);
                        report.skipped += 1;
                    }
                }
            }

            let summary = upsert_events(self.store.as_ref(), &rows).await;
            report.summary.merge(summary);

            if page.page.is_last() {
                break;
            }
        }

        info!(
            pages = report.pages,
            fetched = report.fetched,
            skipped = report.skipped,
            written = report.summary.written(),
            "Load complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{PageInfo, RawEventPage};
    use crate::error::EventsError;
    use crate::storage::SqliteEventStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves canned pages by index; an index past the end fails
    struct ScriptedSearch {
        pages: Vec<RawEventPage>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSearch {
        fn new(pages: Vec<RawEventPage>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EventSearch for ScriptedSearch {
        fn source_name(&self) -> &'static str {
            "scripted"
        }

        async fn search(&self, criteria: &SearchCriteria) -> Result<RawEventPage> {
            self.requested.lock().unwrap().push(criteria.page);
            self.pages
                .get(criteria.page as usize)
                .cloned()
                .ok_or_else(|| EventsError::RemoteFetch {
                    message: "HTTP 500: upstream".into(),
                })
        }
    }

    fn page(ids: &[&str], number: u64, total_pages: u64) -> RawEventPage {
        RawEventPage {
            events: ids
                .iter()
                .map(|id| json!({"id": id, "name": format!("Event {id}")}))
                .collect(),
            page: PageInfo {
                total_elements: 0,
                total_pages,
                number,
                size: ids.len() as u64,
            },
        }
    }

    fn loader(search: Arc<ScriptedSearch>) -> (EventLoader, Arc<SqliteEventStore>) {
        let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
        (EventLoader::new(search, store.clone()), store)
    }

    #[tokio::test]
    async fn test_stops_at_last_page() {
        let search = Arc::new(ScriptedSearch::new(vec![
            page(&["A", "B"], 0, 2),
            page(&["C"], 1, 2),
        ]));
        let (loader, store) = loader(search.clone());

        let report = loader.load(&SearchCriteria::default(), 5).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.summary.inserted, 3);
        assert_eq!(*search.requested.lock().unwrap(), vec![0, 1]);
        assert_eq!(store.total_rows().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_respects_max_pages() {
        let search = Arc::new(ScriptedSearch::new(vec![
            page(&["A"], 0, 10),
            page(&["B"], 1, 10),
            page(&["C"], 2, 10),
        ]));
        let (loader, _store) = loader(search.clone());

        let report = loader.load(&SearchCriteria::default(), 2).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(*search.requested.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let search = Arc::new(ScriptedSearch::new(vec![page(&[], 0, 3)]));
        let (loader, _store) = loader(search);

        let report = loader.load(&SearchCriteria::default(), 5).await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.summary.written(), 0);
    }

    #[tokio::test]
    async fn test_malformed_records_skipped() {
        let mut first = page(&["A"], 0, 1);
        first.events.push(json!({"name": "no id"}));
        first.events.push(json!({"id": "  "}));
        let (loader, store) = loader(Arc::new(ScriptedSearch::new(vec![first])));

        let report = loader.load(&SearchCriteria::default(), 5).await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.total_rows().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_written_pages() {
        // Only page 0 is scripted while the remote claims three pages
        let search = Arc::new(ScriptedSearch::new(vec![page(&["A", "B"], 0, 3)]));
        let (loader, store) = loader(search);

        let result = loader.load(&SearchCriteria::default(), 5).await;
        assert!(matches!(result, Err(EventsError::RemoteFetch { .. })));
        assert_eq!(store.total_rows().unwrap(), 2);
    }
}
