use crate::apis::EventSearch;
use crate::common::json_path::{array_at, lookup};
use crate::config::TicketmasterConfig;
use crate::constants::MAX_PAGE_SIZE;
use crate::pipeline::filter::clamp_days_ahead;
use crate::error::{EventsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const UTC_QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Query parameters for one page of the Discovery event search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub keyword: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    /// "latitude,longitude"
    pub lat_long: Option<String>,
    pub radius: Option<u32>,
    pub unit: String,
    pub classification_names: Vec<String>,
    pub start_date_time: Option<DateTime<Utc>>,
    pub end_date_time: Option<DateTime<Utc>>,
    pub size: u32,
    pub page: u32,
    pub sort: String,
    pub locale: String,
    pub include_tba: bool,
    pub include_tbd: bool,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            keyword: None,
            country_code: None,
            city: None,
            lat_long: None,
            radius: None,
            unit: "km".to_string(),
            classification_names: Vec::new(),
            start_date_time: None,
            end_date_time: None,
            size: 20,
            page: 0,
            sort: "relevance,desc".to_string(),
            locale: "en".to_string(),
            include_tba: false,
            include_tbd: false,
        }
    }
}

impl SearchCriteria {
    /// The batch-load search configured for this deployment: an area around
    /// `lat_long` over the next `days_ahead` days (clamped like the listing window)
    pub fn from_config(config: &TicketmasterConfig, now: DateTime<Utc>, days_ahead: i64) -> Self {
        let end = now
            .checked_add_signed(chrono::Duration::days(clamp_days_ahead(days_ahead)))
            .unwrap_or(now);
        Self {
            lat_long: Some(config.lat_long.clone()),
            radius: Some(config.radius),
            unit: config.unit.clone(),
            start_date_time: Some(now),
            end_date_time: Some(end),
            size: config.page_size,
            sort: config.sort.clone(),
            locale: config.locale.clone(),
            ..Self::default()
        }
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Size actually requested; the remote API rejects anything above 200
    pub fn effective_size(&self) -> u32 {
        self.size.min(MAX_PAGE_SIZE)
    }

    /// Query string pairs, without the API key. List values repeat their key.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let yes_no = |flag: bool| (if flag { "yes" } else { "no" }).to_string();

        let mut pairs = vec![
            ("size", self.effective_size().to_string()),
            ("page", self.page.to_string()),
            ("sort", self.sort.clone()),
            ("locale", self.locale.clone()),
            ("includeTBA", yes_no(self.include_tba)),
            ("includeTBD", yes_no(self.include_tbd)),
            ("unit", self.unit.clone()),
        ];

        let optional = [
            ("keyword", self.keyword.clone()),
            ("countryCode", self.country_code.clone()),
            ("city", self.city.clone()),
            ("latlong", self.lat_long.clone()),
            ("radius", self.radius.map(|r| r.to_string())),
            (
                "startDateTime",
                self.start_date_time
                    .map(|dt| dt.format(UTC_QUERY_FORMAT).to_string()),
            ),
            (
                "endDateTime",
                self.end_date_time
                    .map(|dt| dt.format(UTC_QUERY_FORMAT).to_string()),
            ),
        ];
        pairs.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v))),
        );

        pairs.extend(
            self.classification_names
                .iter()
                .filter(|name| !name.trim().is_empty())
                .map(|name| ("classificationName", name.trim().to_string())),
        );
        pairs
    }
}

/// Paging metadata reported by the remote search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub total_elements: u64,
    pub total_pages: u64,
    pub number: u64,
    pub size: u64,
}

impl PageInfo {
    pub fn is_last(&self) -> bool {
        self.number + 1 >= self.total_pages
    }
}

/// One page of raw event records as received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEventPage {
    pub events: Vec<Value>,
    pub page: PageInfo,
}

impl RawEventPage {
    /// Pull `_embedded.events` and `page` out of a search response. Missing
    /// sections read as an empty page.
    pub fn from_json(payload: &Value) -> Self {
        let events = array_at(payload, &["_embedded", "events"]).to_vec();
        let page = match lookup(payload, &["page"]) {
            Some(page) => serde_json::from_value(page.clone()).unwrap_or_else(|e| {
                warn!("Ignoring unreadable page info: {}", e);
                PageInfo::default()
            }),
            None => PageInfo::default(),
        };
        Self { events, page }
    }
}

/// Discovery API client
pub struct TicketmasterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TicketmasterClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &TicketmasterConfig, api_key: &str) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[async_trait]
impl EventSearch for TicketmasterClient {
    fn source_name(&self) -> &'static str {
        "ticketmaster"
    }

    #[instrument(skip(self, criteria), fields(page = criteria.page, size = criteria.effective_size()))]
    async fn search(&self, criteria: &SearchCriteria) -> Result<RawEventPage> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(&criteria.to_query_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(EventsError::RemoteFetch {
                message: format!("HTTP {status}: {snippet}"),
            });
        }

        let bytes = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes).map_err(|e| EventsError::RemoteFetch {
            message: format!("invalid JSON in search response: {e}"),
        })?;

        let page = RawEventPage::from_json(&payload);
        debug!(
            events = page.events.len(),
            total_elements = page.page.total_elements,
            "Fetched search page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TicketmasterClient {
        TicketmasterClient::new(
            "test-key",
            format!("{}/discovery/v2/events.json", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_query_pairs() {
        let criteria = SearchCriteria {
            keyword: Some("jazz".into()),
            country_code: Some("CZ".into()),
            city: Some(String::new()),
            classification_names: vec!["music".into(), " sports ".into()],
            start_date_time: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
            size: 500,
            include_tba: true,
            ..SearchCriteria::default()
        };
        let pairs = criteria.to_query_pairs();
        let get = |key: &str| -> Vec<&str> {
            pairs
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .collect()
        };

        assert_eq!(get("size"), vec!["200"]);
        assert_eq!(get("keyword"), vec!["jazz"]);
        assert_eq!(get("countryCode"), vec!["CZ"]);
        assert!(get("city").is_empty());
        assert!(get("latlong").is_empty());
        assert_eq!(get("classificationName"), vec!["music", "sports"]);
        assert_eq!(get("startDateTime"), vec!["2025-06-01T00:00:00Z"]);
        assert_eq!(get("includeTBA"), vec!["yes"]);
        assert_eq!(get("includeTBD"), vec!["no"]);
    }

    #[test]
    fn test_page_from_json() {
        let page = RawEventPage::from_json(&json!({
            "_embedded": {"events": [{"id": "A"}, {"id": "B"}]},
            "page": {"size": 2, "totalElements": 3, "totalPages": 2, "number": 0}
        }));
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.page.total_elements, 3);
        assert!(!page.page.is_last());

        let empty = RawEventPage::from_json(&json!({"page": {"totalElements": 0}}));
        assert!(empty.events.is_empty());
        assert!(empty.page.is_last());
    }

    #[tokio::test]
    async fn test_search_sends_key_and_criteria() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/discovery/v2/events.json"))
            .and(query_param("apikey", "test-key"))
            .and(query_param("keyword", "rock"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"events": [{"id": "E1", "name": "Rock Night"}]},
                "page": {"size": 20, "totalElements": 21, "totalPages": 2, "number": 1}
            })))
            .mount(&server)
            .await;

        let criteria = SearchCriteria {
            keyword: Some("rock".into()),
            page: 1,
            ..SearchCriteria::default()
        };
        let page = client_for(&server).search(&criteria).await.unwrap();
        assert_eq!(page.events[0]["id"], "E1");
        assert!(page.page.is_last());
    }

    #[tokio::test]
    async fn test_non_success_status_is_remote_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/discovery/v2/events.json"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid ApiKey"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search(&SearchCriteria::default())
            .await
            .unwrap_err();
        match err {
            EventsError::RemoteFetch { message } => {
                assert!(message.contains("401"));
                assert!(message.contains("Invalid ApiKey"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_json_is_remote_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/discovery/v2/events.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).search(&SearchCriteria::default()).await;
        assert!(matches!(result, Err(EventsError::RemoteFetch { .. })));
    }

    #[tokio::test]
    async fn test_no_embedded_section_is_empty_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": {"size": 20, "totalElements": 0, "totalPages": 0, "number": 0}
            })))
            .mount(&server)
            .await;

        let page = client_for(&server)
            .search(&SearchCriteria::default())
            .await
            .unwrap();
        assert!(page.events.is_empty());
    }

    #[test]
    fn test_config_search_window_is_capped() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let criteria = SearchCriteria::from_config(&TicketmasterConfig::default(), now, 100_000_000_000);
        let span = criteria.end_date_time.unwrap() - now;
        assert_eq!(span.num_days(), crate::constants::MAX_DAYS_AHEAD);
        assert!(criteria.lat_long.is_some());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"page": {"totalElements": 0}}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = TicketmasterClient::new(
            "test-key",
            format!("{}/discovery/v2/events.json", server.uri()),
            Duration::from_millis(50),
        )
        .unwrap();

        match client.search(&SearchCriteria::default()).await.unwrap_err() {
            EventsError::RemoteFetch { message } => assert!(message.contains("timed out"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
