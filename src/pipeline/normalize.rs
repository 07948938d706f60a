use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::common::json_path::{array_at, lookup_str, lookup_string};
use crate::domain::{Event, EventPreview, EventRow, Image, LocalTime, PriceRange};
use crate::error::{EventsError, Result};
use crate::pipeline::extract::{extract_classification, extract_venue};

/// Map one raw ticketing record into the canonical (response-mode) event.
///
/// The identifier is the only thing that can fail; every other field degrades
/// to `None` or an empty list.
pub fn normalize_event(raw: &Value) -> Result<Event> {
    let id = lookup_str(raw, &["id"])
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| EventsError::MalformedRecord("event has no id".to_string()))?;

    Ok(Event {
        id: id.to_string(),
        name: lookup_string(raw, &["name"]),
        url: lookup_string(raw, &["url"]),
        date: lookup_str(raw, &["dates", "start", "localDate"]).and_then(parse_date),
        time: lookup_str(raw, &["dates", "start", "localTime"]).and_then(parse_time),
        datetime: lookup_str(raw, &["dates", "start", "dateTime"]).and_then(parse_datetime),
        timezone: lookup_string(raw, &["dates", "timezone"]),
        status: lookup_string(raw, &["dates", "status", "code"]),
        venue: extract_venue(raw),
        classification: extract_classification(raw),
        price_ranges: array_at(raw, &["priceRanges"]).iter().cloned().map(PriceRange).collect(),
        images: array_at(raw, &["images"]).iter().cloned().map(Image).collect(),
        info: lookup_string(raw, &["info"]),
        please_note: lookup_string(raw, &["pleaseNote"]),
    })
}

/// Normalize straight to the storage-mode row
pub fn to_storage_row(raw: &Value) -> Result<EventRow> {
    normalize_event(raw).map(|event| EventRow::from(&event))
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        let venue = event.venue.clone().unwrap_or_default();
        let classification = event.classification.clone().unwrap_or_default();

        EventRow {
            id: event.id.clone(),
            name: event.name.clone(),
            url: event.url.clone(),
            date: event.date,
            time: event.time,
            datetime: event.datetime,
            timezone: event.timezone.clone(),
            status: event.status.clone(),
            venue_id: venue.id,
            venue_name: venue.name,
            venue_address: venue.address,
            venue_city: venue.city,
            venue_state: venue.state,
            venue_country: venue.country,
            venue_country_code: venue.country_code,
            venue_postal_code: venue.postal_code,
            venue_timezone: venue.timezone,
            venue_location: venue
                .location
                .map(|location| location.to_string())
                .unwrap_or_else(|| "{}".to_string()),
            classification_segment: classification.segment,
            classification_genre: classification.genre,
            classification_subgenre: classification.subgenre,
            classification_type: classification.kind,
            classification_subtype: classification.subtype,
            classification_family: classification.family,
            price_ranges: encode_items(&event.price_ranges),
            images: encode_items(&event.images),
            info: event.info.clone(),
            please_note: event.please_note.clone(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<&Event> for EventPreview {
    fn from(event: &Event) -> Self {
        EventPreview {
            id: event.id.clone(),
            name: event.name.clone(),
            date: event.date,
            time: event.time,
            venue_name: event.venue.as_ref().and_then(|v| v.name.clone()),
            classification_segment: event
                .classification
                .as_ref()
                .and_then(|c| c.segment.clone()),
            url: event.url.clone(),
            image_url: event.images.iter().find_map(|image| image.url()).map(str::to_string),
        }
    }
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| debug!("Unparseable date '{}': {}", value, e))
        .ok()
}

pub(crate) fn parse_time(value: &str) -> Option<LocalTime> {
    let parsed = LocalTime::parse(value);
    if parsed.is_none() {
        debug!("Unparseable time '{}'", value);
    }
    parsed
}

pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map_err(|e| debug!("Unparseable timestamp '{}': {}", value, e))
        .ok()
}

fn encode_items<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
