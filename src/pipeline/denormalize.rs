use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::{Classification, Event, EventRow, Image, PriceRange, Venue};

impl From<EventRow> for Event {
    /// Rebuild the response shape from a stored row.
    ///
    /// The venue is re-embedded only when `venue_name` is present and the
    /// classification only when `classification_segment` is present. Text
    /// columns that fail to decode fall back to empty values.
    fn from(row: EventRow) -> Self {
        let venue = row.venue_name.clone().map(|name| Venue {
            id: row.venue_id.clone(),
            name: Some(name),
            address: row.venue_address.clone(),
            city: row.venue_city.clone(),
            state: row.venue_state.clone(),
            country: row.venue_country.clone(),
            country_code: row.venue_country_code.clone(),
            postal_code: row.venue_postal_code.clone(),
            timezone: row.venue_timezone.clone(),
            location: decode_location(&row.id, &row.venue_location),
        });

        let classification = row.classification_segment.clone().map(|segment| Classification {
            segment: Some(segment),
            genre: row.classification_genre.clone(),
            subgenre: row.classification_subgenre.clone(),
            kind: row.classification_type.clone(),
            subtype: row.classification_subtype.clone(),
            family: row.classification_family,
        });

        let price_ranges = decode_list::<PriceRange>(&row.id, "price_ranges", &row.price_ranges);
        let images = decode_list::<Image>(&row.id, "images", &row.images);

        Event {
            id: row.id,
            name: row.name,
            url: row.url,
            date: row.date,
            time: row.time,
            datetime: row.datetime,
            timezone: row.timezone,
            status: row.status,
            venue,
            classification,
            price_ranges,
            images,
            info: row.info,
            please_note: row.please_note,
        }
    }
}

fn decode_list<T: DeserializeOwned>(event_id: &str, column: &str, text: &str) -> Vec<T> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<T>>(text) {
        Ok(items) => items,
        Err(e) => {
            warn!(event_id, column, "Undecodable stored column, using []: {}", e);
            Vec::new()
        }
    }
}

/// `{}` and `null` are stored for "no location" and decode back to `None`
fn decode_location(event_id: &str, text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => None,
        Ok(Value::Object(map)) if map.is_empty() => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event_id, "Undecodable venue_location, dropping it: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::{normalize_event, to_storage_row};
    use chrono::NaiveDate;
    use serde_json::json;

    fn stored_row() -> EventRow {
        to_storage_row(&json!({
            "id": "E10",
            "name": "Prague Jazz Festival",
            "dates": {"start": {"localDate": "2025-10-05", "localTime": "18:00:00"}},
            "_embedded": {"venues": [{
                "name": "Rudolfinum",
                "city": {"name": "Prague"},
                "location": {"longitude": "14.41", "latitude": "50.09"}
            }]},
            "classifications": [{"segment": {"name": "Music"}, "family": true}],
            "priceRanges": [
                {"type": "standard", "currency": "CZK", "min": 450.0, "max": 900.0},
                {"type": "vip", "currency": "CZK", "min": 2000.0, "max": 2000.0, "note": "lounge"}
            ],
            "images": [{"url": "https://img/a.jpg", "ratio": "16_9", "width": 1024, "height": 576, "fallback": false}]
        }))
        .unwrap()
    }

    #[test]
    fn test_round_trip_matches_response_mode() {
        let row = stored_row();
        let event = Event::from(row);

        assert_eq!(event.id, "E10");
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 10, 5));
        assert_eq!(event.venue.as_ref().unwrap().name.as_deref(), Some("Rudolfinum"));
        assert_eq!(
            event.venue.as_ref().unwrap().location,
            Some(json!({"longitude": "14.41", "latitude": "50.09"}))
        );
        let classification = event.classification.unwrap();
        assert_eq!(classification.segment.as_deref(), Some("Music"));
        assert!(classification.family);
    }

    #[test]
    fn test_price_ranges_round_trip_in_order() {
        let row = stored_row();
        let event = Event::from(row.clone());

        assert_eq!(event.price_ranges.len(), 2);
        assert_eq!(event.price_ranges[0].field("type"), Some(&json!("standard")));
        assert_eq!(event.price_ranges[1].field("note"), Some(&json!("lounge")));
        assert_eq!(event.images[0].field("width"), Some(&json!(1024)));

        // re-encoding reproduces the stored text
        let again = EventRow::from(&event);
        assert_eq!(again.price_ranges, row.price_ranges);
        assert_eq!(again.images, row.images);
    }

    #[test]
    fn test_no_venue_means_no_reconstruction() {
        let row = to_storage_row(&json!({"id": "E11", "name": "Nowhere"})).unwrap();
        let event = Event::from(row);
        assert!(event.venue.is_none());
        assert!(event.classification.is_none());
    }

    #[test]
    fn test_venue_name_is_presence_sentinel() {
        let mut row = stored_row();
        row.venue_name = None;
        row.classification_segment = None;
        let event = Event::from(row);
        assert!(event.venue.is_none());
        assert!(event.classification.is_none());
    }

    #[test]
    fn test_malformed_price_ranges_decode_to_empty() {
        let mut row = stored_row();
        row.price_ranges = "{not json".to_string();
        row.images = String::new();
        row.venue_location = "garbage".to_string();

        let event = Event::from(row);
        assert!(event.price_ranges.is_empty());
        assert!(event.images.is_empty());
        assert!(event.venue.as_ref().unwrap().location.is_none());
        // the rest of the row is intact
        assert_eq!(event.name.as_deref(), Some("Prague Jazz Festival"));
        assert_eq!(event.venue.unwrap().city.as_deref(), Some("Prague"));
    }

    #[test]
    fn test_matches_direct_normalization() {
        let raw = json!({
            "id": "E12",
            "name": "Opera Gala",
            "dates": {"start": {"localDate": "2025-12-31"}},
            "_embedded": {"venues": [{"name": "State Opera"}]},
            "classifications": [{"segment": {"name": "Arts & Theatre"}}]
        });
        let direct = normalize_event(&raw).unwrap();
        let stored = Event::from(to_storage_row(&raw).unwrap());
        assert_eq!(direct, stored);
    }
}
