use serde_json::Value;

use crate::common::json_path::{first_in, lookup, lookup_bool, lookup_string};
use crate::domain::{Classification, Venue};

/// Pull the first listed venue out of a raw event.
///
/// Only `_embedded.venues[0]` is considered; further venues are ignored. Every
/// sub-field is optional, and a missing or mistyped venue list is absence.
pub fn extract_venue(raw: &Value) -> Option<Venue> {
    let venue = first_in(raw, &["_embedded", "venues"]).filter(|v| v.is_object())?;

    Some(Venue {
        id: lookup_string(venue, &["id"]),
        name: lookup_string(venue, &["name"]),
        address: lookup_string(venue, &["address", "line1"]),
        city: lookup_string(venue, &["city", "name"]),
        state: lookup_string(venue, &["state", "name"]),
        country: lookup_string(venue, &["country", "name"]),
        country_code: lookup_string(venue, &["country", "countryCode"]),
        postal_code: lookup_string(venue, &["postalCode"]),
        timezone: lookup_string(venue, &["timezone"]),
        location: lookup(venue, &["location"]).cloned(),
    })
}

/// Pull the first listed classification out of a raw event. `family` defaults to false.
pub fn extract_classification(raw: &Value) -> Option<Classification> {
    let classification = first_in(raw, &["classifications"]).filter(|c| c.is_object())?;

    Some(Classification {
        segment: lookup_string(classification, &["segment", "name"]),
        genre: lookup_string(classification, &["genre", "name"]),
        subgenre: lookup_string(classification, &["subGenre", "name"]),
        kind: lookup_string(classification, &["type", "name"]),
        subtype: lookup_string(classification, &["subType", "name"]),
        family: lookup_bool(classification, &["family"]).unwrap_or(false),
    })
}
