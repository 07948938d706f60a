use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::common::json_path::{lookup, lookup_str};

/// Canonical event, in the shape served to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<LocalTime>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub venue: Option<Venue>,
    pub classification: Option<Classification>,
    #[serde(default)]
    pub price_ranges: Vec<PriceRange>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub info: Option<String>,
    pub please_note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,
    /// Latitude/longitude pair exactly as the source sent it
    pub location: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub segment: Option<String>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    #[serde(default)]
    pub family: bool,
}

/// One price band exactly as the source sent it (`type`, `currency`, `min`,
/// `max` and whatever else). Kept as raw JSON so numbers and unknown keys
/// survive storage untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceRange(pub Value);

impl PriceRange {
    pub fn field(&self, key: &str) -> Option<&Value> {
        lookup(&self.0, &[key])
    }
}

/// One image descriptor exactly as the source sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Image(pub Value);

impl Image {
    pub fn field(&self, key: &str) -> Option<&Value> {
        lookup(&self.0, &[key])
    }

    pub fn url(&self) -> Option<&str> {
        lookup_str(&self.0, &["url"])
    }
}

/// Local start time. Remembers whether the source gave seconds, so `20:00`
/// is served back as `20:00` and `19:30:00` as `19:30:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTime {
    time: NaiveTime,
    with_seconds: bool,
}

impl LocalTime {
    /// Accepts `HH:MM:SS` or `HH:MM`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(time) = NaiveTime::parse_from_str(text, "%H:%M:%S") {
            return Some(Self {
                time,
                with_seconds: true,
            });
        }
        NaiveTime::parse_from_str(text, "%H:%M")
            .ok()
            .map(|time| Self {
                time,
                with_seconds: false,
            })
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.with_seconds {
            write!(f, "{}", self.time.format("%H:%M:%S"))
        } else {
            write!(f, "{}", self.time.format("%H:%M"))
        }
    }
}

impl Serialize for LocalTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        LocalTime::parse(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid local time '{text}'")))
    }
}

/// Storage-mode event: venue and classification flattened into sibling columns,
/// complex fields serialized to JSON text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRow {
    pub id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<LocalTime>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub venue_id: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub venue_city: Option<String>,
    pub venue_state: Option<String>,
    pub venue_country: Option<String>,
    pub venue_country_code: Option<String>,
    pub venue_postal_code: Option<String>,
    pub venue_timezone: Option<String>,
    pub venue_location: String,
    pub classification_segment: Option<String>,
    pub classification_genre: Option<String>,
    pub classification_subgenre: Option<String>,
    pub classification_type: Option<String>,
    pub classification_subtype: Option<String>,
    pub classification_family: bool,
    pub price_ranges: String,
    pub images: String,
    pub info: Option<String>,
    pub please_note: Option<String>,
    /// Set by the store
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reduced projection used by list-preview endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPreview {
    pub id: String,
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<LocalTime>,
    pub venue_name: Option<String>,
    pub classification_segment: Option<String>,
    pub url: Option<String>,
    /// First image, if any
    pub image_url: Option<String>,
}

/// Per-row result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
