use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ALL_CLASSIFICATIONS, DEFAULT_DAYS_AHEAD, DEFAULT_PAGE_SIZE, MAX_DAYS_AHEAD, MAX_PAGE_SIZE,
};

/// Criteria a caller may filter stored events by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Inclusive lower bound
    pub date_from: NaiveDate,
    /// Inclusive upper bound
    pub date_to: NaiveDate,
    pub city: Option<String>,
    pub country: Option<String>,
    /// Segment names; empty or containing "all" means unfiltered
    pub classifications: Vec<String>,
    pub keyword: Option<String>,
    pub page_size: u32,
    pub page: u32,
}

impl EventFilter {
    /// `[today, today + days_ahead]` with every other criterion unset.
    /// `days_ahead` is clamped to `0..=MAX_DAYS_AHEAD`.
    pub fn upcoming(today: NaiveDate, days_ahead: i64) -> Self {
        let horizon = today
            .checked_add_signed(Duration::days(clamp_days_ahead(days_ahead)))
            .unwrap_or(NaiveDate::MAX);
        Self::between(today, horizon)
    }

    /// Today only: the half-open `[midnight, +1 day)` window as inclusive dates
    pub fn today(today: NaiveDate) -> Self {
        Self::between(today, today)
    }

    /// The week starting at the most recent Monday: `[monday, monday + 7 days)`
    pub fn this_week(today: NaiveDate) -> Self {
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        Self::between(monday, monday + Duration::days(6))
    }

    pub fn between(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from,
            date_to,
            city: None,
            country: None,
            classifications: Vec::new(),
            keyword: None,
            page_size: DEFAULT_PAGE_SIZE,
            page: 0,
        }
    }

    pub fn default_window(today: NaiveDate) -> Self {
        Self::upcoming(today, DEFAULT_DAYS_AHEAD)
    }

    /// Page size after clamping to `1..=MAX_PAGE_SIZE`
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Bound a caller-supplied look-ahead so date arithmetic cannot overflow
pub fn clamp_days_ahead(days_ahead: i64) -> i64 {
    days_ahead.clamp(0, MAX_DAYS_AHEAD)
}

/// Case folding shared by the filter plan and the store (Unicode lowercase)
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Parse a comma separated classification list, e.g. `"music, sports"`
pub fn parse_classifications(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// One conjunctive condition of a filter plan
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Inclusive on both ends
    DateBetween { from: NaiveDate, to: NaiveDate },
    /// Case-insensitive equality on the venue city
    CityEquals(String),
    /// Case-insensitive equality on the venue country name or country code
    CountryEquals(String),
    /// Case-insensitive membership of the classification segment (logical OR)
    SegmentIn(Vec<String>),
    /// Case-insensitive substring of the event name
    NameContains(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub size: u32,
    /// 0-based
    pub index: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.size as u64 * self.index as u64
    }
}

/// Sort keys, applied in order, all ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
    Time,
    Id,
}

/// Structured, store-agnostic query: AND of predicates, fixed ordering, one page.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
    pub page: PageRequest,
}

impl FilterPlan {
    pub fn from_filter(filter: &EventFilter) -> Self {
        let mut predicates = vec![Predicate::DateBetween {
            from: filter.date_from,
            to: filter.date_to,
        }];

        if let Some(city) = non_blank(&filter.city) {
            predicates.push(Predicate::CityEquals(city));
        }
        if let Some(country) = non_blank(&filter.country) {
            predicates.push(Predicate::CountryEquals(country));
        }

        let segments: Vec<String> = filter
            .classifications
            .iter()
            .map(|c| fold_case(c.trim()))
            .filter(|c| !c.is_empty())
            .collect();
        let unfiltered = segments.is_empty() || segments.iter().any(|c| c == ALL_CLASSIFICATIONS);
        if !unfiltered {
            let mut deduped = segments;
            deduped.sort();
            deduped.dedup();
            predicates.push(Predicate::SegmentIn(deduped));
        }

        if let Some(keyword) = non_blank(&filter.keyword) {
            predicates.push(Predicate::NameContains(keyword));
        }

        FilterPlan {
            predicates,
            order_by: vec![SortKey::Date, SortKey::Time, SortKey::Id],
            page: PageRequest {
                size: filter.effective_page_size(),
                index: filter.page,
            },
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pagination metadata returned alongside a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub returned: usize,
}

impl Pagination {
    pub fn new(total_count: u64, page: PageRequest, returned: usize) -> Self {
        let size = page.size.max(1) as u64;
        Pagination {
            total_count,
            total_pages: total_count.div_ceil(size),
            current_page: page.index,
            page_size: page.size,
            returned,
        }
    }
}
