use crate::constants::{droppable_tables, EVENTS_TABLE};
use crate::domain::{EventRow, UpsertOutcome};
use crate::error::{EventsError, Result};
use crate::pipeline::filter::{fold_case, FilterPlan, Predicate, SortKey};
use crate::pipeline::normalize::{parse_date, parse_datetime, parse_time};
use crate::storage::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const EVENT_COLUMNS: &str = "id, name, url, date, time, datetime, timezone, status, \
    venue_id, venue_name, venue_address, venue_city, venue_state, venue_country, \
    venue_country_code, venue_postal_code, venue_timezone, venue_location, \
    classification_segment, classification_genre, classification_subgenre, \
    classification_type, classification_subtype, classification_family, \
    price_ranges, images, info, please_note, created_at, updated_at";

/// SQL name of the Unicode lowercase function registered on every connection.
/// Built-in `LOWER()` folds ASCII only.
const FOLD_FN: &str = "fold_case";

/// SQLite-backed event store. One connection, owned here, guarded by a mutex.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (creating if needed) the database file and run migrations
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening event store at {}", path.as_ref().display());
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::register_functions(&conn)?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn register_functions(conn: &Connection) -> Result<()> {
        conn.create_scalar_function(
            FOLD_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| fold_case(&v)))
            },
        )
        .map_err(|e| EventsError::Database {
            message: format!("Failed to register {FOLD_FN}: {e}"),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        debug!("Running event store migrations");
        let migration_sql = include_str!("../../migrations/001_create_events.sql");
        conn.execute_batch(migration_sql)
            .map_err(|e| EventsError::Database {
                message: format!("Failed to run migrations: {e}"),
            })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| EventsError::Database {
            message: format!("Event store connection poisoned: {e}"),
        })
    }

    /// Fetch a single row by id
    pub fn get_event(&self, id: &str) -> Result<Option<EventRow>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE id = ?1");
        conn.query_row(&sql, params![id], read_event_row)
            .optional()
            .map_err(|e| EventsError::StoreQuery {
                message: format!("Failed to read event {id}: {e}"),
            })
    }

    /// Number of rows in the events table
    pub fn total_rows(&self) -> Result<u64> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {EVENTS_TABLE}");
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| EventsError::StoreQuery {
                message: format!("Failed to count events: {e}"),
            })?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn upsert_event(&self, row: &EventRow) -> Result<UpsertOutcome> {
        let write_err = |e: rusqlite::Error| EventsError::StoreWrite {
            id: row.id.clone(),
            message: e.to_string(),
        };
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM {EVENTS_TABLE} WHERE id = ?1"),
                params![row.id],
                |_| Ok(()),
            )
            .optional()
            .map_err(write_err)?
            .is_some();

        let sql = format!(
            "INSERT INTO {EVENTS_TABLE} ({EVENT_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?29
            )
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                date = excluded.date,
                time = excluded.time,
                datetime = excluded.datetime,
                timezone = excluded.timezone,
                status = excluded.status,
                venue_name = excluded.venue_name,
                venue_city = excluded.venue_city,
                venue_country = excluded.venue_country,
                classification_segment = excluded.classification_segment,
                classification_genre = excluded.classification_genre,
                updated_at = excluded.updated_at"
        );

        conn.execute(
            &sql,
            params![
                row.id,
                row.name,
                row.url,
                row.date.map(|d| d.format("%Y-%m-%d").to_string()),
                row.time.map(|t| t.to_string()),
                row.datetime.map(|dt| dt.to_rfc3339()),
                row.timezone,
                row.status,
                row.venue_id,
                row.venue_name,
                row.venue_address,
                row.venue_city,
                row.venue_state,
                row.venue_country,
                row.venue_country_code,
                row.venue_postal_code,
                row.venue_timezone,
                row.venue_location,
                row.classification_segment,
                row.classification_genre,
                row.classification_subgenre,
                row.classification_type,
                row.classification_subtype,
                row.classification_family,
                row.price_ranges,
                row.images,
                row.info,
                row.please_note,
                now,
            ],
        )
        .map_err(write_err)?;

        let outcome = if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!("Upserted event {} ({:?})", row.id, outcome);
        Ok(outcome)
    }

    async fn query(&self, plan: &FilterPlan) -> Result<Vec<EventRow>> {
        let statement = SqlStatement::select(plan);
        let conn = self.lock()?;
        let query_err = |e: rusqlite::Error| EventsError::StoreQuery {
            message: e.to_string(),
        };

        let mut stmt = conn.prepare(&statement.sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(statement.params.iter()), read_event_row)
            .map_err(query_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(query_err)?);
        }
        debug!("Event query returned {} rows", results.len());
        Ok(results)
    }

    async fn count(&self, plan: &FilterPlan) -> Result<u64> {
        let statement = SqlStatement::count(plan);
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get(0),
            )
            .map_err(|e| EventsError::StoreQuery {
                message: e.to_string(),
            })?;
        Ok(count.max(0) as u64)
    }

    async fn drop_table(&self, name: &str) -> Result<bool> {
        if !droppable_tables().contains(&name) {
            warn!("Refusing to drop unknown table '{}'", name);
            return Ok(false);
        }

        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !exists {
            warn!("Table '{}' does not exist", name);
            return Ok(false);
        }

        // `name` comes from the allow-list above
        conn.execute_batch(&format!("DROP TABLE {name};"))?;
        info!("Dropped table '{}'", name);
        Ok(true)
    }
}

/// SQL text plus positional parameters. Caller-supplied values only ever travel
/// in `params`, never in `sql`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlStatement {
    pub fn select(plan: &FilterPlan) -> Self {
        let (where_sql, mut params) = render_where(plan);
        let order_sql = plan
            .order_by
            .iter()
            .map(|key| match key {
                SortKey::Date => "date ASC",
                SortKey::Time => "time ASC",
                SortKey::Id => "id ASC",
            })
            .collect::<Vec<_>>()
            .join(", ");

        let limit_idx = params.len() + 1;
        params.push(SqlValue::Integer(plan.page.size as i64));
        params.push(SqlValue::Integer(plan.page.offset() as i64));

        SqlStatement {
            sql: format!(
                "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE}{where_sql} ORDER BY {order_sql} LIMIT ?{} OFFSET ?{}",
                limit_idx,
                limit_idx + 1
            ),
            params,
        }
    }

    pub fn count(plan: &FilterPlan) -> Self {
        let (where_sql, params) = render_where(plan);
        SqlStatement {
            sql: format!("SELECT COUNT(*) FROM {EVENTS_TABLE}{where_sql}"),
            params,
        }
    }
}

/// Render the plan's predicates as ` WHERE a AND b ...` with numbered placeholders.
///
/// String comparisons fold both sides with the same Unicode lowercase: the
/// column through `fold_case()` in SQL, the parameter through [`fold_case`].
fn render_where(plan: &FilterPlan) -> (String, Vec<SqlValue>) {
    fn bind(value: String, params: &mut Vec<SqlValue>) -> String {
        params.push(SqlValue::Text(value));
        format!("?{}", params.len())
    }

    let mut clauses = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    for predicate in &plan.predicates {
        let clause = match predicate {
            Predicate::DateBetween { from, to } => {
                let from = bind(from.format("%Y-%m-%d").to_string(), &mut params);
                let to = bind(to.format("%Y-%m-%d").to_string(), &mut params);
                format!("date >= {from} AND date <= {to}")
            }
            Predicate::CityEquals(city) => {
                let p = bind(fold_case(city), &mut params);
                format!("{FOLD_FN}(venue_city) = {p}")
            }
            Predicate::CountryEquals(country) => {
                let p = bind(fold_case(country), &mut params);
                format!("({FOLD_FN}(venue_country) = {p} OR {FOLD_FN}(venue_country_code) = {p})")
            }
            Predicate::SegmentIn(segments) => {
                let placeholders = segments
                    .iter()
                    .map(|segment| bind(fold_case(segment), &mut params))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{FOLD_FN}(classification_segment) IN ({placeholders})")
            }
            Predicate::NameContains(keyword) => {
                let p = bind(
                    format!("%{}%", escape_like(&fold_case(keyword))),
                    &mut params,
                );
                format!("{FOLD_FN}(name) LIKE {p} ESCAPE '\\'")
            }
        };
        clauses.push(clause);
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn read_event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    let date: Option<String> = row.get("date")?;
    let time: Option<String> = row.get("time")?;
    let datetime: Option<String> = row.get("datetime")?;
    let created_at: Option<String> = row.get("created_at")?;
    let updated_at: Option<String> = row.get("updated_at")?;

    Ok(EventRow {
        id: row.get("id")?,
        name: row.get("name")?,
        url: row.get("url")?,
        date: date.as_deref().and_then(parse_date),
        time: time.as_deref().and_then(parse_time),
        datetime: datetime.as_deref().and_then(parse_datetime),
        timezone: row.get("timezone")?,
        status: row.get("status")?,
        venue_id: row.get("venue_id")?,
        venue_name: row.get("venue_name")?,
        venue_address: row.get("venue_address")?,
        venue_city: row.get("venue_city")?,
        venue_state: row.get("venue_state")?,
        venue_country: row.get("venue_country")?,
        venue_country_code: row.get("venue_country_code")?,
        venue_postal_code: row.get("venue_postal_code")?,
        venue_timezone: row.get("venue_timezone")?,
        venue_location: row
            .get::<_, Option<String>>("venue_location")?
            .unwrap_or_default(),
        classification_segment: row.get("classification_segment")?,
        classification_genre: row.get("classification_genre")?,
        classification_subgenre: row.get("classification_subgenre")?,
        classification_type: row.get("classification_type")?,
        classification_subtype: row.get("classification_subtype")?,
        classification_family: row
            .get::<_, Option<bool>>("classification_family")?
            .unwrap_or(false),
        price_ranges: row
            .get::<_, Option<String>>("price_ranges")?
            .unwrap_or_default(),
        images: row.get::<_, Option<String>>("images")?.unwrap_or_default(),
        info: row.get("info")?,
        please_note: row.get("please_note")?,
        created_at: created_at.as_deref().and_then(parse_timestamp),
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::EventFilter;
    use crate::pipeline::normalize::to_storage_row;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn july() -> EventFilter {
        EventFilter::between(date(2025, 7, 1), date(2025, 7, 31))
    }

    #[test]
    fn test_caller_values_never_reach_sql_text() {
        let mut filter = july();
        filter.city = Some("Prague'; DROP TABLE events; --".into());
        filter.keyword = Some("50%_off".into());
        filter.classifications = vec!["music".into(), "sports".into()];

        let plan = FilterPlan::from_filter(&filter);
        let select = SqlStatement::select(&plan);
        assert!(!select.sql.contains("DROP"));
        assert!(!select.sql.contains("Prague"));
        assert!(!select.sql.contains("50"));
        assert!(select.sql.contains("fold_case(venue_city) = ?3"));
        assert!(select.sql.contains("fold_case(classification_segment) IN (?4, ?5)"));
        assert!(select.sql.ends_with("ORDER BY date ASC, time ASC, id ASC LIMIT ?7 OFFSET ?8"));
        assert_eq!(select.params[5], SqlValue::Text("%50\\%\\_off%".into()));
        assert_eq!(select.params.len(), 8);

        let count = SqlStatement::count(&plan);
        assert!(count.sql.starts_with("SELECT COUNT(*) FROM events WHERE"));
        assert_eq!(count.params.len(), 6);
    }

    #[tokio::test]
    async fn test_upsert_reports_insert_then_update() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let row = to_storage_row(&json!({"id": "E1", "name": "First"})).unwrap();

        assert_eq!(store.upsert_event(&row).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_event(&row).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.total_rows().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stored_row_reads_back() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let row = to_storage_row(&json!({
            "id": "E2",
            "name": "Jazz Night",
            "dates": {
                "start": {"localDate": "2025-07-01", "localTime": "20:00", "dateTime": "2025-07-01T18:00:00Z"},
                "status": {"code": "onsale"}
            },
            "_embedded": {"venues": [{"name": "Blue Note", "city": {"name": "Prague"}}]},
            "classifications": [{"segment": {"name": "Music"}, "family": true}]
        }))
        .unwrap();
        store.upsert_event(&row).await.unwrap();

        let stored = store.get_event("E2").unwrap().unwrap();
        assert_eq!(stored.date, row.date);
        assert_eq!(stored.time, row.time);
        assert_eq!(stored.datetime, row.datetime);
        assert_eq!(stored.venue_city.as_deref(), Some("Prague"));
        assert!(stored.classification_family);
        assert!(stored.created_at.is_some());
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(store.get_event("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters_fold_non_ascii_case() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let row = to_storage_row(&json!({
            "id": "CZ1",
            "name": "Čapek Večer",
            "dates": {"start": {"localDate": "2025-07-12"}},
            "_embedded": {"venues": [{
                "name": "Dům kultury",
                "city": {"name": "Ústí nad Labem"},
                "country": {"name": "Česko", "countryCode": "CZ"}
            }]},
            "classifications": [{"segment": {"name": "Música"}}]
        }))
        .unwrap();
        store.upsert_event(&row).await.unwrap();

        let matching = [
            EventFilter { keyword: Some("čapek".into()), ..july() },
            EventFilter { keyword: Some("VEČER".into()), ..july() },
            EventFilter { city: Some("ÚSTÍ NAD LABEM".into()), ..july() },
            EventFilter { country: Some("ČESKO".into()), ..july() },
            EventFilter { classifications: vec!["MÚSICA".into()], ..july() },
        ];
        for filter in &matching {
            let plan = FilterPlan::from_filter(filter);
            assert_eq!(store.count(&plan).await.unwrap(), 1, "{filter:?}");
            assert_eq!(store.query(&plan).await.unwrap()[0].id, "CZ1");
        }

        let plan = FilterPlan::from_filter(&EventFilter {
            city: Some("usti nad labem".into()),
            ..july()
        });
        assert_eq!(store.count(&plan).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        assert!(!store.drop_table("sqlite_master").await.unwrap());
        assert!(store.drop_table("user_events").await.unwrap());
        assert!(!store.drop_table("user_events").await.unwrap());
        assert!(store.drop_table("events").await.unwrap());

        let plan = FilterPlan::from_filter(&july());
        assert!(matches!(
            store.query(&plan).await,
            Err(EventsError::StoreQuery { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.db");
        {
            let store = SqliteEventStore::open(&path).unwrap();
            let row = to_storage_row(&json!({"id": "E3"})).unwrap();
            store.upsert_event(&row).await.unwrap();
        }
        let reopened = SqliteEventStore::open(&path).unwrap();
        assert_eq!(reopened.total_rows().unwrap(), 1);
    }
}
