use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create database directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{op}: constraint violated: {source}")]
    Constraint {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{op}: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    fn from_sqlite(op: &'static str, source: rusqlite::Error) -> Self {
        match source.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Constraint { op, source },
            _ => StoreError::Query { op, source },
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            StoreError::Connect { .. } => "connect",
            StoreError::CreateDir { .. } => "init_schema",
            StoreError::Constraint { op, .. } | StoreError::Query { op, .. } => op,
        }
    }
}

trait During<T> {
    fn during(self, op: &'static str) -> Result<T, StoreError>;
}

impl<T> During<T> for rusqlite::Result<T> {
    fn during(self, op: &'static str) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::from_sqlite(op, e))
    }
}

// ── Records ──

/// Identity of a vehicle: one model in one model year.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleKey {
    pub model: String,
    pub year: i32,
}

impl VehicleKey {
    pub fn new(model: impl Into<String>, year: i32) -> Self {
        Self {
            model: model.into(),
            year,
        }
    }
}

impl fmt::Display for VehicleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub car_name: String,
    pub car_year: i32,
    pub title: String,
    pub body: String,
    pub rating: u8,
}

/// Spec fields as extracted from a spec page. Unparsable numbers are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpec {
    pub model: String,
    pub year: i32,
    pub msrp: Option<String>,
    pub horsepower: f64,
    pub mpg: i32,
    pub num_seats: i32,
    pub drive_type: String,
}

/// A row of `cars`. Vehicles first seen through reviews or summaries have no spec data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub car_id: i64,
    pub model: String,
    pub year: i32,
    pub msrp: Option<String>,
    pub horsepower: Option<f64>,
    pub mpg: Option<i32>,
    pub num_seats: Option<i32>,
    pub drive_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Cars,
    Reviews,
    Sentiment,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Cars => "cars",
            Table::Reviews => "car_reviews",
            Table::Sentiment => "car_sentiment",
        }
    }
}

// ── Store ──

/// Handle to the SQLite database. Every operation opens its own connection
/// and drops it before returning.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(|source| StoreError::Connect {
            path: self.path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .during("connect")?;
        Ok(conn)
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cars (
                car_id      INTEGER PRIMARY KEY,
                car_model   TEXT NOT NULL,
                car_year    INTEGER NOT NULL,
                msrp        TEXT,
                horsepower  REAL,
                mpg         INTEGER,
                num_seats   INTEGER,
                drive_type  TEXT NOT NULL DEFAULT 'Unknown',
                UNIQUE(car_model, car_year)
            );

            CREATE TABLE IF NOT EXISTS car_reviews (
                id            INTEGER PRIMARY KEY,
                car_name      TEXT NOT NULL,
                car_year      INTEGER NOT NULL,
                review_title  TEXT NOT NULL,
                review_body   TEXT NOT NULL,
                review_rating INTEGER NOT NULL CHECK(review_rating BETWEEN 0 AND 5)
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_car ON car_reviews(car_name, car_year);

            CREATE TABLE IF NOT EXISTS car_sentiment (
                car_id    INTEGER NOT NULL UNIQUE REFERENCES cars(car_id) ON DELETE CASCADE,
                sentiment TEXT NOT NULL
            );
            ",
        )
        .during("init_schema")?;
        Ok(())
    }

    pub fn clear_table(&self, table: Table) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let deleted = conn
            .execute(&format!("DELETE FROM {}", table.name()), [])
            .during("clear_table")?;
        debug!(table = table.name(), deleted, "Cleared table");
        Ok(deleted)
    }

    // ── Bulk load ──

    /// Inserts all reviews in one transaction. Any failing row rolls back the batch.
    pub fn bulk_insert_reviews(&self, reviews: &[Review]) -> Result<usize, StoreError> {
        const OP: &str = "bulk_insert_reviews";
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction().during(OP)?;
        insert_reviews(&tx, reviews, OP)?;
        tx.commit().during(OP)?;
        Ok(reviews.len())
    }

    /// Inserts all spec rows in one transaction. A duplicate (model, year)
    /// violates the unique constraint and rolls back the batch.
    pub fn bulk_insert_vehicle_specs(&self, specs: &[VehicleSpec]) -> Result<usize, StoreError> {
        const OP: &str = "bulk_insert_vehicle_specs";
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction().during(OP)?;
        insert_specs(&tx, specs, OP)?;
        tx.commit().during(OP)?;
        Ok(specs.len())
    }

    /// Clears `car_reviews` and inserts `reviews` in a single transaction.
    /// A failing row leaves the previous contents untouched.
    pub fn replace_reviews(&self, reviews: &[Review]) -> Result<Replaced, StoreError> {
        const OP: &str = "replace_reviews";
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction().during(OP)?;
        let cleared = tx
            .execute(&format!("DELETE FROM {}", Table::Reviews.name()), [])
            .during(OP)?;
        insert_reviews(&tx, reviews, OP)?;
        tx.commit().during(OP)?;
        Ok(Replaced {
            cleared,
            inserted: reviews.len(),
        })
    }

    /// Clears `cars` (and through the cascade, `car_sentiment`) and inserts
    /// `specs` in a single transaction. A failing row rolls back the clear too.
    pub fn replace_vehicle_specs(&self, specs: &[VehicleSpec]) -> Result<Replaced, StoreError> {
        const OP: &str = "replace_vehicle_specs";
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction().during(OP)?;
        let cleared = tx
            .execute(&format!("DELETE FROM {}", Table::Cars.name()), [])
            .during(OP)?;
        insert_specs(&tx, specs, OP)?;
        tx.commit().during(OP)?;
        Ok(Replaced {
            cleared,
            inserted: specs.len(),
        })
    }

    // ── Upserts ──

    pub fn upsert_vehicle(&self, model: &str, year: i32) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        ensure_vehicle(&conn, model, year)
    }

    /// Writes the summary for (model, year), creating the vehicle if needed.
    /// Leaves exactly one `car_sentiment` row for the vehicle.
    pub fn upsert_summary(&self, model: &str, year: i32, text: &str) -> Result<i64, StoreError> {
        const OP: &str = "upsert_summary";
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction().during(OP)?;
        let car_id = ensure_vehicle(&tx, model, year)?;
        tx.execute(
            "INSERT INTO car_sentiment (car_id, sentiment) VALUES (?1, ?2)
             ON CONFLICT(car_id) DO UPDATE SET sentiment = excluded.sentiment",
            params![car_id, text],
        )
        .during(OP)?;
        tx.commit().during(OP)?;
        Ok(car_id)
    }

    // ── Reads ──

    pub fn get_summary(&self, model: &str, year: i32) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT s.sentiment FROM car_sentiment s
             JOIN cars c ON c.car_id = s.car_id
             WHERE c.car_model = ?1 AND c.car_year = ?2",
            params![model, year],
            |row| row.get(0),
        )
        .optional()
        .during("get_summary")
    }

    pub fn get_vehicle_spec(&self, model: &str, year: i32) -> Result<Option<Vehicle>, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            &format!("{VEHICLE_SELECT} WHERE car_model = ?1 AND car_year = ?2"),
            params![model, year],
            vehicle_from_row,
        )
        .optional()
        .during("get_vehicle_spec")
    }

    pub fn list_all_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        const OP: &str = "list_all_vehicles";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!("{VEHICLE_SELECT} ORDER BY car_model, car_year DESC"))
            .during(OP)?;
        let rows = stmt
            .query_map([], vehicle_from_row)
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;
        Ok(rows)
    }

    /// Distinct models and distinct years, each sorted ascending.
    pub fn list_distinct_models_and_years(&self) -> Result<(Vec<String>, Vec<i32>), StoreError> {
        const OP: &str = "list_distinct_models_and_years";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT car_model, car_year FROM cars")
            .during(OP)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?)))
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;

        let models: BTreeSet<String> = pairs.iter().map(|(m, _)| m.clone()).collect();
        let years: BTreeSet<i32> = pairs.iter().map(|(_, y)| *y).collect();
        Ok((models.into_iter().collect(), years.into_iter().collect()))
    }

    /// Case-insensitive substring match on the model name.
    pub fn search_by_model_substring(&self, query: &str) -> Result<Vec<VehicleKey>, StoreError> {
        const OP: &str = "search_by_model_substring";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT car_model, car_year FROM cars
                 WHERE instr(lower(car_model), lower(?1)) > 0
                 ORDER BY car_model, car_year DESC",
            )
            .during(OP)?;
        let rows = stmt
            .query_map(params![query], |row| Ok(VehicleKey::new(row.get::<_, String>(0)?, row.get(1)?)))
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;
        Ok(rows)
    }

    /// Every stored review body with its vehicle, in insertion order.
    pub fn fetch_review_bodies(&self) -> Result<Vec<(VehicleKey, String)>, StoreError> {
        const OP: &str = "fetch_review_bodies";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT car_name, car_year, review_body FROM car_reviews ORDER BY id")
            .during(OP)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((VehicleKey::new(row.get::<_, String>(0)?, row.get(1)?), row.get::<_, String>(2)?))
            })
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;
        Ok(rows)
    }

    pub fn list_summaries(&self) -> Result<Vec<(VehicleKey, String)>, StoreError> {
        const OP: &str = "list_summaries";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.car_model, c.car_year, s.sentiment
                 FROM car_sentiment s JOIN cars c ON c.car_id = s.car_id
                 ORDER BY c.car_model, c.car_year",
            )
            .during(OP)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((VehicleKey::new(row.get::<_, String>(0)?, row.get(1)?), row.get::<_, String>(2)?))
            })
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;
        Ok(rows)
    }

    // ── Overview ──

    pub fn fetch_overview(&self, limit: usize) -> Result<Vec<OverviewRow>, StoreError> {
        const OP: &str = "fetch_overview";
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.car_model, c.car_year, COALESCE(c.msrp, ''), c.horsepower, c.mpg,
                        c.num_seats, c.drive_type,
                        (SELECT COUNT(*) FROM car_reviews r
                          WHERE r.car_name = c.car_model AND r.car_year = c.car_year),
                        s.car_id IS NOT NULL
                 FROM cars c
                 LEFT JOIN car_sentiment s ON s.car_id = c.car_id
                 ORDER BY c.car_model, c.car_year DESC
                 LIMIT ?1",
            )
            .during(OP)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OverviewRow {
                    model: row.get(0)?,
                    year: row.get(1)?,
                    msrp: row.get(2)?,
                    horsepower: row.get(3)?,
                    mpg: row.get(4)?,
                    num_seats: row.get(5)?,
                    drive_type: row.get(6)?,
                    review_count: row.get(7)?,
                    has_summary: row.get(8)?,
                })
            })
            .during(OP)?
            .collect::<Result<Vec<_>, _>>()
            .during(OP)?;
        Ok(rows)
    }

    pub fn get_stats(&self) -> Result<Stats, StoreError> {
        const OP: &str = "get_stats";
        let conn = self.connect()?;
        let count = |table: Table| -> Result<usize, StoreError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |r| r.get(0))
                .during(OP)
        };
        let with_specs: usize = conn
            .query_row("SELECT COUNT(*) FROM cars WHERE horsepower IS NOT NULL", [], |r| r.get(0))
            .during(OP)?;
        Ok(Stats {
            vehicles: count(Table::Cars)?,
            with_specs,
            reviews: count(Table::Reviews)?,
            summaries: count(Table::Sentiment)?,
        })
    }
}

pub struct OverviewRow {
    pub model: String,
    pub year: i32,
    pub msrp: String,
    pub horsepower: Option<f64>,
    pub mpg: Option<i32>,
    pub num_seats: Option<i32>,
    pub drive_type: String,
    pub review_count: usize,
    pub has_summary: bool,
}

/// Row counts from a clear-and-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replaced {
    pub cleared: usize,
    pub inserted: usize,
}

pub struct Stats {
    pub vehicles: usize,
    pub with_specs: usize,
    pub reviews: usize,
    pub summaries: usize,
}

const VEHICLE_SELECT: &str =
    "SELECT car_id, car_model, car_year, msrp, horsepower, mpg, num_seats, drive_type FROM cars";

fn vehicle_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        car_id: row.get(0)?,
        model: row.get(1)?,
        year: row.get(2)?,
        msrp: row.get(3)?,
        horsepower: row.get(4)?,
        mpg: row.get(5)?,
        num_seats: row.get(6)?,
        drive_type: row.get(7)?,
    })
}

fn insert_reviews(conn: &Connection, reviews: &[Review], op: &'static str) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO car_reviews (car_name, car_year, review_title, review_body, review_rating)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .during(op)?;
    for r in reviews {
        stmt.execute(params![r.car_name, r.car_year, r.title, r.body, r.rating])
            .during(op)?;
    }
    Ok(())
}

fn insert_specs(conn: &Connection, specs: &[VehicleSpec], op: &'static str) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO cars (car_model, car_year, msrp, horsepower, mpg, num_seats, drive_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .during(op)?;
    for s in specs {
        stmt.execute(params![
            s.model, s.year, s.msrp, s.horsepower, s.mpg, s.num_seats, s.drive_type,
        ])
        .during(op)?;
    }
    Ok(())
}

fn ensure_vehicle(conn: &Connection, model: &str, year: i32) -> Result<i64, StoreError> {
    const OP: &str = "upsert_vehicle";
    conn.execute(
        "INSERT INTO cars (car_model, car_year) VALUES (?1, ?2)
         ON CONFLICT(car_model, car_year) DO NOTHING",
        params![model, year],
    )
    .during(OP)?;
    conn.query_row(
        "SELECT car_id FROM cars WHERE car_model = ?1 AND car_year = ?2",
        params![model, year],
        |row| row.get(0),
    )
    .during(OP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("cars.sqlite"));
        store.init_schema().unwrap();
        (dir, store)
    }

    fn review(model: &str, year: i32, title: &str, rating: u8) -> Review {
        Review {
            car_name: model.into(),
            car_year: year,
            title: title.into(),
            body: format!("{title} body"),
            rating,
        }
    }

    fn spec(model: &str, year: i32) -> VehicleSpec {
        VehicleSpec {
            model: model.into(),
            year,
            msrp: Some("$28,545".into()),
            horsepower: 196.0,
            mpg: 57,
            num_seats: 5,
            drive_type: "Front-wheel Drive".into(),
        }
    }

    fn sentiment_rows(store: &Store) -> usize {
        store
            .connect()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM car_sentiment", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn upsert_vehicle_is_idempotent() {
        let (_dir, store) = store();
        let a = store.upsert_vehicle("prius", 2023).unwrap();
        let b = store.upsert_vehicle("prius", 2023).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get_stats().unwrap().vehicles, 1);
    }

    #[test]
    fn upsert_summary_overwrites_single_row() {
        let (_dir, store) = store();
        store.upsert_summary("camry", 2024, "first").unwrap();
        store.upsert_summary("camry", 2024, "second").unwrap();
        assert_eq!(sentiment_rows(&store), 1);
        assert_eq!(store.get_summary("camry", 2024).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn get_summary_unknown_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get_summary("nope", 1999).unwrap(), None);
        store.upsert_vehicle("nope", 1999).unwrap();
        assert_eq!(store.get_summary("nope", 1999).unwrap(), None);
    }

    #[test]
    fn bulk_insert_reviews_and_clear() {
        let (_dir, store) = store();
        let reviews = vec![review("rav4", 2022, "Solid", 4), review("rav4", 2022, "Meh", 2)];
        assert_eq!(store.bulk_insert_reviews(&reviews).unwrap(), 2);
        assert_eq!(store.fetch_review_bodies().unwrap().len(), 2);
        assert_eq!(store.clear_table(Table::Reviews).unwrap(), 2);
        assert!(store.fetch_review_bodies().unwrap().is_empty());
    }

    #[test]
    fn bad_review_rolls_back_batch() {
        let (_dir, store) = store();
        let reviews = vec![review("rav4", 2022, "Fine", 4), review("rav4", 2022, "Broken", 9)];
        let err = store.bulk_insert_reviews(&reviews).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { op: "bulk_insert_reviews", .. }));
        assert!(store.fetch_review_bodies().unwrap().is_empty());
    }

    #[test]
    fn failed_spec_replace_keeps_cars_and_summaries() {
        let (_dir, store) = store();
        store.bulk_insert_vehicle_specs(&[spec("camry", 2024)]).unwrap();
        store.upsert_summary("camry", 2024, "Smooth ride").unwrap();

        let err = store
            .replace_vehicle_specs(&[spec("prius", 2024), spec("prius", 2024)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { op: "replace_vehicle_specs", .. }));
        assert!(store.get_vehicle_spec("camry", 2024).unwrap().is_some());
        assert!(store.get_vehicle_spec("prius", 2024).unwrap().is_none());
        assert_eq!(sentiment_rows(&store), 1);

        let done = store.replace_vehicle_specs(&[spec("prius", 2024)]).unwrap();
        assert_eq!(done, Replaced { cleared: 1, inserted: 1 });
        assert_eq!(sentiment_rows(&store), 0);
    }

    #[test]
    fn duplicate_spec_rolls_back_batch() {
        let (_dir, store) = store();
        let err = store
            .bulk_insert_vehicle_specs(&[spec("tacoma", 2021), spec("tacoma", 2021)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
        assert_eq!(store.get_stats().unwrap().vehicles, 0);
    }

    #[test]
    fn vehicle_spec_roundtrip_and_defaults() {
        let (_dir, store) = store();
        store.bulk_insert_vehicle_specs(&[spec("prius", 2025)]).unwrap();
        store.upsert_vehicle("sienna", 2020).unwrap();

        let prius = store.get_vehicle_spec("prius", 2025).unwrap().unwrap();
        assert_eq!(prius.mpg, Some(57));
        assert_eq!(prius.horsepower, Some(196.0));
        assert_eq!(prius.msrp.as_deref(), Some("$28,545"));

        let sienna = store.get_vehicle_spec("sienna", 2020).unwrap().unwrap();
        assert_eq!(sienna.drive_type, "Unknown");
        assert_eq!(sienna.mpg, None);

        assert!(store.get_vehicle_spec("sienna", 2019).unwrap().is_none());
    }

    #[test]
    fn clearing_cars_drops_summaries() {
        let (_dir, store) = store();
        store.upsert_summary("tundra", 2023, "big truck").unwrap();
        store.clear_table(Table::Cars).unwrap();
        assert_eq!(sentiment_rows(&store), 0);
    }

    #[test]
    fn models_years_and_search() {
        let (_dir, store) = store();
        for (m, y) in [("Camry", 2024), ("camry", 2022), ("corolla", 2024), ("rav4", 2023)] {
            store.upsert_vehicle(m, y).unwrap();
        }
        let (models, years) = store.list_distinct_models_and_years().unwrap();
        assert_eq!(models, vec!["Camry", "camry", "corolla", "rav4"]);
        assert_eq!(years, vec![2022, 2023, 2024]);

        let hits = store.search_by_model_substring("CAM").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|k| k.model.eq_ignore_ascii_case("camry")));
        assert!(store.search_by_model_substring("zzz").unwrap().is_empty());
    }

    #[test]
    fn overview_counts_reviews() {
        let (_dir, store) = store();
        store.bulk_insert_vehicle_specs(&[spec("prius", 2023)]).unwrap();
        store
            .bulk_insert_reviews(&[review("prius", 2023, "a", 5), review("prius", 2023, "b", 3)])
            .unwrap();
        store.upsert_summary("prius", 2023, "liked").unwrap();

        let rows = store.fetch_overview(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].review_count, 2);
        assert!(rows[0].has_summary);
    }

    #[test]
    fn connect_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("missing").join("deeper").join("db.sqlite"));
        let err = store.get_summary("x", 1).unwrap_err();
        assert_eq!(err.op(), "connect");
    }
}
