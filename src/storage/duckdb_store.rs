//! Relational backing over DuckDB.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use duckdb::{Connection, Row, params};
use std::path::Path;
use tracing::info;

use super::FareStore;
use crate::models::{
    FareRow, NewObservation, NewOperator, NewRoute, NewService, RouteKey, RouteSummary,
    SessionStatus,
};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS route_ids;
CREATE TABLE IF NOT EXISTS routes (
    id           BIGINT PRIMARY KEY DEFAULT nextval('route_ids'),
    source       VARCHAR NOT NULL,
    destination  VARCHAR NOT NULL,
    source_key   VARCHAR NOT NULL,
    dest_key     VARCHAR NOT NULL,
    distance_km  DOUBLE,
    created_at   TIMESTAMP NOT NULL,
    UNIQUE (source_key, dest_key)
);

CREATE SEQUENCE IF NOT EXISTS operator_ids;
CREATE TABLE IF NOT EXISTS bus_operators (
    id          BIGINT PRIMARY KEY DEFAULT nextval('operator_ids'),
    name        VARCHAR NOT NULL,
    name_key    VARCHAR NOT NULL UNIQUE,
    rating      DOUBLE,
    created_at  TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS service_ids;
CREATE TABLE IF NOT EXISTS bus_services (
    id              BIGINT PRIMARY KEY DEFAULT nextval('service_ids'),
    route_id        BIGINT NOT NULL,
    operator_id     BIGINT NOT NULL,
    bus_type        VARCHAR NOT NULL,
    departure_time  VARCHAR NOT NULL,
    arrival_time    VARCHAR NOT NULL DEFAULT '',
    duration        VARCHAR NOT NULL DEFAULT '',
    rating          DOUBLE,
    created_at      TIMESTAMP NOT NULL,
    UNIQUE (route_id, operator_id, departure_time, bus_type)
);

CREATE SEQUENCE IF NOT EXISTS observation_ids;
CREATE TABLE IF NOT EXISTS fare_observations (
    id              BIGINT PRIMARY KEY DEFAULT nextval('observation_ids'),
    service_id      BIGINT  NOT NULL,
    journey_date    DATE    NOT NULL,
    seat_category   VARCHAR NOT NULL,
    fare            DOUBLE  NOT NULL CHECK (fare >= 0),
    available_seats BIGINT  NOT NULL CHECK (available_seats >= 0),
    starting_price  DOUBLE,
    demand_factor   DOUBLE,
    scraped_at      TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS session_ids;
CREATE TABLE IF NOT EXISTS scraping_sessions (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('session_ids'),
    route_id            BIGINT NOT NULL,
    journey_date        DATE   NOT NULL,
    total_buses_found   INTEGER NOT NULL DEFAULT 0,
    successful_scrapes  INTEGER NOT NULL DEFAULT 0,
    session_start       TIMESTAMP NOT NULL,
    session_end         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running'
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_obs_date    ON fare_observations (journey_date);
CREATE INDEX IF NOT EXISTS idx_obs_service ON fare_observations (service_id);
CREATE INDEX IF NOT EXISTS idx_sessions_route ON scraping_sessions (route_id);
"#;

const HISTORY_SELECT: &str = r#"
SELECT r.source, r.destination, o.name, s.bus_type, s.departure_time, s.arrival_time,
       s.duration, f.journey_date, f.seat_category, f.fare, f.available_seats,
       f.starting_price, f.demand_factor, f.scraped_at
FROM fare_observations f
JOIN bus_services s  ON s.id = f.service_id
JOIN routes r        ON r.id = s.route_id
JOIN bus_operators o ON o.id = s.operator_id
"#;

const HISTORY_ORDER: &str = "ORDER BY f.journey_date, f.scraped_at";

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn
            .execute_batch(INDEXES)
            .context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }
}

fn row_to_fare(r: &Row<'_>) -> duckdb::Result<FareRow> {
    Ok(FareRow {
        source: r.get(0)?,
        destination: r.get(1)?,
        operator: r.get(2)?,
        bus_type: r.get(3)?,
        departure_time: r.get(4)?,
        arrival_time: r.get(5)?,
        duration: r.get(6)?,
        journey_date: r.get(7)?,
        seat_category: r.get(8)?,
        fare: r.get(9)?,
        available_seats: r.get(10)?,
        starting_price: r.get(11)?,
        demand_factor: r.get(12)?,
        scraped_at: r.get(13)?,
    })
}

impl FareStore for Repository {
    fn upsert_route(&self, route: &NewRoute) -> Result<i64> {
        self.conn
            .execute(
                r#"INSERT INTO routes (source, destination, source_key, dest_key, distance_km, created_at)
                   VALUES (?, ?, ?, ?, ?, ?)
                   ON CONFLICT (source_key, dest_key) DO UPDATE SET
                       distance_km = COALESCE(routes.distance_km, excluded.distance_km)"#,
                params![
                    route.source,
                    route.destination,
                    route.key.source_key,
                    route.key.dest_key,
                    route.distance_km,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| format!("upsert route {} → {}", route.source, route.destination))?;

        let id = self.conn.query_row(
            "SELECT id FROM routes WHERE source_key = ? AND dest_key = ?",
            params![route.key.source_key, route.key.dest_key],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn upsert_operator(&self, operator: &NewOperator) -> Result<i64> {
        self.conn
            .execute(
                r#"INSERT INTO bus_operators (name, name_key, rating, created_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT (name_key) DO UPDATE SET
                       rating = COALESCE(excluded.rating, bus_operators.rating)"#,
                params![
                    operator.name,
                    operator.name_key,
                    operator.rating,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| format!("upsert operator {}", operator.name))?;

        let id = self.conn.query_row(
            "SELECT id FROM bus_operators WHERE name_key = ?",
            params![operator.name_key],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn upsert_service(&self, service: &NewService) -> Result<i64> {
        self.conn
            .execute(
                r#"INSERT INTO bus_services
                       (route_id, operator_id, bus_type, departure_time, arrival_time, duration, rating, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (route_id, operator_id, departure_time, bus_type) DO UPDATE SET
                       arrival_time = excluded.arrival_time,
                       duration     = excluded.duration,
                       rating       = COALESCE(excluded.rating, bus_services.rating)"#,
                params![
                    service.route_id,
                    service.operator_id,
                    service.bus_type,
                    service.departure_time,
                    service.arrival_time,
                    service.duration,
                    service.rating,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| {
                format!(
                    "upsert service route={} operator={} dep={}",
                    service.route_id, service.operator_id, service.departure_time
                )
            })?;

        let id = self.conn.query_row(
            r#"SELECT id FROM bus_services
               WHERE route_id = ? AND operator_id = ? AND departure_time = ? AND bus_type = ?"#,
            params![
                service.route_id,
                service.operator_id,
                service.departure_time,
                service.bus_type
            ],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn insert_observation(&self, observation: &NewObservation) -> Result<i64> {
        let id = self
            .conn
            .query_row(
                r#"INSERT INTO fare_observations
                       (service_id, journey_date, seat_category, fare, available_seats,
                        starting_price, demand_factor, scraped_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   RETURNING id"#,
                params![
                    observation.service_id,
                    observation.journey_date,
                    observation.seat_category,
                    observation.fare,
                    observation.available_seats,
                    observation.starting_price,
                    observation.demand_factor,
                    observation.scraped_at,
                ],
                |r| r.get(0),
            )
            .with_context(|| {
                format!(
                    "insert observation service={} {}",
                    observation.service_id, observation.seat_category
                )
            })?;
        Ok(id)
    }

    fn begin_session(&self, route_id: i64, journey_date: NaiveDate) -> Result<i64> {
        let id = self.conn.query_row(
            r#"INSERT INTO scraping_sessions (route_id, journey_date, session_start, status)
               VALUES (?, ?, ?, 'running')
               RETURNING id"#,
            params![route_id, journey_date, Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn finish_session(
        &self,
        session_id: i64,
        total_found: usize,
        succeeded: usize,
        status: SessionStatus,
    ) -> Result<()> {
        debug_assert!(succeeded <= total_found);
        self.conn.execute(
            r#"UPDATE scraping_sessions SET
               total_buses_found = ?, successful_scrapes = ?,
               session_end = ?, status = ?
               WHERE id = ?"#,
            params![
                total_found as i64,
                succeeded as i64,
                Utc::now().naive_utc(),
                status.as_str(),
                session_id,
            ],
        )?;
        Ok(())
    }

    fn fare_history(&self, route: Option<&RouteKey>, days_back: u32) -> Result<Vec<FareRow>> {
        let cutoff = Utc::now().naive_utc() - Duration::days(days_back as i64);

        let rows = match route {
            Some(key) => {
                let sql = format!(
                    "{HISTORY_SELECT} WHERE r.source_key = ? AND r.dest_key = ? AND f.scraped_at >= ? {HISTORY_ORDER}"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mapped =
                    stmt.query_map(params![key.source_key, key.dest_key, cutoff], row_to_fare)?;
                mapped.collect::<duckdb::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!("{HISTORY_SELECT} WHERE f.scraped_at >= ? {HISTORY_ORDER}");
                let mut stmt = self.conn.prepare(&sql)?;
                let mapped = stmt.query_map(params![cutoff], row_to_fare)?;
                mapped.collect::<duckdb::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    fn list_routes(&self) -> Result<Vec<RouteSummary>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT r.source, r.destination, COUNT(f.id) AS observations
               FROM routes r
               LEFT JOIN bus_services s ON s.route_id = r.id
               LEFT JOIN fare_observations f ON f.service_id = s.id
               GROUP BY r.source, r.destination
               ORDER BY observations DESC, r.source, r.destination"#,
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(RouteSummary {
                    source: r.get(0)?,
                    destination: r.get(1)?,
                    observations: r.get(2)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
