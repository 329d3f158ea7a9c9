//! Local city lookup table.
//!
//! Cities live in a SQLite database with a single table:
//!
//! ```sql
//! CREATE TABLE cities (id INTEGER, name TEXT, country TEXT, longitude REAL, latitude REAL);
//! ```
//!
//! The ids are OpenWeatherMap city ids, so a resolved [`CityRef`] can be
//! queried directly.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, Params, Row, params};
use tracing::debug;

use crate::{
    error::{Result, WeatherError},
    model::{CityRef, Coordinates},
};

pub trait CityDirectory {
    fn city_by_id(&self, id: i64) -> Result<Option<CityRef>>;

    /// Cities whose name matches `name` (case-insensitive), optionally
    /// restricted to one country code.
    fn cities_by_name(&self, name: &str, country: Option<&str>) -> Result<Vec<CityRef>>;
}

/// Resolves `name` to exactly one city.
pub fn resolve_city(
    directory: &dyn CityDirectory,
    name: &str,
    country: Option<&str>,
) -> Result<CityRef> {
    let mut matches = directory.cities_by_name(name, country)?;

    match matches.len() {
        0 => Err(WeatherError::CityNotFound(match country {
            Some(cc) => format!("{name},{}", cc.to_lowercase()),
            None => name.to_string(),
        })),
        // With a country the first match is taken; duplicates inside one
        // country are rare and the table lists the main city first.
        1 => Ok(matches.remove(0)),
        _ if country.is_some() => Ok(matches.remove(0)),
        n => Err(WeatherError::AmbiguousCity { name: name.to_string(), matches: n }),
    }
}

pub struct SqliteCityDirectory {
    conn: Connection,
}

impl SqliteCityDirectory {
    /// Opens an existing city database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening city database");
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Wraps an already opened connection (e.g. an in-memory database).
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn row_to_city(row: &Row<'_>) -> rusqlite::Result<CityRef> {
        let country: String = row.get(2)?;
        Ok(CityRef::new(
            row.get(0)?,
            row.get::<_, String>(1)?,
            &country,
            Coordinates::new(row.get(3)?, row.get(4)?),
        ))
    }

    fn query_cities<P: Params>(&self, filter: &str, params: P) -> Result<Vec<CityRef>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, name, country, longitude, latitude FROM cities WHERE {filter}"
        ))?;
        let cities = stmt
            .query_map(params, Self::row_to_city)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cities)
    }
}

impl CityDirectory for SqliteCityDirectory {
    fn city_by_id(&self, id: i64) -> Result<Option<CityRef>> {
        let cities = self.query_cities("id = ?1", params![id])?;
        Ok(cities.into_iter().next())
    }

    fn cities_by_name(&self, name: &str, country: Option<&str>) -> Result<Vec<CityRef>> {
        let cities = match country {
            Some(cc) => self.query_cities(
                "name LIKE ?1 AND country LIKE ?2",
                params![name, cc.to_lowercase()],
            )?,
            None => self.query_cities("name LIKE ?1", params![name])?,
        };

        debug!(name, ?country, found = cities.len(), "looked up city by name");
        Ok(cities)
    }
}
