//! Properties repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::Property;

/// Repository for extension properties.
pub struct PropertiesRepo;

impl PropertiesRepo {
    /// Get a property. A missing key is `Ok(None)`; any other failure is an error.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<Property>> {
        let property = conn
            .query_row(
                "SELECT key, value, updated_at FROM properties WHERE key = ?1",
                [key],
                property_from_row,
            )
            .optional()?;

        Ok(property)
    }

    /// Set a property (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO properties (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;

        Ok(())
    }

    /// Delete a property.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM properties WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Delete every property. Returns the number removed.
    pub fn clear(conn: &Connection) -> Result<usize> {
        let deleted = conn.execute("DELETE FROM properties", [])?;
        Ok(deleted)
    }

    /// Get all properties, ordered by key.
    pub fn get_all(conn: &Connection) -> Result<Vec<Property>> {
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM properties ORDER BY key")?;
        let properties = stmt
            .query_map([], property_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(properties)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn property_from_row(row: &Row<'_>) -> rusqlite::Result<Property> {
    let updated_at: String = row.get(2)?;
    Ok(Property {
        key: row.get(0)?,
        value: row.get(1)?,
        updated_at: parse_datetime(&updated_at),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
