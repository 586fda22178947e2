//! Toy catalogue queries.

use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::Pool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    /// File name under the uploads directory, if the toy has a picture.
    pub image: Option<String>,
    pub created_at: String,
}

impl Toy {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price_cents: row.get(3)?,
            image: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, description, price_cents, image, created_at FROM toys";

pub fn list(pool: &Pool) -> Result<Vec<Toy>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))?;
    let toys = stmt
        .query_map([], Toy::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(toys)
}

pub fn get(pool: &Pool, id: &str) -> Result<Option<Toy>> {
    let conn = pool.get()?;
    let toy = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            Toy::from_row,
        )
        .optional()?;
    Ok(toy)
}

pub fn insert(
    pool: &Pool,
    id: &str,
    name: &str,
    description: &str,
    price_cents: i64,
    image: Option<&str>,
) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO toys (id, name, description, price_cents, image) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, description, price_cents, image],
    )?;
    Ok(())
}

/// Returns `false` when no toy had that id.
pub fn delete(pool: &Pool, id: &str) -> Result<bool> {
    let conn = pool.get()?;
    let removed = conn.execute("DELETE FROM toys WHERE id = ?1", [id])?;
    Ok(removed > 0)
}
