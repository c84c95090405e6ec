use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::deck::{DeckEntry, DeckSubmission};
use crate::faction::FactionRule;
use crate::http_cache::app_cache_dir;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDeck {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub point_cap: u32,
    pub faction_rule: FactionRule,
    pub total_points: u32,
    pub created_at: String,
    pub entries: Vec<DeckEntry>,
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("decks.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS decks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            point_cap INTEGER NOT NULL,
            faction_rule TEXT NOT NULL,
            total_points INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS deck_units (
            deck_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            unit_id TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (deck_id, unit_id)
        );
        CREATE INDEX IF NOT EXISTS idx_decks_user ON decks(user_id);
        "#,
    )
    .context("init deck schema")?;
    Ok(())
}

/// Inserts the deck and its entries in one transaction; returns the new deck id.
pub fn insert_deck(
    conn: &mut Connection,
    user_id: &str,
    submission: &DeckSubmission,
) -> Result<String> {
    let tx = conn.transaction().context("begin deck insert")?;
    let next_seq: i64 = tx
        .query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM decks", [], |row| {
            row.get(0)
        })
        .context("allocate deck id")?;
    let id = format!("deck-{next_seq}");
    tx.execute(
        "INSERT INTO decks (seq, id, user_id, name, point_cap, faction_rule, total_points, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            next_seq,
            id,
            user_id,
            submission.name,
            submission.point_cap,
            submission.faction_rule.key(),
            submission.total_points,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("insert deck row")?;
    for (position, entry) in submission.entries.iter().enumerate() {
        tx.execute(
            "INSERT INTO deck_units (deck_id, position, unit_id, count) VALUES (?1, ?2, ?3, ?4)",
            params![id, position as i64, entry.unit_id, entry.count],
        )
        .with_context(|| format!("insert deck entry {}", entry.unit_id))?;
    }
    tx.commit().context("commit deck insert")?;
    Ok(id)
}

pub fn load_deck(conn: &Connection, id: &str) -> Result<Option<StoredDeck>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, name, point_cap, faction_rule, total_points, created_at
             FROM decks WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()
        .context("load deck row")?;
    let Some((id, user_id, name, point_cap, rule, total_points, created_at)) = row else {
        return Ok(None);
    };
    let faction_rule =
        FactionRule::from_key(&rule).ok_or_else(|| anyhow!("unknown faction rule {rule}"))?;
    let entries = load_entries(conn, &id)?;
    Ok(Some(StoredDeck {
        id,
        user_id,
        name,
        point_cap,
        faction_rule,
        total_points,
        created_at,
        entries,
    }))
}

pub fn list_deck_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM decks WHERE user_id = ?1 ORDER BY seq")
        .context("prepare deck list")?;
    let rows = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))
        .context("query deck list")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read deck list")
}

fn load_entries(conn: &Connection, deck_id: &str) -> Result<Vec<DeckEntry>> {
    let mut stmt = conn
        .prepare("SELECT unit_id, count FROM deck_units WHERE deck_id = ?1 ORDER BY position")
        .context("prepare deck entries")?;
    let rows = stmt
        .query_map(params![deck_id], |row| {
            Ok(DeckEntry {
                unit_id: row.get(0)?,
                count: row.get(1)?,
            })
        })
        .context("query deck entries")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read deck entries")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> DeckSubmission {
        DeckSubmission {
            name: "Kursk".to_string(),
            point_cap: 100,
            faction_rule: FactionRule::AxisOnly,
            total_points: 61,
            entries: vec![
                DeckEntry {
                    unit_id: "tiger".to_string(),
                    count: 1,
                },
                DeckEntry {
                    unit_id: "grenadier".to_string(),
                    count: 2,
                },
            ],
        }
    }

    #[test]
    fn insert_then_load_keeps_entry_order() {
        let mut conn = open_in_memory().expect("db");
        let id = insert_deck(&mut conn, "user-1", &submission()).expect("insert");
        assert_eq!(id, "deck-1");
        let deck = load_deck(&conn, &id).expect("load").expect("row");
        assert_eq!(deck.faction_rule, FactionRule::AxisOnly);
        assert_eq!(deck.entries, submission().entries);
        assert_eq!(list_deck_ids(&conn, "user-1").expect("list"), vec![id]);
        assert!(list_deck_ids(&conn, "user-2").expect("list").is_empty());
    }

    #[test]
    fn ids_are_sequential() {
        let mut conn = open_in_memory().expect("db");
        insert_deck(&mut conn, "u", &submission()).expect("first");
        let second = insert_deck(&mut conn, "u", &submission()).expect("second");
        assert_eq!(second, "deck-2");
        assert!(load_deck(&conn, "deck-9").expect("load").is_none());
    }
}
