//! Persistent store of correction chains.
//!
//! A key → list-of-[`Correction`] mapping kept in a single SQLite table.
//! Readers open the file read-only; every update is a read-modify-write
//! inside an IMMEDIATE transaction so two campaigns writing the same file
//! are serialised by SQLite instead of losing each other's appends.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::correction::Correction;
use crate::error::Result;

/// Key suffix of the debug entries written next to a correction chain.
pub const AUDIT_SUFFIX: &str = ":REWEIGHTING";

/// Audit key for `address`.
pub fn audit_key(address: &str) -> String {
    format!("{address}{AUDIT_SUFFIX}")
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

/// Handle on a correction database. Closed on drop.
pub struct WeightStore {
    conn: Connection,
}

impl WeightStore {
    /// Open for reading and writing, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an existing database read-only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM entries ORDER BY key")?;
        let keys = stmt.query_map([], |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Every key with the length of its chain, without decoding the chains.
    pub fn chain_lengths(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare("SELECT key, json_array_length(value) FROM entries ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Chain stored at `key`; empty when the key is absent.
    pub fn get(&self, key: &str) -> Result<Vec<Correction>> {
        read_chain(&self.conn, key)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let n: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM entries WHERE key = ?1", params![key], |row| row.get(0))?;
        Ok(n > 0)
    }

    /// Replace the chain at `key`.
    pub fn put(&mut self, key: &str, chain: &[Correction]) -> Result<()> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_chain(&tx, key, chain)?;
        tx.commit()?;
        Ok(())
    }

    /// `store[key] = store.get(key, []) + items`, atomically. Returns the new length.
    pub fn append(&mut self, key: &str, items: &[Correction]) -> Result<usize> {
        let mut out = self.append_many(&[(key, items)])?;
        Ok(out.pop().unwrap_or_default())
    }

    /// Several appends in one transaction; returns the new length of each chain.
    pub fn append_many(&mut self, updates: &[(&str, &[Correction])]) -> Result<Vec<usize>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut lengths = Vec::with_capacity(updates.len());
        for (key, items) in updates {
            let mut chain = read_chain(&tx, key)?;
            chain.extend(items.iter().cloned());
            write_chain(&tx, key, &chain)?;
            lengths.push(chain.len());
        }
        tx.commit()?;
        Ok(lengths)
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }
}

fn read_chain(conn: &Connection, key: &str) -> Result<Vec<Correction>> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM entries WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    match value {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

fn write_chain(conn: &Connection, key: &str, chain: &[Correction]) -> Result<()> {
    let json = serde_json::to_string(chain)?;
    conn.execute(
        "INSERT INTO entries (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, json],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ve::ValueWithError;

    fn constant(v: f64) -> Correction {
        Correction::Constant(ValueWithError::exact(v))
    }

    #[test]
    fn test_missing_key_is_empty() {
        let store = WeightStore::open_in_memory().unwrap();
        assert!(store.get("nothing").unwrap().is_empty());
        assert!(!store.contains("nothing").unwrap());
    }

    #[test]
    fn test_append_grows_chain() {
        let mut store = WeightStore::open_in_memory().unwrap();
        assert_eq!(store.append("pt", &[constant(1.0)]).unwrap(), 1);
        assert_eq!(store.append("pt", &[constant(2.0)]).unwrap(), 2);
        assert_eq!(store.get("pt").unwrap(), vec![constant(1.0), constant(2.0)]);
        assert_eq!(store.keys().unwrap(), vec!["pt".to_string()]);
    }

    #[test]
    fn test_put_and_remove() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.put("eta", &[constant(3.0)]).unwrap();
        store.put("eta", &[constant(4.0)]).unwrap();
        assert_eq!(store.get("eta").unwrap(), vec![constant(4.0)]);
        assert!(store.remove("eta").unwrap());
        assert!(!store.remove("eta").unwrap());
    }

    #[test]
    fn test_chain_lengths() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("pt", &[constant(1.0), constant(2.0)]).unwrap();
        store.append(&audit_key("pt"), &vec![constant(1.0); 5]).unwrap();
        assert_eq!(
            store.chain_lengths().unwrap(),
            vec![("pt".to_string(), 2), ("pt:REWEIGHTING".to_string(), 5)]
        );
    }

    #[test]
    fn test_audit_key() {
        assert_eq!(audit_key("pt"), "pt:REWEIGHTING");
    }

    #[test]
    fn test_read_only_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.db");
        {
            let mut store = WeightStore::open(&path).unwrap();
            store.append("pt", &[constant(0.5)]).unwrap();
        }
        let store = WeightStore::open_read_only(&path).unwrap();
        assert_eq!(store.get("pt").unwrap(), vec![constant(0.5)]);
    }

    #[test]
    fn test_read_only_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WeightStore::open_read_only(dir.path().join("absent.db")).is_err());
    }
}
