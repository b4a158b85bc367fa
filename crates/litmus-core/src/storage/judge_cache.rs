use super::store::{to_json, Store};
use crate::errors::Result;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

impl Store {
    pub fn judge_cache_get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM judge_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        // A corrupt entry is treated as a miss and overwritten on the next put.
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    pub fn judge_cache_put(&self, key: &str, model: &str, payload: &Value) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO judge_cache (key, model, created_at, payload_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, model, super::now_ts(), to_json(payload)?],
        )?;
        Ok(())
    }
}
