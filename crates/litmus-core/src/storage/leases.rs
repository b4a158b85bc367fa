//! Writer leases: at most one worker drives a given run at a time.
//!
//! A lease row names its holder and carries a heartbeat. A lease whose heartbeat is older than the
//! TTL belongs to a crashed worker and may be taken over.

use super::store::Store;
use crate::errors::{EngineError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub run_id: String,
    pub holder: String,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// True when someone holds a lease on the run whose heartbeat is within the TTL.
pub(crate) fn is_live(conn: &Connection, run_id: &str, ttl: Duration) -> Result<bool> {
    let beat: Option<i64> = conn
        .query_row(
            "SELECT heartbeat_ms FROM run_leases WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(matches!(beat, Some(b) if now_ms().saturating_sub(b) < ttl_ms(ttl)))
}

impl Store {
    pub fn acquire_lease(&self, run_id: &str, ttl: Duration) -> Result<Lease> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if is_live(&tx, run_id, ttl)? {
            return Err(EngineError::RunLocked(run_id.to_string()));
        }
        let holder = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO run_leases (run_id, holder, heartbeat_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id) DO UPDATE SET holder = excluded.holder,
                                               heartbeat_ms = excluded.heartbeat_ms",
            params![run_id, holder, now_ms()],
        )?;
        tx.commit()?;
        Ok(Lease {
            run_id: run_id.to_string(),
            holder,
        })
    }

    /// Fails with `RunLocked` when the lease was taken over by another worker.
    pub fn heartbeat(&self, lease: &Lease) -> Result<()> {
        let conn = self.conn()?;
        heartbeat_on(&conn, lease)
    }

    pub fn release_lease(&self, lease: &Lease) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM run_leases WHERE run_id = ?1 AND holder = ?2",
            params![lease.run_id, lease.holder],
        )?;
        Ok(())
    }

    pub fn lease_is_live(&self, run_id: &str, ttl: Duration) -> Result<bool> {
        let conn = self.conn()?;
        is_live(&conn, run_id, ttl)
    }
}

pub(crate) fn heartbeat_on(conn: &Connection, lease: &Lease) -> Result<()> {
    let n = conn.execute(
        "UPDATE run_leases SET heartbeat_ms = ?3 WHERE run_id = ?1 AND holder = ?2",
        params![lease.run_id, lease.holder, now_ms()],
    )?;
    if n == 0 {
        return Err(EngineError::RunLocked(lease.run_id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn second_acquire_is_locked_until_release() {
        let s = store();
        let ttl = Duration::from_secs(60);
        let lease = s.acquire_lease("r1", ttl).unwrap();
        assert!(matches!(
            s.acquire_lease("r1", ttl),
            Err(EngineError::RunLocked(_))
        ));
        s.acquire_lease("r2", ttl).unwrap();

        s.release_lease(&lease).unwrap();
        assert!(!s.lease_is_live("r1", ttl).unwrap());
        s.acquire_lease("r1", ttl).unwrap();
    }

    #[test]
    fn stale_lease_is_taken_over_and_old_holder_loses_it() {
        let s = store();
        let old = s.acquire_lease("r1", Duration::from_secs(60)).unwrap();
        // Zero TTL: every existing heartbeat counts as stale.
        let new = s.acquire_lease("r1", Duration::ZERO).unwrap();
        assert_ne!(old.holder, new.holder);
        assert!(matches!(s.heartbeat(&old), Err(EngineError::RunLocked(_))));
        s.heartbeat(&new).unwrap();
    }
}
