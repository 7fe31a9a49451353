// ── Store: Trajectory & Event Ops ──────────────────────────────────────────
//
// Trajectory rows are open until completed_at is set. The event log is
// append-only; (trajectory_id, sequence_num) carries a unique index so a
// mis-sequenced append fails loudly instead of corrupting the walk order.

use rusqlite::{params, OptionalExtension};

use super::GraphStore;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{EventType, Trajectory, TrajectoryEvent};

impl GraphStore {
    fn trajectory_from_row(row: &rusqlite::Row) -> rusqlite::Result<Trajectory> {
        Ok(Trajectory {
            id: row.get(0)?,
            account_id: row.get(1)?,
            conversation_id: row.get(2)?,
            input_text: row.get(3)?,
            input_hash: row.get(4)?,
            summary: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }

    const TRAJECTORY_COLS: &'static str =
        "id, account_id, conversation_id, input_text, input_hash, summary, started_at, completed_at";

    pub fn insert_trajectory(&self, t: &Trajectory) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO trajectories (
                id, account_id, conversation_id, input_text, input_hash,
                summary, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                t.id,
                t.account_id,
                t.conversation_id,
                t.input_text,
                t.input_hash,
                t.summary,
                t.started_at,
                t.completed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_trajectory(&self, id: &str) -> EngineResult<Option<Trajectory>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM trajectories WHERE id = ?1",
            Self::TRAJECTORY_COLS
        );
        let result = conn
            .query_row(&sql, params![id], Self::trajectory_from_row)
            .optional()?;
        Ok(result)
    }

    pub fn set_trajectory_completed(
        &self,
        id: &str,
        summary: Option<&str>,
        completed_at: i64,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE trajectories SET completed_at = ?2, summary = ?3 WHERE id = ?1",
            params![id, completed_at, summary],
        )?;
        Ok(())
    }

    /// Account-scoped fetch; a foreign trajectory reads as missing.
    pub fn get_trajectory_for_account(
        &self,
        account_id: &str,
        id: &str,
    ) -> EngineResult<Option<Trajectory>> {
        Ok(self
            .get_trajectory(id)?
            .filter(|t| t.account_id == account_id))
    }

    pub fn trajectories_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> EngineResult<Vec<Trajectory>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM trajectories
             WHERE account_id = ?1
             ORDER BY started_at DESC
             LIMIT ?2",
            Self::TRAJECTORY_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![account_id, limit], Self::trajectory_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Completed walks sharing an input fingerprint. Advisory: the hash is
    /// 32-bit and collisions are tolerated.
    pub fn count_similar_starts(&self, input_hash: i64, exclude_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM trajectories
             WHERE input_hash = ?1 AND id != ?2 AND completed_at IS NOT NULL",
            params![input_hash, exclude_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ── Events ─────────────────────────────────────────────────────────

    pub fn insert_event(&self, ev: &TrajectoryEvent) -> EngineResult<()> {
        let conn = self.conn.lock();
        let data = ev
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO trajectory_events (
                id, trajectory_id, sequence_num, timestamp, event_type, entity_id, data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ev.id,
                ev.trajectory_id,
                ev.sequence_num,
                ev.timestamp,
                ev.event_type.as_str(),
                ev.entity_id,
                data,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_trajectory(&self, trajectory_id: &str) -> EngineResult<Vec<TrajectoryEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, trajectory_id, sequence_num, timestamp, event_type, entity_id, data
             FROM trajectory_events
             WHERE trajectory_id = ?1
             ORDER BY sequence_num ASC",
        )?;
        let rows = stmt
            .query_map(params![trajectory_id], |row| {
                let event_type: String = row.get(4)?;
                let data: Option<String> = row.get(6)?;
                Ok(TrajectoryEvent {
                    id: row.get(0)?,
                    trajectory_id: row.get(1)?,
                    sequence_num: row.get(2)?,
                    timestamp: row.get(3)?,
                    // Unknown strings indicate a schema drift bug; surfaced
                    // as Touch would corrupt counts, so map to Reason which
                    // the completion pass ignores.
                    event_type: EventType::parse(&event_type).unwrap_or(EventType::Reason),
                    entity_id: row.get(5)?,
                    data: data.and_then(|d| serde_json::from_str(&d).ok()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Highest sequence number appended so far, if any. Used to re-seed the
    /// in-memory counter when an open walk outlives the engine instance.
    pub fn max_sequence_num(&self, trajectory_id: &str) -> EngineResult<Option<i64>> {
        let conn = self.conn.lock();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(sequence_num) FROM trajectory_events WHERE trajectory_id = ?1",
            params![trajectory_id],
            |r| r.get(0),
        )?;
        Ok(max)
    }

    /// Distinct entity ids this account has touched, via its trajectories.
    pub fn entity_ids_for_account(&self, account_id: &str) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT e.entity_id
             FROM trajectory_events e
             JOIN trajectories t ON t.id = e.trajectory_id
             WHERE t.account_id = ?1 AND e.entity_id IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(params![account_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Whether the account has at least one event touching the entity —
    /// the gate for the per-account read view on the global graph.
    pub fn account_touched_entity(&self, account_id: &str, entity_id: &str) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM trajectory_events e
             JOIN trajectories t ON t.id = e.trajectory_id
             WHERE t.account_id = ?1 AND e.entity_id = ?2",
            params![account_id, entity_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Most recent trajectories with an event touching the entity.
    pub fn recent_trajectories_touching(
        &self,
        entity_id: &str,
        limit: i64,
    ) -> EngineResult<Vec<Trajectory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.id, t.account_id, t.conversation_id, t.input_text,
                    t.input_hash, t.summary, t.started_at, t.completed_at
             FROM trajectories t
             JOIN trajectory_events e ON e.trajectory_id = t.id
             WHERE e.entity_id = ?1
             ORDER BY t.started_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![entity_id, limit], Self::trajectory_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::input_hash;
    use uuid::Uuid;

    fn store() -> GraphStore {
        GraphStore::open_in_memory().unwrap()
    }

    fn trajectory(account: &str, text: &str) -> Trajectory {
        Trajectory {
            id: Uuid::new_v4().to_string(),
            account_id: account.to_string(),
            conversation_id: None,
            input_text: text.to_string(),
            input_hash: input_hash(text),
            summary: None,
            started_at: 1_000,
            completed_at: None,
        }
    }

    fn event(trajectory_id: &str, seq: i64, et: EventType, entity: Option<&str>) -> TrajectoryEvent {
        TrajectoryEvent {
            id: Uuid::new_v4().to_string(),
            trajectory_id: trajectory_id.to_string(),
            sequence_num: seq,
            timestamp: 1_000 + seq,
            event_type: et,
            entity_id: entity.map(|s| s.to_string()),
            data: None,
        }
    }

    #[test]
    fn test_events_ordered_by_sequence() {
        let s = store();
        let t = trajectory("acct", "hello");
        s.insert_trajectory(&t).unwrap();

        for seq in [0, 1, 2] {
            s.insert_event(&event(&t.id, seq, EventType::Reason, None)).unwrap();
        }

        let events = s.events_for_trajectory(&t.id).unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.sequence_num).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(s.max_sequence_num(&t.id).unwrap(), Some(2));
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let s = store();
        let t = trajectory("acct", "hello");
        s.insert_trajectory(&t).unwrap();

        s.insert_event(&event(&t.id, 0, EventType::Touch, None)).unwrap();
        let dup = s.insert_event(&event(&t.id, 0, EventType::Touch, None));
        assert!(dup.is_err(), "Gapless sequence must be unique per trajectory");
    }

    #[test]
    fn test_event_data_round_trips() {
        let s = store();
        let t = trajectory("acct", "hello");
        s.insert_trajectory(&t).unwrap();

        let mut ev = event(&t.id, 0, EventType::Decide, None);
        ev.data = Some(serde_json::json!({"_context": {"observations": ["stuck on thirds"]}}));
        s.insert_event(&ev).unwrap();

        let events = s.events_for_trajectory(&t.id).unwrap();
        assert_eq!(
            events[0].data.as_ref().unwrap()["_context"]["observations"][0],
            "stuck on thirds"
        );
    }

    #[test]
    fn test_account_touch_gate() {
        let s = store();
        s.find_or_create_entity("alice", "t1", "fractions", None, None)
            .unwrap();
        let entity = s.find_entity_by_normalized_name("fractions").unwrap().unwrap();

        let t = trajectory("alice", "hi");
        s.insert_trajectory(&t).unwrap();
        s.insert_event(&event(&t.id, 0, EventType::Touch, Some(&entity.id)))
            .unwrap();

        assert!(s.account_touched_entity("alice", &entity.id).unwrap());
        assert!(!s.account_touched_entity("bob", &entity.id).unwrap());
        assert_eq!(s.entity_ids_for_account("alice").unwrap(), vec![entity.id]);
    }

    #[test]
    fn test_similar_start_lookup_is_advisory() {
        let s = store();
        let a = trajectory("acct", "same text");
        let mut b = trajectory("acct", "same text");
        b.completed_at = Some(2_000);
        s.insert_trajectory(&a).unwrap();
        s.insert_trajectory(&b).unwrap();

        assert_eq!(s.count_similar_starts(a.input_hash, &a.id).unwrap(), 1);
    }
}
