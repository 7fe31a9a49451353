// ── Store: Edge & Co-occurrence Ops ────────────────────────────────────────
//
// Edges are directed and keyed by (source_id, target_id); co-occurrences
// are undirected and keyed by the lexicographically sorted pair. Upserts
// are idempotent on their keys — concurrent upserts bump counters on the
// same row, never duplicate it.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{now_ms, GraphStore};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{cooccurrence_key, Cooccurrence, Edge};

impl GraphStore {
    fn edge_from_row(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        Ok(Edge {
            id: row.get(0)?,
            source_id: row.get(1)?,
            target_id: row.get(2)?,
            weight: row.get(3)?,
            trajectory_count: row.get(4)?,
            contributor_count: row.get(5)?,
            relationship_type: row.get(6)?,
            positive_outcomes: row.get(7)?,
            negative_outcomes: row.get(8)?,
            mixed_outcomes: row.get(9)?,
            first_seen: row.get(10)?,
            last_seen: row.get(11)?,
        })
    }

    const EDGE_COLS: &'static str = "id, source_id, target_id, weight, trajectory_count, \
         contributor_count, relationship_type, positive_outcomes, negative_outcomes, \
         mixed_outcomes, first_seen, last_seen";

    /// Strengthen (or create) the directed edge source→target.
    ///
    /// `relationship` is written on insert and adopted on update when given;
    /// `strengthen` controls whether weight/trajectory_count are bumped —
    /// marking an already-traversed pair as `leads_to` passes false so the
    /// walk counts the traversal once.
    pub fn upsert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: Option<&str>,
        strengthen: bool,
    ) -> EngineResult<()> {
        if source_id == target_id {
            return Err(EngineError::Invariant(format!(
                "self-loop edge rejected for entity {}",
                source_id
            )));
        }

        let now = now_ms();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![source_id, target_id],
                |r| r.get(0),
            )
            .optional()?;

        match existing {
            Some(edge_id) => {
                if strengthen {
                    tx.execute(
                        "UPDATE edges
                         SET weight = weight + 1,
                             trajectory_count = trajectory_count + 1,
                             last_seen = ?2
                         WHERE id = ?1",
                        params![edge_id, now],
                    )?;
                } else {
                    tx.execute(
                        "UPDATE edges SET last_seen = ?2 WHERE id = ?1",
                        params![edge_id, now],
                    )?;
                }
                if let Some(rel) = relationship {
                    tx.execute(
                        "UPDATE edges SET relationship_type = ?2 WHERE id = ?1",
                        params![edge_id, rel],
                    )?;
                }
            }
            None => {
                tx.execute(
                    "INSERT INTO edges (
                        id, source_id, target_id, weight, trajectory_count,
                        contributor_count, relationship_type, first_seen, last_seen
                    ) VALUES (?1, ?2, ?3, 1, 1, 1, ?4, ?5, ?5)",
                    params![Uuid::new_v4().to_string(), source_id, target_id, relationship, now],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Bump (or create) the canonical co-occurrence row for an unordered pair.
    pub fn upsert_cooccurrence(&self, a: &str, b: &str) -> EngineResult<()> {
        let (lo, hi) = cooccurrence_key(a, b);
        let now = now_ms();
        let conn = self.conn.lock();

        let updated = conn.execute(
            "UPDATE cooccurrences
             SET count = count + 1,
                 window_count = window_count + 1,
                 trajectory_count = trajectory_count + 1,
                 last_updated = ?3
             WHERE entity_a = ?1 AND entity_b = ?2",
            params![lo, hi, now],
        )?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO cooccurrences (
                    entity_a, entity_b, count, window_count,
                    trajectory_count, contributor_count, last_updated
                ) VALUES (?1, ?2, 1, 1, 1, 1, ?3)",
                params![lo, hi, now],
            )?;
        }
        Ok(())
    }

    pub fn get_edge(&self, source_id: &str, target_id: &str) -> EngineResult<Option<Edge>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM edges WHERE source_id = ?1 AND target_id = ?2",
            Self::EDGE_COLS
        );
        let result = conn
            .query_row(&sql, params![source_id, target_id], Self::edge_from_row)
            .optional()?;
        Ok(result)
    }

    pub fn get_cooccurrence(&self, a: &str, b: &str) -> EngineResult<Option<Cooccurrence>> {
        let (lo, hi) = cooccurrence_key(a, b);
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT entity_a, entity_b, count, window_count, trajectory_count,
                        contributor_count, last_updated
                 FROM cooccurrences WHERE entity_a = ?1 AND entity_b = ?2",
                params![lo, hi],
                Self::cooccurrence_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn cooccurrence_from_row(row: &rusqlite::Row) -> rusqlite::Result<Cooccurrence> {
        Ok(Cooccurrence {
            entity_a: row.get(0)?,
            entity_b: row.get(1)?,
            count: row.get(2)?,
            window_count: row.get(3)?,
            trajectory_count: row.get(4)?,
            contributor_count: row.get(5)?,
            last_updated: row.get(6)?,
        })
    }

    /// All edges whose source is in `ids`.
    pub fn edges_from(&self, ids: &[String]) -> EngineResult<Vec<Edge>> {
        self.edges_by_endpoint(ids, "source_id")
    }

    /// All edges whose target is in `ids`.
    pub fn edges_to(&self, ids: &[String]) -> EngineResult<Vec<Edge>> {
        self.edges_by_endpoint(ids, "target_id")
    }

    fn edges_by_endpoint(&self, ids: &[String], column: &str) -> EngineResult<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM edges WHERE {} IN ({})",
            Self::EDGE_COLS,
            column,
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), Self::edge_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Edges with BOTH endpoints in `ids` and weight at or above the floor.
    pub fn edges_among(&self, ids: &[String], min_weight: i64) -> EngineResult<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM edges
             WHERE source_id IN ({1}) AND target_id IN ({1}) AND weight >= ?{2}",
            Self::EDGE_COLS,
            placeholders,
            ids.len() * 2 + 1
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut values: Vec<rusqlite::types::Value> = ids
            .iter()
            .chain(ids.iter())
            .map(|s| rusqlite::types::Value::Text(s.clone()))
            .collect();
        values.push(rusqlite::types::Value::Integer(min_weight));
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), Self::edge_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Edges touching `id` from either side, weight-filtered, for BFS hops.
    pub fn edges_touching(&self, id: &str, min_weight: i64) -> EngineResult<Vec<Edge>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM edges
             WHERE (source_id = ?1 OR target_id = ?1) AND weight >= ?2",
            Self::EDGE_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![id, min_weight], Self::edge_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Edges from `id`, heaviest first — the entity-detail neighbor list.
    pub fn edges_from_by_weight(&self, id: &str) -> EngineResult<Vec<Edge>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM edges WHERE source_id = ?1 ORDER BY weight DESC",
            Self::EDGE_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![id], Self::edge_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Co-occurrence rows involving any of `ids`, strongest first.
    pub fn cooccurrences_involving(&self, ids: &[String]) -> EngineResult<Vec<Cooccurrence>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT entity_a, entity_b, count, window_count, trajectory_count,
                    contributor_count, last_updated
             FROM cooccurrences
             WHERE entity_a IN ({0}) OR entity_b IN ({0})
             ORDER BY count DESC",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let values: Vec<rusqlite::types::Value> = ids
            .iter()
            .chain(ids.iter())
            .map(|s| rusqlite::types::Value::Text(s.clone()))
            .collect();
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(values),
                Self::cooccurrence_from_row,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
