// ── Store: Entity & Contribution Ops ──────────────────────────────────────
//
// Identity rule: `normalized_name` (lower-cased, trimmed) is the lookup key
// and carries a unique index, so at most one entity row per name ever
// exists. Find-or-create runs inside one transaction under the store mutex:
// the entity row, the (entity, account) contribution row, and the parent
// contributor_count bump commit or roll back together.
//
// Counter bumps are serialisable row-level updates
// (`SET touch_count = touch_count + 1`) so racing walks lose no increments.

use log::info;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{now_ms, GraphStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{Entity, EntityContribution};

/// What find-or-create did, so the caller can record provenance flags on
/// the touch event and completion can skip the initial-count bumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOrCreateOutcome {
    pub entity_id: String,
    /// The entity row was inserted by this call.
    pub created_entity: bool,
    /// The (entity, account) contribution row was inserted by this call.
    pub new_contribution: bool,
}

impl GraphStore {
    pub(crate) fn entity_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
        Ok(Entity {
            id: row.get(0)?,
            name: row.get(1)?,
            normalized_name: row.get(2)?,
            entity_type: row.get(3)?,
            description: row.get(4)?,
            touch_count: row.get(5)?,
            trajectory_count: row.get(6)?,
            contributor_count: row.get(7)?,
            first_seen: row.get(8)?,
            last_seen: row.get(9)?,
        })
    }

    const ENTITY_COLS: &'static str = "id, name, normalized_name, entity_type, description, \
         touch_count, trajectory_count, contributor_count, first_seen, last_seen";

    pub fn find_entity_by_id(&self, id: &str) -> EngineResult<Option<Entity>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM entities WHERE id = ?1", Self::ENTITY_COLS);
        let result = conn
            .query_row(&sql, params![id], Self::entity_from_row)
            .optional()?;
        Ok(result)
    }

    pub fn find_entity_by_normalized_name(&self, normalized: &str) -> EngineResult<Option<Entity>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM entities WHERE normalized_name = ?1",
            Self::ENTITY_COLS
        );
        let result = conn
            .query_row(&sql, params![normalized], Self::entity_from_row)
            .optional()?;
        Ok(result)
    }

    /// Find an entity by normalized name (and type, if given), or create it,
    /// tracking the contributing account — all inside one transaction.
    ///
    /// Found: bump touch_count/last_seen; adopt entity_type and description
    /// if still null (sticky, first writer wins). Created: counters start
    /// at 1. Contribution row: insert-or-bump; inserting one for a
    /// pre-existing entity is what bumps the parent contributor_count.
    pub fn find_or_create_entity(
        &self,
        account_id: &str,
        trajectory_id: &str,
        name: &str,
        entity_type: Option<&str>,
        description: Option<&str>,
    ) -> EngineResult<FindOrCreateOutcome> {
        let display_name = name.trim();
        let normalized = display_name.to_lowercase();
        let now = now_ms();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let sql = format!(
            "SELECT {} FROM entities WHERE normalized_name = ?1",
            Self::ENTITY_COLS
        );
        let existing = tx
            .query_row(&sql, params![normalized], Self::entity_from_row)
            .optional()?;

        let (entity_id, created_entity) = match existing {
            Some(entity) => {
                tx.execute(
                    "UPDATE entities SET touch_count = touch_count + 1, last_seen = ?2
                     WHERE id = ?1",
                    params![entity.id, now],
                )?;
                if entity.entity_type.is_none() {
                    if let Some(etype) = entity_type {
                        tx.execute(
                            "UPDATE entities SET entity_type = ?2
                             WHERE id = ?1 AND entity_type IS NULL",
                            params![entity.id, etype],
                        )?;
                    }
                }
                if entity.description.is_none() {
                    if let Some(desc) = description {
                        tx.execute(
                            "UPDATE entities SET description = ?2
                             WHERE id = ?1 AND description IS NULL",
                            params![entity.id, desc],
                        )?;
                    }
                }
                (entity.id, false)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO entities (
                        id, name, normalized_name, entity_type, description,
                        touch_count, trajectory_count, contributor_count,
                        first_seen, last_seen
                    ) VALUES (?1, ?2, ?3, ?4, ?5, 1, 1, 1, ?6, ?6)",
                    params![id, display_name, normalized, entity_type, description, now],
                )?;
                (id, true)
            }
        };

        let have_contribution: i64 = tx.query_row(
            "SELECT COUNT(*) FROM entity_contributions
             WHERE entity_id = ?1 AND account_id = ?2",
            params![entity_id, account_id],
            |r| r.get(0),
        )?;
        let new_contribution = have_contribution == 0;

        if new_contribution {
            tx.execute(
                "INSERT INTO entity_contributions (
                    entity_id, account_id, first_trajectory_id,
                    touch_count, trajectory_count, first_seen, last_seen
                ) VALUES (?1, ?2, ?3, 1, 1, ?4, ?4)",
                params![entity_id, account_id, trajectory_id, now],
            )?;
            // A freshly-inserted entity already counts its creator.
            if !created_entity {
                tx.execute(
                    "UPDATE entities SET contributor_count = contributor_count + 1
                     WHERE id = ?1",
                    params![entity_id],
                )?;
            }
        } else {
            tx.execute(
                "UPDATE entity_contributions
                 SET touch_count = touch_count + 1, last_seen = ?3
                 WHERE entity_id = ?1 AND account_id = ?2",
                params![entity_id, account_id, now],
            )?;
        }

        tx.commit()?;

        if created_entity {
            info!("[store] New entity: {} ({:?})", display_name, entity_type);
        }

        Ok(FindOrCreateOutcome { entity_id, created_entity, new_contribution })
    }

    /// Bump touch_count/last_seen on a bare touch event (caller resolved the
    /// entity id without going through find-or-create).
    pub fn bump_entity_touch(&self, entity_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE entities SET touch_count = touch_count + 1, last_seen = ?2
             WHERE id = ?1",
            params![entity_id, now_ms()],
        )?;
        Ok(())
    }

    /// Trajectory-count bumps applied on walk completion. Entity and
    /// contribution are gated independently: a row whose initial counters
    /// already count the completing walk is skipped.
    pub fn bump_trajectory_counts(
        &self,
        entity_id: &str,
        account_id: &str,
        bump_entity: bool,
        bump_contribution: bool,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        if bump_entity {
            conn.execute(
                "UPDATE entities SET trajectory_count = trajectory_count + 1
                 WHERE id = ?1",
                params![entity_id],
            )?;
        }
        if bump_contribution {
            conn.execute(
                "UPDATE entity_contributions
                 SET trajectory_count = trajectory_count + 1
                 WHERE entity_id = ?1 AND account_id = ?2",
                params![entity_id, account_id],
            )?;
        }
        Ok(())
    }

    pub fn get_contribution(
        &self,
        entity_id: &str,
        account_id: &str,
    ) -> EngineResult<Option<EntityContribution>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT entity_id, account_id, first_trajectory_id,
                        touch_count, trajectory_count, first_seen, last_seen
                 FROM entity_contributions
                 WHERE entity_id = ?1 AND account_id = ?2",
                params![entity_id, account_id],
                |row| {
                    Ok(EntityContribution {
                        entity_id: row.get(0)?,
                        account_id: row.get(1)?,
                        first_trajectory_id: row.get(2)?,
                        touch_count: row.get(3)?,
                        trajectory_count: row.get(4)?,
                        first_seen: row.get(5)?,
                        last_seen: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn contribution_count(&self, entity_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM entity_contributions WHERE entity_id = ?1",
            params![entity_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn entities_by_ids(&self, ids: &[String]) -> EngineResult<Vec<Entity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM entities WHERE id IN ({})",
            Self::ENTITY_COLS,
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), Self::entity_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Exact resolve: normalized name, plus entity_type when constrained.
    pub fn resolve_exact(
        &self,
        normalized: &str,
        entity_type: Option<&str>,
    ) -> EngineResult<Option<Entity>> {
        let conn = self.conn.lock();
        let result = match entity_type {
            Some(etype) => {
                let sql = format!(
                    "SELECT {} FROM entities
                     WHERE normalized_name = ?1 AND entity_type = ?2",
                    Self::ENTITY_COLS
                );
                conn.query_row(&sql, params![normalized, etype], Self::entity_from_row)
                    .optional()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM entities WHERE normalized_name = ?1",
                    Self::ENTITY_COLS
                );
                conn.query_row(&sql, params![normalized], Self::entity_from_row)
                    .optional()?
            }
        };
        Ok(result)
    }

    /// Partial resolve: substring match, best-touched first.
    pub fn resolve_partial(&self, name: &str) -> EngineResult<Option<Entity>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", name);
        let sql = format!(
            "SELECT {} FROM entities
             WHERE normalized_name LIKE ?1
             ORDER BY touch_count DESC
             LIMIT 1",
            Self::ENTITY_COLS
        );
        let result = conn
            .query_row(&sql, params![pattern], Self::entity_from_row)
            .optional()?;
        Ok(result)
    }
}
