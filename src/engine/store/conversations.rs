// ── Store: Conversation & Message Ops ──────────────────────────────────────
// Thin per-account containers around chat turns. Messages order by
// created_at (insertion order within a turn is millisecond-disambiguated
// by the caller passing monotone timestamps).

use log::info;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{now_ms, GraphStore};
use crate::atoms::constants::CONVERSATION_TITLE_MAX_CHARS;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{Conversation, Role, StoredMessage};

impl GraphStore {
    fn conversation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            account_id: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// Create a conversation, seeding the title from the first message text.
    pub fn create_conversation(
        &self,
        account_id: &str,
        first_message: Option<&str>,
    ) -> EngineResult<Conversation> {
        let now = now_ms();
        let title = first_message.map(seed_title);
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            title,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, account_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.account_id,
                conversation.title,
                conversation.created_at,
                conversation.updated_at,
            ],
        )?;
        info!("[store] Created conversation {}", conversation.id);
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: &str) -> EngineResult<Option<Conversation>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT id, account_id, title, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id],
                Self::conversation_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Account-scoped fetch. A mismatch is indistinguishable from a
    /// missing row, so containers never leak across accounts.
    pub fn get_conversation_for_account(
        &self,
        account_id: &str,
        id: &str,
    ) -> EngineResult<Option<Conversation>> {
        Ok(self
            .get_conversation(id)?
            .filter(|c| c.account_id == account_id))
    }

    pub fn conversations_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> EngineResult<Vec<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, title, created_at, updated_at
             FROM conversations
             WHERE account_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![account_id, limit], Self::conversation_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn touch_conversation(&self, id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![id, now_ms()],
        )?;
        Ok(())
    }

    pub fn insert_message(&self, m: &StoredMessage) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, trajectory_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                m.id,
                m.conversation_id,
                m.role.as_str(),
                m.content,
                m.trajectory_id,
                m.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> EngineResult<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, trajectory_id, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                let role: String = row.get(2)?;
                Ok(StoredMessage {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: Role::parse(&role).unwrap_or(Role::User),
                    content: row.get(3)?,
                    trajectory_id: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn seed_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= CONVERSATION_TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(CONVERSATION_TITLE_MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}
