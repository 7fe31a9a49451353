// Database schema and migrations for the Praxis graph store.
// Called once at open by GraphStore::open() after WAL is enabled.
// Adding a new table or column: append an idempotent CREATE TABLE IF NOT
// EXISTS or ALTER TABLE … ADD COLUMN (errors are silently swallowed) at the
// end of run_migrations() — never modify existing SQL to keep upgrade paths
// clean.
//
// All timestamps are INTEGER epoch milliseconds.

use crate::atoms::error::EngineResult;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(CORE_SCHEMA)?;

    // ── Idempotent column additions for future migrations ────────────
    // Pattern: try ADD COLUMN, swallow error if already exists.
    // Add new migrations below as needed.

    Ok(())
}

const CORE_SCHEMA: &str = "
    -- ═══════════════════════════════════════════════════════════════
    -- Entities (global, shared across accounts)
    -- One row per normalized_name; entity_type is sticky.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        normalized_name TEXT NOT NULL,
        entity_type TEXT,
        description TEXT,
        touch_count INTEGER NOT NULL DEFAULT 1,
        trajectory_count INTEGER NOT NULL DEFAULT 1,
        contributor_count INTEGER NOT NULL DEFAULT 1,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_normalized
        ON entities(normalized_name);
    CREATE INDEX IF NOT EXISTS idx_entities_type
        ON entities(entity_type);

    -- ═══════════════════════════════════════════════════════════════
    -- Entity contributions (per-account provenance on global entities)
    -- Exactly one row per (entity_id, account_id); creating one is the
    -- sole trigger for bumping entities.contributor_count.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS entity_contributions (
        entity_id TEXT NOT NULL,
        account_id TEXT NOT NULL,
        first_trajectory_id TEXT NOT NULL,
        touch_count INTEGER NOT NULL DEFAULT 1,
        trajectory_count INTEGER NOT NULL DEFAULT 1,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL,
        PRIMARY KEY (entity_id, account_id),
        FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_contributions_account
        ON entity_contributions(account_id);

    -- ═══════════════════════════════════════════════════════════════
    -- Edges (directed, weighted, accumulating)
    -- Keyed by (source_id, target_id); self-loops never inserted.
    -- Valence counters are reserved: read by inference, never written.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS edges (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        weight INTEGER NOT NULL DEFAULT 1,
        trajectory_count INTEGER NOT NULL DEFAULT 1,
        contributor_count INTEGER NOT NULL DEFAULT 1,
        relationship_type TEXT,
        positive_outcomes INTEGER NOT NULL DEFAULT 0,
        negative_outcomes INTEGER NOT NULL DEFAULT 0,
        mixed_outcomes INTEGER NOT NULL DEFAULT 0,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL,
        FOREIGN KEY (source_id) REFERENCES entities(id) ON DELETE CASCADE,
        FOREIGN KEY (target_id) REFERENCES entities(id) ON DELETE CASCADE
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_pair
        ON edges(source_id, target_id);
    CREATE INDEX IF NOT EXISTS idx_edges_target
        ON edges(target_id);

    -- ═══════════════════════════════════════════════════════════════
    -- Co-occurrences (undirected pair counts)
    -- Canonical orientation: entity_a < entity_b lexicographically.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS cooccurrences (
        entity_a TEXT NOT NULL,
        entity_b TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 1,
        window_count INTEGER NOT NULL DEFAULT 1,
        trajectory_count INTEGER NOT NULL DEFAULT 1,
        contributor_count INTEGER NOT NULL DEFAULT 1,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (entity_a, entity_b),
        FOREIGN KEY (entity_a) REFERENCES entities(id) ON DELETE CASCADE,
        FOREIGN KEY (entity_b) REFERENCES entities(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_cooccurrences_b
        ON cooccurrences(entity_b);

    -- ═══════════════════════════════════════════════════════════════
    -- Trajectories (one walk per chat turn, per-account)
    -- Open until completed_at is set; thereafter immutable.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS trajectories (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        conversation_id TEXT,
        input_text TEXT NOT NULL,
        input_hash INTEGER NOT NULL,
        summary TEXT,
        started_at INTEGER NOT NULL,
        completed_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_trajectories_account
        ON trajectories(account_id, started_at DESC);
    CREATE INDEX IF NOT EXISTS idx_trajectories_hash
        ON trajectories(input_hash);

    -- ═══════════════════════════════════════════════════════════════
    -- Trajectory events (append-only, gapless sequence per trajectory)
    -- data is an opaque JSON blob; _context carries decision context.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS trajectory_events (
        id TEXT PRIMARY KEY,
        trajectory_id TEXT NOT NULL,
        sequence_num INTEGER NOT NULL,
        timestamp INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        entity_id TEXT,
        data TEXT,
        FOREIGN KEY (trajectory_id) REFERENCES trajectories(id) ON DELETE CASCADE
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_events_trajectory_seq
        ON trajectory_events(trajectory_id, sequence_num);
    CREATE INDEX IF NOT EXISTS idx_events_entity
        ON trajectory_events(entity_id);

    -- ═══════════════════════════════════════════════════════════════
    -- Conversations & messages (thin per-account containers)
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        title TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversations_account
        ON conversations(account_id, updated_at DESC);

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        trajectory_id TEXT,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages(conversation_id, created_at);
";
