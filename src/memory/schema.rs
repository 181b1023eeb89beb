//! SQLite schema and migrations for the knowledge graph.
//!
//! Table and column names are the on-disk interchange contract shared with
//! every other tool that opens the graph file. The full-text projection in
//! `memory_fts` has no triggers: the store rewrites a node's FTS row inside
//! the same transaction as every content, summary, path or tag change.

use rusqlite::{params, Connection, Result as SqliteResult};

use super::types::DEFAULT_DOMAIN_ID;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL lets readers proceed while another handle writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
///
/// Tables, the default domain, the current-domain pointer and the version
/// row commit together, so a store is never seen half initialized.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS domains (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            last_access TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS current_domain (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            domain_id TEXT NOT NULL,
            FOREIGN KEY (domain_id) REFERENCES domains(id)
        );

        CREATE TABLE IF NOT EXISTS memory_nodes (
            id TEXT PRIMARY KEY,
            domain_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            path TEXT NOT NULL DEFAULT '/',
            content_summary TEXT,
            summary_timestamp TEXT,
            FOREIGN KEY (domain_id) REFERENCES domains(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS memory_edges (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relationship_type TEXT NOT NULL,
            strength REAL NOT NULL CHECK (strength >= 0.0 AND strength <= 1.0),
            created_at TEXT NOT NULL,
            domain_id TEXT NOT NULL,
            UNIQUE (domain_id, source_id, target_id, relationship_type),
            FOREIGN KEY (source_id) REFERENCES memory_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES memory_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (domain_id) REFERENCES domains(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS memory_tags (
            node_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (node_id, tag),
            FOREIGN KEY (node_id) REFERENCES memory_nodes(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS domain_references (
            source_node_id TEXT NOT NULL,
            source_domain_id TEXT NOT NULL,
            target_domain_id TEXT NOT NULL,
            target_node_id TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            bidirectional INTEGER NOT NULL DEFAULT 0 CHECK (bidirectional IN (0, 1)),
            created_at TEXT NOT NULL,
            UNIQUE (source_node_id, target_domain_id, target_node_id),
            FOREIGN KEY (source_node_id) REFERENCES memory_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (source_domain_id) REFERENCES domains(id) ON DELETE CASCADE,
            FOREIGN KEY (target_domain_id) REFERENCES domains(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_domain ON memory_nodes(domain_id);
        CREATE INDEX IF NOT EXISTS idx_edges_domain ON memory_edges(domain_id);
        CREATE INDEX IF NOT EXISTS idx_edges_source ON memory_edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON memory_edges(target_id);
        CREATE INDEX IF NOT EXISTS idx_tags_tag ON memory_tags(tag);
        CREATE INDEX IF NOT EXISTS idx_refs_source ON domain_references(source_domain_id, source_node_id);
        CREATE INDEX IF NOT EXISTS idx_refs_target ON domain_references(target_domain_id, target_node_id);

        -- Trigram tokens make any substring of three or more characters matchable
        CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
            node_id UNINDEXED,
            domain_id UNINDEXED,
            content,
            summary,
            path,
            tags,
            tokenize = 'trigram'
        );",
    )?;

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT OR IGNORE INTO domains (id, name, description, created_at, last_access)
         VALUES (?1, ?1, 'Default domain', ?2, ?2)",
        params![DEFAULT_DOMAIN_ID, now],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO current_domain (id, domain_id) VALUES (1, ?1)",
        params![DEFAULT_DOMAIN_ID],
    )?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    tx.commit()
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='memory_nodes'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_initialize_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        assert!(is_initialized(&conn));
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        for table in [
            "domains",
            "current_domain",
            "memory_nodes",
            "memory_edges",
            "memory_tags",
            "domain_references",
            "memory_fts",
        ] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_idempotent_initialization() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        let pointers: i32 = conn
            .query_row("SELECT COUNT(*) FROM current_domain", [], |row| row.get(0))
            .unwrap();
        assert_eq!(pointers, 1);
    }

    #[test]
    fn test_failed_seeding_leaves_store_uninitialized() {
        let conn = Connection::open_in_memory().unwrap();
        // A foreign table without the pointer column breaks the seeding insert
        conn.execute_batch("CREATE TABLE current_domain (id INTEGER PRIMARY KEY);")
            .unwrap();

        assert!(initialize_schema(&conn).is_err());
        assert!(!is_initialized(&conn));
        assert!(!table_exists(&conn, "domains"));
        assert!(!table_exists(&conn, "memory_fts"));
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_default_domain_is_current() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let current: String = conn
            .query_row("SELECT domain_id FROM current_domain WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(current, DEFAULT_DOMAIN_ID);
    }

    #[test]
    fn test_strength_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO memory_nodes (id, domain_id, content, created_at)
                 VALUES ('a', 'default', 'alpha', '2024-01-01T00:00:00Z');
             INSERT INTO memory_nodes (id, domain_id, content, created_at)
                 VALUES ('b', 'default', 'beta', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO memory_edges
                 (id, source_id, target_id, relationship_type, strength, created_at, domain_id)
             VALUES ('e', 'a', 'b', 'contains', 1.5, '2024-01-01T00:00:00Z', 'default')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_no_fts_triggers() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let triggers: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(triggers, 0);
    }

    #[test]
    fn test_wal_mode() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        // In-memory databases use "memory" mode, file databases would use "wal"
        assert!(mode == "memory" || mode == "wal");
    }
}
