//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            organization INTEGER NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users_roles (
            id INTEGER PRIMARY KEY,
            user INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tests (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            organization INTEGER NOT NULL,
            name TEXT NOT NULL,
            purpose TEXT NOT NULL DEFAULT '',
            browser TEXT NOT NULL DEFAULT '',
            url_domain TEXT NOT NULL DEFAULT '',
            url_path TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS tests_steps (
            id INTEGER PRIMARY KEY,
            test INTEGER NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            command TEXT NOT NULL DEFAULT '',
            target TEXT,
            value TEXT
        );

        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            organization INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS collections_tests (
            id INTEGER PRIMARY KEY,
            collection INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            test TEXT NOT NULL,
            browser TEXT NOT NULL DEFAULT '',
            url_domain TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            organization INTEGER NOT NULL,
            test TEXT NOT NULL,
            browser TEXT NOT NULL DEFAULT '',
            url_domain TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'new',
            created TEXT NOT NULL,
            start TEXT,
            \"end\" TEXT
        );

        CREATE TABLE IF NOT EXISTS runs_steps (
            id INTEGER PRIMARY KEY,
            run INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_users_org ON users(organization);
        CREATE INDEX IF NOT EXISTS idx_users_roles_user ON users_roles(user);
        CREATE INDEX IF NOT EXISTS idx_tests_org ON tests(organization);
        CREATE INDEX IF NOT EXISTS idx_tests_steps_test ON tests_steps(test);
        CREATE INDEX IF NOT EXISTS idx_collections_org ON collections(organization);
        CREATE INDEX IF NOT EXISTS idx_collections_tests_collection ON collections_tests(collection);
        CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status, created);
        CREATE INDEX IF NOT EXISTS idx_runs_org_created ON runs(organization, created);
        CREATE INDEX IF NOT EXISTS idx_runs_latest ON runs(organization, test, browser, url_domain, created);
        CREATE INDEX IF NOT EXISTS idx_runs_steps_run ON runs_steps(run);",
    )?;

    Ok(())
}
