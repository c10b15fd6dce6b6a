//! SQLite-dialect schema for the libSQL backend.
//!
//! Mirrors `migrations/V1__whatsapp_provisioning.sql`. Timestamps are stored
//! as RFC 3339 text and every statement is idempotent, so the whole batch
//! runs on each startup.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS gateway_credentials (
    owner_id TEXT PRIMARY KEY,
    base_url TEXT NOT NULL,
    api_key TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS whatsapp_connections (
    user_id TEXT PRIMARY KEY,
    session_name TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('connecting', 'connected')),
    phone_number TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS whatsapp_sessions (
    user_id TEXT NOT NULL,
    session_name TEXT NOT NULL,
    status TEXT NOT NULL,
    gateway_session_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, session_name)
);

CREATE TABLE IF NOT EXISTS whatsapp_identities (
    identity TEXT NOT NULL,
    user_id TEXT NOT NULL,
    franchise_id TEXT,
    display_name TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (identity, user_id)
);

CREATE INDEX IF NOT EXISTS idx_whatsapp_identities_user ON whatsapp_identities(user_id);

CREATE TABLE IF NOT EXISTS franchise_members (
    user_id TEXT PRIMARY KEY,
    franchise_id TEXT NOT NULL
);
"#;
