//! SQLite schema definition
//!
//! Projects are stored whole: `document` holds the camelCase JSON of the
//! project. `title` and `stage` are denormalized for listing only.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,                   -- UUID
    title TEXT NOT NULL,                   -- brief title suggestion or working title
    stage TEXT NOT NULL,                   -- 'empty', 'brief+bible', 'outlined', 'drafting (n/m chapters)'
    created_at TEXT NOT NULL,              -- RFC 3339, UTC
    updated_at TEXT NOT NULL,              -- RFC 3339, UTC, fixed width so it sorts as text
    revision TEXT NOT NULL,                -- sha256 of document
    document TEXT NOT NULL                 -- JSON project document
);

CREATE INDEX IF NOT EXISTS idx_projects_updated ON projects(updated_at DESC);
"#;
