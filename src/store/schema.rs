// src/store/schema.rs

//! SQL schema for the entity store. Applied idempotently on every open.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    alt_name          TEXT NOT NULL,
    library_id        TEXT NOT NULL DEFAULT '',
    flowcell          TEXT,
    path              TEXT NOT NULL UNIQUE,
    started           TEXT NOT NULL,
    ended             TEXT,
    status            TEXT NOT NULL DEFAULT 'RUNNING',
    basecalling_model TEXT,
    CHECK ((ended IS NULL) = (status NOT IN ('DONE', 'FAILED')))
);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs (status);
CREATE INDEX IF NOT EXISTS idx_runs_name ON runs (name);
CREATE INDEX IF NOT EXISTS idx_runs_alt_name ON runs (alt_name);

CREATE TABLE IF NOT EXISTS sample_sheets (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id         INTEGER UNIQUE REFERENCES runs (id),
    path           TEXT,
    version        TEXT NOT NULL,
    date           TEXT NOT NULL,
    library_id     TEXT NOT NULL DEFAULT '',
    sequencing_kit TEXT NOT NULL DEFAULT '',
    barcode_kit    TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS samples (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_sheet_id INTEGER NOT NULL REFERENCES sample_sheets (id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    sample_id       TEXT NOT NULL,
    accession       TEXT NOT NULL DEFAULT '',
    barcode_id      TEXT NOT NULL DEFAULT '',
    organism        TEXT NOT NULL DEFAULT '',
    extraction_kit  TEXT NOT NULL DEFAULT '',
    comment         TEXT NOT NULL DEFAULT '',
    user            TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    path          TEXT NOT NULL UNIQUE,
    run_id        INTEGER REFERENCES runs (id),
    sample_id     INTEGER REFERENCES samples (id),
    checksum      TEXT,
    last_modified TEXT NOT NULL,
    exported      INTEGER NOT NULL DEFAULT 0,
    CHECK (run_id IS NULL OR sample_id IS NULL)
);
CREATE INDEX IF NOT EXISTS idx_files_run ON files (run_id);

CREATE TABLE IF NOT EXISTS duties (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    job_class  TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'READY',
    datadir    TEXT,
    remotedir  TEXT,
    job_handle TEXT,
    run_id     INTEGER REFERENCES runs (id),
    file_id    INTEGER REFERENCES files (id),
    attempts   INTEGER NOT NULL DEFAULT 0,
    created    TEXT NOT NULL,
    CHECK ((run_id IS NULL) <> (file_id IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_duties_status ON duties (status);

CREATE TABLE IF NOT EXISTS tags (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (name <> '')
);

CREATE TABLE IF NOT EXISTS triple_tags (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL CHECK (namespace <> ''),
    name      TEXT NOT NULL CHECK (name <> ''),
    value     TEXT NOT NULL,
    UNIQUE (namespace, name, value)
);

CREATE TABLE IF NOT EXISTS tag_junctions (
    tag_id      INTEGER NOT NULL REFERENCES tags (id),
    entity_kind TEXT NOT NULL,
    entity_id   INTEGER NOT NULL,
    PRIMARY KEY (tag_id, entity_kind, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_tag_junctions_entity ON tag_junctions (entity_kind, entity_id);

CREATE TABLE IF NOT EXISTS ttag_junctions (
    ttag_id     INTEGER NOT NULL REFERENCES triple_tags (id),
    entity_kind TEXT NOT NULL,
    entity_id   INTEGER NOT NULL,
    PRIMARY KEY (ttag_id, entity_kind, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_ttag_junctions_entity ON ttag_junctions (entity_kind, entity_id);
";
