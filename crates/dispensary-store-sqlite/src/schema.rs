//! SQL schema for the Dispensary SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS batches (
    batch_id            TEXT PRIMARY KEY,
    pharmacy_id         TEXT NOT NULL,
    item_id             TEXT NOT NULL,
    supplier_id         TEXT NOT NULL,
    batch_no            TEXT NOT NULL,
    expiry_date         TEXT,            -- YYYY-MM-DD or NULL
    qty_received_units  INTEGER NOT NULL CHECK (qty_received_units > 0),
    qty_on_hand_units   INTEGER NOT NULL,
    purchase_unit_price INTEGER,         -- minor units
    sale_unit_price     INTEGER,
    notes               TEXT,
    received_at         TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    active              INTEGER NOT NULL DEFAULT 1,
    CHECK (qty_on_hand_units BETWEEN 0 AND qty_received_units)
);

-- Strictly append-only; the triggers below reject UPDATE and DELETE.
CREATE TABLE IF NOT EXISTS ledger (
    entry_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id    TEXT NOT NULL REFERENCES batches(batch_id),
    pharmacy_id TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    delta       INTEGER NOT NULL CHECK (delta != 0),
    cause       TEXT NOT NULL,           -- RECEIPT | DISPENSE | ADJUSTMENT | RETURN
    reference   TEXT NOT NULL,
    actor       TEXT NOT NULL,
    note        TEXT,
    occurred_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS ledger_no_update
BEFORE UPDATE ON ledger
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS ledger_no_delete
BEFORE DELETE ON ledger
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS batches_no_delete
BEFORE DELETE ON batches
BEGIN
    SELECT RAISE(ABORT, 'batches are deactivated, never deleted');
END;

CREATE TABLE IF NOT EXISTS reorder_levels (
    pharmacy_id   TEXT NOT NULL,
    item_id       TEXT NOT NULL,
    reorder_level INTEGER NOT NULL CHECK (reorder_level >= 0),
    PRIMARY KEY (pharmacy_id, item_id)
);

CREATE INDEX IF NOT EXISTS batches_scope_idx   ON batches(pharmacy_id, item_id);
CREATE INDEX IF NOT EXISTS ledger_batch_idx    ON ledger(batch_id, entry_id);
CREATE INDEX IF NOT EXISTS ledger_pharmacy_idx ON ledger(pharmacy_id, entry_id);

PRAGMA user_version = 1;
";
