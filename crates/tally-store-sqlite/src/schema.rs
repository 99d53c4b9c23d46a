//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Threshold memory: exactly one live row per key, last-write-wins.
CREATE TABLE IF NOT EXISTS thresholds (
    key         TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL,   -- JSON number or string
    reason      TEXT NOT NULL,
    source      TEXT NOT NULL,   -- 'system_default' | 'feedback' | 'feedback+llm' | 'manual'
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

-- One row per triage case. Immutable after insert except `status`.
CREATE TABLE IF NOT EXISTS cases (
    case_id            TEXT PRIMARY KEY,
    run_id             TEXT NOT NULL,
    title              TEXT NOT NULL,
    anomaly_type       TEXT NOT NULL,
    severity           TEXT NOT NULL,
    confidence         TEXT NOT NULL,
    estimated_impact   REAL NOT NULL,
    evidence           TEXT NOT NULL,   -- JSON array of strings
    details            TEXT NOT NULL,   -- JSON payload tagged with anomaly_type
    recommended_action TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'open',
    created_at         TEXT NOT NULL,
    sentiment          TEXT             -- JSON SentimentReport or NULL
);

-- Feedback is strictly append-only.
-- No UPDATE or DELETE is ever issued against individual rows.
CREATE TABLE IF NOT EXISTS feedback (
    feedback_id   TEXT PRIMARY KEY,
    target_type   TEXT NOT NULL,   -- 'case' | 'analyst'
    target_id     TEXT NOT NULL,
    feedback_type TEXT NOT NULL,
    anomaly_type  TEXT,            -- target case's type at submission; NULL for analyst targets
    comment       TEXT NOT NULL DEFAULT '',
    timestamp     TEXT NOT NULL
);

-- Billing source tables, read-only for detectors.
CREATE TABLE IF NOT EXISTS customers (
    customer_id   TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    region        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id TEXT PRIMARY KEY,
    customer_id     TEXT NOT NULL REFERENCES customers(customer_id),
    plan_tier       TEXT NOT NULL,
    billing_status  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invoices (
    invoice_id       TEXT PRIMARY KEY,
    customer_id      TEXT NOT NULL REFERENCES customers(customer_id),
    billed_amount    REAL NOT NULL,
    expected_amount  REAL NOT NULL,
    plan_tier_billed TEXT NOT NULL,
    invoice_date     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    payment_id   TEXT PRIMARY KEY,
    invoice_id   TEXT NOT NULL REFERENCES invoices(invoice_id),
    customer_id  TEXT NOT NULL REFERENCES customers(customer_id),
    amount       REAL NOT NULL,
    payment_date TEXT NOT NULL,
    processor    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS refunds (
    refund_id         TEXT PRIMARY KEY,
    customer_id       TEXT NOT NULL REFERENCES customers(customer_id),
    amount            REAL NOT NULL,
    refund_date       TEXT NOT NULL,
    reason            TEXT NOT NULL,
    processor         TEXT NOT NULL,
    linked_payment_id TEXT
);

CREATE INDEX IF NOT EXISTS cases_run_idx       ON cases(run_id);
CREATE INDEX IF NOT EXISTS cases_status_idx    ON cases(status);
CREATE INDEX IF NOT EXISTS feedback_target_idx ON feedback(target_id);
CREATE INDEX IF NOT EXISTS refunds_cust_idx    ON refunds(customer_id);

PRAGMA user_version = 1;
";
