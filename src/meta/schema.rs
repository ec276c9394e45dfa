//! SQLite schema definition

/// SQL schema for the lead database
pub const SCHEMA_SQL: &str = r#"
-- Leads: one business website moving through the pipeline
CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    website TEXT NOT NULL,
    city TEXT NOT NULL DEFAULT '',
    business_name TEXT,
    address TEXT,
    rating REAL,
    reviews_count INTEGER,
    years_active INTEGER,
    text_content TEXT,
    seo_title TEXT,
    seo_description TEXT,
    profile_content TEXT,
    faq_json TEXT,
    services_json TEXT,
    unique_features_json TEXT,
    facts_json TEXT,
    signals_json TEXT,
    schema_markup_json TEXT,
    scrape_status TEXT DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    processing_error TEXT,
    scraped_at TEXT,
    processed_at TEXT,
    created_at TEXT NOT NULL,
    integrity_json TEXT,
    comparative_json TEXT
);

-- Integrity checks: append-only log of every verdict
CREATE TABLE IF NOT EXISTS integrity_checks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id INTEGER NOT NULL REFERENCES leads(id),
    source_hash TEXT NOT NULL,
    max_similarity REAL NOT NULL,
    status TEXT NOT NULL,
    rewrite_mode TEXT NOT NULL,
    worst_pair_json TEXT,
    checked_at TEXT NOT NULL
);

-- Pipeline runs: one row per batch
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id TEXT PRIMARY KEY,
    stage TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    batch_size INTEGER NOT NULL,
    leads_processed INTEGER DEFAULT 0,
    leads_succeeded INTEGER DEFAULT 0,
    leads_failed INTEGER DEFAULT 0,
    errors_json TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(scrape_status);
CREATE INDEX IF NOT EXISTS idx_leads_city ON leads(city);
CREATE INDEX IF NOT EXISTS idx_checks_lead ON integrity_checks(lead_id);
CREATE INDEX IF NOT EXISTS idx_runs_started ON pipeline_runs(started_at);
"#;
