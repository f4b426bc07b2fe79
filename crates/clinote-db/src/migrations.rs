// crates/clinote-db/src/migrations.rs
//! Inline schema migrations, applied in order and tracked in `_migrations`
//! (see `Database::run_migrations`). Column-level shape follows the
//! persisted-state layout table.

pub const MIGRATIONS: &[&str] = &[
    // 1. patients
    r#"
    CREATE TABLE IF NOT EXISTS patients (
        tenant_id TEXT NOT NULL,
        patient_id TEXT NOT NULL,
        display_name TEXT,
        age_bucket TEXT,
        gender TEXT,
        race TEXT,
        ethnicity TEXT,
        zip TEXT,
        education TEXT,
        veteran_status TEXT,
        PRIMARY KEY (tenant_id, patient_id)
    );
    "#,
    // 2. notes
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        patient_id TEXT NOT NULL,
        date_of_service TEXT NOT NULL,
        text TEXT NOT NULL,
        provider_id TEXT,
        PRIMARY KEY (id),
        UNIQUE (tenant_id, patient_id, date_of_service)
    );
    CREATE INDEX IF NOT EXISTS idx_notes_tenant ON notes (tenant_id);
    "#,
    // 3. dictionary
    r#"
    CREATE TABLE IF NOT EXISTS dictionary (
        tenant_id TEXT NOT NULL,
        symptom_id TEXT NOT NULL,
        segment TEXT NOT NULL,
        diagnosis TEXT,
        diagnosis_code TEXT,
        diagnostic_category TEXT,
        kind TEXT NOT NULL,
        hrsn_code TEXT,
        hrsn_mapping TEXT,
        PRIMARY KEY (tenant_id, symptom_id)
    );
    "#,
    // 4. mentions
    r#"
    CREATE TABLE IF NOT EXISTS mentions (
        mention_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        patient_id TEXT NOT NULL,
        date_of_service TEXT NOT NULL,
        symptom_id TEXT NOT NULL,
        segment TEXT NOT NULL,
        diagnosis TEXT,
        diagnosis_code TEXT,
        diagnostic_category TEXT,
        kind TEXT NOT NULL,
        hrsn_code TEXT NOT NULL,
        position_in_text INTEGER NOT NULL,
        present TEXT NOT NULL,
        detected TEXT NOT NULL,
        validated TEXT NOT NULL,
        housing_status TEXT,
        food_status TEXT,
        financial_status TEXT,
        transportation_needs TEXT,
        has_a_car TEXT,
        utility_insecurity TEXT,
        childcare_needs TEXT,
        elder_care_needs TEXT,
        employment_status TEXT,
        education_needs TEXT,
        legal_needs TEXT,
        social_isolation TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (tenant_id, patient_id, segment, date_of_service, position_in_text)
    );
    CREATE INDEX IF NOT EXISTS idx_mentions_tenant_patient ON mentions (tenant_id, patient_id);
    "#,
    // 5. process_status
    r#"
    CREATE TABLE IF NOT EXISTS process_status (
        tenant_id TEXT NOT NULL,
        process_type TEXT NOT NULL,
        state TEXT NOT NULL,
        percentage INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL DEFAULT '',
        stage TEXT NOT NULL DEFAULT '',
        total_items INTEGER,
        processed_items INTEGER,
        last_update TEXT,
        start TEXT,
        end TEXT,
        error TEXT,
        PRIMARY KEY (tenant_id, process_type)
    );
    "#,
    // 6. jobs
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        state TEXT NOT NULL,
        started_at TEXT,
        ended_at TEXT,
        processed INTEGER NOT NULL DEFAULT 0,
        total INTEGER NOT NULL DEFAULT 0,
        rate_per_sec REAL NOT NULL DEFAULT 0,
        eta_sec REAL,
        percentage REAL NOT NULL DEFAULT 0,
        error TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_tenant ON jobs (tenant_id, created_at);
    "#,
    // 7. upload_tracking
    r#"
    CREATE TABLE IF NOT EXISTS upload_tracking (
        upload_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        processed_records INTEGER NOT NULL DEFAULT 0,
        new_patients INTEGER NOT NULL DEFAULT 0,
        new_notes INTEGER NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    "#,
];
