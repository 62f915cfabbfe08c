//! Relational schema.
//!
//! List-valued medical record columns hold JSON arrays. Enum columns hold the upper-snake names
//! from [`crate::status`], guarded by `CHECK` constraints. Every statement is idempotent so
//! `migrate()` can run on each startup.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    patient_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    nhs_number      TEXT UNIQUE,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    date_of_birth   TEXT,
    address         TEXT NOT NULL DEFAULT '',
    phone_number    TEXT NOT NULL DEFAULT '',
    email           TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_identity
    ON patients (last_name, first_name, address);

CREATE TABLE IF NOT EXISTS regional_hospitals (
    hospital_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    address         TEXT NOT NULL DEFAULT '',
    phone_number    TEXT NOT NULL DEFAULT '',
    email           TEXT NOT NULL DEFAULT '',
    latitude        REAL NOT NULL,
    longitude       REAL NOT NULL,
    capacity        INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ambulances (
    ambulance_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ambulance_number      TEXT NOT NULL UNIQUE,
    latitude              REAL NOT NULL,
    longitude             REAL NOT NULL,
    status                TEXT NOT NULL DEFAULT 'AVAILABLE'
                          CHECK (status IN ('AVAILABLE', 'ON_CALL', 'MAINTENANCE')),
    regional_hospital_id  INTEGER REFERENCES regional_hospitals (hospital_id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_ambulances_pool
    ON ambulances (regional_hospital_id, status);

CREATE TABLE IF NOT EXISTS emergency_calls (
    call_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id             INTEGER REFERENCES patients (patient_id) ON DELETE SET NULL,
    nhs_number             TEXT NOT NULL DEFAULT '',
    caller_name            TEXT NOT NULL DEFAULT '',
    caller_phone           TEXT NOT NULL DEFAULT '',
    call_time              TEXT NOT NULL,
    medical_condition      TEXT NOT NULL DEFAULT '',
    latitude               REAL NOT NULL,
    longitude              REAL NOT NULL,
    severity               TEXT NOT NULL DEFAULT 'LOW'
                           CHECK (severity IN ('LOW', 'MODERATE', 'HIGH', 'CRITICAL')),
    status                 TEXT NOT NULL DEFAULT 'AMBULANCE_PENDING'
                           CHECK (status IN ('AMBULANCE_PENDING', 'AMBULANCE_DISPATCHED', 'AMBULANCE_COMPLETED')),
    assigned_ambulance_id  INTEGER REFERENCES ambulances (ambulance_id) ON DELETE SET NULL,
    assigned_hospital_id   INTEGER REFERENCES regional_hospitals (hospital_id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS call_out_details (
    detail_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    call_id         INTEGER NOT NULL REFERENCES emergency_calls (call_id) ON DELETE CASCADE,
    ambulance_id    INTEGER NOT NULL REFERENCES ambulances (ambulance_id),
    action_taken    TEXT NOT NULL DEFAULT '',
    time_spent      TEXT NOT NULL,
    notes           TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medical_records (
    record_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id      INTEGER NOT NULL REFERENCES patients (patient_id) ON DELETE CASCADE,
    callout_ids     TEXT NOT NULL DEFAULT '[]',
    conditions      TEXT NOT NULL DEFAULT '[]',
    medications     TEXT NOT NULL DEFAULT '[]',
    allergies       TEXT NOT NULL DEFAULT '[]',
    notes           TEXT NOT NULL DEFAULT '[]',
    last_updated    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_medical_records_patient
    ON medical_records (patient_id, last_updated);

CREATE TABLE IF NOT EXISTS ambulance_requests (
    request_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    emergency_call_id  INTEGER NOT NULL REFERENCES emergency_calls (call_id) ON DELETE CASCADE,
    hospital_id        INTEGER REFERENCES regional_hospitals (hospital_id),
    ambulance_id       INTEGER REFERENCES ambulances (ambulance_id),
    severity           TEXT NOT NULL
                       CHECK (severity IN ('LOW', 'MODERATE', 'HIGH', 'CRITICAL')),
    latitude           REAL NOT NULL,
    longitude          REAL NOT NULL,
    status             TEXT NOT NULL DEFAULT 'PENDING'
                       CHECK (status IN ('PENDING', 'ACCEPTED', 'REJECTED', 'COMPLETED')),
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    CHECK (ambulance_id IS NULL OR status IN ('ACCEPTED', 'COMPLETED'))
);

CREATE INDEX IF NOT EXISTS idx_ambulance_requests_hospital
    ON ambulance_requests (hospital_id, status);

-- An ambulance serves at most one accepted request at a time.
CREATE UNIQUE INDEX IF NOT EXISTS idx_ambulance_requests_one_accepted
    ON ambulance_requests (ambulance_id) WHERE status = 'ACCEPTED';

CREATE TABLE IF NOT EXISTS ambulance_staff (
    staff_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    phone_number    TEXT NOT NULL DEFAULT '',
    email           TEXT NOT NULL DEFAULT '',
    role            TEXT NOT NULL
                    CHECK (role IN ('PARAMEDIC', 'DRIVER', 'OPERATOR', 'HOSPITAL_STAFF', 'OTHER')),
    ambulance_id    INTEGER REFERENCES ambulances (ambulance_id) ON DELETE SET NULL,
    is_active       INTEGER NOT NULL DEFAULT 1
);
"#;
