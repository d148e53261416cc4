//! SQL schema for the Muster SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS classes (
    class_id            TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    homeroom_teacher_id TEXT             -- user id; NULL when unassigned
);

CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL UNIQUE,
    class_id   TEXT REFERENCES classes(class_id)
);

CREATE TABLE IF NOT EXISTS activities (
    activity_id           TEXT PRIMARY KEY,
    title                 TEXT NOT NULL,
    creator_user_id       TEXT NOT NULL,
    class_id              TEXT,
    status                TEXT NOT NULL,   -- 'pending' | 'approved' | 'rejected'
    start_at              TEXT NOT NULL,
    end_at                TEXT NOT NULL,
    registration_deadline TEXT NOT NULL,
    capacity              INTEGER,         -- NULL is unbounded
    qr_token              TEXT,
    rejection_reason      TEXT
);

-- Status changes are conditional UPDATEs on the current status.
CREATE TABLE IF NOT EXISTS registrations (
    registration_id  TEXT PRIMARY KEY,
    student_id       TEXT NOT NULL REFERENCES students(student_id),
    activity_id      TEXT NOT NULL REFERENCES activities(activity_id),
    status           TEXT NOT NULL,   -- 'pending' | 'approved' | 'rejected' | 'attended'
    created_at       TEXT NOT NULL,
    approved_at      TEXT,
    approver_id      TEXT,
    rejection_reason TEXT,
    UNIQUE (student_id, activity_id)
);

-- Written once per student and activity, never updated.
CREATE TABLE IF NOT EXISTS attendances (
    attendance_id         TEXT PRIMARY KEY,
    student_id            TEXT NOT NULL REFERENCES students(student_id),
    activity_id           TEXT NOT NULL REFERENCES activities(activity_id),
    checked_in_at         TEXT NOT NULL,
    checked_in_by_user_id TEXT NOT NULL,
    method                TEXT NOT NULL,   -- 'qr' | 'manual'
    UNIQUE (student_id, activity_id)
);

CREATE INDEX IF NOT EXISTS classes_teacher_idx       ON classes(homeroom_teacher_id);
CREATE INDEX IF NOT EXISTS students_class_idx        ON students(class_id);
CREATE INDEX IF NOT EXISTS activities_creator_idx    ON activities(creator_user_id);
CREATE INDEX IF NOT EXISTS registrations_activity_idx ON registrations(activity_id, status);

PRAGMA user_version = 1;
";
