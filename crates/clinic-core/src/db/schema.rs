//! Canonical SQLite schema for the clinic store.
//!
//! The schema owns the roster invariants at the storage boundary:
//! - `UNIQUE (group_id, user_id)` keeps one role per person per group
//! - a partial unique index allows at most one `responsible` row per group
//! - a partial unique index allows a student row in at most one group
//!
//! `cases.state` still admits the legacy spellings `en_tramite` and
//! `iniciado` so imported rows load; the store reads both as `active` and
//! only ever writes canonical names.

/// Migration v1: identities, groups, rosters, cases and history.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY CHECK (length(trim(user_id)) > 0),
    display_name TEXT NOT NULL,
    system_role TEXT NOT NULL
        CHECK (system_role IN ('administrator', 'instructor', 'student')),
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS consultants (
    consultant_id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL CHECK (length(trim(full_name)) > 0),
    document TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS clinic_groups (
    group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    description TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    roster_version INTEGER NOT NULL DEFAULT 0 CHECK (roster_version >= 0),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    member_id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES clinic_groups(group_id) ON DELETE RESTRICT,
    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE RESTRICT,
    role TEXT NOT NULL CHECK (role IN ('responsible', 'assistant', 'student')),
    joined_at_us INTEGER NOT NULL,
    role_since_us INTEGER NOT NULL,
    UNIQUE (group_id, user_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_group_members_one_responsible
    ON group_members(group_id) WHERE role = 'responsible';

CREATE UNIQUE INDEX IF NOT EXISTS idx_group_members_student_single_group
    ON group_members(user_id) WHERE role = 'student';

CREATE TABLE IF NOT EXISTS cases (
    case_id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES clinic_groups(group_id) ON DELETE RESTRICT,
    consultant_id INTEGER NOT NULL REFERENCES consultants(consultant_id) ON DELETE RESTRICT,
    folder_number TEXT NOT NULL UNIQUE CHECK (length(trim(folder_number)) > 0),
    state TEXT NOT NULL CHECK (
        state IN ('pending', 'active', 'closed', 'withdrawn', 'en_tramite', 'iniciado')
    ),
    opened_at_us INTEGER NOT NULL,
    closed_at_us INTEGER,
    observations TEXT NOT NULL DEFAULT '',
    state_reason TEXT,
    updated_at_us INTEGER NOT NULL
);

CREATE TRIGGER IF NOT EXISTS cases_folder_number_immutable
BEFORE UPDATE OF folder_number ON cases
WHEN old.folder_number <> new.folder_number
BEGIN
    SELECT RAISE(ABORT, 'folder_number is immutable');
END;

CREATE TRIGGER IF NOT EXISTS cases_group_immutable
BEFORE UPDATE OF group_id ON cases
WHEN old.group_id <> new.group_id
BEGIN
    SELECT RAISE(ABORT, 'case group is immutable');
END;

CREATE TABLE IF NOT EXISTS case_transitions (
    transition_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
    from_state TEXT NOT NULL,
    to_state TEXT NOT NULL,
    reason TEXT,
    actor_id TEXT NOT NULL,
    at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS clinic_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO clinic_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: audit log and read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    detail_json TEXT NOT NULL DEFAULT '{}',
    at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_group_members_user
    ON group_members(user_id, group_id);

CREATE INDEX IF NOT EXISTS idx_cases_group_state
    ON cases(group_id, state);

CREATE INDEX IF NOT EXISTS idx_case_transitions_case
    ON case_transitions(case_id, transition_id);

CREATE INDEX IF NOT EXISTS idx_audit_log_entity
    ON audit_log(entity_id, entry_id);
";

/// Indexes that must exist after migrating to the latest schema.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_group_members_one_responsible",
    "idx_group_members_student_single_group",
    "idx_group_members_user",
    "idx_cases_group_state",
    "idx_case_transitions_case",
    "idx_audit_log_entity",
];
