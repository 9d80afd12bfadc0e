pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    xors_user_id TEXT NOT NULL UNIQUE,
    xors_api_key TEXT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    sessions_remaining INTEGER NOT NULL DEFAULT 0,
    total_sessions INTEGER NOT NULL DEFAULT 0,
    goals TEXT,
    current_weight TEXT,
    target_weight TEXT,
    last_session_date DATE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_clients_xors_user_id ON clients (xors_user_id);
CREATE INDEX IF NOT EXISTS idx_clients_email ON clients (email);

CREATE TABLE IF NOT EXISTS client_notes (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (client_id) REFERENCES clients (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_client_notes_client_id ON client_notes (client_id);

CREATE TABLE IF NOT EXISTS exercise_logs (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL,
    exercise TEXT NOT NULL,
    weight TEXT NOT NULL,
    reps INTEGER NOT NULL,
    sets INTEGER NOT NULL DEFAULT 1,
    notes TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (client_id) REFERENCES clients (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_exercise_logs_client_id ON exercise_logs (client_id);
CREATE INDEX IF NOT EXISTS idx_exercise_logs_exercise ON exercise_logs (exercise);
CREATE INDEX IF NOT EXISTS idx_exercise_logs_created ON exercise_logs (created_at);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    api_key TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS user_applications (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    session_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS admin_users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    api_key TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
