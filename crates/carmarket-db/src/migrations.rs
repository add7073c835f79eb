use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id          BLOB PRIMARY KEY,
                username    TEXT NOT NULL,
                -- Unicode-lowercased username; SQLite's NOCASE folds ASCII only
                username_key TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user'
                            CHECK (role IN ('user', 'moderator', 'admin')),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                user_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_expiry ON sessions(expires_at);

            CREATE TABLE cars (
                id            BLOB PRIMARY KEY,
                name          TEXT NOT NULL,
                price         INTEGER NOT NULL CHECK (price >= 0),
                category      TEXT NOT NULL,
                server        TEXT NOT NULL,
                max_speed     INTEGER,
                acceleration  TEXT,
                drive         TEXT,
                phone         TEXT,
                telegram      TEXT,
                discord       TEXT,
                image_url     TEXT,
                description   TEXT,
                is_premium    INTEGER NOT NULL DEFAULT 0,
                status        TEXT NOT NULL DEFAULT 'active'
                              CHECK (status IN ('active', 'pending', 'rejected')),
                created_by    BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE INDEX idx_cars_catalog ON cars(status, created_at);
            CREATE INDEX idx_cars_owner ON cars(created_by);

            CREATE TABLE car_applications (
                id            BLOB PRIMARY KEY,
                name          TEXT NOT NULL,
                price         INTEGER NOT NULL CHECK (price >= 0),
                category      TEXT NOT NULL,
                server        TEXT NOT NULL,
                max_speed     INTEGER,
                acceleration  TEXT,
                drive         TEXT,
                phone         TEXT,
                telegram      TEXT,
                discord       TEXT,
                image_url     TEXT,
                description   TEXT,
                is_premium    INTEGER NOT NULL DEFAULT 0,
                status        TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'approved', 'rejected')),
                created_by    BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reviewed_by   BLOB REFERENCES users(id) ON DELETE SET NULL,
                reviewed_at   TEXT,
                car_id        BLOB UNIQUE REFERENCES cars(id) ON DELETE SET NULL,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_applications_status ON car_applications(status, created_at);
            CREATE INDEX idx_applications_owner ON car_applications(created_by);

            CREATE TABLE favorites (
                user_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                car_id      BLOB NOT NULL REFERENCES cars(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, car_id)
            );

            CREATE TABLE messages (
                id            BLOB PRIMARY KEY,
                car_id        BLOB NOT NULL REFERENCES cars(id) ON DELETE CASCADE,
                sender_id     BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id  BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content       TEXT NOT NULL,
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_messages_recipient ON messages(recipient_id, is_read);
            CREATE INDEX idx_messages_conversation ON messages(car_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
