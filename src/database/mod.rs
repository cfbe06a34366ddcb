//! SQLite-backed credential and query-log store.
//!
//! Tables:
//! - `users`: email, password_hash, salt, created_at
//! - `queries`: user_id, question, answer, created_at
//!
//! Raw credentials never touch disk: registration stores a salted,
//! iterated-SHA-256 stretched hash, and verification recomputes the hash
//! with the stored salt and compares in constant time. The hash and salt
//! never leave this module.

use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Database file name inside `DATABASE_DIR`.
const DB_FILE: &str = "noit.db";

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Fixed salt used for the dummy hash on the unknown-email path, so that
/// lookup failure and credential mismatch take comparable time.
const DUMMY_SALT: &str = "0000000000000000";

/// Errors surfaced by store operations. Every variant is a terminal policy
/// decision for the request that triggered it.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The email is already registered.
    #[error("email already registered")]
    Conflict,
    /// Unknown email or credential mismatch. Deliberately one variant for
    /// both so callers cannot tell which path failed.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Input failed validation before touching the database.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A registered user. Never carries the credential hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: i64,
}

/// One logged research query.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub id: i64,
    pub question: String,
    pub answer: Option<String>,
}

/// SQLite-backed store for user accounts and their query history.
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

impl Database {
    /// Open (or create) the database under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir)?;
        let conn = rusqlite::Connection::open(data_dir.join(DB_FILE))?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                question TEXT NOT NULL,
                answer TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queries_user ON queries(user_id);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Create a new user with a freshly salted credential hash.
    ///
    /// Uniqueness is enforced by the UNIQUE constraint, so a concurrent
    /// duplicate create cannot also succeed.
    pub fn create_user(&self, email: &str, password: &str) -> Result<User, DatabaseError> {
        let email = validate_email(email)?;
        if password.len() < 8 {
            return Err(DatabaseError::Invalid(
                "Password must be at least 8 characters".into(),
            ));
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, email, password_hash, salt, now],
        );

        match result {
            Ok(_) => Ok(User {
                id: user_id,
                email: email.to_string(),
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(DatabaseError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by email. Pure read, no side effects.
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, email, created_at FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        );

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify an email + password pair and return the `User` on success.
    ///
    /// Both failure paths return `InvalidCredentials`: the unknown-email
    /// branch computes a dummy hash so its timing matches the mismatch
    /// branch, and the stored hash is compared in constant time.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, DatabaseError> {
        let conn = self.conn.lock();
        let row: Result<(String, String, String, String, i64), _> = conn.query_row(
            "SELECT id, email, password_hash, salt, created_at
             FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        );

        match row {
            Ok((id, email, stored_hash, salt, created_at)) => {
                let attempt_hash = hash_password(password, &salt);
                if !constant_time_eq(stored_hash.as_bytes(), attempt_hash.as_bytes()) {
                    return Err(DatabaseError::InvalidCredentials);
                }
                Ok(User {
                    id,
                    email,
                    created_at,
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let _ = hash_password(password, DUMMY_SALT);
                Err(DatabaseError::InvalidCredentials)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Query log ───────────────────────────────────────────────────

    /// Append a query + answer pair to the user's history. Returns the row id.
    pub fn log_query(
        &self,
        user_id: &str,
        question: &str,
        answer: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO queries (user_id, question, answer, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, question, answer, epoch_secs()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The user's most recent queries, newest first.
    pub fn recent_queries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<QueryRecord>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, question, answer FROM queries
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let records = stmt
            .query_map(rusqlite::params![user_id, limit as i64], |row| {
                Ok(QueryRecord {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    answer: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn validate_email(email: &str) -> Result<&str, DatabaseError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::Invalid("Email cannot be empty".into()));
    }
    if trimmed.len() > 255 {
        return Err(DatabaseError::Invalid(
            "Email too long (max 255 characters)".into(),
        ));
    }
    if !trimmed.contains('@') {
        return Err(DatabaseError::Invalid("Email must contain '@'".into()));
    }
    Ok(trimmed)
}

// ── Cryptographic Helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with salt using iterated SHA-256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    // Iterated hashing for key stretching
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();
        (tmp, db)
    }

    #[test]
    fn create_and_authenticate() {
        let (_tmp, db) = test_db();

        let user = db
            .create_user("alice@example.com", "securepassword123")
            .unwrap();
        assert!(!user.id.is_empty());
        assert_eq!(user.email, "alice@example.com");

        let authed = db
            .authenticate("alice@example.com", "securepassword123")
            .unwrap();
        assert_eq!(authed.id, user.id);
    }

    #[test]
    fn duplicate_email_is_conflict_and_record_unchanged() {
        let (_tmp, db) = test_db();

        let first = db.create_user("alice@example.com", "password123!").unwrap();
        let result = db.create_user("alice@example.com", "otherpassword1");
        assert!(matches!(result, Err(DatabaseError::Conflict)));

        let stored = db.find_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.created_at, first.created_at);
        // First credential still wins
        assert!(db.authenticate("alice@example.com", "password123!").is_ok());
        assert!(db
            .authenticate("alice@example.com", "otherpassword1")
            .is_err());
    }

    #[test]
    fn duplicate_email_case_insensitive() {
        let (_tmp, db) = test_db();

        db.create_user("Alice@Example.com", "password123!").unwrap();
        let result = db.create_user("alice@example.com", "otherpassword1");
        assert!(matches!(result, Err(DatabaseError::Conflict)));
    }

    #[test]
    fn wrong_password_and_unknown_email_fail_the_same_way() {
        let (_tmp, db) = test_db();

        db.create_user("alice@example.com", "correct_password")
            .unwrap();

        let wrong = db.authenticate("alice@example.com", "wrong_password");
        assert!(matches!(wrong, Err(DatabaseError::InvalidCredentials)));

        let unknown = db.authenticate("ghost@example.com", "anypassword1");
        assert!(matches!(unknown, Err(DatabaseError::InvalidCredentials)));

        assert_eq!(
            wrong.unwrap_err().to_string(),
            unknown.unwrap_err().to_string()
        );
    }

    #[test]
    fn create_empty_email_fails() {
        let (_tmp, db) = test_db();

        let result = db.create_user("", "password123!");
        assert!(matches!(result, Err(DatabaseError::Invalid(_))));
    }

    #[test]
    fn create_email_without_at_fails() {
        let (_tmp, db) = test_db();

        let result = db.create_user("not-an-email", "password123!");
        assert!(matches!(result, Err(DatabaseError::Invalid(_))));
    }

    #[test]
    fn create_short_password_fails() {
        let (_tmp, db) = test_db();

        let result = db.create_user("alice@example.com", "short");
        assert!(matches!(result, Err(DatabaseError::Invalid(_))));
    }

    #[test]
    fn find_by_email_returns_none_for_unknown() {
        let (_tmp, db) = test_db();

        assert!(db.find_by_email("ghost@example.com").unwrap().is_none());
    }

    #[test]
    fn query_log_is_newest_first() {
        let (_tmp, db) = test_db();

        let user = db.create_user("alice@example.com", "password123!").unwrap();
        db.log_query(&user.id, "first question", Some("first answer"))
            .unwrap();
        db.log_query(&user.id, "second question", None).unwrap();

        let records = db.recent_queries(&user.id, 50).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "second question");
        assert_eq!(records[0].answer, None);
        assert_eq!(records[1].question, "first question");
        assert_eq!(records[1].answer.as_deref(), Some("first answer"));
    }

    #[test]
    fn query_log_respects_limit_and_user_scope() {
        let (_tmp, db) = test_db();

        let alice = db.create_user("alice@example.com", "password123!").unwrap();
        let bob = db.create_user("bob@example.com", "password123!").unwrap();
        for i in 0..5 {
            db.log_query(&alice.id, &format!("q{i}"), None).unwrap();
        }
        db.log_query(&bob.id, "bob question", None).unwrap();

        let records = db.recent_queries(&alice.id, 3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].question, "q4");
        assert!(records.iter().all(|r| r.question != "bob question"));
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        let h1 = hash_password("test_password", "fixed_salt_value");
        let h2 = hash_password("test_password", "fixed_salt_value");
        assert_eq!(h1, h2);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", "salt_a");
        let h2 = hash_password("test_password", "salt_b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
