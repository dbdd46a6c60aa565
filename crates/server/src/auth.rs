use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use redb::{Database, ReadableTable, StorageError, TableDefinition};
use serde::{Deserialize, Serialize};

const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: u64,
}

#[derive(Debug)]
pub enum AuthError {
    DbError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::DbError(message) => write!(f, "auth db error: {}", message),
        }
    }
}

impl std::error::Error for AuthError {}

/// Bearer-token sessions backed by a redb table in the catalog database.
/// Expired tokens simply stop resolving; they are overwritten on reuse of
/// the slot and never bulk-collected.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    session_ttl: Duration,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    pub fn init_tables(&self) -> Result<(), AuthError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| AuthError::DbError(e.to_string()))?;
        {
            let _sessions = write_txn
                .open_table(SESSIONS_TABLE)
                .map_err(|e| AuthError::DbError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| AuthError::DbError(e.to_string()))?;
        Ok(())
    }

    pub fn create_session(&self, user_id: &str) -> Result<SessionToken, AuthError> {
        let token_str = generate_token();
        let now = unix_now();
        let session = SessionToken {
            token: token_str.clone(),
            user_id: user_id.to_string(),
            expires_at: now + self.session_ttl.as_secs(),
        };

        let txn = self
            .db
            .begin_write()
            .map_err(|e| AuthError::DbError(e.to_string()))?;
        {
            let mut table = txn
                .open_table(SESSIONS_TABLE)
                .map_err(|e| AuthError::DbError(e.to_string()))?;
            let bytes =
                bincode::serialize(&session).map_err(|e| AuthError::DbError(e.to_string()))?;
            table
                .insert(token_str.as_str(), bytes.as_slice())
                .map_err(|e| AuthError::DbError(e.to_string()))?;
        }
        txn.commit().map_err(|e| AuthError::DbError(e.to_string()))?;

        Ok(session)
    }

    pub fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| AuthError::DbError(e.to_string()))?;
        {
            let mut table = txn
                .open_table(SESSIONS_TABLE)
                .map_err(|e| AuthError::DbError(e.to_string()))?;
            table
                .remove(token)
                .map_err(|e| AuthError::DbError(e.to_string()))?;
        }
        txn.commit().map_err(|e| AuthError::DbError(e.to_string()))?;
        Ok(())
    }

    pub fn user_id_from_token(&self, token: &str) -> Result<Option<String>, AuthError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| AuthError::DbError(e.to_string()))?;
        let sessions = read_txn
            .open_table(SESSIONS_TABLE)
            .map_err(|e| AuthError::DbError(e.to_string()))?;

        let session = match sessions
            .get(token)
            .map_err(|e: StorageError| AuthError::DbError(e.to_string()))?
        {
            Some(value) => {
                let session: SessionToken = bincode::deserialize(value.value())
                    .map_err(|e| AuthError::DbError(e.to_string()))?;
                session
            }
            None => return Ok(None),
        };

        if session.expires_at < unix_now() {
            return Ok(None);
        }
        Ok(Some(session.user_id))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            let chars = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
            chars[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{generate_token, SessionStore};

    fn store(dir: &TempDir, ttl: Duration) -> SessionStore {
        let db = Arc::new(redb::Database::create(dir.path().join("auth.redb")).unwrap());
        let store = SessionStore::new(db, ttl);
        store.init_tables().unwrap();
        store
    }

    #[test]
    fn tokens_resolve_until_revoked() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Duration::from_secs(3600));
        let session = store.create_session("user-1").unwrap();

        assert_eq!(
            store.user_id_from_token(&session.token).unwrap().as_deref(),
            Some("user-1")
        );

        store.revoke_session(&session.token).unwrap();
        assert!(store.user_id_from_token(&session.token).unwrap().is_none());
    }

    #[test]
    fn expired_tokens_stop_resolving() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Duration::from_secs(0));
        let session = store.create_session("user-1").unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.user_id_from_token(&session.token).unwrap().is_none());
    }

    #[test]
    fn tokens_are_32_alphanumeric_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
