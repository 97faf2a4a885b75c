//! SQLite session store.

use super::models::GameSessionRow;
use super::schema::game_sessions;
use super::{GameId, SessionPatch, SessionRecord, StateStore};
use crate::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

/// Schema migrations, applied when a store is opened.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Store backed by a SQLite file.
///
/// Opens one connection per call, on the blocking pool. Several processes
/// may share the same file; compare-and-set is a single guarded statement
/// and patches run in an immediate transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path` and runs pending
    /// migrations.
    ///
    /// `":memory:"` is not useful here: every call gets a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns a `Backend` error if the file cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path.as_ref()))]
    pub fn open(db_path: impl AsRef<str>) -> Result<Self, StoreError> {
        let store = Self {
            db_path: db_path.as_ref().to_string(),
        };
        let mut conn = store.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::backend(format!("Migrations failed: {}", e)))?;
        info!(path = %store.db_path, migrations = applied.len(), "SqliteStore opened");
        Ok(store)
    }

    /// Path of the database file.
    #[instrument(skip(self))]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::backend(format!("Failed to connect to '{}': {}", self.db_path, e))
        })?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .execute(&mut conn)?;
        Ok(conn)
    }

    /// Runs `f` with a fresh connection on the blocking pool.
    #[instrument(skip(self, f))]
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connection()?;
            f(&mut conn)
        })
        .await?
    }
}

fn load(conn: &mut SqliteConnection, game_id: &str) -> Result<Option<SessionRecord>, StoreError> {
    game_sessions::table
        .find(game_id)
        .select(GameSessionRow::as_select())
        .first(conn)
        .optional()?
        .map(GameSessionRow::into_record)
        .transpose()
}

#[async_trait]
impl StateStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, game_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let id = game_id.to_string();
        self.with_connection(move |conn| load(conn, &id)).await
    }

    #[instrument(skip(self, record))]
    async fn set(
        &self,
        game_id: &str,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError> {
        let id = game_id.to_string();
        self.with_connection(move |conn| {
            conn.immediate_transaction(|conn| {
                let version = load(conn, &id)?.map_or(0, |r| r.version) + 1;
                let stored = record.stamped(version);
                diesel::replace_into(game_sessions::table)
                    .values(&GameSessionRow::from_record(&id, &stored)?)
                    .execute(conn)?;
                debug!(game_id = %id, version, "Record set");
                Ok(stored)
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn update(
        &self,
        game_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        let id = game_id.to_string();
        self.with_connection(move |conn| {
            conn.immediate_transaction(|conn| {
                let mut record = load(conn, &id)?.ok_or_else(|| StoreError::not_found(&id))?;
                if let Some(expected) = patch.if_version
                    && record.version != expected
                {
                    return Err(StoreError::conflict(&id, expected));
                }

                patch.apply_to(&mut record);
                let stored = record.stamped(record.version + 1);
                diesel::update(game_sessions::table.find(&id))
                    .set(&GameSessionRow::from_record(&id, &stored)?)
                    .execute(conn)?;
                debug!(game_id = %id, version = stored.version, "Record updated");
                Ok(stored)
            })
        })
        .await
    }

    #[instrument(skip(self, record))]
    async fn compare_and_set(
        &self,
        game_id: &str,
        expected_version: u64,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError> {
        let id = game_id.to_string();
        self.with_connection(move |conn| {
            let stored = record.stamped(expected_version + 1);
            let row = GameSessionRow::from_record(&id, &stored)?;

            if expected_version == 0 {
                diesel::insert_into(game_sessions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| match StoreError::from(e) {
                        err if err.kind == StoreErrorKind::AlreadyExists => {
                            StoreError::already_exists(&id)
                        }
                        err => err,
                    })?;
            } else {
                let expected = i64::try_from(expected_version).map_err(|_| {
                    StoreError::backend(format!("Version {} overflows", expected_version))
                })?;
                let changed = diesel::update(
                    game_sessions::table
                        .filter(game_sessions::game_id.eq(&id))
                        .filter(game_sessions::version.eq(expected)),
                )
                .set(&row)
                .execute(conn)?;
                if changed == 0 {
                    return Err(StoreError::conflict(&id, expected_version));
                }
            }

            debug!(game_id = %id, version = stored.version, "Record swapped");
            Ok(stored)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<GameId>, StoreError> {
        self.with_connection(|conn| {
            Ok(game_sessions::table
                .select(game_sessions::game_id)
                .order(game_sessions::game_id.asc())
                .load::<String>(conn)?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn remove(&self, game_id: &str) -> Result<bool, StoreError> {
        let id = game_id.to_string();
        self.with_connection(move |conn| {
            let deleted = diesel::delete(game_sessions::table.find(&id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}
