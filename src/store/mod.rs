//! SQLite-backed persistence for the package catalog.
//!
//! One connection behind a mutex; WAL journal mode for concurrent readers;
//! the schema is created idempotently at startup.

pub mod models;

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};

use models::{AurInfo, MergedPackage, NewPackage, PackageInfo, UpdateState, UpstreamInfo};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("package '{0}' already exists")]
    DuplicateName(String),

    #[error("package {0} not found")]
    PackageNotFound(i64),
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("opening database at {:?}", db_path);
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        debug!("database ready");
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS package_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                upstream_url TEXT NOT NULL,
                upstream_checker TEXT NOT NULL DEFAULT '',
                version_extract_key TEXT NOT NULL DEFAULT '',
                check_test_version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS aur_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package_id INTEGER NOT NULL UNIQUE,
                aur_version TEXT NOT NULL DEFAULT '',
                upstream_version_ref TEXT NOT NULL DEFAULT '',
                aur_create_date TEXT,
                aur_update_date TEXT,
                aur_update_state INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (package_id) REFERENCES package_info(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS upstream_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package_id INTEGER NOT NULL UNIQUE,
                upstream_version TEXT NOT NULL DEFAULT '',
                upstream_update_date TEXT,
                upstream_update_state INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (package_id) REFERENCES package_info(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        Ok(())
    }

    // ----- package_info -----

    pub fn create_package(&self, new: &NewPackage) -> Result<PackageInfo, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM package_info WHERE name = ?1",
                [&new.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateName(new.name.clone()));
        }

        conn.execute(
            r#"
            INSERT INTO package_info
                (name, upstream_url, upstream_checker, version_extract_key,
                 check_test_version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                new.name,
                new.upstream_url,
                new.upstream_checker,
                new.version_extract_key,
                new.check_test_version as i64,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            "SELECT * FROM package_info WHERE id = ?1",
            [id],
            package_from_row,
        )
        .map_err(StoreError::from)
    }

    pub fn update_package(&self, id: i64, new: &NewPackage) -> Result<PackageInfo, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            r#"
            UPDATE package_info
            SET name = ?1, upstream_url = ?2, upstream_checker = ?3,
                version_extract_key = ?4, check_test_version = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
            params![
                new.name,
                new.upstream_url,
                new.upstream_checker,
                new.version_extract_key,
                new.check_test_version as i64,
                now.to_rfc3339(),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::PackageNotFound(id));
        }

        conn.query_row(
            "SELECT * FROM package_info WHERE id = ?1",
            [id],
            package_from_row,
        )
        .map_err(StoreError::from)
    }

    pub fn delete_package(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM package_info WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::PackageNotFound(id));
        }
        Ok(())
    }

    pub fn get_package(&self, id: i64) -> Result<Option<PackageInfo>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM package_info WHERE id = ?1",
            [id],
            package_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn list_packages(&self) -> Result<Vec<PackageInfo>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM package_info ORDER BY name")?;
        let packages = stmt
            .query_map([], package_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Packages joined with whatever state rows exist for them.
    pub fn list_merged(&self) -> Result<Vec<MergedPackage>, StoreError> {
        let packages = self.list_packages()?;
        packages
            .into_iter()
            .map(|package| {
                let aur = self.get_aur_info(package.id)?;
                let upstream = self.get_upstream_info(package.id)?;
                Ok(MergedPackage {
                    package,
                    aur,
                    upstream,
                })
            })
            .collect()
    }

    pub fn get_merged(&self, id: i64) -> Result<Option<MergedPackage>, StoreError> {
        let Some(package) = self.get_package(id)? else {
            return Ok(None);
        };
        let aur = self.get_aur_info(package.id)?;
        let upstream = self.get_upstream_info(package.id)?;
        Ok(Some(MergedPackage {
            package,
            aur,
            upstream,
        }))
    }

    // ----- aur_info -----

    pub fn get_aur_info(&self, package_id: i64) -> Result<Option<AurInfo>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM aur_info WHERE package_id = ?1",
            [package_id],
            aur_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Record the outcome of an AUR-side refresh, creating the state row on
    /// first contact.
    pub fn upsert_aur_info(
        &self,
        package_id: i64,
        aur_version: &str,
        upstream_version_ref: &str,
        create_date: Option<chrono::DateTime<Utc>>,
        update_date: Option<chrono::DateTime<Utc>>,
        state: UpdateState,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO aur_info
                (package_id, aur_version, upstream_version_ref, aur_create_date,
                 aur_update_date, aur_update_state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(package_id) DO UPDATE SET
                aur_version = excluded.aur_version,
                upstream_version_ref = excluded.upstream_version_ref,
                aur_create_date = excluded.aur_create_date,
                aur_update_date = excluded.aur_update_date,
                aur_update_state = excluded.aur_update_state,
                updated_at = excluded.updated_at
            "#,
            params![
                package_id,
                aur_version,
                upstream_version_ref,
                create_date.map(|d| d.to_rfc3339()),
                update_date.map(|d| d.to_rfc3339()),
                state.as_i64(),
                now,
            ],
        )?;
        Ok(())
    }

    /// Mark an AUR refresh as failed without touching the recorded version.
    pub fn mark_aur_failed(&self, package_id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO aur_info
                (package_id, aur_update_state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(package_id) DO UPDATE SET
                aur_update_state = excluded.aur_update_state,
                updated_at = excluded.updated_at
            "#,
            params![package_id, UpdateState::Fail.as_i64(), now],
        )?;
        Ok(())
    }

    // ----- upstream_info -----

    pub fn get_upstream_info(&self, package_id: i64) -> Result<Option<UpstreamInfo>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM upstream_info WHERE package_id = ?1",
            [package_id],
            upstream_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Record the outcome of an upstream refresh.
    pub fn upsert_upstream_info(
        &self,
        package_id: i64,
        upstream_version: &str,
        state: UpdateState,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO upstream_info
                (package_id, upstream_version, upstream_update_date,
                 upstream_update_state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?3, ?3)
            ON CONFLICT(package_id) DO UPDATE SET
                upstream_version = CASE
                    WHEN excluded.upstream_version != '' THEN excluded.upstream_version
                    ELSE upstream_info.upstream_version
                END,
                upstream_update_date = excluded.upstream_update_date,
                upstream_update_state = excluded.upstream_update_state,
                updated_at = excluded.updated_at
            "#,
            params![package_id, upstream_version, now, state.as_i64()],
        )?;
        Ok(())
    }
}

fn parse_date(value: Option<String>) -> Option<chrono::DateTime<Utc>> {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn required_date(value: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

fn package_from_row(row: &Row<'_>) -> rusqlite::Result<PackageInfo> {
    Ok(PackageInfo {
        id: row.get("id")?,
        name: row.get("name")?,
        upstream_url: row.get("upstream_url")?,
        upstream_checker: row.get("upstream_checker")?,
        version_extract_key: row.get("version_extract_key")?,
        check_test_version: row.get::<_, i64>("check_test_version")? != 0,
        created_at: required_date(row.get("created_at")?),
        updated_at: required_date(row.get("updated_at")?),
    })
}

fn aur_from_row(row: &Row<'_>) -> rusqlite::Result<AurInfo> {
    Ok(AurInfo {
        id: row.get("id")?,
        package_id: row.get("package_id")?,
        aur_version: row.get("aur_version")?,
        upstream_version_ref: row.get("upstream_version_ref")?,
        aur_create_date: parse_date(row.get("aur_create_date")?),
        aur_update_date: parse_date(row.get("aur_update_date")?),
        aur_update_state: UpdateState::from_i64(row.get("aur_update_state")?),
        created_at: required_date(row.get("created_at")?),
        updated_at: required_date(row.get("updated_at")?),
    })
}

fn upstream_from_row(row: &Row<'_>) -> rusqlite::Result<UpstreamInfo> {
    Ok(UpstreamInfo {
        id: row.get("id")?,
        package_id: row.get("package_id")?,
        upstream_version: row.get("upstream_version")?,
        upstream_update_date: parse_date(row.get("upstream_update_date")?),
        upstream_update_state: UpdateState::from_i64(row.get("upstream_update_state")?),
        created_at: required_date(row.get("created_at")?),
        updated_at: required_date(row.get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_package(name: &str) -> NewPackage {
        NewPackage {
            name: name.to_string(),
            upstream_url: format!("https://github.com/example/{name}"),
            upstream_checker: "github".to_string(),
            version_extract_key: String::new(),
            check_test_version: false,
        }
    }

    #[test]
    fn package_crud_round_trips() {
        let store = Store::open_in_memory().unwrap();

        let created = store.create_package(&new_package("ripgrep")).unwrap();
        assert_eq!(created.name, "ripgrep");
        assert_eq!(created.upstream_checker, "github");

        let fetched = store.get_package(created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "ripgrep");

        let mut update = new_package("ripgrep");
        update.version_extract_key = "v(.*)".to_string();
        let updated = store.update_package(created.id, &update).unwrap();
        assert_eq!(updated.version_extract_key, "v(.*)");

        store.delete_package(created.id).unwrap();
        assert!(store.get_package(created.id).unwrap().is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.create_package(&new_package("fd")).unwrap();
        let err = store.create_package(&new_package("fd")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
    }

    #[test]
    fn missing_ids_surface_as_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.delete_package(99),
            Err(StoreError::PackageNotFound(99))
        ));
        assert!(matches!(
            store.update_package(99, &new_package("x")),
            Err(StoreError::PackageNotFound(99))
        ));
    }

    #[test]
    fn aur_state_upserts_and_merges() {
        let store = Store::open_in_memory().unwrap();
        let package = store.create_package(&new_package("bat")).unwrap();

        store
            .upsert_aur_info(package.id, "0.24.0-1", "a.b.c", None, None, UpdateState::Ok)
            .unwrap();
        store
            .upsert_upstream_info(package.id, "0.24.0", UpdateState::Ok)
            .unwrap();

        let merged = store.get_merged(package.id).unwrap().unwrap();
        let aur = merged.aur.unwrap();
        assert_eq!(aur.aur_version, "0.24.0-1");
        assert_eq!(aur.upstream_version_ref, "a.b.c");
        assert_eq!(aur.aur_update_state, UpdateState::Ok);
        let upstream = merged.upstream.unwrap();
        assert_eq!(upstream.upstream_version, "0.24.0");

        // A failure keeps the last good version.
        store
            .upsert_upstream_info(package.id, "", UpdateState::Fail)
            .unwrap();
        let merged = store.get_merged(package.id).unwrap().unwrap();
        let upstream = merged.upstream.unwrap();
        assert_eq!(upstream.upstream_version, "0.24.0");
        assert_eq!(upstream.upstream_update_state, UpdateState::Fail);
    }

    #[test]
    fn deleting_a_package_cascades_to_state_rows() {
        let store = Store::open_in_memory().unwrap();
        let package = store.create_package(&new_package("exa")).unwrap();
        store
            .upsert_aur_info(package.id, "1.0.0-1", "a.b.c", None, None, UpdateState::Ok)
            .unwrap();

        store.delete_package(package.id).unwrap();
        assert!(store.get_aur_info(package.id).unwrap().is_none());
    }

    #[test]
    fn schema_creation_is_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.db");
        {
            let store = Store::open(&path).unwrap();
            store.create_package(&new_package("zoxide")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_packages().unwrap().len(), 1);
    }
}
