//! SQLite account repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ldapgate_core::types::{AccountStatus, Authmap, LocalAccount, NewAccount};
use ldapgate_core::{Error, Result, SITE_OWNER_UID};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::traits::AccountStore;

const ACCOUNT_COLUMNS: &str =
    "uid, name, mail, pass, status, ldap_excluded, roles, created_at, last_login";

type AccountRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    i64,
    bool,
    String,
    String,
    Option<String>,
);

pub struct MetadataStore {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> Error {
    Error::DatabaseError(e.to_string())
}

/// Map uniqueness violations to a provisioning failure
fn provisioning_err(e: sqlx::Error, what: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::ProvisioningError(format!("{} already exists", what))
        }
        _ => db_err(e),
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::DatabaseError(format!("Invalid timestamp '{}': {}", value, e)))
}

fn account_from_row(r: AccountRow) -> Result<LocalAccount> {
    let roles: Vec<String> = serde_json::from_str(&r.6)
        .map_err(|e| Error::DatabaseError(format!("Invalid roles for uid {}: {}", r.0, e)))?;

    Ok(LocalAccount {
        uid: r.0,
        name: r.1,
        mail: r.2,
        pass_hash: r.3,
        status: AccountStatus::from_i64(r.4),
        ldap_excluded: r.5,
        roles,
        created_at: parse_ts(&r.7)?,
        last_login: r.8.as_deref().map(parse_ts).transpose()?,
    })
}

fn roles_json(roles: &[String]) -> Result<String> {
    serde_json::to_string(roles).map_err(|e| Error::InternalError(e.to_string()))
}

impl MetadataStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 16).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        // Every connection to an in-memory database sees its own empty
        // database, so the pool must hold exactly one that never expires.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = options.connect(database_url).await.map_err(db_err)?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                mail TEXT,
                pass TEXT,
                status INTEGER NOT NULL DEFAULT 1,
                ldap_excluded INTEGER NOT NULL DEFAULT 0,
                roles TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // Reserve uid 1 for the site owner
        sqlx::query(
            r#"
            INSERT INTO sqlite_sequence (name, seq)
            SELECT 'users', 1
            WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = 'users')
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS authmap (
                aid INTEGER PRIMARY KEY AUTOINCREMENT,
                uid INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
                module TEXT NOT NULL,
                authname TEXT NOT NULL,
                UNIQUE (module, authname)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_authmap_uid ON authmap(uid, module)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_config (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Account store initialized");
        Ok(())
    }

    async fn fetch_account(&self, sql: &str, bind: &str) -> Result<Option<LocalAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(account_from_row).transpose()
    }
}

#[async_trait]
impl AccountStore for MetadataStore {
    async fn create_account(&self, account: &NewAccount) -> Result<LocalAccount> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, mail, pass, status, ldap_excluded, roles, created_at)
            VALUES (?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&account.name)
        .bind(&account.mail)
        .bind(&account.pass_hash)
        .bind(account.ldap_excluded)
        .bind(roles_json(&account.roles)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| provisioning_err(e, &format!("Account '{}'", account.name)))?;

        let uid = result.last_insert_rowid();
        debug!(uid, name = %account.name, "Created account");

        self.get_account(uid)
            .await?
            .ok_or_else(|| Error::InternalError(format!("Account {} vanished after insert", uid)))
    }

    async fn ensure_site_owner(&self, account: &NewAccount) -> Result<LocalAccount> {
        if let Some(owner) = self.get_account(SITE_OWNER_UID).await? {
            return Ok(owner);
        }

        sqlx::query(
            r#"
            INSERT INTO users (uid, name, mail, pass, status, ldap_excluded, roles, created_at)
            VALUES (?, ?, ?, ?, 1, 0, ?, ?)
            "#,
        )
        .bind(SITE_OWNER_UID)
        .bind(&account.name)
        .bind(&account.mail)
        .bind(&account.pass_hash)
        .bind(roles_json(&account.roles)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| provisioning_err(e, &format!("Account '{}'", account.name)))?;

        info!(name = %account.name, "Created site owner account");

        self.get_account(SITE_OWNER_UID)
            .await?
            .ok_or_else(|| Error::InternalError("Site owner vanished after insert".into()))
    }

    async fn get_account(&self, uid: i64) -> Result<Option<LocalAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE uid = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(account_from_row).transpose()
    }

    async fn get_account_by_name(&self, name: &str) -> Result<Option<LocalAccount>> {
        self.fetch_account(
            &format!("SELECT {} FROM users WHERE name = ?", ACCOUNT_COLUMNS),
            name.trim(),
        )
        .await
    }

    async fn list_accounts(&self) -> Result<Vec<LocalAccount>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY uid", ACCOUNT_COLUMNS))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter().map(account_from_row).collect()
    }

    async fn update_mail(&self, uid: i64, mail: Option<&str>) -> Result<()> {
        sqlx::query(r#"UPDATE users SET mail = ? WHERE uid = ?"#)
            .bind(mail)
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        debug!(uid, "Updated account mail");
        Ok(())
    }

    async fn update_roles(&self, uid: i64, roles: &[String]) -> Result<()> {
        sqlx::query(r#"UPDATE users SET roles = ? WHERE uid = ?"#)
            .bind(roles_json(roles)?)
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        debug!(uid, roles = ?roles, "Updated account roles");
        Ok(())
    }

    async fn set_status(&self, uid: i64, status: AccountStatus) -> Result<()> {
        sqlx::query(r#"UPDATE users SET status = ? WHERE uid = ?"#)
            .bind(status.as_i64())
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn set_ldap_excluded(&self, uid: i64, excluded: bool) -> Result<()> {
        sqlx::query(r#"UPDATE users SET ldap_excluded = ? WHERE uid = ?"#)
            .bind(excluded)
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn touch_login(&self, uid: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(r#"UPDATE users SET last_login = ? WHERE uid = ?"#)
            .bind(at.to_rfc3339())
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn get_account_by_authname(
        &self,
        module: &str,
        authname: &str,
    ) -> Result<Option<LocalAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT u.uid, u.name, u.mail, u.pass, u.status, u.ldap_excluded, u.roles,
                   u.created_at, u.last_login
            FROM authmap a
            JOIN users u ON u.uid = a.uid
            WHERE a.module = ? AND a.authname = ?
            "#,
        )
        .bind(module)
        .bind(authname)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(account_from_row).transpose()
    }

    async fn get_authmap(&self, uid: i64, module: &str) -> Result<Option<Authmap>> {
        let row: Option<(i64, i64, String, String)> = sqlx::query_as(
            r#"SELECT aid, uid, module, authname FROM authmap WHERE uid = ? AND module = ?"#,
        )
        .bind(uid)
        .bind(module)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Authmap {
            aid: r.0,
            uid: r.1,
            module: r.2,
            authname: r.3,
        }))
    }

    async fn create_authmap(&self, uid: i64, module: &str, authname: &str) -> Result<Authmap> {
        let result = sqlx::query(r#"INSERT INTO authmap (uid, module, authname) VALUES (?, ?, ?)"#)
            .bind(uid)
            .bind(module)
            .bind(authname)
            .execute(&self.pool)
            .await
            .map_err(|e| provisioning_err(e, &format!("Authmap for '{}'", authname)))?;

        debug!(uid, module, authname, "Created authmap");

        Ok(Authmap {
            aid: result.last_insert_rowid(),
            uid,
            module: module.to_string(),
            authname: authname.to_string(),
        })
    }

    async fn provision_account(
        &self,
        account: &NewAccount,
        module: &str,
        authname: &str,
    ) -> Result<LocalAccount> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (name, mail, pass, status, ldap_excluded, roles, created_at)
            VALUES (?, ?, ?, 1, 0, ?, ?)
            "#,
        )
        .bind(&account.name)
        .bind(&account.mail)
        .bind(&account.pass_hash)
        .bind(roles_json(&account.roles)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| provisioning_err(e, &format!("Account '{}'", account.name)))?;

        let uid = result.last_insert_rowid();

        sqlx::query(r#"INSERT INTO authmap (uid, module, authname) VALUES (?, ?, ?)"#)
            .bind(uid)
            .bind(module)
            .bind(authname)
            .execute(&mut *tx)
            .await
            .map_err(|e| provisioning_err(e, &format!("Authmap for '{}'", authname)))?;

        tx.commit().await.map_err(db_err)?;

        info!(uid, name = %account.name, authname, "Provisioned account");

        self.get_account(uid)
            .await?
            .ok_or_else(|| Error::InternalError(format!("Account {} vanished after insert", uid)))
    }

    async fn put_site_config(&self, name: &str, json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO site_config (name, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(name, "Stored site config");
        Ok(())
    }

    async fn get_site_config(&self, name: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT value FROM site_config WHERE name = ?"#)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(row.map(|r| r.0))
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
