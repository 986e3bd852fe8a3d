use async_trait::async_trait;
use authz::{Claim, Principal, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::directory::{DirectoryOutcome, DirectoryResult, PrincipalDirectory};
use crate::error::DirectoryError;

/// Configuration for the directory database
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/backoffice/directory.db"),
            max_connections: 5,
            connection_timeout: 30,
        }
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        DirectoryError::new(err.to_string())
    }
}

fn outcome_of<T>(result: Result<T, sqlx::Error>) -> DirectoryOutcome {
    match result {
        Ok(_) => DirectoryOutcome::success(),
        Err(e) => DirectoryOutcome::failed([e.to_string()]),
    }
}

/// Principal directory persisted in SQLite.
///
/// Role membership and claims hang off the users table with cascading
/// deletes, so deleting a role detaches it from everyone in one statement.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: Pool<Sqlite>,
}

impl SqliteDirectory {
    /// Open (or create) the directory database and run migrations
    pub async fn connect(config: &DirectoryConfig) -> DirectoryResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DirectoryError::new(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_with(options)
            .await?;

        info!(
            "Principal directory opened at: {}",
            config.database_path.display()
        );

        let directory = Self { pool };
        directory.run_migrations().await?;
        Ok(directory)
    }

    /// Private in-memory database. A single connection that is never
    /// recycled keeps the data alive for the lifetime of the pool.
    pub async fn in_memory() -> DirectoryResult<Self> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let directory = Self { pool };
        directory.run_migrations().await?;
        Ok(directory)
    }

    async fn run_migrations(&self) -> DirectoryResult<()> {
        info!("Running principal directory migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                assigned_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, role_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Claim types repeat per user, so rows are keyed by a surrogate id
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                claim_type TEXT NOT NULL,
                claim_value TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_roles_role ON user_roles(role_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_claims_user ON user_claims(user_id)")
            .execute(&self.pool)
            .await?;

        info!("Principal directory migrations completed");
        Ok(())
    }

    /// Insert a principal with its roles and claims in one transaction.
    /// Roles unknown to the directory are created with the given id.
    pub async fn add_principal(&self, principal: &Principal) -> DirectoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, username, email) VALUES (?, ?, ?)")
            .bind(&principal.id)
            .bind(&principal.display_name)
            .bind(&principal.email)
            .execute(&mut *tx)
            .await?;

        for role in &principal.roles {
            sqlx::query("INSERT OR IGNORE INTO roles (id, name) VALUES (?, ?)")
                .bind(&role.id)
                .bind(&role.name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(&principal.id)
                .bind(&role.id)
                .execute(&mut *tx)
                .await?;
        }

        for claim in &principal.claims {
            sqlx::query(
                "INSERT INTO user_claims (user_id, claim_type, claim_value) VALUES (?, ?, ?)",
            )
            .bind(&principal.id)
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Directory: added principal {}", principal.id);
        Ok(())
    }

    async fn user_exists(&self, principal_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(principal_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Roles and claims for one user row, read on the caller's connection so
    /// a transaction sees a single snapshot.
    async fn load_principal(
        conn: &mut SqliteConnection,
        id: String,
        username: String,
        email: Option<String>,
    ) -> DirectoryResult<Principal> {
        let roles = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT r.id, r.name FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(&id)
        .fetch_all(&mut *conn)
        .await?;

        let claims = sqlx::query_as::<_, (String, String)>(
            "SELECT claim_type, claim_value FROM user_claims WHERE user_id = ? ORDER BY id",
        )
        .bind(&id)
        .fetch_all(&mut *conn)
        .await?;

        let mut principal = Principal::new(id, username);
        principal.email = email;
        principal.roles = roles
            .into_iter()
            .map(|(id, name)| Role::new(id, name))
            .collect();
        principal.claims = claims
            .into_iter()
            .map(|(claim_type, value)| Claim::new(claim_type, value))
            .collect();
        Ok(principal)
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Principal directory connection closed");
    }
}

#[async_trait]
impl PrincipalDirectory for SqliteDirectory {
    async fn find_principal(&self, principal_id: &str) -> DirectoryResult<Option<Principal>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT id, username, email FROM users WHERE id = ?",
        )
        .bind(principal_id)
        .fetch_optional(&mut *tx)
        .await?;

        let principal = match row {
            Some((id, username, email)) => {
                Some(Self::load_principal(&mut tx, id, username, email).await?)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(principal)
    }

    async fn principals(&self) -> DirectoryResult<Vec<Principal>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT id, username, email FROM users ORDER BY username",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut principals = Vec::with_capacity(rows.len());
        for (id, username, email) in rows {
            principals.push(Self::load_principal(&mut tx, id, username, email).await?);
        }

        tx.commit().await?;
        Ok(principals)
    }

    async fn find_role(&self, role_id: &str) -> DirectoryResult<Option<Role>> {
        let row = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM roles WHERE id = ?")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, name)| Role::new(id, name)))
    }

    async fn find_role_by_name(&self, name: &str) -> DirectoryResult<Option<Role>> {
        let row =
            sqlx::query_as::<_, (String, String)>("SELECT id, name FROM roles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| Role::new(id, name)))
    }

    async fn roles(&self) -> DirectoryResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Role::new(id, name))
            .collect())
    }

    async fn is_member(&self, principal_id: &str, role_id: &str) -> DirectoryResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_roles WHERE user_id = ? AND role_id = ?)",
        )
        .bind(principal_id)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_role(&self, role: &Role) -> DirectoryOutcome {
        outcome_of(
            sqlx::query("INSERT INTO roles (id, name) VALUES (?, ?)")
                .bind(&role.id)
                .bind(&role.name)
                .execute(&self.pool)
                .await,
        )
    }

    async fn update_role(&self, role: &Role) -> DirectoryOutcome {
        let result = sqlx::query(
            "UPDATE roles SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&role.name)
        .bind(&role.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                DirectoryOutcome::failed([format!("Role '{}' not found", role.id)])
            }
            other => outcome_of(other),
        }
    }

    async fn delete_role(&self, role_id: &str) -> DirectoryOutcome {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(role_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                DirectoryOutcome::failed([format!("Role '{}' not found", role_id)])
            }
            other => outcome_of(other),
        }
    }

    async fn add_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome {
        outcome_of(
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(principal_id)
                .bind(role_id)
                .execute(&self.pool)
                .await,
        )
    }

    async fn remove_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(principal_id)
            .bind(role_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => DirectoryOutcome::failed([format!(
                "Principal '{}' is not in role '{}'",
                principal_id, role_id
            )]),
            other => outcome_of(other),
        }
    }

    async fn attach_claim(&self, principal_id: &str, claim: &Claim) -> DirectoryOutcome {
        match self.user_exists(principal_id).await {
            Ok(true) => {}
            Ok(false) => {
                return DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)])
            }
            Err(e) => return DirectoryOutcome::failed([e.to_string()]),
        }

        outcome_of(
            sqlx::query(
                "INSERT INTO user_claims (user_id, claim_type, claim_value) VALUES (?, ?, ?)",
            )
            .bind(principal_id)
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .execute(&self.pool)
            .await,
        )
    }

    async fn detach_claims(&self, principal_id: &str, claim_type: &str) -> DirectoryOutcome {
        match self.user_exists(principal_id).await {
            Ok(true) => {}
            Ok(false) => {
                return DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)])
            }
            Err(e) => return DirectoryOutcome::failed([e.to_string()]),
        }

        outcome_of(
            sqlx::query("DELETE FROM user_claims WHERE user_id = ? AND claim_type = ?")
                .bind(principal_id)
                .bind(claim_type)
                .execute(&self.pool)
                .await,
        )
    }

    async fn update_principal(&self, principal: &Principal) -> DirectoryOutcome {
        let result = sqlx::query("UPDATE users SET username = ?, email = ? WHERE id = ?")
            .bind(&principal.display_name)
            .bind(&principal.email)
            .bind(&principal.id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                DirectoryOutcome::failed([format!("Principal '{}' not found", principal.id)])
            }
            other => outcome_of(other),
        }
    }

    async fn delete_principal(&self, principal_id: &str) -> DirectoryOutcome {
        // Memberships and claims go with the user row
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(principal_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)])
            }
            Ok(_) => {
                debug!("Directory: deleted principal {}", principal_id);
                DirectoryOutcome::success()
            }
            Err(e) => DirectoryOutcome::failed([e.to_string()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dave() -> Principal {
        Principal::new("u1", "dave")
            .with_email("dave@example.com")
            .with_role(Role::new("r1", "Administrators"))
            .with_claim("Edit Albums", "Edit Albums")
            .with_claim("Edit Albums", "second")
    }

    #[tokio::test]
    async fn test_file_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("directory.db");

        let config = DirectoryConfig {
            database_path: db_path.clone(),
            ..DirectoryConfig::default()
        };

        let directory = SqliteDirectory::connect(&config).await.unwrap();
        assert!(db_path.exists());
        assert!(directory.roles().await.unwrap().is_empty());
        directory.close().await;

        // Reopening runs the migrations again without error
        let directory = SqliteDirectory::connect(&config).await.unwrap();
        directory.close().await;
    }

    #[tokio::test]
    async fn test_principal_snapshot() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.add_principal(&dave()).await.unwrap();

        let principal = directory.find_principal("u1").await.unwrap().unwrap();
        assert_eq!(principal, dave());
        assert!(directory.find_principal("nobody").await.unwrap().is_none());
        assert_eq!(directory.principals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_role_cascades_to_members() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.add_principal(&dave()).await.unwrap();

        assert!(directory.is_member("u1", "r1").await.unwrap());
        assert!(directory.delete_role("r1").await.succeeded);
        assert!(!directory.is_member("u1", "r1").await.unwrap());

        let outcome = directory.delete_role("r1").await;
        assert_eq!(outcome.errors, vec!["Role 'r1' not found"]);
    }

    #[tokio::test]
    async fn test_duplicate_role_name_rejected() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        assert!(directory.create_role(&Role::new("r1", "Editors")).await.succeeded);
        let outcome = directory.create_role(&Role::new("r2", "Editors")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_claims_detach_by_type() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.add_principal(&dave()).await.unwrap();

        assert!(directory
            .attach_claim("u1", &Claim::new("Delete Albums", "Delete Albums"))
            .await
            .succeeded);
        assert!(directory.detach_claims("u1", "Edit Albums").await.succeeded);

        let principal = directory.find_principal("u1").await.unwrap().unwrap();
        assert_eq!(principal.claims, vec![Claim::new("Delete Albums", "Delete Albums")]);

        let outcome = directory.attach_claim("ghost", &Claim::new("x", "x")).await;
        assert_eq!(outcome.errors, vec!["Principal 'ghost' not found"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_principal() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.add_principal(&dave()).await.unwrap();

        let edited = Principal::new("u1", "David").with_email("david@126.com");
        assert!(directory.update_principal(&edited).await.succeeded);
        let principal = directory.find_principal("u1").await.unwrap().unwrap();
        assert_eq!(principal.display_name, "David");
        assert_eq!(principal.email.as_deref(), Some("david@126.com"));
        assert_eq!(principal.claims.len(), 2);

        let outcome = directory
            .update_principal(&Principal::new("ghost", "nobody"))
            .await;
        assert_eq!(outcome.errors, vec!["Principal 'ghost' not found"]);

        assert!(directory.delete_principal("u1").await.succeeded);
        assert!(directory.find_principal("u1").await.unwrap().is_none());
        let orphans: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM user_roles) + (SELECT COUNT(*) FROM user_claims)",
        )
        .fetch_one(&directory.pool)
        .await
        .unwrap();
        assert_eq!(orphans, 0);
        assert!(directory.find_role("r1").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_snapshot_never_mixes_concurrent_edits() {
        let temp_dir = TempDir::new().unwrap();
        let config = DirectoryConfig {
            database_path: temp_dir.path().join("directory.db"),
            ..DirectoryConfig::default()
        };
        let directory = SqliteDirectory::connect(&config).await.unwrap();
        directory
            .add_principal(&Principal::new("u1", "erin"))
            .await
            .unwrap();
        directory.create_role(&Role::new("r1", "Editors")).await;

        // Membership and claim always change together
        let writer = {
            let pool = directory.pool.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let mut tx = pool.begin().await.unwrap();
                    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ('u1', 'r1')")
                        .execute(&mut *tx)
                        .await
                        .unwrap();
                    sqlx::query(
                        "INSERT INTO user_claims (user_id, claim_type, claim_value) VALUES ('u1', 'Edit Albums', 'Edit Albums')",
                    )
                    .execute(&mut *tx)
                    .await
                    .unwrap();
                    tx.commit().await.unwrap();

                    let mut tx = pool.begin().await.unwrap();
                    sqlx::query("DELETE FROM user_roles WHERE user_id = 'u1'")
                        .execute(&mut *tx)
                        .await
                        .unwrap();
                    sqlx::query("DELETE FROM user_claims WHERE user_id = 'u1'")
                        .execute(&mut *tx)
                        .await
                        .unwrap();
                    tx.commit().await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let principal = directory.find_principal("u1").await.unwrap().unwrap();
            assert_eq!(principal.roles.len(), principal.claims.len());
        }
        writer.await.unwrap();
        directory.close().await;
    }

    #[tokio::test]
    async fn test_remove_missing_membership_fails() {
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.add_principal(&dave()).await.unwrap();
        directory.create_role(&Role::new("r2", "Editors")).await;

        let outcome = directory.remove_member("u1", "r2").await;
        assert_eq!(outcome.errors, vec!["Principal 'u1' is not in role 'r2'"]);
    }
}
