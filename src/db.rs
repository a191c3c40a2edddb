use std::{fs, path::Path, str::FromStr};

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};

use crate::{
    auth::{hash_password, new_id},
    config::AppConfig,
    models::{ReservationRow, RESERVATION_COLUMNS, ROLE_ADMIN},
};

pub async fn connect(config: &AppConfig) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    ensure_sqlite_dir(&config.database_url)?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the parent directory of a file-backed SQLite URL.
pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let Some(path) = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    let path = path.strip_prefix("file:").unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_admin(pool: &SqlitePool, config: &AppConfig) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    if config.admin_password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&config.admin_password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&config.admin_user)
    .bind(&config.admin_display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    log::info!("Seeded admin account {}", config.admin_user);
    Ok(())
}

/// Appends to the activity log. Failures are logged and swallowed: the log
/// never decides whether a request succeeds.
pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    reservation_id: Option<&str>,
) {
    let result = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, reservation_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(reservation_id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to record {kind} activity: {err}");
    }
}

pub async fn fetch_reservation(
    conn: &mut SqliteConnection,
    reservation_id: &str,
) -> Result<Option<ReservationRow>, sqlx::Error> {
    sqlx::query_as::<_, ReservationRow>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?"
    ))
    .bind(reservation_id)
    .fetch_optional(&mut *conn)
    .await
}

#[cfg(test)]
pub mod testing {
    //! In-memory database and account fixtures shared by the test modules.

    use std::time::Duration;

    use sqlx::sqlite::SqliteJournalMode;

    use super::*;
    use crate::{
        models::{ROLE_DOCTOR, ROLE_USER},
        slots::WorkingHours,
    };

    pub async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        // One connection: every `sqlite::memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    /// A file-backed database behind `connections` connections, so booking
    /// transactions really overlap. The directory must outlive the pool.
    pub async fn file_pool(connections: u32) -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("vetbook.db"))
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, pool)
    }

    pub async fn insert_account(pool: &SqlitePool, username: &str, role: &str, password: &str) -> String {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
               VALUES (?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(&id)
        .bind(username)
        .bind(username)
        .bind(role)
        .bind(hash_password(password).unwrap())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    /// A verified doctor charging `fee`, working Mondays 09:00-10:00.
    pub async fn insert_doctor(pool: &SqlitePool, username: &str, fee: f64) -> String {
        let id = insert_account(pool, username, ROLE_DOCTOR, "doctor-pass").await;
        sqlx::query(
            r#"INSERT INTO doctors (id, specialization, consultation_fee, slot_duration_minutes,
                                    is_active, is_verified, created_at)
               VALUES (?, 'general', ?, 30, 1, 1, ?)"#,
        )
        .bind(&id)
        .bind(fee)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
        crate::profiles::replace_working_hours(
            pool,
            &id,
            &[WorkingHours {
                weekday: 0,
                start_time: "09:00".into(),
                end_time: "10:00".into(),
                enabled: true,
            }],
        )
        .await
        .unwrap();
        id
    }

    pub async fn insert_owner_with_pet(pool: &SqlitePool, username: &str) -> (String, String) {
        let owner_id = insert_account(pool, username, ROLE_USER, "owner-pass").await;
        let pet = crate::profiles::create_pet(
            pool,
            &owner_id,
            crate::profiles::NewPet {
                name: "Biscuit".into(),
                species: "dog".into(),
                breed: Some("beagle".into()),
            },
        )
        .await
        .unwrap();
        (owner_id, pet.id)
    }

    pub fn monday() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_need_no_directory() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/db").is_ok());
    }

    #[tokio::test]
    async fn admin_is_seeded_once() {
        let pool = testing::memory_pool().await;
        let config = AppConfig::from_lookup(|_| None).unwrap();
        seed_admin(&pool, &config).await.unwrap();
        seed_admin(&pool, &config).await.unwrap();
        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
    }

    #[tokio::test]
    async fn activity_log_appends() {
        let pool = testing::memory_pool().await;
        log_activity(&pool, "test", "hello", None, None).await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
