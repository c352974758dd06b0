//! Database schema initialization.
//!
//! Timestamps are unix seconds supplied by the bot's clock, not SQLite's,
//! so period windows stay testable.

use sqlx::SqlitePool;

/// Create tables and indexes if they do not exist.
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    // Users
    //*******
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id integer PRIMARY KEY AUTOINCREMENT,
            discord_id text UNIQUE NOT NULL,
            username text,
            email text,
            created_at integer NOT NULL,
            updated_at integer NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await?;

    // Licenses
    //**********
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS licenses (
            id integer PRIMARY KEY AUTOINCREMENT,
            user_id integer NOT NULL REFERENCES users(id),
            license_key text UNIQUE NOT NULL,
            status text NOT NULL DEFAULT 'active',
            plan text NOT NULL DEFAULT 'standard',
            expires_at integer,
            application text,
            created_at integer NOT NULL,
            updated_at integer NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_licenses_user ON licenses(user_id)")
        .execute(&mut *tx)
        .await?;

    // Command log
    //*************
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS commands (
            id integer PRIMARY KEY AUTOINCREMENT,
            user_id integer NOT NULL REFERENCES users(id),
            command text NOT NULL,
            executed_at integer NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await?;

    // Validation log, append-only
    //*****************************
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS validations (
            id integer PRIMARY KEY AUTOINCREMENT,
            user_id integer NOT NULL REFERENCES users(id),
            license_key text NOT NULL,
            is_valid integer NOT NULL,
            created_at integer NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_validations_user_time ON validations(user_id, created_at)",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
