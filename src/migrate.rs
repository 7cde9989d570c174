use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates the schema in the configured database. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Persons. Parent columns are plain text: the `child` table carries
    // the enforced parent → child relation.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS family_node (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            gender TEXT,
            birth TEXT,
            birthLocation TEXT,
            death TEXT,
            deathLocation TEXT,
            fatherId TEXT,
            motherId TEXT,
            occupation TEXT,
            profileImg TEXT,
            facts TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spouse (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            spouse_id TEXT NOT NULL,
            UNIQUE(node_id, spouse_id),
            FOREIGN KEY (node_id) REFERENCES family_node(id),
            FOREIGN KEY (spouse_id) REFERENCES family_node(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS child (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id TEXT NOT NULL,
            child_id TEXT NOT NULL,
            UNIQUE(parent_id, child_id),
            FOREIGN KEY (parent_id) REFERENCES family_node(id),
            FOREIGN KEY (child_id) REFERENCES family_node(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            userId TEXT NOT NULL,
            FOREIGN KEY (userId) REFERENCES family_node(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_child_child_id ON child(child_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_user_id ON documents(userId)")
        .execute(pool)
        .await?;

    Ok(())
}
