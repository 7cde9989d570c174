//! SQLite-backed [`FamilyStore`] implementation.
//!
//! Each trait method is a single statement against the schema created by
//! [`crate::migrate`]. Listing order is `rowid` order, i.e. insertion
//! order, so normalized output is stable between runs.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use family_tree_core::models::{ChildEdge, Gender, PersonRecord, SpouseEdge, UploadedDocument};
use family_tree_core::store::{matches_query, FamilyStore};

const PERSON_COLUMNS: &str = "id, name, gender, birth, birthLocation, death, deathLocation, \
                              fatherId, motherId, occupation, profileImg, facts";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn person_from_row(row: &SqliteRow) -> PersonRecord {
    let gender: Option<String> = row.get("gender");
    PersonRecord {
        id: row.get("id"),
        name: row.get("name"),
        gender: gender.map(|g| Gender::parse(&g)).unwrap_or_default(),
        birth: row.get("birth"),
        birth_location: row.get("birthLocation"),
        death: row.get("death"),
        death_location: row.get("deathLocation"),
        father_id: row.get("fatherId"),
        mother_id: row.get("motherId"),
        occupation: row.get("occupation"),
        profile_img: row.get("profileImg"),
        facts: row.get("facts"),
    }
}

fn document_from_row(row: &SqliteRow) -> UploadedDocument {
    UploadedDocument {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        user_id: row.get("userId"),
    }
}

#[async_trait]
impl FamilyStore for SqliteStore {
    async fn list_persons(&self) -> Result<Vec<PersonRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM family_node ORDER BY rowid",
            PERSON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(person_from_row).collect())
    }

    async fn list_spouse_edges(&self) -> Result<Vec<SpouseEdge>> {
        let rows = sqlx::query("SELECT node_id, spouse_id FROM spouse ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| SpouseEdge {
                node_id: row.get("node_id"),
                spouse_id: row.get("spouse_id"),
            })
            .collect())
    }

    async fn list_child_edges(&self) -> Result<Vec<ChildEdge>> {
        let rows = sqlx::query("SELECT parent_id, child_id FROM child ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ChildEdge {
                parent_id: row.get("parent_id"),
                child_id: row.get("child_id"),
            })
            .collect())
    }

    async fn get_person(&self, id: &str) -> Result<Option<PersonRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM family_node WHERE id = ?",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(person_from_row))
    }

    async fn insert_person(&self, person: &PersonRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO family_node (id, name, gender, birth, birthLocation, death,
                                     deathLocation, fatherId, motherId, occupation,
                                     profileImg, facts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&person.id)
        .bind(&person.name)
        .bind(person.gender.as_str())
        .bind(&person.birth)
        .bind(&person.birth_location)
        .bind(&person.death)
        .bind(&person.death_location)
        .bind(&person.father_id)
        .bind(&person.mother_id)
        .bind(&person.occupation)
        .bind(&person.profile_img)
        .bind(&person.facts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_person(&self, person: &PersonRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE family_node SET
                name = ?, gender = ?, birth = ?, birthLocation = ?, death = ?,
                deathLocation = ?, fatherId = ?, motherId = ?, occupation = ?,
                profileImg = ?, facts = ?
            WHERE id = ?
            "#,
        )
        .bind(&person.name)
        .bind(person.gender.as_str())
        .bind(&person.birth)
        .bind(&person.birth_location)
        .bind(&person.death)
        .bind(&person.death_location)
        .bind(&person.father_id)
        .bind(&person.mother_id)
        .bind(&person.occupation)
        .bind(&person.profile_img)
        .bind(&person.facts)
        .bind(&person.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(family_tree_core::error::FamilyError::not_found(format!(
                "family member {}",
                person.id
            ))
            .into());
        }
        Ok(())
    }

    async fn insert_child_edge(&self, edge: &ChildEdge) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO child (parent_id, child_id) VALUES (?, ?)")
            .bind(&edge.parent_id)
            .bind(&edge.child_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_child_edge(&self, edge: &ChildEdge) -> Result<bool> {
        let result = sqlx::query("DELETE FROM child WHERE parent_id = ? AND child_id = ?")
            .bind(&edge.parent_id)
            .bind(&edge.child_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_spouse_edge(&self, edge: &SpouseEdge) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO spouse (node_id, spouse_id) VALUES (?, ?)")
                .bind(&edge.node_id)
                .bind(&edge.spouse_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// SQLite `LIKE` only folds ASCII case, so the filter runs in
    /// process with the same predicate as the in-memory store.
    async fn search_persons(&self, query: &str) -> Result<Vec<PersonRecord>> {
        let persons = self.list_persons().await?;
        Ok(persons
            .into_iter()
            .filter(|person| matches_query(person, query))
            .collect())
    }

    async fn get_document_for_owner(&self, owner_id: &str) -> Result<Option<UploadedDocument>> {
        let row = sqlx::query(
            "SELECT id, name, url, userId FROM documents WHERE userId = ? ORDER BY rowid LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn insert_document(&self, doc: &UploadedDocument) -> Result<()> {
        sqlx::query("INSERT INTO documents (id, name, url, userId) VALUES (?, ?, ?, ?)")
            .bind(&doc.id)
            .bind(&doc.name)
            .bind(&doc.url)
            .bind(&doc.user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<Option<UploadedDocument>> {
        let row = sqlx::query("DELETE FROM documents WHERE id = ? RETURNING id, name, url, userId")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(document_from_row))
    }
}
