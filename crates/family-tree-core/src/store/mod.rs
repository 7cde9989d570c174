//! Storage abstraction for Family Tree.
//!
//! The [`FamilyStore`] trait covers the four persisted tables: persons
//! (`family_node`), spouse edges, child edges and documents. The SQLite
//! backend lives in the application crate; [`memory::InMemoryStore`] backs
//! tests and tooling.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Each method is one atomic statement; callers that issue several in a
//! row get no transaction around them.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::adapter::SourceTables;
use crate::models::{ChildEdge, PersonRecord, SpouseEdge, UploadedDocument};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_persons`](FamilyStore::list_persons) | All persons, insertion order |
/// | [`insert_person`](FamilyStore::insert_person) / [`update_person`](FamilyStore::update_person) | Person writes |
/// | [`insert_child_edge`](FamilyStore::insert_child_edge) / [`delete_child_edge`](FamilyStore::delete_child_edge) | Parent → child edges |
/// | [`insert_spouse_edge`](FamilyStore::insert_spouse_edge) | Marriage edges |
/// | [`search_persons`](FamilyStore::search_persons) | Substring search |
/// | [`insert_document`](FamilyStore::insert_document) and friends | Uploaded documents |
#[async_trait]
pub trait FamilyStore: Send + Sync {
    async fn list_persons(&self) -> Result<Vec<PersonRecord>>;

    async fn list_spouse_edges(&self) -> Result<Vec<SpouseEdge>>;

    async fn list_child_edges(&self) -> Result<Vec<ChildEdge>>;

    async fn get_person(&self, id: &str) -> Result<Option<PersonRecord>>;

    /// Fails if the id is already taken.
    async fn insert_person(&self, person: &PersonRecord) -> Result<()>;

    /// Overwrites every column of an existing person. Merging partial
    /// updates is the caller's job.
    async fn update_person(&self, person: &PersonRecord) -> Result<()>;

    /// Idempotent. Returns `false` when the edge already existed.
    async fn insert_child_edge(&self, edge: &ChildEdge) -> Result<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_child_edge(&self, edge: &ChildEdge) -> Result<bool>;

    /// Idempotent. The edge should already be in storage order
    /// (see [`SpouseEdge::ordered`]).
    async fn insert_spouse_edge(&self, edge: &SpouseEdge) -> Result<bool>;

    /// Case-insensitive substring match on name, birth location, death
    /// location and occupation.
    async fn search_persons(&self, query: &str) -> Result<Vec<PersonRecord>>;

    /// The first document owned by `owner_id`.
    async fn get_document_for_owner(&self, owner_id: &str) -> Result<Option<UploadedDocument>>;

    async fn insert_document(&self, doc: &UploadedDocument) -> Result<()>;

    /// Deletes by document id, returning the removed row.
    async fn delete_document(&self, id: &str) -> Result<Option<UploadedDocument>>;

    /// Reads all three relationship tables into normalizer input.
    async fn load_tables(&self) -> Result<SourceTables> {
        let persons = self.list_persons().await?;
        let spouses = self.list_spouse_edges().await?;
        let children = self.list_child_edges().await?;
        Ok(SourceTables::from_tables(persons, spouses, children))
    }
}

/// The search predicate shared by stores that filter in process.
pub fn matches_query(person: &PersonRecord, query: &str) -> bool {
    let needle = query.to_lowercase();
    [
        Some(&person.name),
        person.birth_location.as_ref(),
        person.death_location.as_ref(),
        person.occupation.as_ref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}
