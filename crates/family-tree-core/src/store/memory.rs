//! In-memory [`FamilyStore`] implementation for tests and tooling.
//!
//! Tables are `Vec`s behind `std::sync::RwLock`, so listing order is
//! insertion order like the SQLite backend's `rowid` order. Edge inserts
//! check that both endpoints exist, mirroring the foreign keys.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::error::FamilyError;
use crate::models::{ChildEdge, PersonRecord, SpouseEdge, UploadedDocument};

use super::{matches_query, FamilyStore};

#[derive(Default)]
struct Tables {
    persons: Vec<PersonRecord>,
    spouses: Vec<SpouseEdge>,
    children: Vec<ChildEdge>,
    documents: Vec<UploadedDocument>,
}

impl Tables {
    fn has_person(&self, id: &str) -> bool {
        self.persons.iter().any(|p| p.id == id)
    }

    fn require_persons(&self, ids: [&str; 2]) -> Result<()> {
        for id in ids {
            if !self.has_person(id) {
                bail!("foreign key violation: no person with id {}", id);
            }
        }
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl FamilyStore for InMemoryStore {
    async fn list_persons(&self) -> Result<Vec<PersonRecord>> {
        Ok(self.read()?.persons.clone())
    }

    async fn list_spouse_edges(&self) -> Result<Vec<SpouseEdge>> {
        Ok(self.read()?.spouses.clone())
    }

    async fn list_child_edges(&self) -> Result<Vec<ChildEdge>> {
        Ok(self.read()?.children.clone())
    }

    async fn get_person(&self, id: &str) -> Result<Option<PersonRecord>> {
        Ok(self.read()?.persons.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_person(&self, person: &PersonRecord) -> Result<()> {
        let mut tables = self.write()?;
        if tables.has_person(&person.id) {
            bail!("unique constraint violation: person {} already exists", person.id);
        }
        tables.persons.push(person.clone());
        Ok(())
    }

    async fn update_person(&self, person: &PersonRecord) -> Result<()> {
        let mut tables = self.write()?;
        let slot = tables
            .persons
            .iter_mut()
            .find(|p| p.id == person.id)
            .ok_or_else(|| FamilyError::not_found(format!("family member {}", person.id)))?;
        *slot = person.clone();
        Ok(())
    }

    async fn insert_child_edge(&self, edge: &ChildEdge) -> Result<bool> {
        let mut tables = self.write()?;
        tables.require_persons([edge.parent_id.as_str(), edge.child_id.as_str()])?;
        if tables.children.contains(edge) {
            return Ok(false);
        }
        tables.children.push(edge.clone());
        Ok(true)
    }

    async fn delete_child_edge(&self, edge: &ChildEdge) -> Result<bool> {
        let mut tables = self.write()?;
        let before = tables.children.len();
        tables.children.retain(|e| e != edge);
        Ok(tables.children.len() != before)
    }

    async fn insert_spouse_edge(&self, edge: &SpouseEdge) -> Result<bool> {
        let mut tables = self.write()?;
        tables.require_persons([edge.node_id.as_str(), edge.spouse_id.as_str()])?;
        if tables.spouses.contains(edge) {
            return Ok(false);
        }
        tables.spouses.push(edge.clone());
        Ok(true)
    }

    async fn search_persons(&self, query: &str) -> Result<Vec<PersonRecord>> {
        Ok(self
            .read()?
            .persons
            .iter()
            .filter(|p| matches_query(p, query))
            .cloned()
            .collect())
    }

    async fn get_document_for_owner(&self, owner_id: &str) -> Result<Option<UploadedDocument>> {
        Ok(self
            .read()?
            .documents
            .iter()
            .find(|d| d.user_id == owner_id)
            .cloned())
    }

    async fn insert_document(&self, doc: &UploadedDocument) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.has_person(&doc.user_id) {
            bail!("foreign key violation: no person with id {}", doc.user_id);
        }
        tables.documents.push(doc.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<Option<UploadedDocument>> {
        let mut tables = self.write()?;
        let index = tables.documents.iter().position(|d| d.id == id);
        Ok(index.map(|i| tables.documents.remove(i)))
    }
}
