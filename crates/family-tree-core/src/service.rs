//! CRUD gateway over a [`FamilyStore`].
//!
//! [`FamilyService`] is the only writer. It keeps the two representations
//! of parenthood (the child's father/mother fields and the `child` edge
//! table) in step on every create and update, and invalidates its
//! [`TreeCache`] after every successful write.
//!
//! Writes are sequences of single-statement store calls with no
//! transaction around them. A failure part-way leaves the earlier
//! statements applied.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::{lenient_string, normalize_ref, IdRef, RawPerson, SourceTables};
use crate::cache::{SharedNodes, TreeCache};
use crate::error::FamilyError;
use crate::models::{ChildEdge, Gender, NormalizedNode, PersonRecord, SpouseEdge, UploadedDocument};
use crate::normalize::{check_integrity, normalize, IntegrityIssue};
use crate::store::FamilyStore;

/// Body of a create or update request.
///
/// `father_id` / `mother_id` distinguish "key absent" (`None`) from "key
/// present, possibly null" (`Some(_)`). Only the latter is a parent edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth: Option<String>,
    #[serde(
        default,
        alias = "birthlocation",
        alias = "birth_location",
        deserialize_with = "lenient_string"
    )]
    pub birth_location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub death: Option<String>,
    #[serde(
        default,
        alias = "deathlocation",
        alias = "death_location",
        deserialize_with = "lenient_string"
    )]
    pub death_location: Option<String>,
    #[serde(
        default,
        alias = "fatherid",
        alias = "father_id",
        deserialize_with = "present_ref"
    )]
    pub father_id: Option<Option<String>>,
    #[serde(
        default,
        alias = "motherid",
        alias = "mother_id",
        deserialize_with = "present_ref"
    )]
    pub mother_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub occupation: Option<String>,
    #[serde(
        default,
        alias = "profileimg",
        alias = "profile_img",
        deserialize_with = "lenient_string"
    )]
    pub profile_img: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub facts: Option<String>,
    #[serde(default)]
    pub spouses: Option<Vec<IdRef>>,
    #[serde(default)]
    pub spouse_id: Option<IdRef>,
}

fn present_ref<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(lenient_string(deserializer)?))
}

impl PersonInput {
    pub fn is_parent_edit(&self) -> bool {
        self.father_id.is_some() || self.mother_id.is_some()
    }

    fn spouse_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let refs = self.spouses.iter().flatten().chain(self.spouse_id.as_ref());
        for r in refs {
            if let Some(id) = normalize_ref(Some(r.id().to_string())) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

/// Body of `POST /documents`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "userId", alias = "user_id", alias = "userid")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveAction {
    Created,
    Updated,
}

impl SaveAction {
    pub fn message(&self) -> &'static str {
        match self {
            SaveAction::Created => "Node created",
            SaveAction::Updated => "Node updated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub action: SaveAction,
    pub record: PersonRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub persons: usize,
    pub skipped: usize,
    pub spouse_edges: usize,
    pub child_edges: usize,
}

pub struct FamilyService {
    store: Arc<dyn FamilyStore>,
    cache: TreeCache,
}

impl FamilyService {
    pub fn new(store: Arc<dyn FamilyStore>) -> Self {
        Self {
            store,
            cache: TreeCache::new(),
        }
    }

    pub fn store(&self) -> &dyn FamilyStore {
        self.store.as_ref()
    }

    /// Drops the cached tree. Writes made through this service do this
    /// themselves; call it after writes made by another process.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// The normalized node list, served from the cache when fresh.
    pub async fn tree(&self) -> Result<SharedNodes> {
        self.cache
            .get_or_compute(move || async move {
                let tables = self.store.load_tables().await?;
                let issues = check_integrity(&tables);
                for issue in &issues {
                    warn!("integrity: {}", issue);
                }
                let nodes = normalize(&tables);
                debug!(
                    nodes = nodes.len(),
                    issues = issues.len(),
                    "normalized family tree"
                );
                anyhow::Ok(nodes)
            })
            .await
    }

    pub async fn integrity(&self) -> Result<Vec<IntegrityIssue>> {
        let tables = self.store.load_tables().await?;
        Ok(check_integrity(&tables))
    }

    pub async fn get_node(&self, id: &str) -> Result<NormalizedNode> {
        let nodes = self.tree().await?;
        nodes
            .iter()
            .find(|n| n.person.id == id)
            .cloned()
            .ok_or_else(|| FamilyError::not_found(format!("family member {}", id)).into())
    }

    pub async fn get_record(&self, id: &str) -> Result<PersonRecord> {
        self.store
            .get_person(id)
            .await?
            .ok_or_else(|| FamilyError::not_found(format!("family member {}", id)).into())
    }

    pub async fn list_records(&self) -> Result<Vec<PersonRecord>> {
        self.store.list_persons().await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<PersonRecord>> {
        self.store.search_persons(query.trim()).await
    }

    /// `POST /family`: update when the input carries an id, else create.
    pub async fn save(&self, input: PersonInput) -> Result<SaveOutcome> {
        match normalize_ref(input.id.clone()) {
            Some(id) => Ok(SaveOutcome {
                action: SaveAction::Updated,
                record: self.update(&id, input).await?,
            }),
            None => Ok(SaveOutcome {
                action: SaveAction::Created,
                record: self.create(input).await?,
            }),
        }
    }

    /// Inserts a new person with a fresh UUID, a child edge per parent and
    /// a spouse edge per requested spouse.
    pub async fn create(&self, input: PersonInput) -> Result<PersonRecord> {
        let name = required_name(input.name.as_deref())?;
        let father_id = normalize_ref(input.father_id.clone().flatten());
        let mother_id = normalize_ref(input.mother_id.clone().flatten());
        distinct_parents(father_id.as_deref(), mother_id.as_deref())?;
        self.require_existing("fatherId", father_id.as_deref()).await?;
        self.require_existing("motherId", mother_id.as_deref()).await?;

        let spouses = input.spouse_ids();
        for spouse in &spouses {
            self.require_existing("spouses", Some(spouse)).await?;
        }

        let record = PersonRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            gender: input.gender.unwrap_or_default(),
            birth: input.birth,
            birth_location: input.birth_location,
            death: input.death,
            death_location: input.death_location,
            father_id,
            mother_id,
            occupation: input.occupation,
            profile_img: input.profile_img,
            facts: input.facts,
        };

        self.store.insert_person(&record).await?;
        self.invalidate();

        for parent in record.parent_ids() {
            self.store
                .insert_child_edge(&ChildEdge::new(parent, record.id.as_str()))
                .await?;
        }
        for spouse in &spouses {
            self.store
                .insert_spouse_edge(&SpouseEdge::ordered(record.id.as_str(), spouse.as_str()))
                .await?;
        }
        self.invalidate();

        info!(id = %record.id, name = %record.name, "created family member");
        Ok(record)
    }

    /// Merges `input` into the stored record. Absent fields keep their
    /// prior value; a parent edit replaces both parent fields and brings
    /// the child edges in line.
    pub async fn update(&self, id: &str, input: PersonInput) -> Result<PersonRecord> {
        let prior = self.get_record(id).await?;
        let parent_edit = input.is_parent_edit();
        let spouses = input.spouse_ids();

        let name = match input.name.as_deref() {
            Some(name) => required_name(Some(name))?,
            None => prior.name.clone(),
        };

        let (father_id, mother_id) = if parent_edit {
            let father = normalize_ref(input.father_id.clone().flatten());
            let mother = normalize_ref(input.mother_id.clone().flatten());
            distinct_parents(father.as_deref(), mother.as_deref())?;
            for (field, parent) in [("fatherId", &father), ("motherId", &mother)] {
                if parent.as_deref() == Some(id) {
                    return Err(FamilyError::validation(
                        field,
                        "a person cannot be their own parent",
                    )
                    .into());
                }
                self.require_existing(field, parent.as_deref()).await?;
            }
            (father, mother)
        } else {
            (prior.father_id.clone(), prior.mother_id.clone())
        };

        for spouse in &spouses {
            if spouse == id {
                return Err(
                    FamilyError::validation("spouses", "a person cannot marry themselves").into(),
                );
            }
            self.require_existing("spouses", Some(spouse)).await?;
        }

        let record = PersonRecord {
            id: prior.id.clone(),
            name,
            gender: input.gender.unwrap_or(prior.gender),
            birth: input.birth.or(prior.birth.clone()),
            birth_location: input.birth_location.or(prior.birth_location.clone()),
            death: input.death.or(prior.death.clone()),
            death_location: input.death_location.or(prior.death_location.clone()),
            father_id,
            mother_id,
            occupation: input.occupation.or(prior.occupation.clone()),
            profile_img: input.profile_img.or(prior.profile_img.clone()),
            facts: input.facts.or(prior.facts.clone()),
        };

        self.store.update_person(&record).await?;
        self.invalidate();

        if parent_edit {
            let old: HashSet<&str> = prior.parent_ids().collect();
            let new: HashSet<&str> = record.parent_ids().collect();
            for removed in old.difference(&new) {
                self.store
                    .delete_child_edge(&ChildEdge::new(*removed, id))
                    .await?;
            }
            for added in record.parent_ids() {
                self.store.insert_child_edge(&ChildEdge::new(added, id)).await?;
            }
        }
        for spouse in &spouses {
            self.store
                .insert_spouse_edge(&SpouseEdge::ordered(id, spouse.as_str()))
                .await?;
        }
        self.invalidate();

        info!(id = %record.id, parent_edit, "updated family member");
        Ok(record)
    }

    /// Loads people in the embedded representation: persons first, then
    /// spouse edges, then child edges. Persons whose id already exists are
    /// skipped; edge inserts are idempotent.
    pub async fn seed(&self, raw: Vec<RawPerson>) -> Result<SeedSummary> {
        let tables = SourceTables::from_embedded(raw)?;
        let mut summary = SeedSummary::default();

        for person in &tables.persons {
            if self.store.get_person(&person.id).await?.is_some() {
                debug!(id = %person.id, "seed: person exists, skipping");
                summary.skipped += 1;
                continue;
            }
            self.store.insert_person(person).await?;
            summary.persons += 1;
        }
        self.invalidate();

        for edge in &tables.spouse_edges {
            if self.store.insert_spouse_edge(edge).await? {
                summary.spouse_edges += 1;
            }
        }
        for edge in &tables.child_edges {
            if self.store.insert_child_edge(edge).await? {
                summary.child_edges += 1;
            }
        }
        self.invalidate();

        info!(
            persons = summary.persons,
            skipped = summary.skipped,
            spouse_edges = summary.spouse_edges,
            child_edges = summary.child_edges,
            "seeded family tree"
        );
        Ok(summary)
    }

    pub async fn document_for(&self, owner_id: Option<&str>) -> Result<UploadedDocument> {
        let owner_id = required_param("id", owner_id)?;
        self.store
            .get_document_for_owner(owner_id)
            .await?
            .ok_or_else(|| FamilyError::not_found("document").into())
    }

    pub async fn add_document(&self, input: DocumentInput) -> Result<UploadedDocument> {
        let name = required_param("name", input.name.as_deref())?;
        let url = required_param("url", input.url.as_deref())?;
        let user_id = required_param("userId", input.user_id.as_deref())?;
        self.get_record(user_id).await?;

        let doc = UploadedDocument {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
        };
        self.store.insert_document(&doc).await?;
        info!(id = %doc.id, owner = %doc.user_id, "stored document");
        Ok(doc)
    }

    pub async fn delete_document(&self, id: Option<&str>) -> Result<UploadedDocument> {
        let id = required_param("id", id)?;
        self.store
            .delete_document(id)
            .await?
            .ok_or_else(|| FamilyError::not_found("document").into())
    }

    pub(crate) async fn require_existing(&self, field: &str, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if self.store.get_person(id).await?.is_none() {
                return Err(FamilyError::validation(
                    field,
                    format!("no family member with id {}", id),
                )
                .into());
            }
        }
        Ok(())
    }
}

fn distinct_parents(father_id: Option<&str>, mother_id: Option<&str>) -> Result<()> {
    match (father_id, mother_id) {
        (Some(f), Some(m)) if f == m => Err(FamilyError::validation(
            "motherId",
            "father and mother must be different people",
        )
        .into()),
        _ => Ok(()),
    }
}

fn required_name(name: Option<&str>) -> Result<String> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(FamilyError::validation("name", "name is required").into()),
    }
}

fn required_param<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(FamilyError::validation(field, format!("missing {}", field)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Relation, RelationType};
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn service() -> FamilyService {
        FamilyService::new(Arc::new(InMemoryStore::new()))
    }

    fn input(value: serde_json::Value) -> PersonInput {
        serde_json::from_value(value).unwrap()
    }

    async fn parents(svc: &FamilyService) -> (String, String) {
        let f = svc
            .create(input(json!({"name": "Frank", "gender": "male"})))
            .await
            .unwrap();
        let m = svc
            .create(input(json!({"name": "Mary", "gender": "female"})))
            .await
            .unwrap();
        (f.id, m.id)
    }

    #[tokio::test]
    async fn test_create_with_both_parents_writes_two_edges() {
        let svc = service();
        let (f, m) = parents(&svc).await;
        let child = svc
            .create(input(json!({"name": "Carl", "fatherId": f, "motherId": m})))
            .await
            .unwrap();

        let edges = svc.store().list_child_edges().await.unwrap();
        assert_eq!(
            edges,
            vec![
                ChildEdge::new(f.as_str(), child.id.as_str()),
                ChildEdge::new(m.as_str(), child.id.as_str())
            ]
        );
        assert!(svc.integrity().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_without_parents_writes_no_edges() {
        let svc = service();
        svc.create(input(json!({"name": "Solo", "fatherId": null, "motherId": ""})))
            .await
            .unwrap();
        assert!(svc.store().list_child_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let svc = service();
        let err = svc.create(input(json!({"birth": "1900"}))).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "name"
        ));
        assert!(svc.list_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_dangling_parent() {
        let svc = service();
        let err = svc
            .create(input(json!({"name": "Orphan", "motherId": "missing"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "motherId"
        ));
    }

    #[tokio::test]
    async fn test_create_with_spouse_objects() {
        let svc = service();
        let (f, _) = parents(&svc).await;
        let wife = svc
            .create(input(json!({"name": "Wendy", "spouses": [{"id": f, "type": "married"}]})))
            .await
            .unwrap();
        let nodes = svc.tree().await.unwrap();
        let frank = nodes.iter().find(|n| n.person.id == f).unwrap();
        assert_eq!(
            frank.spouses,
            vec![Relation::new(wife.id.clone(), RelationType::Married)]
        );
        assert_eq!(
            svc.store().list_spouse_edges().await.unwrap(),
            vec![SpouseEdge::ordered(f, wife.id)]
        );
    }

    #[tokio::test]
    async fn test_update_keeps_unspecified_fields() {
        let svc = service();
        let p1 = svc
            .create(input(json!({"name": "John Smith", "birth": "1900"})))
            .await
            .unwrap();
        let outcome = svc
            .save(input(json!({"id": p1.id, "name": "John Q. Smith"})))
            .await
            .unwrap();
        assert_eq!(outcome.action, SaveAction::Updated);
        assert_eq!(outcome.record.name, "John Q. Smith");
        assert_eq!(outcome.record.birth.as_deref(), Some("1900"));

        let stored = svc.get_record(&p1.id).await.unwrap();
        assert_eq!(stored.birth.as_deref(), Some("1900"));
    }

    #[tokio::test]
    async fn test_update_without_parent_keys_keeps_parents() {
        let svc = service();
        let (f, m) = parents(&svc).await;
        let child = svc
            .create(input(json!({"name": "Carl", "fatherId": f, "motherId": m})))
            .await
            .unwrap();
        let updated = svc
            .update(&child.id, input(json!({"occupation": "Miner"})))
            .await
            .unwrap();
        assert_eq!(updated.father_id.as_deref(), Some(f.as_str()));
        assert_eq!(updated.mother_id.as_deref(), Some(m.as_str()));
        assert_eq!(svc.store().list_child_edges().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_parent_edit_replaces_fields_and_edges() {
        let svc = service();
        let (f, m) = parents(&svc).await;
        let child = svc
            .create(input(json!({"name": "Carl", "fatherId": f, "motherId": m})))
            .await
            .unwrap();

        // Only fatherId is sent: mother is cleared along with her edge.
        let updated = svc
            .update(&child.id, input(json!({"fatherId": f})))
            .await
            .unwrap();
        assert_eq!(updated.mother_id, None);
        assert_eq!(
            svc.store().list_child_edges().await.unwrap(),
            vec![ChildEdge::new(f.as_str(), child.id.as_str())]
        );
        assert!(svc.integrity().await.unwrap().is_empty());

        // Explicit nulls clear both.
        svc.update(&child.id, input(json!({"fatherId": null, "motherId": null})))
            .await
            .unwrap();
        assert!(svc.store().list_child_edges().await.unwrap().is_empty());
        let node = svc.get_node(&child.id).await.unwrap();
        assert!(node.parents.is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_self_parent_and_unknown_id() {
        let svc = service();
        let p = svc.create(input(json!({"name": "Pat"}))).await.unwrap();
        let err = svc
            .update(&p.id, input(json!({"fatherId": p.id})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "fatherId"
        ));

        let err = svc
            .save(input(json!({"id": "nope", "name": "X"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_person_cannot_be_both_parents() {
        let svc = service();
        let (f, _) = parents(&svc).await;
        let err = svc
            .create(input(json!({"name": "Kit", "fatherId": f, "motherId": f})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "motherId"
        ));
        assert_eq!(svc.list_records().await.unwrap().len(), 2);

        let kit = svc
            .create(input(json!({"name": "Kit", "fatherId": f})))
            .await
            .unwrap();
        let err = svc
            .update(&kit.id, input(json!({"fatherId": f, "motherId": f})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "motherId"
        ));
        assert_eq!(svc.get_record(&kit.id).await.unwrap().mother_id, None);
    }

    #[tokio::test]
    async fn test_writes_invalidate_tree_cache() {
        let svc = service();
        assert!(svc.tree().await.unwrap().is_empty());
        svc.create(input(json!({"name": "New"}))).await.unwrap();
        assert_eq!(svc.tree().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_is_rerunnable() {
        let svc = service();
        let raw: Vec<RawPerson> = serde_json::from_value(json!([
            {"id": "f", "name": "F", "gender": "male", "spouses": ["m"], "children": ["c"]},
            {"id": "m", "name": "M", "gender": "female", "spouses": ["f"], "children": ["c"]},
            {"id": "c", "name": "C", "fatherId": "f", "motherId": "m"}
        ]))
        .unwrap();
        let first = svc.seed(raw.clone()).await.unwrap();
        assert_eq!(
            first,
            SeedSummary {
                persons: 3,
                skipped: 0,
                spouse_edges: 1,
                child_edges: 2
            }
        );
        let second = svc.seed(raw).await.unwrap();
        assert_eq!(second.persons, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.child_edges, 0);

        let c = svc.get_node("c").await.unwrap();
        assert_eq!(c.parents.len(), 2);
        assert!(svc.integrity().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_documents_validation() {
        let svc = service();
        let p = svc.create(input(json!({"name": "Owner"}))).await.unwrap();

        let missing: DocumentInput =
            serde_json::from_value(json!({"name": "Census", "userId": p.id})).unwrap();
        let err = svc.add_document(missing).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "url"
        ));

        let unknown_owner: DocumentInput = serde_json::from_value(
            json!({"name": "Census", "url": "https://x/y.pdf", "userId": "ghost"}),
        )
        .unwrap();
        let err = svc.add_document(unknown_owner).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::NotFound(_))
        ));

        let doc = svc
            .add_document(
                serde_json::from_value(
                    json!({"name": "Census", "url": "https://x/y.pdf", "userId": p.id}),
                )
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(svc.document_for(Some(&p.id)).await.unwrap(), doc);
        assert!(svc.document_for(None).await.is_err());
        assert_eq!(svc.delete_document(Some(&doc.id)).await.unwrap(), doc);
        assert!(svc.delete_document(Some(&doc.id)).await.is_err());
    }
}
