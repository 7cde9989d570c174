//! Write-through of extracted profile data.
//!
//! The extractor returns `{nodes, relations}`. Before anything is written,
//! identifiers that are not UUIDs are replaced and every reference to them
//! inside the same extraction is rewritten. Rows are then written in three
//! passes: persons, child edges for their parents, spouse edges for
//! `married` relations. The first failure stops the run and the rows
//! already written are reported with it; nothing is rolled back.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::{lenient_string, normalize_ref};
use crate::error::FamilyError;
use crate::models::{ChildEdge, Gender, PersonRecord, SpouseEdge};
use crate::service::FamilyService;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub nodes: Vec<ExtractedNode>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedNode {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth: Option<String>,
    #[serde(default, alias = "birthlocation", deserialize_with = "lenient_string")]
    pub birth_location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub death: Option<String>,
    #[serde(default, alias = "deathlocation", deserialize_with = "lenient_string")]
    pub death_location: Option<String>,
    #[serde(default, alias = "fatherid", deserialize_with = "lenient_string")]
    pub father_id: Option<String>,
    #[serde(default, alias = "motherid", deserialize_with = "lenient_string")]
    pub mother_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub occupation: Option<String>,
    #[serde(default, alias = "profileimg", deserialize_with = "lenient_string")]
    pub profile_img: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub facts: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
}

impl ExtractedRelation {
    pub fn is_marriage(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("married"))
    }
}

fn is_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Replaces every non-UUID node id with a fresh v4 UUID and rewrites the
/// references to it. Returns the `old → new` map.
pub fn remap_ids(data: &mut ExtractedData) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for node in &mut data.nodes {
        match normalize_ref(node.id.take()) {
            Some(id) if is_uuid(&id) => node.id = Some(id),
            Some(old) => {
                let new = Uuid::new_v4().to_string();
                map.insert(old, new.clone());
                node.id = Some(new);
            }
            None => node.id = Some(Uuid::new_v4().to_string()),
        }
    }

    let rewrite = |r: &mut Option<String>| {
        if let Some(cleaned) = normalize_ref(r.take()) {
            *r = Some(map.get(&cleaned).cloned().unwrap_or(cleaned));
        }
    };

    for node in &mut data.nodes {
        rewrite(&mut node.father_id);
        rewrite(&mut node.mother_id);
    }
    for relation in &mut data.relations {
        rewrite(&mut relation.source);
        rewrite(&mut relation.target);
        if !relation.id.as_deref().is_some_and(is_uuid) {
            relation.id = Some(Uuid::new_v4().to_string());
        }
    }

    map
}

/// What a write-through managed to insert before finishing or failing.
#[derive(Debug)]
pub struct ImportOutcome {
    pub nodes: Vec<PersonRecord>,
    pub relations: Vec<ExtractedRelation>,
    pub extracted: ExtractedData,
    pub error: Option<anyhow::Error>,
}

impl FamilyService {
    /// Writes an extraction through to the store. Never returns early with
    /// an error: failures land in [`ImportOutcome::error`] next to the
    /// partial results.
    pub async fn import(&self, mut data: ExtractedData) -> ImportOutcome {
        let remapped = remap_ids(&mut data);
        if !remapped.is_empty() {
            info!(count = remapped.len(), "replaced non-UUID extractor ids");
        }

        let mut outcome = ImportOutcome {
            nodes: Vec::new(),
            relations: Vec::new(),
            extracted: data.clone(),
            error: None,
        };
        if let Err(e) = self.write_extraction(data, &mut outcome).await {
            warn!("import stopped: {:#}", e);
            outcome.error = Some(e);
        }
        if !outcome.nodes.is_empty() || !outcome.relations.is_empty() {
            self.invalidate();
        }

        info!(
            nodes = outcome.nodes.len(),
            relations = outcome.relations.len(),
            failed = outcome.error.is_some(),
            "import finished"
        );
        outcome
    }

    async fn write_extraction(
        &self,
        data: ExtractedData,
        outcome: &mut ImportOutcome,
    ) -> Result<()> {
        let batch: HashSet<String> = data.nodes.iter().filter_map(|n| n.id.clone()).collect();

        for node in data.nodes {
            let record = self.resolve_node(node, &batch).await?;
            self.store().insert_person(&record).await?;
            outcome.nodes.push(record);
        }

        for record in &outcome.nodes {
            for parent in record.parent_ids() {
                self.store()
                    .insert_child_edge(&ChildEdge::new(parent, record.id.as_str()))
                    .await?;
            }
        }

        for relation in data.relations {
            if !relation.is_marriage() {
                continue;
            }
            let (Some(source), Some(target)) = (relation.source.as_deref(), relation.target.as_deref())
            else {
                continue;
            };
            self.store()
                .insert_spouse_edge(&SpouseEdge::ordered(source, target))
                .await?;
            outcome.relations.push(relation);
        }

        Ok(())
    }

    /// Builds the record for one extracted node. Parent references that
    /// point neither into this batch nor at a stored person are dropped.
    async fn resolve_node(
        &self,
        node: ExtractedNode,
        batch: &HashSet<String>,
    ) -> Result<PersonRecord> {
        let id = node
            .id
            .ok_or_else(|| FamilyError::validation("id", "extracted node has no id"))?;
        let name = node
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                FamilyError::validation("name", format!("extracted node {} has no name", id))
            })?;

        let mut parents = [node.father_id, node.mother_id];
        for parent in parents.iter_mut() {
            let Some(parent_id) = parent.as_deref() else {
                continue;
            };
            let known = parent_id != id
                && (batch.contains(parent_id) || self.store().get_person(parent_id).await?.is_some());
            if !known {
                warn!(person = %id, parent = %parent_id, "dropping unresolved parent reference");
                *parent = None;
            }
        }
        let [father_id, mother_id] = parents;

        Ok(PersonRecord {
            id,
            name,
            gender: node.gender,
            birth: node.birth,
            birth_location: node.birth_location,
            death: node.death,
            death_location: node.death_location,
            father_id,
            mother_id,
            occupation: node.occupation,
            profile_img: node.profile_img,
            facts: node.facts,
        })
    }
}
