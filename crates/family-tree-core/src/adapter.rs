//! Input adapters: every storage representation into one canonical shape.
//!
//! Rows reach the normalizer from two places: the edge-table layout
//! (`family_node` + `spouse` + `child`) and the embedded layout where each
//! person carries its own `spouses` / `children` id lists (seed files,
//! exported snapshots). Field names also arrive in several casings
//! (`fatherId`, `fatherid`, `father_id`). Both are resolved here so that
//! [`crate::normalize`] only ever sees [`SourceTables`].

use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Deserializer};

use crate::error::FamilyError;
use crate::models::{ChildEdge, Gender, PersonRecord, SpouseEdge};

/// Canonical normalizer input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTables {
    pub persons: Vec<PersonRecord>,
    pub spouse_edges: Vec<SpouseEdge>,
    pub child_edges: Vec<ChildEdge>,
}

impl SourceTables {
    /// Adapts the edge-table layout. Parent references are cleaned with
    /// [`normalize_ref`]; edges with a blank endpoint are dropped.
    pub fn from_tables(
        persons: Vec<PersonRecord>,
        spouse_edges: Vec<SpouseEdge>,
        child_edges: Vec<ChildEdge>,
    ) -> Self {
        let persons = persons
            .into_iter()
            .map(|mut p| {
                p.father_id = normalize_ref(p.father_id.take());
                p.mother_id = normalize_ref(p.mother_id.take());
                p
            })
            .collect();

        let spouse_edges = spouse_edges
            .into_iter()
            .filter(|e| !e.node_id.trim().is_empty() && !e.spouse_id.trim().is_empty())
            .collect();
        let child_edges = child_edges
            .into_iter()
            .filter(|e| !e.parent_id.trim().is_empty() && !e.child_id.trim().is_empty())
            .collect();

        Self {
            persons,
            spouse_edges,
            child_edges,
        }
    }

    /// Adapts the embedded layout. Spouse pairs listed on both partners
    /// collapse into one smaller-first edge.
    pub fn from_embedded(raw: Vec<RawPerson>) -> Result<Self> {
        let mut persons = Vec::with_capacity(raw.len());
        let mut spouse_edges = Vec::new();
        let mut child_edges = Vec::new();
        let mut seen_spouses = HashSet::new();
        let mut seen_children = HashSet::new();

        for row in raw {
            let (record, spouses, children) = row.into_parts()?;

            for spouse in spouses {
                let edge = SpouseEdge::ordered(record.id.clone(), spouse);
                if seen_spouses.insert(edge.clone()) {
                    spouse_edges.push(edge);
                }
            }
            for child in children {
                let edge = ChildEdge::new(record.id.clone(), child);
                if seen_children.insert(edge.clone()) {
                    child_edges.push(edge);
                }
            }
            persons.push(record);
        }

        Ok(Self {
            persons,
            spouse_edges,
            child_edges,
        })
    }
}

/// Blank, whitespace-only, and literal `"null"` references mean "no parent".
pub fn normalize_ref(raw: Option<String>) -> Option<String> {
    raw.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// A relationship reference: either a bare id or an `{id, type}` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdRef {
    Id(String),
    Object { id: String },
}

impl IdRef {
    pub fn id(&self) -> &str {
        match self {
            IdRef::Id(id) => id,
            IdRef::Object { id } => id,
        }
    }
}

/// A person row in any of the observed field casings, optionally carrying
/// embedded relationship lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPerson {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth: Option<String>,
    #[serde(
        default,
        alias = "birthLocation",
        alias = "birthlocation",
        deserialize_with = "lenient_string"
    )]
    pub birth_location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub death: Option<String>,
    #[serde(
        default,
        alias = "deathLocation",
        alias = "deathlocation",
        deserialize_with = "lenient_string"
    )]
    pub death_location: Option<String>,
    #[serde(
        default,
        alias = "fatherId",
        alias = "fatherid",
        deserialize_with = "lenient_string"
    )]
    pub father_id: Option<String>,
    #[serde(
        default,
        alias = "motherId",
        alias = "motherid",
        deserialize_with = "lenient_string"
    )]
    pub mother_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub occupation: Option<String>,
    #[serde(
        default,
        alias = "profileImg",
        alias = "profileimg",
        deserialize_with = "lenient_string"
    )]
    pub profile_img: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub facts: Option<String>,
    #[serde(default)]
    pub spouses: Option<Vec<IdRef>>,
    #[serde(default)]
    pub children: Option<Vec<IdRef>>,
}

impl RawPerson {
    /// Splits the row into a canonical record plus its embedded spouse and
    /// child ids. `id` and `name` are required.
    pub fn into_parts(self) -> Result<(PersonRecord, Vec<String>, Vec<String>)> {
        let id = normalize_ref(self.id)
            .ok_or_else(|| FamilyError::validation("id", "person row has no id"))?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| FamilyError::validation("name", format!("person {} has no name", id)))?;

        let spouses = ids_of(self.spouses);
        let children = ids_of(self.children);

        let record = PersonRecord {
            id,
            name,
            gender: self.gender,
            birth: self.birth,
            birth_location: self.birth_location,
            death: self.death,
            death_location: self.death_location,
            father_id: normalize_ref(self.father_id),
            mother_id: normalize_ref(self.mother_id),
            occupation: self.occupation,
            profile_img: self.profile_img,
            facts: self.facts,
        };

        Ok((record, spouses, children))
    }
}

fn ids_of(refs: Option<Vec<IdRef>>) -> Vec<String> {
    refs.unwrap_or_default()
        .iter()
        .filter_map(|r| normalize_ref(Some(r.id().to_string())))
        .collect()
}

/// Accepts a string, a number (`"birth": 1850`), or `null`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
