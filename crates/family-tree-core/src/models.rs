//! Core data models for Family Tree.
//!
//! [`PersonRecord`], [`SpouseEdge`], [`ChildEdge`], and [`UploadedDocument`]
//! mirror the persisted tables. [`NormalizedNode`] is derived on every read
//! and never persisted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Gender of a person. Anything other than `male` / `female` (including
/// `null`) reads as [`Gender::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Gender::Male,
            "female" | "f" => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

impl Serialize for Gender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Gender::parse(&s)).unwrap_or_default())
    }
}

/// Tag on a relationship. Only `Blood` and `Married` are produced by the
/// normalizer; the rest is vocabulary accepted from data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Blood,
    Married,
    Divorced,
    Adopted,
    Half,
}

/// Display tag on a sibling entry, taken from the sibling's own gender.
/// Unrelated to [`RelationType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingTag {
    Father,
    Mother,
}

impl SiblingTag {
    pub fn for_gender(gender: Gender) -> Self {
        if gender == Gender::Male {
            SiblingTag::Father
        } else {
            SiblingTag::Mother
        }
    }
}

/// One family member as stored in the `family_node` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub birth: Option<String>,
    #[serde(default)]
    pub birth_location: Option<String>,
    /// Absent means living.
    #[serde(default)]
    pub death: Option<String>,
    #[serde(default)]
    pub death_location: Option<String>,
    #[serde(default)]
    pub father_id: Option<String>,
    #[serde(default)]
    pub mother_id: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub profile_img: Option<String>,
    #[serde(default)]
    pub facts: Option<String>,
}

impl PersonRecord {
    /// A record with only an id and a name set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            gender: Gender::Unknown,
            birth: None,
            birth_location: None,
            death: None,
            death_location: None,
            father_id: None,
            mother_id: None,
            occupation: None,
            profile_img: None,
            facts: None,
        }
    }

    pub fn is_living(&self) -> bool {
        self.death.is_none()
    }

    /// Father then mother, skipping unset references.
    pub fn parent_ids(&self) -> impl Iterator<Item = &str> {
        self.father_id
            .as_deref()
            .into_iter()
            .chain(self.mother_id.as_deref())
    }
}

/// A marriage. Stored once per pair, smaller identifier first; read in
/// both directions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpouseEdge {
    pub node_id: String,
    pub spouse_id: String,
}

impl SpouseEdge {
    /// Builds the edge in storage order (smaller identifier first).
    pub fn ordered(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self {
                node_id: a,
                spouse_id: b,
            }
        } else {
            Self {
                node_id: b,
                spouse_id: a,
            }
        }
    }
}

/// Directed parent → child edge from the `child` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildEdge {
    pub parent_id: String,
    pub child_id: String,
}

impl ChildEdge {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }
}

/// `{id, type}` entry in a normalized relationship list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RelationType,
}

impl Relation {
    pub fn new(id: impl Into<String>, kind: RelationType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// `{id, type}` entry in a normalized sibling list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingRef {
    pub id: String,
    #[serde(rename = "type")]
    pub tag: SiblingTag,
}

/// A [`PersonRecord`] with its computed relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedNode {
    #[serde(flatten)]
    pub person: PersonRecord,
    pub parents: Vec<Relation>,
    pub children: Vec<Relation>,
    pub spouses: Vec<Relation>,
    pub siblings: Vec<SiblingRef>,
}

/// Supporting document attached to a person. Not removed with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}
