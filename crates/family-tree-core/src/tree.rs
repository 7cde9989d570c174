//! Tree presentation adapter.
//!
//! Maps [`NormalizedNode`]s into the node contract expected by the
//! family-tree layout library: `{id, gender, parents, children, siblings,
//! spouses}` where every relation is `{id, type}`. The layout library only
//! knows two genders, so `unknown` is laid out as `female`.

use serde::{Deserialize, Serialize};

use crate::models::{Gender, NormalizedNode, Relation, RelationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutGender {
    Male,
    Female,
}

impl From<Gender> for LayoutGender {
    fn from(gender: Gender) -> Self {
        match gender {
            Gender::Male => LayoutGender::Male,
            Gender::Female | Gender::Unknown => LayoutGender::Female,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub gender: LayoutGender,
    pub parents: Vec<Relation>,
    pub children: Vec<Relation>,
    pub siblings: Vec<Relation>,
    pub spouses: Vec<Relation>,
}

/// Root plus nodes, as served by `GET /family/tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLayout {
    pub root_id: Option<String>,
    pub nodes: Vec<TreeNode>,
}

pub fn to_tree_nodes(nodes: &[NormalizedNode]) -> Vec<TreeNode> {
    nodes
        .iter()
        .map(|node| TreeNode {
            id: node.person.id.clone(),
            gender: node.person.gender.into(),
            parents: node.parents.clone(),
            children: node.children.clone(),
            // Normalized siblings always share both parents.
            siblings: node
                .siblings
                .iter()
                .map(|s| Relation::new(s.id.clone(), RelationType::Blood))
                .collect(),
            spouses: node.spouses.clone(),
        })
        .collect()
}

/// The preferred root when it exists, else the first node without
/// parents, else the first node.
pub fn pick_root(nodes: &[NormalizedNode], preferred: Option<&str>) -> Option<String> {
    if let Some(preferred) = preferred {
        if nodes.iter().any(|n| n.person.id == preferred) {
            return Some(preferred.to_string());
        }
    }
    nodes
        .iter()
        .find(|n| n.parents.is_empty())
        .or_else(|| nodes.first())
        .map(|n| n.person.id.clone())
}

pub fn layout(nodes: &[NormalizedNode], preferred: Option<&str>) -> TreeLayout {
    TreeLayout {
        root_id: pick_root(nodes, preferred),
        nodes: to_tree_nodes(nodes),
    }
}
