//! Relationship normalization.
//!
//! Turns [`SourceTables`] into one [`NormalizedNode`] per person:
//!
//! 1. **Spouses**: every [`SpouseEdge`] is read in both directions.
//! 2. **Children**: grouped by parent from the [`ChildEdge`] table.
//! 3. **Parents**: taken from the person's own father/mother fields.
//! 4. **Siblings**: persons whose father *and* mother are both set and
//!    pairwise equal. A missing parent on either side never matches, even
//!    when both sides are missing the same one.
//!
//! The transformation is pure: the same input always yields the same
//! output, in input order.
//!
//! [`check_integrity`] compares the two representations of parenthood
//! (edge table vs. parent fields) and reports disagreements without
//! resolving them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::adapter::SourceTables;
use crate::models::{
    ChildEdge, NormalizedNode, Relation, RelationType, SiblingRef, SiblingTag, SpouseEdge,
};

/// Builds `id → spouse ids` with both directions of every edge.
/// Duplicate pairs (e.g. stored as A,B and B,A) appear once.
pub fn spouse_map(edges: &[SpouseEdge]) -> HashMap<&str, Vec<&str>> {
    let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        push_unique(&mut map, &edge.node_id, &edge.spouse_id);
        push_unique(&mut map, &edge.spouse_id, &edge.node_id);
    }
    map
}

/// Builds `parent id → child ids` from the edge table.
pub fn child_map(edges: &[ChildEdge]) -> HashMap<&str, Vec<&str>> {
    let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        push_unique(&mut map, &edge.parent_id, &edge.child_id);
    }
    map
}

fn push_unique<'a>(map: &mut HashMap<&'a str, Vec<&'a str>>, key: &'a str, value: &'a str) {
    let entry = map.entry(key).or_default();
    if !entry.contains(&value) {
        entry.push(value);
    }
}

/// Groups person indices by `(father, mother)`. Persons missing either
/// parent are left out of the index entirely.
fn sibling_index(tables: &SourceTables) -> HashMap<(&str, &str), Vec<usize>> {
    let mut index: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
    for (i, person) in tables.persons.iter().enumerate() {
        if let (Some(father), Some(mother)) = (person.father_id.as_deref(), person.mother_id.as_deref())
        {
            index.entry((father, mother)).or_default().push(i);
        }
    }
    index
}

/// Produces a [`NormalizedNode`] for every person in `tables`.
pub fn normalize(tables: &SourceTables) -> Vec<NormalizedNode> {
    let spouses = spouse_map(&tables.spouse_edges);
    let children = child_map(&tables.child_edges);
    let siblings = sibling_index(tables);

    tables
        .persons
        .iter()
        .enumerate()
        .map(|(i, person)| {
            let parents = person
                .parent_ids()
                .map(|id| Relation::new(id, RelationType::Blood))
                .collect();

            let child_list = children
                .get(person.id.as_str())
                .map(|ids| {
                    ids.iter()
                        .map(|id| Relation::new(*id, RelationType::Blood))
                        .collect()
                })
                .unwrap_or_default();

            let spouse_list = spouses
                .get(person.id.as_str())
                .map(|ids| {
                    ids.iter()
                        .map(|id| Relation::new(*id, RelationType::Married))
                        .collect()
                })
                .unwrap_or_default();

            let sibling_list = match (person.father_id.as_deref(), person.mother_id.as_deref()) {
                (Some(father), Some(mother)) => siblings
                    .get(&(father, mother))
                    .map(|group| {
                        group
                            .iter()
                            .filter(|&&j| j != i)
                            .map(|&j| {
                                let sibling = &tables.persons[j];
                                SiblingRef {
                                    id: sibling.id.clone(),
                                    tag: SiblingTag::for_gender(sibling.gender),
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            };

            NormalizedNode {
                person: person.clone(),
                parents,
                children: child_list,
                spouses: spouse_list,
                siblings: sibling_list,
            }
        })
        .collect()
}

/// Which parent field a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentRole {
    Father,
    Mother,
}

/// A disagreement between the edge table and the parent fields, or a
/// reference that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A `child` row exists but the child names neither parent as this id.
    EdgeWithoutField { parent_id: String, child_id: String },
    /// The child's father/mother field has no matching `child` row.
    FieldWithoutEdge {
        child_id: String,
        parent_id: String,
        role: ParentRole,
    },
    /// An edge or parent field points at an id with no person row.
    UnknownPerson {
        reference: String,
        referenced_by: String,
    },
    /// A person is recorded as its own parent.
    SelfParent { id: String },
    /// Father and mother fields name the same person.
    SameParent { id: String, parent_id: String },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::EdgeWithoutField {
                parent_id,
                child_id,
            } => write!(
                f,
                "child edge {} -> {} has no matching father/mother field",
                parent_id, child_id
            ),
            IntegrityIssue::FieldWithoutEdge {
                child_id,
                parent_id,
                role,
            } => write!(
                f,
                "{} of {} is {} but no child edge exists",
                match role {
                    ParentRole::Father => "father",
                    ParentRole::Mother => "mother",
                },
                child_id,
                parent_id
            ),
            IntegrityIssue::UnknownPerson {
                reference,
                referenced_by,
            } => write!(f, "{} references unknown person {}", referenced_by, reference),
            IntegrityIssue::SelfParent { id } => write!(f, "{} is recorded as its own parent", id),
            IntegrityIssue::SameParent { id, parent_id } => {
                write!(f, "{} has {} as both father and mother", id, parent_id)
            }
        }
    }
}

/// Reports every place where the two representations of parenthood
/// disagree. Nothing is repaired.
pub fn check_integrity(tables: &SourceTables) -> Vec<IntegrityIssue> {
    let known: HashSet<&str> = tables.persons.iter().map(|p| p.id.as_str()).collect();
    let edges: HashSet<(&str, &str)> = tables
        .child_edges
        .iter()
        .map(|e| (e.parent_id.as_str(), e.child_id.as_str()))
        .collect();
    let by_id: HashMap<&str, _> = tables.persons.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut issues = Vec::new();

    for person in &tables.persons {
        if let (Some(father), Some(mother)) = (&person.father_id, &person.mother_id) {
            if father == mother {
                issues.push(IntegrityIssue::SameParent {
                    id: person.id.clone(),
                    parent_id: father.clone(),
                });
            }
        }
        let roles = [
            (person.father_id.as_deref(), ParentRole::Father),
            (person.mother_id.as_deref(), ParentRole::Mother),
        ];
        for (parent, role) in roles {
            let Some(parent) = parent else { continue };
            if parent == person.id {
                issues.push(IntegrityIssue::SelfParent {
                    id: person.id.clone(),
                });
                continue;
            }
            if !known.contains(parent) {
                issues.push(IntegrityIssue::UnknownPerson {
                    reference: parent.to_string(),
                    referenced_by: person.id.clone(),
                });
            }
            if !edges.contains(&(parent, person.id.as_str())) {
                issues.push(IntegrityIssue::FieldWithoutEdge {
                    child_id: person.id.clone(),
                    parent_id: parent.to_string(),
                    role,
                });
            }
        }
    }

    for edge in &tables.child_edges {
        for endpoint in [&edge.parent_id, &edge.child_id] {
            if !known.contains(endpoint.as_str()) {
                issues.push(IntegrityIssue::UnknownPerson {
                    reference: endpoint.clone(),
                    referenced_by: format!("child edge {} -> {}", edge.parent_id, edge.child_id),
                });
            }
        }
        if let Some(child) = by_id.get(edge.child_id.as_str()) {
            let named = child.father_id.as_deref() == Some(edge.parent_id.as_str())
                || child.mother_id.as_deref() == Some(edge.parent_id.as_str());
            if !named {
                issues.push(IntegrityIssue::EdgeWithoutField {
                    parent_id: edge.parent_id.clone(),
                    child_id: edge.child_id.clone(),
                });
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RawPerson;
    use crate::models::{Gender, PersonRecord};

    fn person(id: &str, father: Option<&str>, mother: Option<&str>) -> PersonRecord {
        let mut p = PersonRecord::new(id, id.to_uppercase());
        p.father_id = father.map(String::from);
        p.mother_id = mother.map(String::from);
        p
    }

    fn node<'a>(nodes: &'a [NormalizedNode], id: &str) -> &'a NormalizedNode {
        nodes.iter().find(|n| n.person.id == id).unwrap()
    }

    #[test]
    fn test_spouse_edge_is_symmetric() {
        let tables = SourceTables::from_tables(
            vec![person("p1", None, None), person("p2", None, None)],
            vec![SpouseEdge {
                node_id: "p2".into(),
                spouse_id: "p1".into(),
            }],
            vec![],
        );
        let nodes = normalize(&tables);
        assert_eq!(
            node(&nodes, "p1").spouses,
            vec![Relation::new("p2", RelationType::Married)]
        );
        assert_eq!(
            node(&nodes, "p2").spouses,
            vec![Relation::new("p1", RelationType::Married)]
        );
    }

    #[test]
    fn test_spouse_pair_stored_twice_listed_once() {
        let edges = vec![
            SpouseEdge::ordered("a", "b"),
            SpouseEdge {
                node_id: "b".into(),
                spouse_id: "a".into(),
            },
        ];
        let map = spouse_map(&edges);
        assert_eq!(map["a"], vec!["b"]);
        assert_eq!(map["b"], vec!["a"]);
    }

    #[test]
    fn test_siblings_require_both_parents() {
        let tables = SourceTables::from_tables(
            vec![
                person("c1", Some("f1"), Some("m1")),
                person("c2", Some("f1"), Some("m1")),
                person("c3", Some("f1"), None),
            ],
            vec![],
            vec![],
        );
        let nodes = normalize(&tables);
        let c1: Vec<&str> = node(&nodes, "c1").siblings.iter().map(|s| s.id.as_str()).collect();
        let c2: Vec<&str> = node(&nodes, "c2").siblings.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(c1, vec!["c2"]);
        assert_eq!(c2, vec!["c1"]);
        assert!(node(&nodes, "c3").siblings.is_empty());
    }

    #[test]
    fn test_matching_nulls_are_not_siblings() {
        let tables = SourceTables::from_tables(
            vec![
                person("a", None, None),
                person("b", None, None),
                person("c", None, Some("m")),
                person("d", None, Some("m")),
            ],
            vec![],
            vec![],
        );
        for n in normalize(&tables) {
            assert!(n.siblings.is_empty(), "{} has siblings", n.person.id);
        }
    }

    #[test]
    fn test_empty_string_parents_treated_as_missing() {
        let mut a = person("a", None, None);
        a.father_id = Some(String::new());
        a.mother_id = Some(String::new());
        let mut b = a.clone();
        b.id = "b".into();
        let nodes = normalize(&SourceTables::from_tables(vec![a, b], vec![], vec![]));
        for n in &nodes {
            assert!(n.parents.is_empty());
            assert!(n.siblings.is_empty());
        }
    }

    #[test]
    fn test_sibling_tag_follows_sibling_gender() {
        let mut brother = person("b", Some("f"), Some("m"));
        brother.gender = Gender::Male;
        let mut sister = person("s", Some("f"), Some("m"));
        sister.gender = Gender::Female;
        let unknown = person("u", Some("f"), Some("m"));
        let nodes = normalize(&SourceTables::from_tables(
            vec![brother, sister, unknown],
            vec![],
            vec![],
        ));
        let of_u = &node(&nodes, "u").siblings;
        assert_eq!(of_u[0].tag, SiblingTag::Father);
        assert_eq!(of_u[1].tag, SiblingTag::Mother);
        assert_eq!(node(&nodes, "b").siblings[1].tag, SiblingTag::Mother);
    }

    #[test]
    fn test_parents_come_from_fields_children_from_edges() {
        let tables = SourceTables::from_tables(
            vec![
                person("f", None, None),
                person("m", None, None),
                person("c", Some("f"), Some("m")),
            ],
            vec![],
            vec![ChildEdge::new("f", "c")],
        );
        let nodes = normalize(&tables);
        assert_eq!(
            node(&nodes, "c").parents,
            vec![
                Relation::new("f", RelationType::Blood),
                Relation::new("m", RelationType::Blood)
            ]
        );
        assert_eq!(
            node(&nodes, "f").children,
            vec![Relation::new("c", RelationType::Blood)]
        );
        // No edge from m, so m lists no children even though c names m.
        assert!(node(&nodes, "m").children.is_empty());
        assert!(node(&nodes, "f").parents.is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let tables = SourceTables::from_tables(
            vec![
                person("f", None, None),
                person("m", None, None),
                person("c1", Some("f"), Some("m")),
                person("c2", Some("f"), Some("m")),
            ],
            vec![SpouseEdge::ordered("f", "m")],
            vec![
                ChildEdge::new("f", "c1"),
                ChildEdge::new("m", "c1"),
                ChildEdge::new("f", "c2"),
            ],
        );
        let snapshot = tables.clone();
        let first = normalize(&tables);
        let second = normalize(&tables);
        assert_eq!(first, second);
        assert_eq!(tables, snapshot);
    }

    #[test]
    fn test_embedded_and_table_layouts_agree() {
        let raw: Vec<RawPerson> = serde_json::from_value(serde_json::json!([
            {"id": "f", "name": "F", "spouses": ["m"], "children": ["c"]},
            {"id": "m", "name": "M", "spouses": ["f"], "children": ["c"]},
            {"id": "c", "name": "C", "fatherId": "f", "motherId": "m"}
        ]))
        .unwrap();
        let embedded = normalize(&SourceTables::from_embedded(raw).unwrap());

        let mut f = PersonRecord::new("f", "F");
        f.gender = Gender::Unknown;
        let tables = SourceTables::from_tables(
            vec![f, PersonRecord::new("m", "M"), {
                let mut c = PersonRecord::new("c", "C");
                c.father_id = Some("f".into());
                c.mother_id = Some("m".into());
                c
            }],
            vec![SpouseEdge::ordered("m", "f")],
            vec![ChildEdge::new("f", "c"), ChildEdge::new("m", "c")],
        );
        assert_eq!(embedded, normalize(&tables));
    }

    #[test]
    fn test_integrity_reports_disagreements() {
        let tables = SourceTables::from_tables(
            vec![
                person("f", None, None),
                person("m", None, None),
                person("c", None, Some("m")),
                person("loop", Some("loop"), None),
            ],
            vec![],
            vec![ChildEdge::new("f", "c"), ChildEdge::new("ghost", "c")],
        );
        let issues = check_integrity(&tables);
        assert!(issues.contains(&IntegrityIssue::EdgeWithoutField {
            parent_id: "f".into(),
            child_id: "c".into()
        }));
        assert!(issues.contains(&IntegrityIssue::FieldWithoutEdge {
            child_id: "c".into(),
            parent_id: "m".into(),
            role: ParentRole::Mother
        }));
        assert!(issues.contains(&IntegrityIssue::SelfParent { id: "loop".into() }));
        assert!(issues.iter().any(|i| matches!(
            i,
            IntegrityIssue::UnknownPerson { reference, .. } if reference == "ghost"
        )));
    }

    #[test]
    fn test_integrity_reports_same_person_as_both_parents() {
        let tables = SourceTables::from_tables(
            vec![person("p", None, None), person("c", Some("p"), Some("p"))],
            vec![],
            vec![ChildEdge::new("p", "c")],
        );
        let issues = check_integrity(&tables);
        let same = IntegrityIssue::SameParent {
            id: "c".into(),
            parent_id: "p".into(),
        };
        assert!(issues.contains(&same));
        assert_eq!(same.to_string(), "c has p as both father and mother");
    }

    #[test]
    fn test_consistent_tables_have_no_issues() {
        let tables = SourceTables::from_tables(
            vec![
                person("f", None, None),
                person("m", None, None),
                person("c", Some("f"), Some("m")),
            ],
            vec![SpouseEdge::ordered("f", "m")],
            vec![ChildEdge::new("f", "c"), ChildEdge::new("m", "c")],
        );
        assert!(check_integrity(&tables).is_empty());
    }
}
