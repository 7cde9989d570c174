//! Profile views shown inside the shared member dialog.
//!
//! The set of views is closed: [`ProfileView`] names each one and
//! [`ProfileView::render`] is the single render contract. A view receives
//! the current subject and returns a [`ViewModel`] listing the views it may
//! switch to; [`DialogState::request_view`] is the change request and
//! refuses switches a view does not offer.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::FamilyError;
use crate::models::{Gender, NormalizedNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileView {
    NodeProfile,
    EditNode,
    DocumentUploader,
    AddChild,
    AddSpouse,
}

impl ProfileView {
    pub const ALL: [ProfileView; 5] = [
        ProfileView::NodeProfile,
        ProfileView::EditNode,
        ProfileView::DocumentUploader,
        ProfileView::AddChild,
        ProfileView::AddSpouse,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ProfileView::NodeProfile => "node-profile",
            ProfileView::EditNode => "edit-node",
            ProfileView::DocumentUploader => "document-uploader",
            ProfileView::AddChild => "add-child",
            ProfileView::AddSpouse => "add-spouse",
        }
    }

    /// Views reachable from this one.
    pub fn actions(&self) -> &'static [ProfileView] {
        match self {
            ProfileView::NodeProfile => &[
                ProfileView::EditNode,
                ProfileView::DocumentUploader,
                ProfileView::AddChild,
                ProfileView::AddSpouse,
            ],
            _ => &[ProfileView::NodeProfile],
        }
    }

    pub fn render(&self, ctx: &ViewContext<'_>) -> ViewModel {
        let subject = &ctx.subject.person;
        let fields = match self {
            ProfileView::NodeProfile => {
                let mut fields = vec![
                    Field::new("Name", Some(subject.name.clone())),
                    Field::new("Gender", Some(subject.gender.as_str().to_string())),
                    Field::new("Born", join_place(&subject.birth, &subject.birth_location)),
                    Field::new(
                        "Died",
                        if subject.is_living() {
                            Some("Living".to_string())
                        } else {
                            join_place(&subject.death, &subject.death_location)
                        },
                    ),
                    Field::new("Occupation", subject.occupation.clone()),
                    Field::new("Father", subject.father_id.as_deref().map(|id| ctx.name_of(id))),
                    Field::new("Mother", subject.mother_id.as_deref().map(|id| ctx.name_of(id))),
                ];
                fields.push(ctx.names_field("Spouses", ctx.subject.spouses.iter().map(|r| r.id.as_str())));
                fields.push(ctx.names_field("Children", ctx.subject.children.iter().map(|r| r.id.as_str())));
                fields.push(ctx.names_field("Siblings", ctx.subject.siblings.iter().map(|s| s.id.as_str())));
                fields.push(Field::new("Facts", subject.facts.clone()));
                fields
            }
            ProfileView::EditNode => vec![
                Field::new("name", Some(subject.name.clone())),
                Field::new("gender", Some(subject.gender.as_str().to_string())),
                Field::new("birth", subject.birth.clone()),
                Field::new("birthLocation", subject.birth_location.clone()),
                Field::new("death", subject.death.clone()),
                Field::new("deathLocation", subject.death_location.clone()),
                Field::new("fatherId", subject.father_id.clone()),
                Field::new("motherId", subject.mother_id.clone()),
                Field::new("occupation", subject.occupation.clone()),
                Field::new("profileImg", subject.profile_img.clone()),
                Field::new("facts", subject.facts.clone()),
            ],
            ProfileView::DocumentUploader => vec![
                Field::new("owner", Some(subject.name.clone())),
                Field::new("userId", Some(subject.id.clone())),
            ],
            ProfileView::AddChild => {
                let partner = ctx.subject.spouses.first().map(|r| r.id.clone());
                match subject.gender {
                    Gender::Male => vec![
                        Field::new("fatherId", Some(subject.id.clone())),
                        Field::new("motherId", partner),
                    ],
                    Gender::Female => vec![
                        Field::new("fatherId", partner),
                        Field::new("motherId", Some(subject.id.clone())),
                    ],
                    Gender::Unknown => vec![Field::new("parentId", Some(subject.id.clone()))],
                }
            }
            ProfileView::AddSpouse => vec![Field::new("spouses", Some(subject.id.clone()))],
        };

        ViewModel {
            view: *self,
            subject_id: subject.id.clone(),
            title: match self {
                ProfileView::NodeProfile => subject.name.clone(),
                ProfileView::EditNode => format!("Edit {}", subject.name),
                ProfileView::DocumentUploader => format!("Documents for {}", subject.name),
                ProfileView::AddChild => format!("Add child of {}", subject.name),
                ProfileView::AddSpouse => format!("Add spouse of {}", subject.name),
            },
            fields,
            actions: self.actions().to_vec(),
        }
    }
}

impl fmt::Display for ProfileView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProfileView {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileView::ALL
            .into_iter()
            .find(|v| v.key() == s)
            .ok_or_else(|| FamilyError::validation("view", format!("unknown view '{}'", s)))
    }
}

fn join_place(date: &Option<String>, place: &Option<String>) -> Option<String> {
    match (date, place) {
        (Some(d), Some(p)) => Some(format!("{}, {}", d, p)),
        (Some(d), None) => Some(d.clone()),
        (None, Some(p)) => Some(p.clone()),
        (None, None) => None,
    }
}

/// The subject of a view plus a name index over the whole tree.
pub struct ViewContext<'a> {
    pub subject: &'a NormalizedNode,
    names: HashMap<&'a str, &'a str>,
}

impl<'a> ViewContext<'a> {
    pub fn new(subject: &'a NormalizedNode, all: &'a [NormalizedNode]) -> Self {
        let names = all
            .iter()
            .map(|n| (n.person.id.as_str(), n.person.name.as_str()))
            .collect();
        Self { subject, names }
    }

    /// Display name for an id; unknown ids are shown as-is.
    pub fn name_of(&self, id: &str) -> String {
        self.names.get(id).copied().unwrap_or(id).to_string()
    }

    fn names_field<'b>(&self, label: &str, ids: impl Iterator<Item = &'b str>) -> Field {
        let names: Vec<String> = ids.map(|id| self.name_of(id)).collect();
        Field::new(label, (!names.is_empty()).then(|| names.join(", ")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub label: String,
    pub value: Option<String>,
}

impl Field {
    fn new(label: &str, value: Option<String>) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub view: ProfileView,
    pub subject_id: String,
    pub title: String,
    pub fields: Vec<Field>,
    pub actions: Vec<ProfileView>,
}

/// Open/closed state of the member dialog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DialogState {
    current: Option<(String, ProfileView)>,
}

impl DialogState {
    pub fn open(&mut self, subject_id: impl Into<String>, view: ProfileView) {
        self.current = Some((subject_id.into(), view));
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn view(&self) -> Option<ProfileView> {
        self.current.as_ref().map(|(_, v)| *v)
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.current.as_ref().map(|(id, _)| id.as_str())
    }

    /// Switches to `next` if the current view offers it.
    pub fn request_view(&mut self, next: ProfileView) -> Result<()> {
        let Some((_, view)) = self.current.as_mut() else {
            return Err(FamilyError::validation("view", "dialog is closed").into());
        };
        if *view != next && !view.actions().contains(&next) {
            return Err(FamilyError::validation(
                "view",
                format!("cannot switch from {} to {}", view, next),
            )
            .into());
        }
        *view = next;
        Ok(())
    }

    /// Renders the current view against `nodes`. `None` when closed.
    pub fn render(&self, nodes: &[NormalizedNode]) -> Result<Option<ViewModel>> {
        let Some((subject_id, view)) = &self.current else {
            return Ok(None);
        };
        let subject = nodes
            .iter()
            .find(|n| &n.person.id == subject_id)
            .ok_or_else(|| FamilyError::not_found(format!("family member {}", subject_id)))?;
        Ok(Some(view.render(&ViewContext::new(subject, nodes))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SourceTables;
    use crate::models::{ChildEdge, PersonRecord, SpouseEdge};
    use crate::normalize::normalize;

    fn nodes() -> Vec<NormalizedNode> {
        let mut f = PersonRecord::new("f", "Frank");
        f.gender = Gender::Male;
        f.birth = Some("1850".into());
        f.birth_location = Some("Leeds".into());
        let mut m = PersonRecord::new("m", "Mary");
        m.gender = Gender::Female;
        let mut c = PersonRecord::new("c", "Carl");
        c.father_id = Some("f".into());
        c.mother_id = Some("m".into());
        normalize(&SourceTables::from_tables(
            vec![f, m, c],
            vec![SpouseEdge::ordered("f", "m")],
            vec![ChildEdge::new("f", "c"), ChildEdge::new("m", "c")],
        ))
    }

    fn value<'a>(model: &'a ViewModel, label: &str) -> Option<&'a str> {
        model
            .fields
            .iter()
            .find(|f| f.label == label)
            .and_then(|f| f.value.as_deref())
    }

    #[test]
    fn test_view_keys_round_trip() {
        for view in ProfileView::ALL {
            assert_eq!(view.key().parse::<ProfileView>().unwrap(), view);
            assert_eq!(
                serde_json::to_value(view).unwrap(),
                serde_json::Value::String(view.key().to_string())
            );
        }
        assert!("gallery".parse::<ProfileView>().is_err());
    }

    #[test]
    fn test_profile_resolves_names() {
        let all = nodes();
        let model = ProfileView::NodeProfile.render(&ViewContext::new(&all[2], &all));
        assert_eq!(value(&model, "Father"), Some("Frank"));
        assert_eq!(value(&model, "Mother"), Some("Mary"));
        assert_eq!(value(&model, "Died"), Some("Living"));

        let father = ProfileView::NodeProfile.render(&ViewContext::new(&all[0], &all));
        assert_eq!(value(&father, "Born"), Some("1850, Leeds"));
        assert_eq!(value(&father, "Spouses"), Some("Mary"));
        assert_eq!(value(&father, "Children"), Some("Carl"));
        assert_eq!(father.actions.len(), 4);
    }

    #[test]
    fn test_add_child_prefills_parents_by_gender() {
        let all = nodes();
        let from_father = ProfileView::AddChild.render(&ViewContext::new(&all[0], &all));
        assert_eq!(value(&from_father, "fatherId"), Some("f"));
        assert_eq!(value(&from_father, "motherId"), Some("m"));

        let from_child = ProfileView::AddChild.render(&ViewContext::new(&all[2], &all));
        assert_eq!(value(&from_child, "parentId"), Some("c"));
    }

    #[test]
    fn test_dialog_transitions() {
        let all = nodes();
        let mut dialog = DialogState::default();
        assert!(dialog.request_view(ProfileView::EditNode).is_err());
        assert_eq!(dialog.render(&all).unwrap(), None);

        dialog.open("c", ProfileView::NodeProfile);
        dialog.request_view(ProfileView::EditNode).unwrap();
        assert_eq!(dialog.view(), Some(ProfileView::EditNode));
        assert!(dialog.request_view(ProfileView::AddSpouse).is_err());

        let model = dialog.render(&all).unwrap().unwrap();
        assert_eq!(model.title, "Edit Carl");
        assert_eq!(model.actions, vec![ProfileView::NodeProfile]);

        dialog.close();
        assert!(!dialog.is_open());
    }

    #[test]
    fn test_dialog_unknown_subject() {
        let mut dialog = DialogState::default();
        dialog.open("ghost", ProfileView::NodeProfile);
        let err = dialog.render(&nodes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::NotFound(_))
        ));
    }
}
