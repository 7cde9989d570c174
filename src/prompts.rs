//! Prompt templates and sampling settings for every completion the
//! assistant makes.
//!
//! Each function returns a ready [`CompletionRequest`]. Extraction is
//! deterministic (temperature 0); suggestions run slightly warm; the
//! free-form chat reply runs warmest.

use crate::llm::{ChatMessage, CompletionRequest};

const EXTRACTOR_SYSTEM: &str = "You convert genealogy profile text into JSON. Reply with JSON only.";

const EXTRACTOR_TEMPLATE: &str = r#"Read the genealogy profile text at the end of this message and describe every person in it as JSON with exactly this shape:

{
  "nodes": [
    {
      "id": "a freshly generated version 4 UUID",
      "name": "full name",
      "gender": "male | female | unknown",
      "birth": "MM/DD/YYYY, or YYYY when only the year is known",
      "birthLocation": "City, County, State, Country",
      "death": "same format as birth, null while living",
      "deathLocation": "City, County, State, Country",
      "fatherId": "id of the father from this output or a known id, else null",
      "motherId": "id of the mother from this output or a known id, else null",
      "occupation": "occupation",
      "profileImg": "image URL or null",
      "facts": "any remaining biographical notes"
    }
  ],
  "relations": [
    {
      "id": "a freshly generated version 4 UUID",
      "type": "married | divorced | blood | adopted | half",
      "source": "id of one person",
      "target": "id of the other person",
      "date": "MM/DD/YYYY or YYYY"
    }
  ]
}

Rules:
- Give every person their own node, including spouses, parents and children that are only named.
- Labels map to fields like this: Name -> name; Gender -> gender (lowercase); Born / Birth Date -> birth; Birth Place -> birthLocation; Died / Death Date -> death; Death Place -> deathLocation; Occupation / Profession -> occupation; Photo / Image -> profileImg; Notes / Biography -> facts.
- When the text names a person's father or mother and that parent has a node, put the parent's id in fatherId / motherId.
- Every marriage becomes one relation of type "married" between the two spouses.
- Write dates as MM/DD/YYYY where the day is known and YYYY otherwise.
- Use null for anything the text does not say. Never invent facts.

Worked example.

Text:
Eleanor Hayes
Born: 2 Jun 1881 in Bristol, Gloucestershire, England
Died: 9 Nov 1950 in Bath, Somerset, England
Spouse: Thomas Webb (married 1903)
Occupation: Schoolteacher

JSON:
{
  "nodes": [
    {
      "id": "5f0c2a9e-3b7d-4c1a-9e2f-7a6b1c0d4e21",
      "name": "Eleanor Hayes",
      "gender": "female",
      "birth": "06/02/1881",
      "birthLocation": "Bristol, Gloucestershire, England",
      "death": "11/09/1950",
      "deathLocation": "Bath, Somerset, England",
      "fatherId": null,
      "motherId": null,
      "occupation": "Schoolteacher",
      "profileImg": null,
      "facts": null
    },
    {
      "id": "8d3e6b14-92a0-4f57-b1c8-0e5d7f2a9c36",
      "name": "Thomas Webb",
      "gender": "male",
      "birth": null,
      "birthLocation": null,
      "death": null,
      "deathLocation": null,
      "fatherId": null,
      "motherId": null,
      "occupation": null,
      "profileImg": null,
      "facts": null
    }
  ],
  "relations": [
    {
      "id": "c41a7e02-6d5b-4e88-a3f9-2b0c9d1e5f70",
      "type": "married",
      "source": "5f0c2a9e-3b7d-4c1a-9e2f-7a6b1c0d4e21",
      "target": "8d3e6b14-92a0-4f57-b1c8-0e5d7f2a9c36",
      "date": "1903"
    }
  ]
}

Text:
"#;

/// Profile text → `{nodes, relations}` extraction.
pub fn extractor(cleaned_text: &str, max_tokens: u32) -> CompletionRequest {
    let prompt = format!(
        "{}{}\n\nJSON:",
        EXTRACTOR_TEMPLATE, cleaned_text
    );
    CompletionRequest {
        messages: vec![ChatMessage::system(EXTRACTOR_SYSTEM), ChatMessage::user(prompt)],
        temperature: 0.0,
        max_tokens: Some(max_tokens),
    }
}

/// Description → one person record suggestion, using existing names to
/// resolve mentioned relatives.
pub fn suggest_node(description: &str, existing: &[(String, String)]) -> CompletionRequest {
    let roster = existing
        .iter()
        .map(|(id, name)| format!("- {} (id {})", name, id))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        r#"A user wants to add someone to their family tree.

Description: "{description}"

People already in the tree:
{roster}

Answer with one JSON object:
{{
  "name": "full name",
  "gender": "male, female or null",
  "birth": "YYYY-MM-DD or null",
  "birthLocation": "place or null",
  "death": "YYYY-MM-DD or null",
  "deathLocation": "place or null",
  "fatherId": "id of an existing person named as father, or null",
  "motherId": "id of an existing person named as mother, or null",
  "occupation": "occupation or null",
  "spouses": ["ids of existing people named as spouses"]
}}

Only fill in what the description supports."#
    );
    CompletionRequest {
        messages: vec![
            ChatMessage::system("You help maintain family tree records. Reply with JSON only."),
            ChatMessage::user(prompt),
        ],
        temperature: 0.3,
        max_tokens: Some(500),
    }
}

/// Name → likely parents, spouses and children among existing people.
pub fn suggest_relationships(name: &str, existing_names: &[String]) -> CompletionRequest {
    let prompt = format!(
        r#"Person: "{name}"
People already in the tree: {names}

Which of the existing people could be this person's parents, spouses or children? Answer with:
{{"suggestedParents": [names], "suggestedSpouses": [names], "suggestedChildren": [names]}}
Use surnames, places and dates as clues. Leave a list empty when nothing fits."#,
        names = existing_names.join(", ")
    );
    CompletionRequest {
        messages: vec![
            ChatMessage::system("You suggest family relationships. Reply with JSON only."),
            ChatMessage::user(prompt),
        ],
        temperature: 0.3,
        max_tokens: Some(300),
    }
}

/// Person record → `{isValid, suggestions}` review.
pub fn validate_node(node: &serde_json::Value) -> CompletionRequest {
    let pretty = serde_json::to_string_pretty(node).unwrap_or_else(|_| node.to_string());
    let prompt = format!(
        r#"Review this family tree record:

{pretty}

Look for missing names, death dates before birth dates, impossible parent ages and other data quality problems.
Answer with {{"isValid": true or false, "suggestions": ["one short suggestion per problem"]}}."#
    );
    CompletionRequest {
        messages: vec![
            ChatMessage::system("You review genealogy records for mistakes. Reply with JSON only."),
            ChatMessage::user(prompt),
        ],
        temperature: 0.2,
        max_tokens: Some(400),
    }
}

/// Direct fallback for the `create` chat action.
pub fn create_fallback(message: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You are a family tree assistant. Turn the user's description of a person into one JSON object \
                 with the fields name (required), birth (YYYY-MM-DD), birthLocation, death (YYYY-MM-DD), \
                 deathLocation, occupation and gender (male or female). Use null for anything unknown. \
                 Reply with the JSON object only.",
            ),
            ChatMessage::user(message),
        ],
        temperature: 0.1,
        max_tokens: None,
    }
}

/// Direct fallback for the `suggest_relationships` chat action.
pub fn relationships_fallback(message: &str, existing: &serde_json::Value) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You are a family tree assistant. Given a person and the existing family members, suggest \
                 relationships as a JSON array of objects with the fields name (an existing member), \
                 relationship (father, mother, spouse, child or sibling) and confidence (high, medium or low). \
                 Reply with the JSON array only.",
            ),
            ChatMessage::user(format!(
                "Person: {}\n\nExisting family members: {}",
                message, existing
            )),
        ],
        temperature: 0.3,
        max_tokens: None,
    }
}

/// Free-form reply when no action matched.
pub fn general(message: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You are a friendly family tree assistant. You can add new family members, search the tree, \
                 list everyone in it and suggest relationships. Answer the user and point them at whichever \
                 of these fits what they want next.",
            ),
            ChatMessage::user(message),
        ],
        temperature: 0.7,
        max_tokens: None,
    }
}
