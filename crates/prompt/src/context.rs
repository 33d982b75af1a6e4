//! Template context projections.
//!
//! Each context type is a declarative mapping from canonical domain fields to
//! the alias names the templates use, applied as a flat key/value projection.
//! Only public persona fields cross into templates; no secrets.

use serde_json::{Map, Value, json};

use plume_core::persona::Persona;

/// Alias table for persona contexts: canonical field → template alias.
const PERSONA_ALIASES: &[(&str, &str)] = &[
    ("name", "char_name"),
    ("persona", "char_persona"),
    ("world", "char_world"),
    ("greeting", "char_greeting"),
    ("example_dialogue", "char_dialogue"),
];

/// Build the flat template context for a persona.
pub fn persona_context(persona: &Persona) -> Value {
    let card = &persona.card;
    let canonical: &[(&str, &str)] = &[
        ("name", &card.name),
        ("persona", &card.persona),
        ("world", &card.world),
        ("greeting", &card.greeting),
        ("example_dialogue", &card.example_dialogue),
    ];

    let mut out = Map::new();
    for (field, value) in canonical {
        out.insert((*field).to_string(), json!(value));
        if let Some((_, alias)) = PERSONA_ALIASES.iter().find(|(f, _)| f == field) {
            out.insert((*alias).to_string(), json!(value));
        }
    }
    // Display name of the persona record itself (distinct from the card name)
    out.insert("persona_name".to_string(), json!(persona.name));
    Value::Object(out)
}

/// Build the template context for behavior-level fragments (`system.base`,
/// `behavior.*`). These are cached per behavior type, shared across
/// personas, so no persona fields may leak in.
pub fn behavior_context(behavior: plume_core::prompt::BehaviorType) -> Value {
    json!({ "behavior": behavior.as_str() })
}

/// Build the flat template context for a one-shot task.
pub fn task_context(input: &str, task_code: &str, persona: Option<&Persona>) -> Value {
    let mut out = Map::new();
    out.insert("input".to_string(), json!(input));
    out.insert("task_code".to_string(), json!(task_code));
    if let Some(p) = persona {
        if let Value::Object(persona_fields) = persona_context(p) {
            out.extend(persona_fields);
        }
    }
    Value::Object(out)
}
