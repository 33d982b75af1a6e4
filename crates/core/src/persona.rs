//! Persona aggregate — a named, templated character definition.
//!
//! Personas ground conversation style and content. A persona's card is the
//! raw material for the `char.*` prompt templates; the rendered card becomes
//! one element of the request pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for a persona.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonaId(pub String);

impl PersonaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PersonaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The character definition rendered into the `char.*` templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaCard {
    /// Character name shown in templates
    pub name: String,

    /// Character description and personality text
    pub persona: String,

    /// World / scenario text
    #[serde(default)]
    pub world: String,

    /// Opening greeting
    #[serde(default)]
    pub greeting: String,

    /// Example dialogue demonstrating the character's voice
    #[serde(default)]
    pub example_dialogue: String,
}

impl PersonaCard {
    /// A card is valid when it has a non-empty name and persona text.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.persona.trim().is_empty()
    }
}

/// A persona aggregate.
///
/// Updates produce a new value and emit a change event at the service layer;
/// the struct itself never mutates in place once shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Unique persona ID
    pub id: PersonaId,

    /// Display name (unique across personas)
    pub name: String,

    /// Optional description shown in persona listings
    #[serde(default)]
    pub description: String,

    /// Optional cover image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,

    /// The character card
    pub card: PersonaCard,

    /// Whether this persona can be used to build new conversation clients.
    /// Existing cached clients may survive until evicted.
    pub enabled: bool,

    /// Optional world-book reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_book_id: Option<String>,

    /// Soft-deletion marker set before physical removal
    #[serde(default)]
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    /// Create a new persona, validating the card.
    pub fn create(
        name: impl Into<String>,
        description: impl Into<String>,
        card: PersonaCard,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("persona name must not be empty"));
        }
        if !card.is_valid() {
            return Err(Error::validation(
                "persona card must have non-empty name and persona text",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: PersonaId::new(),
            name,
            description: description.into(),
            cover: None,
            card,
            enabled: true,
            world_book_id: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Produce an updated copy with a new card, validating it first.
    pub fn with_card(&self, card: PersonaCard) -> Result<Self, Error> {
        if !card.is_valid() {
            return Err(Error::validation(
                "persona card must have non-empty name and persona text",
            ));
        }
        let mut next = self.clone();
        next.card = card;
        next.updated_at = Utc::now();
        Ok(next)
    }

    /// Produce an updated copy with new display fields.
    pub fn with_profile(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        cover: Option<String>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("persona name must not be empty"));
        }
        let mut next = self.clone();
        next.name = name;
        next.description = description.into();
        next.cover = cover;
        next.updated_at = Utc::now();
        Ok(next)
    }

    /// Produce an updated copy with the enabled flag toggled.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        let mut next = self.clone();
        next.enabled = enabled;
        next.updated_at = Utc::now();
        next
    }

    /// Produce an updated copy with a new world-book reference.
    pub fn with_world_book(&self, world_book_id: Option<String>) -> Self {
        let mut next = self.clone();
        next.world_book_id = world_book_id;
        next.updated_at = Utc::now();
        next
    }

    /// Soft-delete marker. Physical removal from the store follows the
    /// deletion event.
    pub fn mark_deleted(&self) -> Self {
        let mut next = self.clone();
        next.deleted = true;
        next.enabled = false;
        next.updated_at = Utc::now();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_card() -> PersonaCard {
        PersonaCard {
            name: "Sable".into(),
            persona: "A dry-witted bartender who has seen everything.".into(),
            world: "A late-night bar below a bookshop.".into(),
            greeting: "What'll it be?".into(),
            example_dialogue: String::new(),
        }
    }

    #[test]
    fn create_validates_card() {
        let persona = Persona::create("bartender", "Late night talk", valid_card()).unwrap();
        assert!(persona.enabled);
        assert!(!persona.deleted);

        let bad = PersonaCard {
            name: String::new(),
            ..valid_card()
        };
        assert!(Persona::create("x", "", bad).is_err());
    }

    #[test]
    fn create_rejects_blank_persona_text() {
        let bad = PersonaCard {
            persona: "   ".into(),
            ..valid_card()
        };
        assert!(Persona::create("x", "", bad).is_err());
    }

    #[test]
    fn updates_produce_new_values() {
        let persona = Persona::create("bartender", "", valid_card()).unwrap();
        let updated = persona
            .with_profile("barkeep", "renamed", None)
            .unwrap();
        assert_eq!(persona.name, "bartender");
        assert_eq!(updated.name, "barkeep");
        assert!(updated.updated_at >= persona.updated_at);
    }

    #[test]
    fn mark_deleted_disables() {
        let persona = Persona::create("bartender", "", valid_card()).unwrap();
        let deleted = persona.mark_deleted();
        assert!(deleted.deleted);
        assert!(!deleted.enabled);
    }
}
