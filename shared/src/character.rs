//! Character templates: the static stat blocks a game clones when a peer
//! joins.

use crate::attack::Animation;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterTemplate {
    pub name: String,
    pub hp_max: f32,
    pub mp_max: f32,
    /// Tiles per second
    pub move_speed: f32,
    pub physical_damage: f32,
    pub physical_armor: f32,
    /// Tiles between centres at which an auto-attack can start
    pub attack_range: f32,
    /// Seconds between consecutive auto-attacks
    pub attack_cooldown: f32,
    pub attack_animation: Animation,
    /// Animation frame on which the attack lands
    pub attack_trigger_frame: u32,
}

impl CharacterTemplate {
    /// Melee bruiser used by default on every server
    pub fn fighter() -> Self {
        Self {
            name: "fighter".to_string(),
            hp_max: 600.0,
            mp_max: 200.0,
            move_speed: 3.0,
            physical_damage: 60.0,
            physical_armor: 15.0,
            attack_range: 1.5,
            attack_cooldown: 1.2,
            attack_animation: Animation::new(0, 6, 0.6),
            attack_trigger_frame: 3,
        }
    }

    pub fn archer() -> Self {
        Self {
            name: "archer".to_string(),
            hp_max: 420.0,
            mp_max: 260.0,
            move_speed: 3.5,
            physical_damage: 45.0,
            physical_armor: 8.0,
            attack_range: 5.0,
            attack_cooldown: 1.0,
            attack_animation: Animation::new(6, 8, 0.8),
            attack_trigger_frame: 5,
        }
    }
}

/// Lookup of character templates by name
pub trait CharacterCatalog {
    fn template(&self, name: &str) -> Option<&CharacterTemplate>;
}

impl CharacterCatalog for HashMap<String, CharacterTemplate> {
    fn template(&self, name: &str) -> Option<&CharacterTemplate> {
        self.get(name)
    }
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct CharacterRoster {
    templates: HashMap<String, CharacterTemplate>,
}

impl CharacterRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster holding the built-in templates
    pub fn builtin() -> Self {
        let mut roster = Self::new();
        roster.insert(CharacterTemplate::fighter());
        roster.insert(CharacterTemplate::archer());
        roster
    }

    pub fn insert(&mut self, template: CharacterTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl CharacterCatalog for CharacterRoster {
    fn template(&self, name: &str) -> Option<&CharacterTemplate> {
        self.templates.get(name)
    }
}
