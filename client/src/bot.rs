//! Autonomous stand-in for player input: wanders between walkable tiles and
//! now and then picks a fight with a known enemy

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::game::GameContainer;
use shared::math::Vec2;
use shared::protocol::SlotId;

/// What the bot wants its character to do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    MoveTo(Vec2),
    Attack(SlotId),
}

pub struct Bot {
    rng: StdRng,
    /// Seconds until the next decision
    cooldown: f32,
    /// Chance that a decision is an attack when an enemy is known
    aggression: f64,
}

impl Bot {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            cooldown: 0.0,
            aggression: 0.4,
        }
    }

    pub fn with_aggression(mut self, aggression: f64) -> Self {
        self.aggression = aggression.clamp(0.0, 1.0);
        self
    }

    /// Advances the decision timer and, when it runs out, picks an action
    /// for `me`. Dead or unknown characters do nothing, and neither does one
    /// already busy chasing a target.
    pub fn decide(&mut self, dt: f32, game: &GameContainer, me: SlotId) -> Option<Action> {
        self.cooldown -= dt;
        if self.cooldown > 0.0 {
            return None;
        }
        self.cooldown = self.rng.gen_range(1.0..3.0);

        let character = game.character(me)?;
        if !character.is_alive() || character.attack_target.is_some() {
            return None;
        }

        let enemies: Vec<SlotId> = game
            .characters()
            .filter(|(_, c)| c.is_alive() && c.team == character.team.opponent())
            .map(|(slot, _)| slot)
            .collect();
        if !enemies.is_empty() && self.rng.gen_bool(self.aggression) {
            return enemies.choose(&mut self.rng).map(|&slot| Action::Attack(slot));
        }

        let tiles: Vec<_> = game.map().graph().nodes().collect();
        tiles
            .choose(&mut self.rng)
            .map(|tile| Action::MoveTo(tile.center()))
    }
}
