//! Game container: the live state of one match.
//!
//! The server holds one authoritative container per game id. Each client
//! mirrors its own game in a client-authority container so that local actions
//! and relayed events play out the same way on both sides.

use crate::attack::{TargetAttack, TriggerMode};
use crate::character::CharacterTemplate;
use crate::game_map::GameMap;
use crate::math::Vec2;
use crate::pathfinding::PathfindingHelper;
use crate::protocol::{DamageEvent, Event, GameId, SlotId, Team, UNASSIGNED_SLOT};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Seats per team in one game
pub const PLAYERS_PER_TEAM: usize = 5;
/// Seconds a dead character waits before respawning
pub const RESPAWN_DELAY: f32 = 5.0;
/// Gold paid to the character landing a kill
pub const KILL_GOLD: u32 = 300;
/// How far a chased target may drift before the chaser re-paths
const REPATH_DRIFT: f32 = 0.5;

/// Live, per-game state of one character
#[derive(Debug, Clone)]
pub struct CharacterWrapper {
    pub template: CharacterTemplate,
    pub hp: f32,
    pub hp_max: f32,
    pub mp: f32,
    pub mp_max: f32,
    pub gold: u32,
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    pub team: Team,
    pub pathfinding: PathfindingHelper,
    /// Enemy slot this character is auto-attacking, resolved every tick
    pub attack_target: Option<SlotId>,
    attack_cooldown: f32,
    respawn_timer: Option<f32>,
    /// Slots that landed hits since the last death, oldest first
    attackers: Vec<SlotId>,
}

impl CharacterWrapper {
    pub fn new(template: &CharacterTemplate, team: Team, spawn: Vec2) -> Self {
        Self {
            template: template.clone(),
            hp: template.hp_max,
            hp_max: template.hp_max,
            mp: template.mp_max,
            mp_max: template.mp_max,
            gold: 0,
            kills: 0,
            assists: 0,
            deaths: 0,
            team,
            pathfinding: PathfindingHelper::new(spawn, spawn),
            attack_target: None,
            attack_cooldown: 0.0,
            respawn_timer: None,
            attackers: Vec::new(),
        }
    }

    pub fn pos(&self) -> Vec2 {
        self.pathfinding.pos
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }

    /// Seconds until respawn, while dead
    pub fn respawn_timer(&self) -> Option<f32> {
        self.respawn_timer
    }

    fn record_attacker(&mut self, slot: SlotId) {
        self.attackers.retain(|&s| s != slot);
        self.attackers.push(slot);
    }
}

/// Damage resolver for plain physical auto-attacks
fn physical_hit(source: &CharacterWrapper, target: &CharacterWrapper) -> Event {
    let damage = (source.template.physical_damage - target.template.physical_armor).max(1.0);
    Event::Damage(DamageEvent {
        game_id: 0,
        char_id: 0,
        hp: (target.hp - damage).max(0.0),
    })
}

/// Who owns the truth for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Allocates slots and applies the damage its own attacks produce
    Server,
    /// Mirrors server decisions: takes assigned slots and waits for `Damage`
    Client,
}

/// Outcome of a successful [`GameContainer::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub slot: SlotId,
    pub team: Team,
}

enum FollowPlan {
    Drop,
    Chase(Vec2),
    Strike,
}

#[derive(Debug)]
pub struct GameContainer {
    map: Arc<GameMap>,
    game_id: GameId,
    authority: Authority,
    trigger_mode: TriggerMode,
    characters: BTreeMap<SlotId, CharacterWrapper>,
    attacks: Vec<TargetAttack>,
}

impl GameContainer {
    pub fn new(map: Arc<GameMap>, game_id: GameId, authority: Authority) -> Self {
        Self {
            map,
            game_id,
            authority,
            trigger_mode: TriggerMode::default(),
            characters: BTreeMap::new(),
            attacks: Vec::new(),
        }
    }

    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Seats a new character built from `template`.
    ///
    /// `Team::Any` goes to the smaller team, ties to team one. A specific team
    /// is only accepted while it has room. A server container picks the first
    /// free slot; a client container takes `slot` as assigned by the server.
    /// Returns `None`, leaving the container untouched, when nothing fits.
    pub fn add(
        &mut self,
        template: &CharacterTemplate,
        team: Team,
        slot: SlotId,
    ) -> Option<Admission> {
        let one = self.team_count(Team::One);
        let two = self.team_count(Team::Two);

        let team = match team {
            Team::Any if one < PLAYERS_PER_TEAM || two < PLAYERS_PER_TEAM => {
                if two >= PLAYERS_PER_TEAM || (one <= two && one < PLAYERS_PER_TEAM) {
                    Team::One
                } else {
                    Team::Two
                }
            }
            Team::One if one < PLAYERS_PER_TEAM => Team::One,
            Team::Two if two < PLAYERS_PER_TEAM => Team::Two,
            _ => return None,
        };

        let slot = match self.authority {
            Authority::Server => (0..UNASSIGNED_SLOT).find(|s| !self.characters.contains_key(s))?,
            Authority::Client => {
                if slot == UNASSIGNED_SLOT || self.characters.contains_key(&slot) {
                    return None;
                }
                slot
            }
        };

        let spawn = self.map.spawn_point(team, slot);
        self.characters
            .insert(slot, CharacterWrapper::new(template, team, spawn));
        debug!(
            "game {}: slot {} joined team {} at ({:.1}, {:.1})",
            self.game_id, slot, team, spawn.x, spawn.y
        );

        Some(Admission { slot, team })
    }

    /// Drops a character together with every attack and reference involving it
    pub fn remove(&mut self, slot: SlotId) -> Option<CharacterWrapper> {
        let removed = self.characters.remove(&slot)?;
        self.attacks
            .retain(|attack| attack.source() != slot && attack.target() != slot);
        for character in self.characters.values_mut() {
            if character.attack_target == Some(slot) {
                character.attack_target = None;
            }
            character.attackers.retain(|&s| s != slot);
        }
        debug!("game {}: slot {} left", self.game_id, slot);
        Some(removed)
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// Returns the events triggered by attacks this tick, stamped and ready
    /// to dispatch. A server container has already applied them.
    pub fn update(&mut self, dt: f32) -> Vec<Event> {
        self.update_respawns(dt);
        self.update_follow(dt);

        for character in self.characters.values_mut() {
            if character.is_alive() {
                let step = dt * character.template.move_speed;
                character.pathfinding.update(step);
            }
        }

        let mut triggered = Vec::new();
        for attack in &mut self.attacks {
            if let Some(event) = attack.update(dt, self.game_id, &self.characters) {
                triggered.push((attack.source(), attack.target(), event));
            }
        }
        let events: Vec<Event> = triggered
            .into_iter()
            .map(|(source, target, event)| {
                if let Some(character) = self.characters.get_mut(&target) {
                    character.record_attacker(source);
                }
                trace!("game {}: slot {} hit slot {}", self.game_id, source, target);
                event
            })
            .collect();

        if self.authority == Authority::Server {
            for event in &events {
                self.apply(event);
            }
        }

        self.attacks.retain(|attack| !attack.is_done());
        events
    }

    fn update_respawns(&mut self, dt: f32) {
        for (&slot, character) in self.characters.iter_mut() {
            let Some(timer) = character.respawn_timer.as_mut() else {
                continue;
            };
            *timer -= dt;
            if *timer > 0.0 {
                continue;
            }

            character.respawn_timer = None;
            character.hp = character.hp_max;
            character.mp = character.mp_max;
            character.attackers.clear();
            character
                .pathfinding
                .teleport(self.map.spawn_point(character.team, slot));
            debug!("game {}: slot {} respawned", self.game_id, slot);
        }
    }

    /// Resolves every auto-attack reference by slot id and chases or strikes
    fn update_follow(&mut self, dt: f32) {
        let mut plans = Vec::new();
        for (&slot, character) in &self.characters {
            if !character.is_alive() {
                continue;
            }
            let Some(target_slot) = character.attack_target else {
                continue;
            };

            let plan = match self.characters.get(&target_slot) {
                Some(target) if target.is_alive() && target.team == character.team.opponent() => {
                    let to = target.pos();
                    if character.pos().distance(to) <= character.template.attack_range {
                        FollowPlan::Strike
                    } else {
                        FollowPlan::Chase(to)
                    }
                }
                _ => FollowPlan::Drop,
            };
            plans.push((slot, target_slot, plan));
        }

        for character in self.characters.values_mut() {
            character.attack_cooldown = (character.attack_cooldown - dt).max(0.0);
        }

        for (slot, target_slot, plan) in plans {
            let busy = self.attacks.iter().any(|attack| attack.source() == slot);
            let Some(character) = self.characters.get_mut(&slot) else {
                continue;
            };

            match plan {
                FollowPlan::Drop => character.attack_target = None,
                FollowPlan::Chase(to) => {
                    let helper = &mut character.pathfinding;
                    if helper.target.distance(to) > REPATH_DRIFT || !helper.is_moving() {
                        helper.set_target(self.map.graph(), to);
                    }
                }
                FollowPlan::Strike => {
                    character.pathfinding.stop();
                    if busy || character.attack_cooldown > 0.0 {
                        continue;
                    }
                    character.attack_cooldown = character.template.attack_cooldown;
                    let attack = TargetAttack::new(
                        slot,
                        target_slot,
                        character.template.attack_animation,
                        character.template.attack_trigger_frame,
                        Box::new(physical_hit),
                    )
                    .with_trigger_mode(self.trigger_mode);
                    self.attacks.push(attack);
                }
            }
        }
    }

    /// Applies a gameplay event to the container.
    ///
    /// Handles `Move`, `Damage` and `AutoAttack`; returns false when the
    /// event was not applicable (other variants, unknown slots, dead
    /// characters, invalid attack targets).
    pub fn apply(&mut self, event: &Event) -> bool {
        match *event {
            Event::Move(e) => {
                let graph = self.map.graph();
                let Some(character) = self.characters.get_mut(&e.char_id) else {
                    return false;
                };
                character.attack_target = None;
                character.pathfinding.teleport(e.pos.into());
                if !character.pathfinding.set_target(graph, e.target.into()) {
                    trace!(
                        "game {}: slot {} move target {:?} is off the mesh",
                        self.game_id,
                        e.char_id,
                        e.target
                    );
                }
                true
            }
            Event::Damage(e) => {
                let Some(character) = self.characters.get_mut(&e.char_id) else {
                    return false;
                };
                if !character.is_alive() {
                    return false;
                }
                character.hp = e.hp.clamp(0.0, character.hp_max);
                if !character.is_alive() {
                    self.kill(e.char_id);
                }
                true
            }
            Event::AutoAttack(e) => {
                if e.cancel {
                    return match self.characters.get_mut(&e.char_id) {
                        Some(character) => {
                            character.attack_target = None;
                            true
                        }
                        None => false,
                    };
                }

                let enemy = match (
                    self.characters.get(&e.char_id),
                    self.characters.get(&e.target_id),
                ) {
                    (Some(source), Some(target)) => target.team == source.team.opponent(),
                    _ => false,
                };
                if !enemy {
                    return false;
                }
                if let Some(character) = self.characters.get_mut(&e.char_id) {
                    character.attack_target = Some(e.target_id);
                }
                true
            }
            Event::Nop | Event::Connect(_) | Event::Disconnect(_) | Event::GameFull(_) => false,
        }
    }

    /// Credits the kill and assists and starts the respawn timer
    fn kill(&mut self, slot: SlotId) {
        let attackers = match self.characters.get_mut(&slot) {
            Some(character) => {
                character.hp = 0.0;
                character.deaths += 1;
                character.attack_target = None;
                character.respawn_timer = Some(RESPAWN_DELAY);
                character.pathfinding.stop();
                std::mem::take(&mut character.attackers)
            }
            None => return,
        };
        self.attacks
            .retain(|attack| attack.source() != slot && attack.target() != slot);

        let Some((&killer, assisting)) = attackers.split_last() else {
            debug!("game {}: slot {} died", self.game_id, slot);
            return;
        };
        if let Some(character) = self.characters.get_mut(&killer) {
            character.kills += 1;
            character.gold += KILL_GOLD;
        }
        for assist in assisting {
            if let Some(character) = self.characters.get_mut(assist) {
                character.assists += 1;
            }
        }
        debug!(
            "game {}: slot {} killed by slot {} ({} assists)",
            self.game_id,
            slot,
            killer,
            assisting.len()
        );
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn map(&self) -> &Arc<GameMap> {
        &self.map
    }

    pub fn character(&self, slot: SlotId) -> Option<&CharacterWrapper> {
        self.characters.get(&slot)
    }

    pub fn characters(&self) -> impl Iterator<Item = (SlotId, &CharacterWrapper)> + '_ {
        self.characters.iter().map(|(&slot, c)| (slot, c))
    }

    pub fn attacks(&self) -> &[TargetAttack] {
        &self.attacks
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn team_count(&self, team: Team) -> usize {
        self.characters.values().filter(|c| c.team == team).count()
    }
}
