//! Timed, animation-gated attacks.
//!
//! A [`TargetAttack`] plays an animation and, when playback reaches its
//! trigger frame, calls its resolver once with the source and target
//! characters. The resolver's event is handed back to the game container for
//! dispatch.

use crate::game::CharacterWrapper;
use crate::protocol::{Event, GameId, SlotId};
use std::collections::BTreeMap;
use std::fmt;

/// Frame span and playback length of a sprite animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    /// Index of the first frame in the sprite sheet
    pub first_frame: u32,
    pub frame_count: u32,
    /// Seconds for one full playback
    pub duration: f32,
}

impl Animation {
    pub fn new(first_frame: u32, frame_count: u32, duration: f32) -> Self {
        Self {
            first_frame,
            frame_count: frame_count.max(1),
            duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    Playing,
    Done,
}

/// When the resolver is allowed to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Only on a tick whose frame equals the trigger frame. A tick that jumps
    /// over the trigger frame never fires.
    #[default]
    ExactFrame,
    /// On the first tick whose frame is at or past the trigger frame
    ReachedFrame,
}

/// Produces the event an attack resolves to, given (source, target)
pub type AttackResolver =
    Box<dyn FnMut(&CharacterWrapper, &CharacterWrapper) -> Event + Send + Sync>;

pub struct TargetAttack {
    source: SlotId,
    target: SlotId,
    animation: Animation,
    trigger_frame: u32,
    mode: TriggerMode,
    clock: f32,
    frame: u32,
    state: AttackState,
    resolver: Option<AttackResolver>,
}

impl TargetAttack {
    pub fn new(
        source: SlotId,
        target: SlotId,
        animation: Animation,
        trigger_frame: u32,
        resolver: AttackResolver,
    ) -> Self {
        Self {
            source,
            target,
            animation,
            trigger_frame,
            mode: TriggerMode::default(),
            clock: 0.0,
            frame: 0,
            state: AttackState::Playing,
            resolver: Some(resolver),
        }
    }

    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Advances playback by `dt` seconds.
    ///
    /// Returns the resolver's event, stamped with `game_id` and the target
    /// slot, on the tick the attack triggers. The resolver runs at most once;
    /// if either character is gone by then it is dropped without running.
    pub fn update(
        &mut self,
        dt: f32,
        game_id: GameId,
        characters: &BTreeMap<SlotId, CharacterWrapper>,
    ) -> Option<Event> {
        if self.state == AttackState::Done {
            return None;
        }

        self.clock += dt;
        // templates may carry a literal zero-frame animation
        let frame_count = self.animation.frame_count.max(1);
        let mut frame = if self.animation.duration > 0.0 {
            (self.clock * frame_count as f32 / self.animation.duration).floor() as u32
        } else {
            frame_count
        };
        if frame >= frame_count {
            self.state = AttackState::Done;
            frame %= frame_count;
        }
        self.frame = frame;

        if self.state != AttackState::Playing {
            return None;
        }
        let triggered = match self.mode {
            TriggerMode::ExactFrame => frame == self.trigger_frame,
            TriggerMode::ReachedFrame => frame >= self.trigger_frame,
        };
        if !triggered {
            return None;
        }

        let mut resolver = self.resolver.take()?;
        let source = characters.get(&self.source)?;
        let target = characters.get(&self.target)?;
        let mut event = resolver(source, target);
        event.stamp(game_id, self.target);
        Some(event)
    }

    pub fn source(&self) -> SlotId {
        self.source
    }

    pub fn target(&self) -> SlotId {
        self.target
    }

    pub fn state(&self) -> AttackState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == AttackState::Done
    }

    pub fn has_fired(&self) -> bool {
        self.resolver.is_none()
    }

    /// Frame within the animation, wrapped once playback is over
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Absolute sprite-sheet frame for a renderer
    pub fn sprite_frame(&self) -> u32 {
        self.animation.first_frame + self.frame
    }

    /// Cuts playback short without firing
    pub fn cancel(&mut self) {
        self.resolver = None;
        self.state = AttackState::Done;
    }
}

impl fmt::Debug for TargetAttack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetAttack")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("animation", &self.animation)
            .field("trigger_frame", &self.trigger_frame)
            .field("mode", &self.mode)
            .field("clock", &self.clock)
            .field("frame", &self.frame)
            .field("state", &self.state)
            .field("fired", &self.has_fired())
            .finish()
    }
}
