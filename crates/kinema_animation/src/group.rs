use std::sync::Arc;

use kinema_core::{KinemaError, Result};

use crate::animator::PlaybackHandle;
use crate::binding::TargetId;
use crate::curve::{AdditiveOptions, Curve, Keyframe};

/// A curve paired with the target it drives inside a group.
#[derive(Debug, Clone)]
pub struct TargetedCurve {
    pub curve: Arc<Curve>,
    pub target: TargetId,
}

/// A named set of `(curve, target)` pairs started, stopped and paused
/// together.
///
/// Groups are plain data; the [`Animator`](crate::Animator) owns them and
/// drives their playbacks.
#[derive(Debug, Clone)]
pub struct PlaybackGroup {
    pub name: String,
    targeted: Vec<TargetedCurve>,
    from: f32,
    to: f32,
    pub(crate) speed_ratio: f32,
    pub(crate) loop_animation: bool,
    pub(crate) weight: Option<f32>,
    pub(crate) is_additive: bool,
    pub(crate) is_started: bool,
    pub(crate) is_paused: bool,
    /// Live playbacks, one per member while started.
    pub(crate) playbacks: Vec<PlaybackHandle>,
    pub(crate) loop_flags: Vec<bool>,
    pub(crate) loop_count: usize,
}

impl PlaybackGroup {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            targeted: Vec::new(),
            from: f32::MAX,
            to: -f32::MAX,
            speed_ratio: 1.0,
            loop_animation: false,
            weight: None,
            is_additive: false,
            is_started: false,
            is_paused: false,
            playbacks: Vec::new(),
            loop_flags: Vec::new(),
            loop_count: 0,
        }
    }

    /// Adds a member and widens the group range to cover its keys.
    pub fn add_targeted_curve(&mut self, curve: Arc<Curve>, target: TargetId) {
        self.from = self.from.min(curve.first_frame());
        self.to = self.to.max(curve.highest_frame());
        self.targeted.push(TargetedCurve { curve, target });
    }

    #[must_use]
    pub fn targeted_curves(&self) -> &[TargetedCurve] {
        &self.targeted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targeted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targeted.is_empty()
    }

    /// First frame across members; 0 for an empty group.
    #[must_use]
    pub fn from_frame(&self) -> f32 {
        if self.targeted.is_empty() { 0.0 } else { self.from }
    }

    #[must_use]
    pub fn to_frame(&self) -> f32 {
        if self.targeted.is_empty() { 0.0 } else { self.to }
    }

    #[must_use]
    pub fn speed_ratio(&self) -> f32 {
        self.speed_ratio
    }

    #[must_use]
    pub fn loop_animation(&self) -> bool {
        self.loop_animation
    }

    #[must_use]
    pub fn weight(&self) -> Option<f32> {
        self.weight
    }

    #[must_use]
    pub fn is_additive(&self) -> bool {
        self.is_additive
    }

    pub fn set_additive(&mut self, is_additive: bool) {
        self.is_additive = is_additive;
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_started && !self.is_paused
    }

    #[must_use]
    pub fn playbacks(&self) -> &[PlaybackHandle] {
        &self.playbacks
    }

    /// Pads every member with boundary keys so all of them span
    /// `begin..=end`. Missing bounds default to the group's current range.
    pub fn normalize(&mut self, begin: Option<f32>, end: Option<f32>) -> Result<()> {
        if self.targeted.is_empty() {
            return Ok(());
        }
        let begin = begin.unwrap_or(self.from);
        let end = end.unwrap_or(self.to);
        if begin > end {
            return Err(KinemaError::InvalidFrameRange { from: begin, to: end });
        }

        for member in &mut self.targeted {
            let keys = member.curve.keys();
            let first = keys[0];
            let last = keys[keys.len() - 1];
            if first.frame <= begin && last.frame >= end {
                continue;
            }

            let mut padded = keys.to_vec();
            if first.frame > begin {
                padded.insert(0, Keyframe { frame: begin, ..first });
            }
            if last.frame < end {
                padded.push(Keyframe { frame: end, ..last });
            }
            Arc::make_mut(&mut member.curve).set_keys(padded)?;
        }

        self.from = begin;
        self.to = end;
        Ok(())
    }

    /// Converts every member curve to additive and flags the group additive.
    ///
    /// Curves shared with other owners are copied before conversion.
    pub fn make_additive(&mut self, options: &AdditiveOptions) -> Result<()> {
        for member in &mut self.targeted {
            Arc::make_mut(&mut member.curve).make_additive(options)?;
        }
        self.is_additive = true;
        Ok(())
    }

    /// Records one member loop; returns `true` when every member has looped
    /// in the current cycle.
    pub(crate) fn record_loop(&mut self, member: usize) -> bool {
        if self.loop_flags.len() < self.targeted.len() {
            self.loop_flags.resize(self.targeted.len(), false);
        }
        match self.loop_flags.get_mut(member) {
            Some(flag) if !*flag => *flag = true,
            _ => return false,
        }
        self.loop_count += 1;
        if self.loop_count == self.targeted.len() {
            self.loop_count = 0;
            self.loop_flags.iter_mut().for_each(|f| *f = false);
            return true;
        }
        false
    }

    /// Forgets a finished playback; returns `true` when it was the last one.
    pub(crate) fn record_end(&mut self, playback: PlaybackHandle) -> bool {
        let Some(index) = self.playbacks.iter().position(|&p| p == playback) else {
            return false;
        };
        self.playbacks.remove(index);
        if self.playbacks.is_empty() {
            self.is_started = false;
            return true;
        }
        false
    }
}
