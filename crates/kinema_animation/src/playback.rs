use std::sync::Arc;

use kinema_core::Result;
use smallvec::SmallVec;

use crate::animator::{GroupHandle, PlaybackHandle};
use crate::binding::{AnimationHost, TargetId, WriteMode};
use crate::curve::Curve;
use crate::runtime::{AnimateContext, RuntimeCurveState, SyncInfo, Timeline};

/// Lifecycle of a [`Playback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Registered but not ticked yet, or holding no curves.
    Created,
    Running,
    Paused,
    /// Every curve ran past the end of a non-looping timeline.
    Finished,
    Stopped,
}

/// Parameters for starting a playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub from: f32,
    pub to: f32,
    pub loop_animation: bool,
    pub speed_ratio: f32,
    pub write_mode: WriteMode,
    pub is_additive: bool,
    /// Remove the playback from the animator once it finishes.
    pub dispose_on_end: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            from: 0.0,
            to: 100.0,
            loop_animation: false,
            speed_ratio: 1.0,
            write_mode: WriteMode::Direct,
            is_additive: false,
            dispose_on_end: true,
        }
    }
}

impl PlaybackOptions {
    #[must_use]
    pub fn range(from: f32, to: f32) -> Self {
        Self {
            from,
            to,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn looping(mut self, loop_animation: bool) -> Self {
        self.loop_animation = loop_animation;
        self
    }

    #[must_use]
    pub fn speed(mut self, speed_ratio: f32) -> Self {
        self.speed_ratio = speed_ratio;
        self
    }

    #[must_use]
    pub fn weighted(mut self, weight: f32) -> Self {
        self.write_mode = WriteMode::Weighted(weight.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn additive(mut self, is_additive: bool) -> Self {
        self.is_additive = is_additive;
        self
    }

    #[must_use]
    pub fn dispose_on_end(mut self, dispose_on_end: bool) -> Self {
        self.dispose_on_end = dispose_on_end;
        self
    }
}

/// Result of one playback tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TickReport {
    pub running: bool,
    pub looped: bool,
    /// First tick on which every curve finished.
    pub ended: bool,
}

/// One animation session: a set of curve states on a target sharing a
/// timeline.
pub struct Playback {
    targets: SmallVec<[TargetId; 1]>,
    pub from_frame: f32,
    pub to_frame: f32,
    pub loop_animation: bool,
    pub dispose_on_end: bool,
    speed_ratio: f32,
    write_mode: WriteMode,
    previous_weight: Option<f32>,
    is_additive: bool,
    states: Vec<RuntimeCurveState>,
    pub(crate) sync_root: Option<PlaybackHandle>,
    pub(crate) group: Option<(GroupHandle, usize)>,

    local_delay_offset: Option<f64>,
    paused_delay: Option<f64>,
    manual_jump_delay: Option<f64>,
    frame_to_sync_from_jump: Option<f32>,
    pending_go_to_frame: Option<f32>,
    last_now: f64,

    paused: bool,
    state: PlaybackState,
    end_notified: bool,
}

impl Playback {
    pub(crate) fn new(targets: &[TargetId], options: &PlaybackOptions) -> Self {
        Self {
            targets: targets.iter().copied().collect(),
            from_frame: options.from,
            to_frame: options.to,
            loop_animation: options.loop_animation,
            dispose_on_end: options.dispose_on_end,
            speed_ratio: options.speed_ratio,
            write_mode: options.write_mode,
            previous_weight: None,
            is_additive: options.is_additive,
            states: Vec::new(),
            sync_root: None,
            group: None,
            local_delay_offset: None,
            paused_delay: None,
            manual_jump_delay: None,
            frame_to_sync_from_jump: None,
            pending_go_to_frame: None,
            last_now: 0.0,
            paused: false,
            state: PlaybackState::Created,
            end_notified: false,
        }
    }

    /// Binds each curve to this playback's targets.
    ///
    /// All curves are bound before any is added, so a resolution failure
    /// leaves the playback unchanged.
    pub fn append_curves(&mut self, host: &dyn AnimationHost, curves: &[Arc<Curve>]) -> Result<()> {
        let mut bound = Vec::with_capacity(curves.len());
        for curve in curves {
            bound.push(RuntimeCurveState::bind(
                Arc::clone(curve),
                &self.targets,
                host,
                self.is_additive,
            )?);
        }
        self.states.extend(bound);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn target(&self) -> Option<TargetId> {
        self.targets.first().copied()
    }

    #[must_use]
    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    #[must_use]
    pub fn runtime_states(&self) -> &[RuntimeCurveState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        if self.paused && matches!(self.state, PlaybackState::Running | PlaybackState::Created) {
            PlaybackState::Paused
        } else {
            self.state
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn is_additive(&self) -> bool {
        self.is_additive
    }

    #[must_use]
    pub fn speed_ratio(&self) -> f32 {
        self.speed_ratio
    }

    #[must_use]
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    #[must_use]
    pub fn weight(&self) -> Option<f32> {
        self.write_mode.weight()
    }

    #[must_use]
    pub fn sync_root(&self) -> Option<PlaybackHandle> {
        self.sync_root
    }

    #[must_use]
    pub fn group(&self) -> Option<GroupHandle> {
        self.group.map(|(g, _)| g)
    }

    /// Current frame of the first curve state.
    #[must_use]
    pub fn master_frame(&self) -> f32 {
        self.states.first().map_or(0.0, RuntimeCurveState::current_frame)
    }

    /// Local playback time in milliseconds, 0 before the first tick.
    #[must_use]
    pub fn elapsed_time(&self) -> f64 {
        self.local_delay_offset.map_or(0.0, |offset| self.last_now - offset)
    }

    #[must_use]
    pub fn has_curve(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.curve().name == name)
    }

    /// The state driving `property` on `target`, if any.
    #[must_use]
    pub fn runtime_state_for(&self, target: TargetId, property: &str) -> Option<&RuntimeCurveState> {
        self.states
            .iter()
            .find(|s| s.curve().target_property() == property && s.targets().any(|t| t == target))
    }

    pub(crate) fn sync_info(&self) -> SyncInfo {
        SyncInfo {
            master_frame: self.master_frame(),
            from: self.from_frame,
            to: self.to_frame,
        }
    }

    fn fps(&self) -> Option<f32> {
        self.states.first().map(RuntimeCurveState::fps)
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn restart(&mut self) {
        self.paused = false;
    }

    /// Changes the speed without a jump in the current frame.
    pub fn set_speed_ratio(&mut self, speed_ratio: f32) {
        for state in &mut self.states {
            state.prepare_for_speed_ratio_change(speed_ratio);
        }
        self.speed_ratio = speed_ratio;
        if let Some(frame) = self.pending_go_to_frame {
            self.schedule_jump(frame);
        }
    }

    /// Sets the blend weight, clamped to `[0, 1]`. `None` switches to direct
    /// writes.
    pub fn set_weight(&mut self, weight: Option<f32>) {
        self.write_mode = match weight {
            Some(w) => WriteMode::Weighted(w.clamp(0.0, 1.0)),
            None => WriteMode::Direct,
        };
    }

    pub fn enable_blending(&mut self, blending_speed: f32) {
        for state in &mut self.states {
            state.set_blending(true, blending_speed);
        }
    }

    pub fn disable_blending(&mut self) {
        for state in &mut self.states {
            state.set_blending(false, 0.0);
        }
    }

    fn schedule_jump(&mut self, frame: f32) {
        let Some(fps) = self.fps() else { return };
        let sync_frame = *self.frame_to_sync_from_jump.get_or_insert(self.master_frame());
        let delay = if self.speed_ratio == 0.0 {
            0.0
        } else {
            f64::from(frame - sync_frame) / f64::from(fps) * 1000.0 / f64::from(self.speed_ratio)
        };
        self.manual_jump_delay = Some(-delay);
        self.pending_go_to_frame = Some(frame);
    }

    /// Folds the jump into the running offset and evaluates every curve at
    /// `frame` right away.
    pub(crate) fn go_to_frame(&mut self, ctx: &mut AnimateContext<'_>, frame: f32) {
        self.schedule_jump(frame);
        let write_mode = self.write_mode;
        for state in &mut self.states {
            state.go_to_frame(ctx, frame, write_mode);
        }
    }

    /// Rewinds every curve and restores the targets' bind-time values.
    pub(crate) fn reset(&mut self, host: &mut dyn AnimationHost) {
        for state in &mut self.states {
            state.reset(Some(&mut *host));
        }
        self.local_delay_offset = None;
        self.paused_delay = None;
        self.manual_jump_delay = None;
        self.frame_to_sync_from_jump = None;
        self.pending_go_to_frame = None;
        self.previous_weight = None;
        self.end_notified = false;
        if self.state == PlaybackState::Finished {
            self.state = PlaybackState::Created;
        }
    }

    /// Drops the states matching the selector. With neither a name nor a
    /// mask every state is dropped. Returns how many were removed.
    pub(crate) fn remove_states(&mut self, name: Option<&str>, mask: Option<&dyn Fn(TargetId) -> bool>) -> usize {
        let before = self.states.len();
        if name.is_none() && mask.is_none() {
            self.states.clear();
        } else {
            self.states.retain(|s| {
                let name_matches = name.is_none_or(|n| s.curve().name == n);
                let mask_matches = mask.is_none_or(|m| s.targets().any(m));
                !(name_matches && mask_matches)
            });
        }
        before - self.states.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Marks the playback stopped; returns `true` when the end notification
    /// has not been sent yet.
    pub(crate) fn mark_stopped(&mut self) -> bool {
        self.state = PlaybackState::Stopped;
        !std::mem::replace(&mut self.end_notified, true)
    }

    pub(crate) fn tick(&mut self, now: f64, ctx: &mut AnimateContext<'_>, sync: Option<SyncInfo>) -> TickReport {
        self.last_now = now;
        let holding = TickReport {
            running: true,
            ..TickReport::default()
        };

        if self.states.is_empty() || self.state == PlaybackState::Stopped {
            return holding;
        }
        if self.paused {
            if self.paused_delay.is_none() {
                self.paused_delay = Some(now);
            }
            return holding;
        }
        if self.state == PlaybackState::Created {
            self.state = PlaybackState::Running;
        }

        let mut offset = match (self.local_delay_offset, self.paused_delay.take()) {
            (None, _) => now,
            (Some(offset), Some(paused_at)) => offset + (now - paused_at),
            (Some(offset), None) => offset,
        };
        if let Some(jump) = self.manual_jump_delay.take() {
            offset += jump;
            self.frame_to_sync_from_jump = None;
        }
        self.local_delay_offset = Some(offset);
        self.pending_go_to_frame = None;

        let weight = self.write_mode.weight();
        if weight == Some(0.0) && self.previous_weight == Some(0.0) {
            return holding;
        }
        self.previous_weight = weight;

        let timeline = Timeline {
            from: self.from_frame,
            to: self.to_frame,
            looping: self.loop_animation,
            speed_ratio: self.speed_ratio,
        };
        let elapsed = now - offset;
        let mut report = TickReport::default();
        for state in &mut self.states {
            report.running |= state.animate(ctx, elapsed, timeline, self.write_mode, sync);
            report.looped |= state.looped_last_tick();
        }

        if report.running {
            self.state = PlaybackState::Running;
        } else {
            self.state = PlaybackState::Finished;
            report.ended = !std::mem::replace(&mut self.end_notified, true);
        }
        report
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("targets", &self.targets)
            .field("from_frame", &self.from_frame)
            .field("to_frame", &self.to_frame)
            .field("state", &self.state())
            .field("curves", &self.states.len())
            .finish_non_exhaustive()
    }
}
