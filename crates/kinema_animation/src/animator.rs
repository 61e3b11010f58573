//! Two-phase animation scheduler.
//!
//! Each tick runs in two phases:
//!
//! 1. **Tick**: every active [`Playback`] advances in registration order.
//!    Direct writes land on the host immediately; weighted writes are
//!    registered with the [`LateBindingCompositor`].
//! 2. **Resolve**: the compositor blends every property that received
//!    weighted writes and performs one final write per property.
//!
//! A playback synced to another one is moved behind its root when the sync is
//! set up, so it reads the root's frame from the same pass. If a later sync
//! reorders the root behind it, the synced playback reads the root's frame
//! from the previous pass instead.

use std::sync::Arc;

use kinema_core::{AnimationClock, KinemaError, Result};
use slotmap::{SlotMap, new_key_type};

use crate::binding::{AnimationHost, TargetId, WriteMode};
use crate::compositor::LateBindingCompositor;
use crate::curve::Curve;
use crate::group::PlaybackGroup;
use crate::playback::{Playback, PlaybackOptions, TickReport};
use crate::runtime::AnimateContext;
use crate::settings::AnimationSettings;

new_key_type! {
    /// Handle to a playback owned by an [`Animator`].
    pub struct PlaybackHandle;
    /// Handle to a playback group owned by an [`Animator`].
    pub struct GroupHandle;
}

/// Lifecycle notification produced while ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorEvent {
    PlaybackLooped(PlaybackHandle),
    /// Sent once per playback, when it finishes or is stopped.
    PlaybackEnded(PlaybackHandle),
    /// Every member of the group looped at least once since the last one.
    GroupLooped(GroupHandle),
    GroupEnded(GroupHandle),
}

/// Owns playbacks and groups, and drives them against an [`AnimationHost`].
#[derive(Default)]
pub struct Animator {
    playbacks: SlotMap<PlaybackHandle, Playback>,
    order: Vec<PlaybackHandle>,
    groups: SlotMap<GroupHandle, PlaybackGroup>,
    compositor: LateBindingCompositor,
    settings: AnimationSettings,
    clock: AnimationClock,
    events: Vec<AnimatorEvent>,
}

impl Animator {
    #[must_use]
    pub fn new(settings: AnimationSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &AnimationSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut AnimationSettings {
        &mut self.settings
    }

    #[inline]
    #[must_use]
    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    // ========================================================================
    // Playbacks
    // ========================================================================

    /// Binds `curves` to `targets` and registers a new playback.
    ///
    /// Fails without registering anything when a curve's property does not
    /// resolve on a target. An empty curve list yields a playback that stays
    /// idle until curves are appended.
    pub fn begin(
        &mut self,
        host: &dyn AnimationHost,
        targets: &[TargetId],
        curves: &[Arc<Curve>],
        options: PlaybackOptions,
    ) -> Result<PlaybackHandle> {
        if targets.is_empty() {
            return Err(KinemaError::UnknownTarget("playback needs at least one target".to_string()));
        }
        let mut playback = Playback::new(targets, &options);
        playback.append_curves(host, curves)?;
        let handle = self.playbacks.insert(playback);
        self.order.push(handle);
        log::debug!(
            "Playback {handle:?} started on {} with {} curve(s), frames {}..{}",
            targets[0],
            curves.len(),
            options.from,
            options.to
        );
        Ok(handle)
    }

    pub fn append_curves(&mut self, host: &dyn AnimationHost, handle: PlaybackHandle, curves: &[Arc<Curve>]) -> Result<()> {
        let playback = self
            .playbacks
            .get_mut(handle)
            .ok_or_else(|| KinemaError::UnknownTarget(format!("{handle:?}")))?;
        playback.append_curves(host, curves)
    }

    #[inline]
    #[must_use]
    pub fn playback(&self, handle: PlaybackHandle) -> Option<&Playback> {
        self.playbacks.get(handle)
    }

    #[inline]
    pub fn playback_mut(&mut self, handle: PlaybackHandle) -> Option<&mut Playback> {
        self.playbacks.get_mut(handle)
    }

    #[must_use]
    pub fn is_active(&self, handle: PlaybackHandle) -> bool {
        self.playbacks.contains_key(handle)
    }

    #[must_use]
    pub fn playback_count(&self) -> usize {
        self.playbacks.len()
    }

    /// Playbacks in tick order.
    pub fn playbacks(&self) -> impl Iterator<Item = (PlaybackHandle, &Playback)> + '_ {
        self.order.iter().filter_map(|&h| self.playbacks.get(h).map(|p| (h, p)))
    }

    /// Every playback driving `target`, in tick order.
    #[must_use]
    pub fn playbacks_for_target(&self, target: TargetId) -> Vec<PlaybackHandle> {
        self.playbacks()
            .filter(|(_, p)| p.targets().contains(&target))
            .map(|(h, _)| h)
            .collect()
    }

    pub fn pause(&mut self, handle: PlaybackHandle) {
        if let Some(playback) = self.playbacks.get_mut(handle) {
            playback.pause();
        }
    }

    pub fn restart(&mut self, handle: PlaybackHandle) {
        if let Some(playback) = self.playbacks.get_mut(handle) {
            playback.restart();
        }
    }

    pub fn set_speed_ratio(&mut self, handle: PlaybackHandle, speed_ratio: f32) {
        if let Some(playback) = self.playbacks.get_mut(handle) {
            playback.set_speed_ratio(speed_ratio);
        }
    }

    /// Locks `handle`'s frame to `root`'s normalized progress, or unlocks it.
    pub fn sync_with(&mut self, handle: PlaybackHandle, root: Option<PlaybackHandle>) {
        let Some(playback) = self.playbacks.get_mut(handle) else {
            return;
        };
        playback.sync_root = root.filter(|&r| r != handle);
        if playback.sync_root.is_some()
            && let Some(index) = self.order.iter().position(|&h| h == handle)
        {
            self.order.remove(index);
            self.order.push(handle);
        }
    }

    /// Scrubs to `frame`. Weighted playbacks are resolved right away so the
    /// host sees the new pose without waiting for the next tick.
    pub fn go_to_frame(&mut self, host: &mut dyn AnimationHost, handle: PlaybackHandle, frame: f32) {
        let Some(playback) = self.playbacks.get_mut(handle) else {
            return;
        };
        let mut ctx = AnimateContext {
            host: &mut *host,
            compositor: &mut self.compositor,
            settings: &self.settings,
        };
        playback.go_to_frame(&mut ctx, frame);
        self.compositor.resolve(host, self.settings.matrix_interpolation);
    }

    /// Rewinds a playback and restores its targets' original values.
    pub fn reset(&mut self, host: &mut dyn AnimationHost, handle: PlaybackHandle) {
        if let Some(playback) = self.playbacks.get_mut(handle) {
            playback.reset(host);
        }
    }

    /// Stops and disposes a playback. Stopping an unknown handle is a no-op.
    pub fn stop(&mut self, handle: PlaybackHandle) -> bool {
        self.stop_filtered(handle, None, None)
    }

    /// Partial stop: removes the curve states whose curve is named `name`
    /// and whose target passes `mask`. With neither selector every state is
    /// removed. The playback is disposed once it holds no states.
    pub fn stop_filtered(
        &mut self,
        handle: PlaybackHandle,
        name: Option<&str>,
        mask: Option<&dyn Fn(TargetId) -> bool>,
    ) -> bool {
        let Some(playback) = self.playbacks.get_mut(handle) else {
            return false;
        };
        let removed = playback.remove_states(name, mask);
        if !playback.is_empty() {
            if removed > 0 {
                log::debug!("Playback {handle:?}: stopped {removed} curve(s)");
            }
            return removed > 0;
        }
        self.dispose(handle);
        true
    }

    /// Stops every playback on `target` with the same selector semantics as
    /// [`Animator::stop_filtered`].
    pub fn stop_target(&mut self, target: TargetId, name: Option<&str>, mask: Option<&dyn Fn(TargetId) -> bool>) {
        for handle in self.playbacks_for_target(target) {
            self.stop_filtered(handle, name, mask);
        }
    }

    pub fn stop_all(&mut self) {
        let handles: Vec<_> = self.order.clone();
        for handle in handles {
            self.dispose(handle);
        }
    }

    fn dispose(&mut self, handle: PlaybackHandle) {
        let Some(mut playback) = self.playbacks.remove(handle) else {
            return;
        };
        self.order.retain(|&h| h != handle);
        log::debug!("Playback {handle:?} disposed");
        if playback.mark_stopped() {
            self.events.push(AnimatorEvent::PlaybackEnded(handle));
            self.record_group_end(handle, playback.group);
        }
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub fn add_group(&mut self, group: PlaybackGroup) -> GroupHandle {
        self.groups.insert(group)
    }

    #[must_use]
    pub fn group(&self, handle: GroupHandle) -> Option<&PlaybackGroup> {
        self.groups.get(handle)
    }

    /// Mutable access for editing members; changes apply on the next start.
    pub fn group_mut(&mut self, handle: GroupHandle) -> Option<&mut PlaybackGroup> {
        self.groups.get_mut(handle)
    }

    /// Stops the group's playbacks and drops the group.
    pub fn remove_group(&mut self, handle: GroupHandle) -> Option<PlaybackGroup> {
        self.stop_group(handle);
        self.groups.remove(handle)
    }

    /// Starts one playback per member. Already-started and empty groups are
    /// left as they are.
    ///
    /// `range` overrides the group's own frame range.
    pub fn start_group(
        &mut self,
        host: &dyn AnimationHost,
        handle: GroupHandle,
        loop_animation: bool,
        speed_ratio: f32,
        range: Option<(f32, f32)>,
    ) -> Result<()> {
        let Some(group) = self.groups.get(handle) else {
            return Err(KinemaError::UnknownTarget(format!("{handle:?}")));
        };
        if group.is_started || group.is_empty() {
            return Ok(());
        }
        let (from, to) = range.unwrap_or((group.from_frame(), group.to_frame()));
        let options = PlaybackOptions {
            from,
            to,
            loop_animation,
            speed_ratio,
            write_mode: match group.weight {
                Some(w) => WriteMode::Weighted(w),
                None => WriteMode::Direct,
            },
            is_additive: group.is_additive,
            dispose_on_end: true,
        };

        let mut bound = Vec::with_capacity(group.len());
        for (index, member) in group.targeted_curves().iter().enumerate() {
            let mut playback = Playback::new(&[member.target], &options);
            playback.append_curves(host, std::slice::from_ref(&member.curve))?;
            playback.group = Some((handle, index));
            bound.push(playback);
        }

        let handles: Vec<_> = bound.into_iter().map(|p| self.playbacks.insert(p)).collect();
        self.order.extend_from_slice(&handles);

        if let Some(group) = self.groups.get_mut(handle) {
            log::debug!("Group '{}' started with {} playback(s)", group.name, handles.len());
            group.playbacks = handles;
            group.loop_animation = loop_animation;
            group.speed_ratio = speed_ratio;
            group.loop_flags.clear();
            group.loop_count = 0;
            group.is_started = true;
            group.is_paused = false;
        }
        Ok(())
    }

    pub fn pause_group(&mut self, handle: GroupHandle) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        if !group.is_started {
            return;
        }
        group.is_paused = true;
        for &h in &group.playbacks {
            if let Some(p) = self.playbacks.get_mut(h) {
                p.pause();
            }
        }
    }

    /// Resumes a started group, or (re)starts it from scratch.
    pub fn play_group(&mut self, host: &dyn AnimationHost, handle: GroupHandle, loop_animation: Option<bool>) -> Result<()> {
        let Some(group) = self.groups.get(handle) else {
            return Err(KinemaError::UnknownTarget(format!("{handle:?}")));
        };
        if group.is_started && group.playbacks.len() == group.len() {
            if let Some(looping) = loop_animation {
                self.set_group_loop(handle, looping);
            }
            self.restart_group(handle);
            return Ok(());
        }
        let looping = loop_animation.unwrap_or(group.loop_animation);
        let speed = group.speed_ratio;
        self.stop_group(handle);
        self.start_group(host, handle, looping, speed, None)
    }

    /// Un-pauses every playback of a started group.
    pub fn restart_group(&mut self, handle: GroupHandle) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        if !group.is_started {
            return;
        }
        group.is_paused = false;
        for &h in &group.playbacks {
            if let Some(p) = self.playbacks.get_mut(h) {
                p.restart();
            }
        }
    }

    pub fn stop_group(&mut self, handle: GroupHandle) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        if !group.is_started {
            return;
        }
        log::debug!("Group '{}' stopped", group.name);
        let handles = group.playbacks.clone();
        for h in handles {
            self.dispose(h);
        }
        if let Some(group) = self.groups.get_mut(handle) {
            group.is_started = false;
            group.is_paused = false;
            group.playbacks.clear();
        }
    }

    /// Rewinds every playback of the group, restoring original values.
    pub fn reset_group(&mut self, host: &mut dyn AnimationHost, handle: GroupHandle) {
        let Some(group) = self.groups.get(handle) else {
            return;
        };
        for h in group.playbacks.clone() {
            self.reset(host, h);
        }
    }

    pub fn go_to_frame_group(&mut self, host: &mut dyn AnimationHost, handle: GroupHandle, frame: f32) {
        let Some(group) = self.groups.get(handle) else {
            return;
        };
        for h in group.playbacks.clone() {
            self.go_to_frame(host, h, frame);
        }
    }

    pub fn set_group_speed_ratio(&mut self, handle: GroupHandle, speed_ratio: f32) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        group.speed_ratio = speed_ratio;
        for &h in &group.playbacks {
            if let Some(p) = self.playbacks.get_mut(h) {
                p.set_speed_ratio(speed_ratio);
            }
        }
    }

    /// Sets the weight on the group and all of its live playbacks.
    pub fn set_group_weight(&mut self, handle: GroupHandle, weight: Option<f32>) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        group.weight = weight.map(|w| w.clamp(0.0, 1.0));
        for &h in &group.playbacks {
            if let Some(p) = self.playbacks.get_mut(h) {
                p.set_weight(weight);
            }
        }
    }

    pub fn set_group_loop(&mut self, handle: GroupHandle, loop_animation: bool) {
        let Some(group) = self.groups.get_mut(handle) else {
            return;
        };
        group.loop_animation = loop_animation;
        for &h in &group.playbacks {
            if let Some(p) = self.playbacks.get_mut(h) {
                p.loop_animation = loop_animation;
            }
        }
    }

    fn record_group_end(&mut self, playback: PlaybackHandle, group: Option<(GroupHandle, usize)>) {
        let Some((gh, _)) = group else { return };
        if let Some(group) = self.groups.get_mut(gh)
            && group.record_end(playback)
        {
            log::debug!("Group '{}' ended", group.name);
            self.events.push(AnimatorEvent::GroupEnded(gh));
        }
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Advances the clock by `real_delta_ms` (subject to the configured
    /// constant delta and time scale) and animates.
    pub fn tick(&mut self, host: &mut dyn AnimationHost, real_delta_ms: f64) {
        if !self.settings.animations_enabled {
            return;
        }
        let now = self.clock.tick(
            real_delta_ms,
            self.settings.constant_delta_time.map(f64::from),
            f64::from(self.settings.animation_time_scale),
        );
        self.animate_at(host, now);
    }

    /// Runs both phases at an absolute animation time in milliseconds.
    pub fn animate_at(&mut self, host: &mut dyn AnimationHost, now_ms: f64) {
        let order = std::mem::take(&mut self.order);
        let mut reports: Vec<(PlaybackHandle, TickReport)> = Vec::new();

        // Phase 1: tick
        {
            let mut ctx = AnimateContext {
                host: &mut *host,
                compositor: &mut self.compositor,
                settings: &self.settings,
            };
            for &handle in &order {
                let sync = self
                    .playbacks
                    .get(handle)
                    .and_then(|p| p.sync_root)
                    .and_then(|root| self.playbacks.get(root))
                    .map(Playback::sync_info);
                let Some(playback) = self.playbacks.get_mut(handle) else {
                    continue;
                };
                let report = playback.tick(now_ms, &mut ctx, sync);
                if report.looped || report.ended {
                    reports.push((handle, report));
                }
            }
        }
        self.order = order;

        // Phase 2: resolve
        self.compositor.resolve(host, self.settings.matrix_interpolation);

        for (handle, report) in reports {
            let Some(playback) = self.playbacks.get(handle) else {
                continue;
            };
            let group = playback.group;
            let dispose = report.ended && playback.dispose_on_end;

            if report.looped {
                self.events.push(AnimatorEvent::PlaybackLooped(handle));
                if let Some((gh, member)) = group
                    && let Some(g) = self.groups.get_mut(gh)
                    && g.record_loop(member)
                {
                    self.events.push(AnimatorEvent::GroupLooped(gh));
                }
            }
            if report.ended {
                self.events.push(AnimatorEvent::PlaybackEnded(handle));
                self.record_group_end(handle, group);
            }
            if dispose {
                self.playbacks.remove(handle);
                self.order.retain(|&h| h != handle);
                log::debug!("Playback {handle:?} finished and disposed");
            }
        }
    }

    /// Lifecycle events gathered since the last drain.
    pub fn drain_events(&mut self) -> Vec<AnimatorEvent> {
        std::mem::take(&mut self.events)
    }
}
