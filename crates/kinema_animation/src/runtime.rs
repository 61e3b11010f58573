use std::sync::Arc;

use kinema_core::{KinemaError, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::binding::{AnimationHost, PropertyKey, TargetId, WriteMode};
use crate::compositor::LateBindingCompositor;
use crate::curve::{Curve, EventAction, KeyframeCursor, LoopMode};
use crate::settings::{AnimationSettings, MatrixInterpolation};
use crate::values::{AnimationValue, DataType};

/// Everything a runtime state touches while it ticks.
pub struct AnimateContext<'a> {
    pub host: &'a mut dyn AnimationHost,
    pub compositor: &'a mut LateBindingCompositor,
    pub settings: &'a AnimationSettings,
}

/// The shared timeline a playback hands to each of its curve states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub from: f32,
    pub to: f32,
    pub looping: bool,
    pub speed_ratio: f32,
}

/// Normalized progress of a sync root, read by playbacks synced to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncInfo {
    pub master_frame: f32,
    pub from: f32,
    pub to: f32,
}

#[derive(Debug, Clone, Copy)]
struct BoundTarget {
    id: TargetId,
    key: PropertyKey,
    /// Property value when the state was bound; the compositor's fallback.
    original_value: Option<AnimationValue>,
}

#[derive(Clone)]
struct RuntimeEvent {
    frame: f32,
    action: EventAction,
    only_once: bool,
    is_done: bool,
}

/// One curve bound to one or more targets, with its own playback cursor.
pub struct RuntimeCurveState {
    curve: Arc<Curve>,
    targets: SmallVec<[BoundTarget; 1]>,
    loop_mode: LoopMode,
    is_additive: bool,

    min_frame: f32,
    max_frame: f32,
    min_value: AnimationValue,
    max_value: AnimationValue,

    cursor: KeyframeCursor,
    current_frame: f32,
    current_value: Option<AnimationValue>,
    write_mode: WriteMode,

    // Keyed by (to, from) bit patterns.
    loop_cache: FxHashMap<(u32, u32), (AnimationValue, AnimationValue)>,
    events: Vec<RuntimeEvent>,

    enable_blending: bool,
    blending_speed: f32,
    blending_factor: f32,
    original_blend_value: Option<AnimationValue>,

    ratio_offset: f32,
    previous_elapsed: f64,
    previous_ratio: f32,
    yoyo_cycle: i64,
    has_ticked: bool,
    looped: bool,
    stopped: bool,
}

impl RuntimeCurveState {
    /// Binds `curve` to `targets`, resolving the property once per target and
    /// snapshotting each target's current value.
    ///
    /// A curve whose first key sits after frame 0 is bound through a copy
    /// carrying an extra frame-0 key; the shared definition is untouched.
    pub fn bind(curve: Arc<Curve>, targets: &[TargetId], host: &dyn AnimationHost, is_additive: bool) -> Result<Self> {
        let Some(&first_target) = targets.first() else {
            return Err(KinemaError::UnknownTarget(format!("curve '{}' bound to no target", curve.name)));
        };

        let curve = if curve.first_frame() > 0.0 {
            Arc::new(curve.with_leading_frame_zero())
        } else {
            curve
        };

        let mut bound = SmallVec::with_capacity(targets.len());
        for &id in targets {
            let key = host.resolve_property(id, curve.property_path())?;
            if let Some(expected) = host.property_data_type(id, key)
                && expected != curve.data_type()
            {
                return Err(KinemaError::PropertyTypeMismatch {
                    path: curve.property_path().to_string(),
                    target: id.to_string(),
                    expected: expected.name(),
                    found: curve.data_type().name(),
                });
            }
            bound.push(BoundTarget {
                id,
                key,
                original_value: host.read_property(id, key),
            });
        }

        let overrides = host.properties_override(first_target);
        let loop_mode = overrides.and_then(|o| o.loop_mode).unwrap_or(curve.loop_mode);
        let enable_blending = overrides.map_or(curve.enable_blending, |o| o.enable_blending);
        let blending_speed = overrides.map_or(curve.blending_speed, |o| o.blending_speed);

        let keys = curve.keys();
        let first = keys[0];
        let last = keys[keys.len() - 1];
        let events = curve
            .events()
            .iter()
            .map(|e| RuntimeEvent {
                frame: e.frame,
                action: Arc::clone(&e.action),
                only_once: e.only_once,
                is_done: false,
            })
            .collect();

        Ok(Self {
            targets: bound,
            loop_mode,
            is_additive,
            min_frame: first.frame,
            max_frame: last.frame,
            min_value: first.value,
            max_value: last.value,
            cursor: KeyframeCursor::new(loop_mode),
            current_frame: 0.0_f32.clamp(first.frame, last.frame),
            current_value: None,
            write_mode: WriteMode::Direct,
            loop_cache: FxHashMap::default(),
            events,
            enable_blending,
            blending_speed,
            blending_factor: 0.0,
            original_blend_value: None,
            ratio_offset: 0.0,
            previous_elapsed: 0.0,
            previous_ratio: 0.0,
            yoyo_cycle: 0,
            has_ticked: false,
            looped: false,
            stopped: false,
            curve,
        })
    }

    #[inline]
    #[must_use]
    pub fn curve(&self) -> &Arc<Curve> {
        &self.curve
    }

    /// The first bound target.
    #[must_use]
    pub fn target(&self) -> TargetId {
        self.targets[0].id
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.targets.iter().map(|t| t.id)
    }

    #[must_use]
    pub fn property_key(&self) -> PropertyKey {
        self.targets[0].key
    }

    #[inline]
    #[must_use]
    pub fn current_frame(&self) -> f32 {
        self.current_frame
    }

    #[inline]
    #[must_use]
    pub fn current_value(&self) -> Option<AnimationValue> {
        self.current_value
    }

    /// Weight used by the last write, `None` for direct writes.
    #[must_use]
    pub fn weight(&self) -> Option<f32> {
        self.write_mode.weight()
    }

    #[must_use]
    pub fn is_additive(&self) -> bool {
        self.is_additive
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn frame_range(&self) -> (f32, f32) {
        (self.min_frame, self.max_frame)
    }

    #[must_use]
    pub fn blending_factor(&self) -> f32 {
        self.blending_factor
    }

    #[must_use]
    pub fn fps(&self) -> f32 {
        self.curve.frames_per_second
    }

    /// Whether the last `animate` call wrapped around a loop boundary.
    #[must_use]
    pub fn looped_last_tick(&self) -> bool {
        self.looped
    }

    pub fn set_blending(&mut self, enabled: bool, speed: f32) {
        self.enable_blending = enabled;
        self.blending_speed = speed;
    }

    /// Absorbs a speed change into the ratio offset so the next tick resumes
    /// from the current position instead of jumping.
    pub fn prepare_for_speed_ratio_change(&mut self, new_speed_ratio: f32) {
        let new_ratio = (self.previous_elapsed * f64::from(self.fps()) * f64::from(new_speed_ratio) / 1000.0) as f32;
        self.ratio_offset = self.previous_ratio - new_ratio;
    }

    /// Advances the state to `elapsed_ms` on `timeline` and writes the value.
    ///
    /// Returns `false` once a non-looping timeline has run past its range; the
    /// value is then pinned to the boundary key.
    pub fn animate(
        &mut self,
        ctx: &mut AnimateContext<'_>,
        elapsed_ms: f64,
        timeline: Timeline,
        write_mode: WriteMode,
        sync: Option<SyncInfo>,
    ) -> bool {
        self.looped = false;
        let curve = Arc::clone(&self.curve);
        let matrix_mode = ctx.settings.matrix_interpolation;

        let mut from = timeline.from;
        let mut to = timeline.to;
        if from < self.min_frame || from > self.max_frame {
            from = self.min_frame;
        }
        if to < self.min_frame || to > self.max_frame {
            to = self.max_frame;
        }

        let range = to - from;
        let speed = timeline.speed_ratio;
        let fps = f64::from(curve.frames_per_second);
        let ratio = (elapsed_ms * fps * f64::from(speed) / 1000.0 + f64::from(self.ratio_offset)) as f32;
        self.previous_elapsed = elapsed_ms;
        self.previous_ratio = ratio;

        let mut running = true;
        let mut high_limit = None;
        let mut offset = None;

        if !timeline.looping && to >= from && ((ratio >= range && speed > 0.0) || (ratio <= 0.0 && speed < 0.0)) {
            running = false;
            high_limit = Some(self.max_value);
        } else if !timeline.looping && from >= to && ((ratio <= range && speed < 0.0) || (ratio >= 0.0 && speed > 0.0))
        {
            running = false;
            high_limit = Some(self.min_value);
        } else if self.loop_mode != LoopMode::Cycle {
            let (o, h) = self.loop_limits(&curve, from, to, matrix_mode);
            offset = Some(o);
            high_limit = Some(h);
        }

        let mut current_frame = match sync {
            Some(root) if root.to != root.from => {
                from + (to - from) * (root.master_frame - root.from) / (root.to - root.from)
            }
            // One pass per range: out to `to` and back, slowing at both ends.
            _ if self.loop_mode == LoopMode::Yoyo && running && range > 0.0 => {
                let position = ratio.rem_euclid(range) / range;
                from + range * (position * std::f32::consts::PI).sin().abs()
            }
            _ if (ratio > 0.0 && from > to) || (ratio < 0.0 && from < to) => {
                if running && range != 0.0 { to + ratio % range } else { from }
            }
            _ => {
                if running && range != 0.0 { from + ratio % range } else { to }
            }
        };
        current_frame = current_frame.clamp(self.min_frame, self.max_frame);

        if self.loop_mode == LoopMode::Yoyo && range > 0.0 {
            let cycle = (f64::from(ratio) / f64::from(range)).floor() as i64;
            if self.has_ticked && cycle != self.yoyo_cycle {
                self.on_loop(speed);
            }
            self.yoyo_cycle = cycle;
        } else if self.has_ticked
            && ((speed > 0.0 && self.current_frame > current_frame) || (speed < 0.0 && self.current_frame < current_frame))
        {
            self.on_loop(speed);
        }
        self.has_ticked = true;
        self.current_frame = current_frame;

        self.cursor.loop_mode = self.loop_mode;
        self.cursor.repeat_count = if range == 0.0 { 0 } else { (ratio / range) as i32 };
        self.cursor.offset_value = offset;
        self.cursor.high_limit_value = high_limit;

        let value = curve.interpolate(current_frame, &mut self.cursor, matrix_mode);
        self.set_value(ctx, value, write_mode);
        self.fire_events(current_frame, from, range);

        if !running {
            self.stopped = true;
        }
        running
    }

    /// Offset (`value(to) - value(from)`) and high limit (`value(to)`) for a
    /// `(from, to)` pair, cached across loops.
    fn loop_limits(&mut self, curve: &Curve, from: f32, to: f32, mode: MatrixInterpolation) -> (AnimationValue, AnimationValue) {
        let key = (to.to_bits(), from.to_bits());
        if let Some(&cached) = self.loop_cache.get(&key) {
            return cached;
        }
        let mut cursor = KeyframeCursor::new(LoopMode::Cycle);
        let from_value = curve.interpolate(from, &mut cursor, mode);
        let to_value = curve.interpolate(to, &mut cursor, mode);
        let offset = if curve.data_type() == DataType::Matrix {
            AnimationValue::zero(DataType::Matrix)
        } else {
            to_value.subtract(&from_value)
        };
        self.loop_cache.insert(key, (offset, to_value));
        (offset, to_value)
    }

    fn on_loop(&mut self, speed: f32) {
        self.looped = true;
        for event in &mut self.events {
            if !event.only_once {
                event.is_done = false;
            }
        }
        self.cursor.key = if speed > 0.0 {
            0
        } else {
            self.curve.keys().len() as isize - 1
        };
    }

    fn fire_events(&mut self, current_frame: f32, from: f32, range: f32) {
        let mut index = 0;
        while index < self.events.len() {
            let event = &self.events[index];
            let crossed = (range >= 0.0 && current_frame >= event.frame && event.frame >= from)
                || (range < 0.0 && current_frame <= event.frame && event.frame <= from);
            if !crossed || event.is_done {
                index += 1;
                continue;
            }
            if event.only_once {
                let event = self.events.remove(index);
                (event.action)(current_frame);
                continue;
            }
            self.events[index].is_done = true;
            (self.events[index].action)(current_frame);
            index += 1;
        }
    }

    fn set_value(&mut self, ctx: &mut AnimateContext<'_>, value: AnimationValue, write_mode: WriteMode) {
        self.write_mode = write_mode;

        let current = if self.enable_blending && self.blending_factor <= 1.0 {
            if self.original_blend_value.is_none() {
                let first = self.targets[0];
                self.original_blend_value = ctx.host.read_property(first.id, first.key);
            }
            let blended = match self.original_blend_value {
                Some(original) => {
                    let mode = match ctx.settings.matrix_interpolation {
                        MatrixInterpolation::None => MatrixInterpolation::Linear,
                        mode => mode,
                    };
                    original.lerp(&value, self.blending_factor, mode)
                }
                None => value,
            };
            self.blending_factor += self.blending_speed;
            blended
        } else {
            value
        };
        self.current_value = Some(current);

        match write_mode {
            WriteMode::Direct => {
                for target in &self.targets {
                    ctx.host.write_property(target.id, target.key, &current);
                }
            }
            WriteMode::Weighted(weight) => {
                for target in &self.targets {
                    match target.original_value {
                        Some(original) => ctx.compositor.register(
                            target.id,
                            target.key,
                            current,
                            weight,
                            self.is_additive,
                            original,
                        ),
                        None => log::warn!(
                            "'{}' on {} has no readable original value; weighted write skipped",
                            self.curve.target_property(),
                            target.id
                        ),
                    }
                }
            }
        }
    }

    /// Jumps straight to `frame`, re-arming events that lie ahead of it.
    pub fn go_to_frame(&mut self, ctx: &mut AnimateContext<'_>, frame: f32, write_mode: WriteMode) {
        let frame = frame.clamp(self.min_frame, self.max_frame);
        for event in &mut self.events {
            if !event.only_once {
                event.is_done = event.frame < frame;
            }
        }
        self.current_frame = frame;
        let value = self
            .curve
            .interpolate(frame, &mut self.cursor, ctx.settings.matrix_interpolation);
        self.set_value(ctx, value, write_mode);
    }

    /// Clears caches, cursor and blend ramp. With a host, the bound targets
    /// are restored to the values they held at bind time.
    pub fn reset(&mut self, restore: Option<&mut dyn AnimationHost>) {
        if let Some(host) = restore {
            for target in &self.targets {
                if let Some(original) = target.original_value {
                    host.write_property(target.id, target.key, &original);
                }
            }
        }
        self.loop_cache.clear();
        self.cursor = KeyframeCursor::new(self.loop_mode);
        self.current_frame = 0.0_f32.clamp(self.min_frame, self.max_frame);
        self.blending_factor = 0.0;
        self.original_blend_value = None;
        self.ratio_offset = 0.0;
        self.previous_ratio = 0.0;
        self.previous_elapsed = 0.0;
        self.yoyo_cycle = 0;
        self.has_ticked = false;
        self.looped = false;
        self.stopped = false;
        for event in &mut self.events {
            event.is_done = false;
        }
    }
}

impl std::fmt::Debug for RuntimeCurveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCurveState")
            .field("curve", &self.curve.name)
            .field("target", &self.target())
            .field("current_frame", &self.current_frame)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
