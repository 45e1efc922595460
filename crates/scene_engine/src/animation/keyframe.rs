//! Keyframes, samplers and named track sequences

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::foundation::math::{Quat, Quaternion, Vec4};

/// A single sample of an animated value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Time in seconds
    pub time: f32,
    /// Value; unused components are zero
    pub value: Vec4,
    /// Incoming tangent for Hermite splines
    pub in_tangent: Vec4,
    /// Outgoing tangent for Hermite splines
    pub out_tangent: Vec4,
}

impl Keyframe {
    /// Keyframe without tangents
    pub fn new(time: f32, value: Vec4) -> Self {
        Self {
            time,
            value,
            in_tangent: Vec4::zeros(),
            out_tangent: Vec4::zeros(),
        }
    }
}

/// How values between two keyframes are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Hold the earlier keyframe
    Step,
    /// Component-wise linear blend
    #[default]
    Linear,
    /// Spherical blend of XYZW quaternions
    Slerp,
    /// Catmull-Rom spline through neighbouring keyframes
    CatmullRomSpline,
    /// Cubic Hermite spline using keyframe tangents (glTF appendix C)
    HermiteSpline,
}

impl InterpolationMode {
    /// Parse the mode names used in scene files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "step" => Some(Self::Step),
            "linear" => Some(Self::Linear),
            "slerp" => Some(Self::Slerp),
            "spline" | "catmull-rom" => Some(Self::CatmullRomSpline),
            "hermite" => Some(Self::HermiteSpline),
            _ => None,
        }
    }
}

fn vec4_to_quat(v: &Vec4) -> Quat {
    Quat::new_normalize(Quaternion::new(v.w, v.x, v.y, v.z))
}

/// Interpolate between `b` and `c` at normalized position `t`.
///
/// `a` and `d` are the neighbours used by Catmull-Rom; `dt` is the time span
/// between `b` and `c`, needed to scale Hermite tangents.
pub fn interpolate(
    mode: InterpolationMode,
    a: &Keyframe,
    b: &Keyframe,
    c: &Keyframe,
    d: &Keyframe,
    t: f32,
    dt: f32,
) -> Vec4 {
    match mode {
        InterpolationMode::Step => b.value,
        InterpolationMode::Linear => b.value.lerp(&c.value, t),
        InterpolationMode::Slerp => {
            let qb = vec4_to_quat(&b.value);
            let qc = vec4_to_quat(&c.value);
            let q = qb.try_slerp(&qc, t, 1e-6).unwrap_or(qb);
            Vec4::new(q.i, q.j, q.k, q.w)
        }
        InterpolationMode::CatmullRomSpline => {
            let i = -a.value + b.value * 3.0 - c.value * 3.0 + d.value;
            let j = a.value * 2.0 - b.value * 5.0 + c.value * 4.0 - d.value;
            let k = -a.value + c.value;
            ((i * t + j) * t + k) * t * 0.5 + b.value
        }
        InterpolationMode::HermiteSpline => {
            let t2 = t * t;
            let t3 = t2 * t;
            b.value * (2.0 * t3 - 3.0 * t2 + 1.0)
                + b.out_tangent * ((t3 - 2.0 * t2 + t) * dt)
                + c.value * (-2.0 * t3 + 3.0 * t2)
                + c.in_tangent * ((t3 - t2) * dt)
        }
    }
}

/// Keyframe track with a single interpolation mode
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    keyframes: Vec<Keyframe>,
    mode: InterpolationMode,
}

impl Sampler {
    /// Create an empty sampler
    pub fn new(mode: InterpolationMode) -> Self {
        Self {
            keyframes: Vec::new(),
            mode,
        }
    }

    /// Evaluate the track at `time`.
    ///
    /// Before the first keyframe the first value is returned. At or past the
    /// last keyframe the last value is returned only when
    /// `extrapolate_last_values` is set; otherwise there is no value.
    pub fn evaluate(&self, time: f32, extrapolate_last_values: bool) -> Option<Vec4> {
        let count = self.keyframes.len();
        let first = self.keyframes.first()?;
        if time <= first.time {
            return Some(first.value);
        }

        let last = &self.keyframes[count - 1];
        if count == 1 || time >= last.time {
            return extrapolate_last_values.then_some(last.value);
        }

        let offset = self
            .keyframes
            .windows(2)
            .position(|pair| pair[0].time <= time && time < pair[1].time)?;

        let b = &self.keyframes[offset];
        let c = &self.keyframes[offset + 1];
        let a = if offset > 0 { &self.keyframes[offset - 1] } else { b };
        let d = self.keyframes.get(offset + 2).unwrap_or(c);
        let dt = c.time - b.time;
        let u = (time - b.time) / dt;

        Some(interpolate(self.mode, a, b, c, d, u, dt))
    }

    /// Append a keyframe. Callers are responsible for time ordering.
    pub fn add_keyframe(&mut self, keyframe: Keyframe) {
        self.keyframes.push(keyframe);
    }

    /// Sort keyframes by time
    pub fn sort_keyframes(&mut self) {
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// All keyframes in time order
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Interpolation mode
    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// Change the interpolation mode
    pub fn set_mode(&mut self, mode: InterpolationMode) {
        self.mode = mode;
    }

    /// Time of the first keyframe, or zero
    pub fn start_time(&self) -> f32 {
        self.keyframes.first().map_or(0.0, |k| k.time)
    }

    /// Time of the last keyframe, or zero
    pub fn end_time(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    /// Load `{ "mode": "...", "values": [ { "time": t, "value": v }, ... ] }`.
    ///
    /// Keyframes whose time is not numeric, or whose value is an object or
    /// string, are skipped with a warning.
    pub fn load(&mut self, node: &Value) {
        if let Some(name) = node.get("mode").and_then(Value::as_str) {
            match InterpolationMode::from_name(name) {
                Some(mode) => self.mode = mode,
                None => log::warn!("Unknown interpolation mode '{name}'"),
            }
        }

        let Some(values) = node.get("values").and_then(Value::as_array) else {
            return;
        };
        for entry in values {
            let Some(time) = entry.get("time").and_then(Value::as_f64) else {
                log::warn!("Keyframe without a numeric time, skipping");
                continue;
            };
            let Some(value) = entry.get("value").and_then(parse_vec4) else {
                log::warn!("Objects and strings are not supported as animation keyframe values");
                continue;
            };
            self.add_keyframe(Keyframe::new(time as f32, value));
        }
        self.sort_keyframes();
    }
}

/// Read a number or an array of up to four numbers into a zero-padded vector.
pub fn parse_vec4(value: &Value) -> Option<Vec4> {
    let mut result = Vec4::zeros();
    if let Some(x) = value.as_f64() {
        result.x = x as f32;
        return Some(result);
    }
    let items = value.as_array()?;
    for (i, item) in items.iter().take(4).enumerate() {
        result[i] = item.as_f64()? as f32;
    }
    Some(result)
}

/// Named collection of samplers sharing a timeline
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    tracks: HashMap<String, Rc<Sampler>>,
    duration: f32,
}

impl Sequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a track by name
    pub fn track(&self, name: &str) -> Option<&Rc<Sampler>> {
        self.tracks.get(name)
    }

    /// Evaluate a named track; unknown tracks have no value
    pub fn evaluate(&self, name: &str, time: f32, extrapolate_last_values: bool) -> Option<Vec4> {
        self.track(name)?.evaluate(time, extrapolate_last_values)
    }

    /// Add or replace a track, extending the duration to cover it
    pub fn add_track(&mut self, name: impl Into<String>, track: Rc<Sampler>) {
        self.duration = self.duration.max(track.end_time());
        self.tracks.insert(name.into(), track);
    }

    /// Latest end time over all tracks
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Load an array of named samplers
    pub fn load(&mut self, node: &Value) {
        let Some(tracks) = node.as_array() else {
            log::warn!("Animation sequence must be an array of tracks");
            return;
        };
        for track_node in tracks {
            let mut track = Sampler::default();
            track.load(track_node);
            let name = track_node.get("name").and_then(Value::as_str).unwrap_or_default();
            self.add_track(name, Rc::new(track));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar_sampler(mode: InterpolationMode, points: &[(f32, f32)]) -> Sampler {
        let mut sampler = Sampler::new(mode);
        for &(time, value) in points {
            sampler.add_keyframe(Keyframe::new(time, Vec4::new(value, 0.0, 0.0, 0.0)));
        }
        sampler
    }

    #[test]
    fn test_sampler_boundaries() {
        let sampler = scalar_sampler(InterpolationMode::Linear, &[(0.0, 10.0), (1.0, 20.0), (2.0, 30.0)]);

        assert_relative_eq!(sampler.evaluate(-1.0, false).unwrap().x, 10.0);
        assert_relative_eq!(sampler.evaluate(3.0, true).unwrap().x, 30.0);
        assert!(sampler.evaluate(3.0, false).is_none());
        assert!(Sampler::default().evaluate(0.0, true).is_none());
    }

    #[test]
    fn test_linear_and_step_between_keys() {
        let linear = scalar_sampler(InterpolationMode::Linear, &[(0.0, 0.0), (2.0, 4.0)]);
        assert_relative_eq!(linear.evaluate(0.5, false).unwrap().x, 1.0);

        let step = scalar_sampler(InterpolationMode::Step, &[(0.0, 0.0), (2.0, 4.0)]);
        assert_relative_eq!(step.evaluate(1.9, false).unwrap().x, 0.0);
    }

    #[test]
    fn test_catmull_rom_passes_through_keys_and_is_linear_on_lines() {
        let spline = scalar_sampler(
            InterpolationMode::CatmullRomSpline,
            &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)],
        );
        assert_relative_eq!(spline.evaluate(1.0, false).unwrap().x, 1.0);
        assert_relative_eq!(spline.evaluate(1.5, false).unwrap().x, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_hermite_uses_tangents() {
        let mut sampler = Sampler::new(InterpolationMode::HermiteSpline);
        let mut a = Keyframe::new(0.0, Vec4::zeros());
        a.out_tangent = Vec4::new(1.0, 0.0, 0.0, 0.0);
        let mut b = Keyframe::new(1.0, Vec4::new(1.0, 0.0, 0.0, 0.0));
        b.in_tangent = Vec4::new(1.0, 0.0, 0.0, 0.0);
        sampler.add_keyframe(a);
        sampler.add_keyframe(b);
        // Unit slope at both ends reproduces the straight line.
        assert_relative_eq!(sampler.evaluate(0.25, false).unwrap().x, 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_slerp_halfway_rotation() {
        let half = std::f32::consts::FRAC_PI_2;
        let q = Quat::from_axis_angle(&crate::foundation::math::Vec3::z_axis(), half);
        let mut sampler = Sampler::new(InterpolationMode::Slerp);
        sampler.add_keyframe(Keyframe::new(0.0, Vec4::new(0.0, 0.0, 0.0, 1.0)));
        sampler.add_keyframe(Keyframe::new(1.0, Vec4::new(q.i, q.j, q.k, q.w)));

        let v = sampler.evaluate(0.5, false).unwrap();
        let expected = Quat::from_axis_angle(&crate::foundation::math::Vec3::z_axis(), half * 0.5);
        assert_relative_eq!(v.z, expected.k, epsilon = 1e-5);
        assert_relative_eq!(v.w, expected.w, epsilon = 1e-5);
    }

    #[test]
    fn test_load_sorts_and_skips_bad_keyframes() {
        let json = serde_json::json!({
            "mode": "step",
            "values": [
                { "time": 2.0, "value": [2, 0, 0] },
                { "time": "soon", "value": 9 },
                { "time": 0.0, "value": 1 },
                { "time": 1.0, "value": "text" }
            ]
        });
        let mut sampler = Sampler::default();
        sampler.load(&json);

        assert_eq!(sampler.mode(), InterpolationMode::Step);
        assert_eq!(sampler.keyframes().len(), 2);
        assert_relative_eq!(sampler.start_time(), 0.0);
        assert_relative_eq!(sampler.end_time(), 2.0);
    }

    #[test]
    fn test_sequence_duration_and_lookup() {
        let mut sequence = Sequence::new();
        sequence.add_track("a", Rc::new(scalar_sampler(InterpolationMode::Linear, &[(0.0, 0.0), (4.0, 1.0)])));
        sequence.add_track("b", Rc::new(scalar_sampler(InterpolationMode::Linear, &[(0.0, 0.0), (2.0, 1.0)])));

        assert_relative_eq!(sequence.duration(), 4.0);
        assert_relative_eq!(sequence.evaluate("a", 2.0, false).unwrap().x, 0.5);
        assert!(sequence.evaluate("missing", 0.0, true).is_none());
    }
}
