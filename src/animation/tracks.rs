use glam::Quat;
use smallvec::SmallVec;

/// Keyframe interpolation declared by a glTF sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    #[default]
    Linear,
    Step,
    /// Output holds (in-tangent, value, out-tangent) per key.
    CubicSpline,
}

impl InterpolationMode {
    /// Unknown names fall back to LINEAR.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "STEP" => Self::Step,
            "CUBICSPLINE" => Self::CubicSpline,
            _ => Self::Linear,
        }
    }

    /// Number of output elements stored per key.
    #[inline]
    #[must_use]
    pub fn elements_per_key(self) -> usize {
        match self {
            Self::CubicSpline => 3,
            _ => 1,
        }
    }
}

/// One sampled value. Sized for a quaternion or a handful of morph weights
/// without allocating.
pub type SampledValue = SmallVec<[f32; 8]>;

/// Forward-scan keyframe cursor.
///
/// Remembers the key the previous sample started at so sequential playback
/// finds the bracketing pair in O(1). A time earlier than the previous one
/// (a loop wrap or a seek) resets the cursor to the first key and rescans.
#[derive(Debug, Clone, Default)]
pub struct KeyframeCursor {
    pub last_key: usize,
    prev_time: f32,
}

impl KeyframeCursor {
    pub fn reset(&mut self) {
        self.last_key = 0;
        self.prev_time = 0.0;
    }

    /// Samples a keyframe stream at `time` (seconds, looping).
    ///
    /// `input` holds key times, `output` the flat values with `stride`
    /// components per element. Rotation streams (`is_rotation`) are always
    /// slerped and normalized, whatever the declared mode.
    ///
    /// Returns `None` when the streams are empty or shorter than the key
    /// count implies.
    pub fn sample(
        &mut self,
        input: &[f32],
        output: &[f32],
        stride: usize,
        mode: InterpolationMode,
        is_rotation: bool,
        time: f32,
    ) -> Option<SampledValue> {
        let per_key = mode.elements_per_key();
        if input.is_empty() || stride == 0 {
            return None;
        }

        // Constant channel
        if input.len() == 1 || output.len() == stride {
            let start = if output.len() >= 3 * stride && per_key == 3 { stride } else { 0 };
            return output.get(start..start + stride).map(SmallVec::from_slice);
        }

        let max_time = input[input.len() - 1];
        let t = if max_time > 0.0 { time.rem_euclid(max_time) } else { 0.0 };

        if t < self.prev_time {
            self.last_key = 0;
        }
        self.prev_time = t;

        let last = input.len() - 1;
        let next_key = (self.last_key.min(last)..input.len())
            .find(|&i| t <= input[i])
            .map_or(1, |i| i.clamp(1, last));
        let prev_key = next_key.saturating_sub(1);
        self.last_key = prev_key;

        let delta = input[next_key] - input[prev_key];
        let tn = if delta > 0.0 {
            ((t - input[prev_key]) / delta).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let element = |key: usize, slot: usize| {
            let start = (key * per_key + slot) * stride;
            output.get(start..start + stride)
        };
        let value_slot = if per_key == 3 { 1 } else { 0 };

        if is_rotation && stride == 4 {
            let q0 = Quat::from_slice(element(prev_key, value_slot)?).normalize();
            let q1 = Quat::from_slice(element(next_key, value_slot)?).normalize();
            let q = q0.slerp(q1, tn).normalize();
            return Some(SmallVec::from_slice(&q.to_array()));
        }

        match mode {
            InterpolationMode::Step => element(prev_key, 0).map(SmallVec::from_slice),
            InterpolationMode::Linear => {
                let a = element(prev_key, 0)?;
                let b = element(next_key, 0)?;
                Some(a.iter().zip(b).map(|(a, b)| a + (b - a) * tn).collect())
            }
            InterpolationMode::CubicSpline => {
                let p0 = element(prev_key, 1)?;
                let m0 = element(prev_key, 2)?;
                let m1 = element(next_key, 0)?;
                let p1 = element(next_key, 1)?;
                Some(
                    (0..stride)
                        .map(|k| hermite(p0[k], m0[k] * delta, p1[k], m1[k] * delta, tn))
                        .collect(),
                )
            }
        }
    }
}

/// Cubic Hermite spline between `p0` and `p1` with tangents already scaled
/// by the key interval.
#[inline]
#[must_use]
pub fn hermite(p0: f32, m0: f32, p1: f32, m1: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;
    let s0 = 1.0 - s2;
    let s1 = s3 - t2 + t;

    s0 * p0 + s1 * m0 + s2 * p1 + s3 * m1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hermite_hits_endpoints() {
        assert!((hermite(1.0, 5.0, 3.0, -2.0, 0.0) - 1.0).abs() < 1e-6);
        assert!((hermite(1.0, 5.0, 3.0, -2.0, 1.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn step_holds_previous_key() {
        let mut cursor = KeyframeCursor::default();
        let input = [0.0, 1.0, 2.0];
        let output = [10.0, 20.0, 30.0];
        let v = cursor.sample(&input, &output, 1, InterpolationMode::Step, false, 1.5).unwrap();
        assert_eq!(v.as_slice(), &[20.0]);
    }

    #[test]
    fn cursor_advances_and_resets_on_wrap() {
        let mut cursor = KeyframeCursor::default();
        let input = [0.0, 1.0, 2.0, 3.0];
        let output = [0.0, 1.0, 2.0, 3.0];

        cursor.sample(&input, &output, 1, InterpolationMode::Linear, false, 2.5);
        assert_eq!(cursor.last_key, 2);

        let v = cursor.sample(&input, &output, 1, InterpolationMode::Linear, false, 3.5).unwrap();
        assert_eq!(cursor.last_key, 0);
        assert!((v[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_streams_sample_to_none() {
        let mut cursor = KeyframeCursor::default();
        assert!(cursor.sample(&[], &[], 3, InterpolationMode::Linear, false, 0.0).is_none());
    }
}
