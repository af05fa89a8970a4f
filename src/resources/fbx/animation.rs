//! FBX animation curves and their resampling into clips.

use cgmath::{Quaternion, Vector3};

use super::{reader::FbxNode, transform::EulerRotation};
use crate::resources::animation::{Channel, Keyframes};

/// FBX time unit: ticks per second.
pub const TICKS_PER_SECOND: f64 = 46_186_158_000.0;

/// One scalar curve, key times in seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Curve {
    pub times: Vec<f64>,
    pub values: Vec<f32>,
}

impl Curve {
    pub fn from_node(node: &FbxNode) -> Option<Curve> {
        let times = node.child("KeyTime")?.prop(0)?.to_i64_vec()?;
        let values = node.child("KeyValueFloat")?.prop(0)?.to_f64_vec()?;
        let len = times.len().min(values.len());
        if len == 0 {
            return None;
        }
        Some(Curve {
            times: times[..len]
                .iter()
                .map(|&t| t as f64 / TICKS_PER_SECOND)
                .collect(),
            values: values[..len].iter().map(|&v| v as f32).collect(),
        })
    }

    /// Linear interpolation, clamped to the first and last key.
    pub fn evaluate(&self, time: f64) -> f32 {
        let Some(&first) = self.times.first() else {
            return 0.0;
        };
        if time <= first {
            return self.values[0];
        }
        let next = self.times.partition_point(|&t| t <= time);
        if next >= self.times.len() {
            return self.values[self.values.len() - 1];
        }
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        if span <= 0.0 {
            return self.values[next];
        }
        let t = ((time - self.times[prev]) / span) as f32;
        self.values[prev] + (self.values[next] - self.values[prev]) * t
    }
}

/// Which local property a curve node animates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Translation,
    Rotation,
    Scale,
}

impl Target {
    pub fn from_property(name: &str) -> Option<Target> {
        match name {
            "Lcl Translation" => Some(Target::Translation),
            "Lcl Rotation" => Some(Target::Rotation),
            "Lcl Scaling" => Some(Target::Scale),
            _ => None,
        }
    }
}

/// The three axis curves of one animated property. Axes without a curve keep
/// their static value.
#[derive(Clone, Debug)]
pub struct CurveNode {
    pub target: Target,
    pub node: usize,
    pub axes: [Option<Curve>; 3],
    pub defaults: [f32; 3],
}

impl CurveNode {
    fn key_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.axes.iter().flatten().flat_map(|c| c.times.iter().copied())
    }

    fn evaluate(&self, time: f64) -> Vector3<f32> {
        let axis = |i: usize| match &self.axes[i] {
            Some(curve) => curve.evaluate(time),
            None => self.defaults[i],
        };
        Vector3::new(axis(0), axis(1), axis(2))
    }
}

/// Resamples curve nodes into clip channels on the union of their key times.
///
/// Times are shifted so that the earliest key of the clip is at zero.
/// `rotation_of(node)` supplies the pre/post rotation and Euler order used to
/// turn animated Euler angles into quaternions.
pub fn resample<'a>(
    curve_nodes: &[CurveNode],
    rotation_of: impl Fn(usize) -> Option<&'a EulerRotation>,
) -> Vec<Channel> {
    let start = curve_nodes
        .iter()
        .flat_map(|cn| cn.key_times())
        .fold(f64::INFINITY, f64::min);
    if !start.is_finite() {
        return Vec::new();
    }

    curve_nodes
        .iter()
        .filter_map(|cn| {
            let mut times: Vec<f64> = cn.key_times().collect();
            times.sort_by(|a, b| a.total_cmp(b));
            times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
            if times.is_empty() {
                return None;
            }
            let values = times.iter().map(|&t| cn.evaluate(t));
            let keyframes = match cn.target {
                Target::Translation => Keyframes::Translation(values.collect()),
                Target::Scale => Keyframes::Scale(values.collect()),
                Target::Rotation => {
                    let default = EulerRotation::default();
                    let rotation = rotation_of(cn.node).unwrap_or(&default);
                    let quats: Vec<Quaternion<f32>> =
                        values.map(|degrees| rotation.to_quaternion(degrees)).collect();
                    Keyframes::Rotation(quats)
                }
            };
            Some(Channel {
                node: cn.node,
                timestamps: times.iter().map(|&t| (t - start) as f32).collect(),
                keyframes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(times: &[f64], values: &[f32]) -> Curve {
        Curve {
            times: times.to_vec(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn evaluates_linearly_between_keys() {
        let c = curve(&[0.0, 1.0], &[0.0, 10.0]);
        assert_eq!(c.evaluate(0.25), 2.5);
        assert_eq!(c.evaluate(-1.0), 0.0);
        assert_eq!(c.evaluate(3.0), 10.0);
    }

    #[test]
    fn resamples_on_the_union_of_axis_keys() {
        let node = CurveNode {
            target: Target::Translation,
            node: 0,
            axes: [
                Some(curve(&[1.0, 2.0], &[0.0, 2.0])),
                Some(curve(&[1.5], &[7.0])),
                None,
            ],
            defaults: [0.0, 0.0, 3.0],
        };
        let channels = resample(&[node], |_| None);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].timestamps, vec![0.0, 0.5, 1.0]);
        match &channels[0].keyframes {
            Keyframes::Translation(v) => {
                assert_eq!(v[1], Vector3::new(1.0, 7.0, 3.0));
            }
            other => panic!("unexpected keyframes {:?}", other),
        }
    }
}
