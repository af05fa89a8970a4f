//! Animation clip data shared by every asset loader.

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<cgmath::Vector3<f32>>),
    Rotation(Vec<cgmath::Quaternion<f32>>),
    Scale(Vec<cgmath::Vector3<f32>>),
    Other,
}

impl Keyframes {
    pub fn len(&self) -> usize {
        match self {
            Keyframes::Translation(v) => v.len(),
            Keyframes::Rotation(v) => v.len(),
            Keyframes::Scale(v) => v.len(),
            Keyframes::Other => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One animated property of one node.
#[derive(Clone, Debug)]
pub struct Channel {
    pub node: usize,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

/// A sampled value of a channel at some point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Translation(Vector3<f32>),
    Rotation(Quaternion<f32>),
    Scale(Vector3<f32>),
}

impl Channel {
    /// Linearly interpolated value at `time` (seconds). Times outside the key
    /// range clamp to the first or last key.
    pub fn sample(&self, time: f32) -> Option<Sample> {
        let count = self.timestamps.len().min(self.keyframes.len());
        if count == 0 {
            return None;
        }
        let (a, b, t) = locate(&self.timestamps[..count], time);
        match &self.keyframes {
            Keyframes::Translation(values) => {
                Some(Sample::Translation(values[a].lerp(values[b], t)))
            }
            Keyframes::Scale(values) => Some(Sample::Scale(values[a].lerp(values[b], t))),
            Keyframes::Rotation(values) => {
                let (from, mut to) = (values[a], values[b]);
                // Take the short way around.
                if from.dot(to) < 0.0 {
                    to = -to;
                }
                Some(Sample::Rotation(from.nlerp(to, t).normalize()))
            }
            Keyframes::Other => None,
        }
    }
}

/// Finds the two keys surrounding `time` and the blend factor between them.
fn locate(timestamps: &[f32], time: f32) -> (usize, usize, f32) {
    let last = timestamps.len() - 1;
    if time <= timestamps[0] {
        return (0, 0, 0.0);
    }
    if time >= timestamps[last] {
        return (last, last, 0.0);
    }
    let next = timestamps.partition_point(|&t| t <= time);
    let prev = next - 1;
    let span = timestamps[next] - timestamps[prev];
    let t = if span > 0.0 {
        (time - timestamps[prev]) / span
    } else {
        0.0
    };
    (prev, next, t.clamp(0.0, 1.0))
}

/// An animation clip: a named set of channels and its duration in seconds.
#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.timestamps.last().copied())
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            channels,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3};

    use super::*;

    fn translation_channel() -> Channel {
        Channel {
            node: 0,
            timestamps: vec![0.0, 1.0, 2.0],
            keyframes: Keyframes::Translation(vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::new(2.0, 4.0, 0.0),
            ]),
        }
    }

    #[test]
    fn samples_between_keys() {
        let channel = translation_channel();
        assert_eq!(
            channel.sample(0.5),
            Some(Sample::Translation(Vector3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(
            channel.sample(1.5),
            Some(Sample::Translation(Vector3::new(2.0, 2.0, 0.0)))
        );
    }

    #[test]
    fn clamps_outside_the_key_range() {
        let channel = translation_channel();
        assert_eq!(
            channel.sample(-1.0),
            Some(Sample::Translation(Vector3::new(0.0, 0.0, 0.0)))
        );
        assert_eq!(
            channel.sample(9.0),
            Some(Sample::Translation(Vector3::new(2.0, 4.0, 0.0)))
        );
    }

    #[test]
    fn rotation_stays_normalized() {
        let channel = Channel {
            node: 0,
            timestamps: vec![0.0, 1.0],
            keyframes: Keyframes::Rotation(vec![
                Quaternion::from_angle_y(Deg(0.0)),
                Quaternion::from_angle_y(Deg(90.0)),
            ]),
        };
        match channel.sample(0.5) {
            Some(Sample::Rotation(q)) => assert!((q.magnitude() - 1.0).abs() < 1e-5),
            other => panic!("unexpected sample {:?}", other),
        }
    }

    #[test]
    fn clip_duration_is_the_last_key() {
        let clip = AnimationClip::new("Take 001", vec![translation_channel()]);
        assert_eq!(clip.duration, 2.0);
    }
}
