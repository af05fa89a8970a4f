//! Animation playback bound to one model.

use instant::Duration;

use crate::{
    data_structures::node_tree::NodeTree,
    resources::animation::{AnimationClip, Sample},
};

/// Plays one clip on a loop and writes the sampled transforms into a
/// [`NodeTree`]. A driver belongs to exactly one model and is dropped with it.
#[derive(Clone, Debug)]
pub struct AnimationDriver {
    clip: AnimationClip,
    time: f32,
}

impl AnimationDriver {
    /// Binds the first clip of `clips`. Any further clips are ignored.
    pub fn from_clips(clips: &[AnimationClip]) -> Option<Self> {
        let clip = clips.first()?;
        if clips.len() > 1 {
            log::debug!(
                "Asset has {} animation clips, playing only '{}'",
                clips.len(),
                clip.name
            );
        }
        Some(Self {
            clip: clip.clone(),
            time: 0.0,
        })
    }

    pub fn clip_name(&self) -> &str {
        &self.clip.name
    }

    /// Current playback position in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Moves the playhead by `dt` (wrapping at the end of the clip) and applies
    /// the pose to `tree`.
    pub fn advance(&mut self, dt: Duration, tree: &mut NodeTree) {
        self.time += dt.as_secs_f32();
        if self.clip.duration > 0.0 {
            self.time %= self.clip.duration;
        } else {
            self.time = 0.0;
        }
        self.apply(tree);
    }

    pub fn apply(&self, tree: &mut NodeTree) {
        for channel in &self.clip.channels {
            let Some(sample) = channel.sample(self.time) else {
                continue;
            };
            let Some(node) = tree.node_mut(channel.node) else {
                log::warn!("Animated node #{} not found in model", channel.node);
                continue;
            };
            match sample {
                Sample::Translation(t) => node.local.position = t,
                Sample::Rotation(r) => node.local.rotation = r,
                Sample::Scale(s) => node.local.scale = s,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;
    use crate::{
        data_structures::instance::Instance,
        resources::animation::{Channel, Keyframes},
    };

    fn bounce() -> AnimationClip {
        AnimationClip::new(
            "bounce",
            vec![Channel {
                node: 0,
                timestamps: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(0.0, 2.0, 0.0),
                ]),
            }],
        )
    }

    #[test]
    fn only_the_first_clip_is_bound() {
        let mut other = bounce();
        other.name = "wave".into();
        let driver = AnimationDriver::from_clips(&[bounce(), other]).expect("has clips");
        assert_eq!(driver.clip_name(), "bounce");
    }

    #[test]
    fn no_clips_no_driver() {
        assert!(AnimationDriver::from_clips(&[]).is_none());
    }

    #[test]
    fn advancing_wraps_and_poses_the_tree() {
        let mut tree = NodeTree::new();
        tree.add_node("root", None, Instance::new());
        let mut driver = AnimationDriver::from_clips(&[bounce()]).expect("has clips");

        driver.advance(Duration::from_millis(500), &mut tree);
        assert_eq!(tree.nodes()[0].local.position, Vector3::new(0.0, 1.0, 0.0));

        driver.advance(Duration::from_millis(1000), &mut tree);
        assert!((driver.time() - 0.5).abs() < 1e-5);
    }
}
