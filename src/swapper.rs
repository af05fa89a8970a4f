//! Replaces the displayed avatar.
//!
//! Requests release the current model immediately and hand out a
//! [`LoadTicket`]. Loads are never cancelled. When one finishes, only the
//! result for the most recent ticket is attached and anything older is
//! released on arrival.

use cgmath::{Point3, Vector3};
use instant::Duration;

use crate::{
    config::FramingConfig,
    data_structures::{
        animation::AnimationDriver, bounds::Aabb, instance::Instance, node_tree::NodeTree,
    },
    resources::animation::AnimationClip,
};

/// Explicit release of the resources an asset holds. Must be idempotent.
pub trait Dispose {
    fn dispose(&mut self);
}

/// What the swapper needs from a loaded asset.
pub trait SceneAsset: Dispose {
    fn animations(&self) -> &[AnimationClip];
    fn node_tree(&self) -> &NodeTree;
    fn node_tree_mut(&mut self) -> &mut NodeTree;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadResolution {
    /// The asset is now the current model.
    Attached,
    /// A newer request was made while this one was in flight.
    Stale,
    Failed,
}

/// Camera placement derived from a model's bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    /// Orbit center and fill light aim.
    pub target: Point3<f32>,
    pub eye: Point3<f32>,
}

/// Frames `bounds` from the front: the target sits `height_factor` of the
/// height above the center and the eye `depth_factor` depths in front of it.
/// Flat models (no depth) are framed by their largest extent instead.
pub fn frame_bounds(bounds: &Aabb, config: &FramingConfig) -> Framing {
    let center = bounds.center();
    let size = bounds.size();
    let depth = if size.z > f32::EPSILON {
        size.z
    } else {
        let largest = size.x.max(size.y).max(size.z);
        if largest > f32::EPSILON { largest } else { 1.0 }
    };
    let target = center + Vector3::new(0.0, config.height_factor * size.y, 0.0);
    let eye = target + Vector3::new(0.0, 0.0, config.depth_factor * depth);
    Framing { target, eye }
}

#[derive(Debug)]
pub struct Attached<M> {
    pub path: String,
    pub model: M,
    pub driver: Option<AnimationDriver>,
}

#[derive(Debug)]
pub struct ModelSwapper<M: SceneAsset> {
    model_scale: f32,
    framing: FramingConfig,
    last_ticket: u64,
    latest: Option<(LoadTicket, String)>,
    current: Option<Attached<M>>,
    framing_pending: bool,
}

impl<M: SceneAsset> ModelSwapper<M> {
    pub fn new(model_scale: f32, framing: FramingConfig) -> Self {
        Self {
            model_scale,
            framing,
            last_ticket: 0,
            latest: None,
            current: None,
            framing_pending: false,
        }
    }

    /// Releases the current model and registers a load of `path`. The caller
    /// starts the actual load and reports back through [`Self::complete`].
    pub fn request(&mut self, path: &str) -> LoadTicket {
        if let Some(mut old) = self.current.take() {
            old.model.dispose();
            log::debug!("Released model {}", old.path);
        }
        self.framing_pending = false;
        self.last_ticket += 1;
        let ticket = LoadTicket(self.last_ticket);
        self.latest = Some((ticket, path.to_string()));
        log::info!("Loading model {}", path);
        ticket
    }

    pub fn complete(&mut self, ticket: LoadTicket, result: anyhow::Result<M>) -> LoadResolution {
        let path = match self.latest.take() {
            Some((latest, path)) if latest == ticket => path,
            other => {
                self.latest = other;
                match result {
                    Ok(mut model) => {
                        model.dispose();
                        log::debug!("Discarded result of superseded load #{}", ticket.id());
                    }
                    Err(e) => {
                        log::debug!("Superseded load #{} failed: {:#}", ticket.id(), e);
                    }
                }
                return LoadResolution::Stale;
            }
        };

        match result {
            Ok(mut model) => {
                model.node_tree_mut().root = Instance::uniform_scale(self.model_scale);
                let driver = AnimationDriver::from_clips(model.animations());
                if let Some(driver) = &driver {
                    driver.apply(model.node_tree_mut());
                    log::info!("Playing animation '{}' of {}", driver.clip_name(), path);
                }
                log::info!("Attached model {}", path);
                self.current = Some(Attached {
                    path,
                    model,
                    driver,
                });
                self.framing_pending = true;
                LoadResolution::Attached
            }
            Err(e) => {
                log::error!("Failed to load model {}: {:#}", path, e);
                LoadResolution::Failed
            }
        }
    }

    /// Steps the animation of the current model.
    pub fn advance(&mut self, dt: Duration) {
        if let Some(Attached {
            model,
            driver: Some(driver),
            ..
        }) = &mut self.current
        {
            driver.advance(dt, model.node_tree_mut());
        }
    }

    /// Framing for a freshly attached model, once. Models without geometry
    /// leave the camera alone.
    pub fn take_framing(&mut self) -> Option<Framing> {
        if !std::mem::take(&mut self.framing_pending) {
            return None;
        }
        let bounds = self.current.as_ref()?.model.node_tree().bounds()?;
        Some(frame_bounds(&bounds, &self.framing))
    }

    pub fn current(&self) -> Option<&Attached<M>> {
        self.current.as_ref()
    }

    pub fn current_model(&self) -> Option<&M> {
        self.current.as_ref().map(|attached| &attached.model)
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current.as_ref().map(|attached| attached.path.as_str())
    }

    /// Whether a requested load has not completed yet.
    pub fn is_loading(&self) -> bool {
        self.latest.is_some()
    }

    /// Releases everything at teardown.
    pub fn clear(&mut self) {
        if let Some(mut old) = self.current.take() {
            old.model.dispose();
        }
        self.latest = None;
        self.framing_pending = false;
    }
}

impl<M: SceneAsset> Drop for ModelSwapper<M> {
    fn drop(&mut self) {
        self.clear();
    }
}
