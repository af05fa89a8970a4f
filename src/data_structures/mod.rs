//! Viewer data structures: models, textures, node trees, and instances.
//!
//! This module contains the core data types for scene representation:
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `texture` contains GPU texture wrapper and creation utilities
//! - `instance` holds per-node transformation data and its GPU layout
//! - `node_tree` is the flat node hierarchy of a loaded asset
//! - `bounds` computes axis-aligned bounding boxes used for camera framing
//! - `animation` drives the node tree from an animation clip
//! - `skin` holds joints, vertex weights and the joint palette

pub mod animation;
pub mod bounds;
pub mod instance;
pub mod model;
pub mod node_tree;
pub mod skin;
pub mod texture;
