//! Render pipelines and their uniforms.

pub mod basic;
pub mod light;
