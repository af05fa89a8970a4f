//! Viewer configuration.
//!
//! Every field has a default, so an empty JSON object is a complete
//! configuration. Natively a JSON file named by `AVATAR_VIEWER_CONFIG` is
//! merged over the defaults.

use serde::{Deserialize, Serialize};

use crate::{channel::ReconnectPolicy, states::{AssetTable, AvatarState}};

pub const CONFIG_ENV_VAR: &str = "AVATAR_VIEWER_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub initial_eye: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            initial_eye: [0.0, 2.0, 5.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Ambient colour as `0xRRGGBB`.
    pub ambient: u32,
    pub key_position: [f32; 3],
    pub key_intensity: f32,
    pub fill_intensity: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: 0x404040,
            key_position: [5.0, 10.0, 7.5],
            key_intensity: 1.0,
            fill_intensity: 0.8,
        }
    }
}

/// How the camera is placed around a freshly loaded model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Fraction of the model height the look-at point sits above the center.
    pub height_factor: f32,
    /// Camera distance in front of the center, in model depths.
    pub depth_factor: f32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            height_factor: 0.4,
            depth_factor: 2.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub framing: FramingConfig,
    pub model_scale: f32,
    /// Background as `0xRRGGBB`.
    pub clear_colour: u32,
    pub assets: AssetTable,
    pub initial_state: AvatarState,
    pub channel: ChannelConfig,
    /// Directory native builds read assets from.
    pub asset_root: String,
    /// Id of the canvas element browser builds render into.
    pub canvas_id: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
            framing: FramingConfig::default(),
            model_scale: 0.01,
            clear_colour: 0xeeeeee,
            assets: AssetTable::default(),
            initial_state: AvatarState::Escuchar,
            channel: ChannelConfig::default(),
            asset_root: "assets".to_string(),
            canvas_id: "canvas".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults, overridden by the file `AVATAR_VIEWER_CONFIG` points at.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context as _;

        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path))?;
                Self::from_json(&json).with_context(|| format!("parsing config file {}", path))
            }
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.channel.host = host.into();
        self
    }

    pub fn initial_asset(&self) -> &str {
        self.assets.path(self.initial_state)
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Converts `0xRRGGBB` to linear RGB, the space the shaders light in.
pub fn hex_to_linear(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_the_default() {
        let config = ViewerConfig::from_json("{}").expect("valid json");
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.initial_asset(), "/model_escuchar.fbx");
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = ViewerConfig::from_json(
            r#"{ "channel": { "port": 9000 }, "framing": { "depth_factor": 3.0 }, "initial_state": "hablar" }"#,
        )
        .expect("valid json");
        assert_eq!(config.channel.port, 9000);
        assert_eq!(config.channel.host, "localhost");
        assert_eq!(config.framing.depth_factor, 3.0);
        assert_eq!(config.framing.height_factor, 0.4);
        assert_eq!(config.initial_asset(), "/model_hablar.fbx");
    }

    #[test]
    fn hex_colours_are_linearised() {
        assert_eq!(hex_to_linear(0xffffff), [1.0, 1.0, 1.0]);
        assert_eq!(hex_to_linear(0x000000), [0.0, 0.0, 0.0]);
        let grey = hex_to_linear(0x404040)[0];
        assert!((grey - 0.0513).abs() < 1e-3);
    }
}
