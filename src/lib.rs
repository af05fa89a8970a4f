//! avatar-viewer
//!
//! Shows an animated 3D avatar and swaps it whenever a controller announces
//! a new state over a WebSocket. Runs natively and in the browser.
//!
//! High-level modules
//! - `states`: the announced avatar states and the asset shown for each
//! - `channel`: WebSocket link to the controller with reconnect backoff
//! - `swapper`: replaces the displayed model and frames it
//! - `resources`: FBX and glTF loading into CPU data and GPU models
//! - `data_structures`: node tree, bounds, animation playback, GPU model types
//! - `camera`: perspective camera and orbit controls
//! - `context`: window, surface and GPU state
//! - `pipelines`: the lit model pipeline and the lighting rig
//! - `flow`: the event loop tying it together
//!

pub mod camera;
pub mod channel;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod resources;
pub mod states;
pub mod swapper;

pub use config::ViewerConfig;
pub use flow::run;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Browser entry point. Connects to the state server on the page's host.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    let host = web_sys::window()
        .unwrap_throw()
        .location()
        .hostname()?;
    let host = if host.is_empty() { "localhost".to_string() } else { host };
    run(ViewerConfig::default().with_host(host)).map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}
