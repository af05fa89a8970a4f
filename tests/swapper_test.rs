mod common;

use avatar_viewer::{
    config::FramingConfig,
    swapper::{LoadResolution, ModelSwapper},
};
use cgmath::{InnerSpace, Point3, Vector3};
use instant::Duration;

use crate::common::test_utils::{MockAsset, State};

fn swapper() -> ModelSwapper<MockAsset> {
    ModelSwapper::new(0.01, FramingConfig::default())
}

#[test]
fn should_attach_the_requested_model() {
    let state = State::new();
    let mut swapper = swapper();

    let ticket = swapper.request("idle.fbx");
    assert!(swapper.is_loading());
    assert!(swapper.current_model().is_none());

    let resolution = swapper.complete(ticket, Ok(MockAsset::character("idle", &state)));
    assert_eq!(resolution, LoadResolution::Attached);
    assert!(!swapper.is_loading());
    assert_eq!(swapper.current_path(), Some("idle.fbx"));
    assert_eq!(swapper.current_model().map(|m| m.name.as_str()), Some("idle"));
    // The model is scaled into scene units.
    assert_eq!(
        swapper.current_model().map(|m| m.tree.root.scale),
        Some(Vector3::new(0.01, 0.01, 0.01))
    );
}

#[test]
fn should_release_the_previous_model_exactly_once() {
    let state = State::new();
    let mut swapper = swapper();

    let first = swapper.request("idle.fbx");
    swapper.complete(first, Ok(MockAsset::character("idle", &state)));
    assert_eq!(state.dispose_invocations(), 0);

    // Released as soon as the next load starts, not when it finishes.
    let second = swapper.request("wave.fbx");
    assert_eq!(state.dispose_invocations(), 1);
    swapper.complete(second, Ok(MockAsset::character("wave", &state)));
    assert_eq!(state.dispose_invocations(), 1);
    assert_eq!(swapper.current_path(), Some("wave.fbx"));

    drop(swapper);
    assert_eq!(state.dispose_invocations(), 2);
    assert_eq!(state.created(), 2);
}

#[test]
fn should_reload_the_same_path() {
    let state = State::new();
    let mut swapper = swapper();

    let first = swapper.request("idle.fbx");
    swapper.complete(first, Ok(MockAsset::character("idle", &state)));
    let second = swapper.request("idle.fbx");
    assert_ne!(first, second);
    assert_eq!(
        swapper.complete(second, Ok(MockAsset::character("idle", &state))),
        LoadResolution::Attached
    );
    assert_eq!(state.dispose_invocations(), 1);
    assert_eq!(swapper.current_path(), Some("idle.fbx"));
}

#[test]
fn should_discard_superseded_loads() {
    let state = State::new();
    let mut swapper = swapper();

    let slow = swapper.request("idle.fbx");
    let fast = swapper.request("wave.fbx");
    assert!(fast.id() > slow.id());

    assert_eq!(
        swapper.complete(fast, Ok(MockAsset::character("wave", &state))),
        LoadResolution::Attached
    );
    assert_eq!(
        swapper.complete(slow, Ok(MockAsset::character("idle", &state))),
        LoadResolution::Stale
    );
    assert_eq!(swapper.current_path(), Some("wave.fbx"));
    // Only the late arrival was released.
    assert_eq!(state.dispose_invocations(), 1);
}

#[test]
fn should_keep_waiting_when_a_stale_load_arrives_first() {
    let state = State::new();
    let mut swapper = swapper();

    let slow = swapper.request("idle.fbx");
    let fast = swapper.request("wave.fbx");
    assert_eq!(
        swapper.complete(slow, Ok(MockAsset::character("idle", &state))),
        LoadResolution::Stale
    );
    assert!(swapper.is_loading());
    assert!(swapper.current_model().is_none());

    assert_eq!(
        swapper.complete(fast, Ok(MockAsset::character("wave", &state))),
        LoadResolution::Attached
    );
    assert_eq!(swapper.current_path(), Some("wave.fbx"));
}

#[test]
fn should_show_nothing_after_a_failed_load() {
    let state = State::new();
    let mut swapper = swapper();

    let first = swapper.request("idle.fbx");
    swapper.complete(first, Ok(MockAsset::character("idle", &state)));
    let broken = swapper.request("missing.fbx");
    let resolution = swapper.complete(broken, Err(anyhow::anyhow!("404 Not Found")));

    assert_eq!(resolution, LoadResolution::Failed);
    assert!(swapper.current_model().is_none());
    assert!(!swapper.is_loading());
    assert!(swapper.take_framing().is_none());
    assert_eq!(state.dispose_invocations(), 1);
}

#[test]
fn should_play_the_first_clip() {
    let state = State::new();
    let mut swapper = swapper();

    let ticket = swapper.request("walk.fbx");
    let asset = MockAsset::character("walk", &state)
        .with_walk("walk")
        .with_walk("unused");
    swapper.complete(ticket, Ok(asset));

    let driver = swapper
        .current()
        .and_then(|attached| attached.driver.as_ref())
        .expect("model has a clip");
    assert_eq!(driver.clip_name(), "walk");

    swapper.advance(Duration::from_millis(500));
    let position = swapper
        .current_model()
        .map(|m| m.tree.nodes()[0].local.position)
        .expect("model attached");
    assert!((position - Vector3::new(5.0, 0.0, 0.0)).magnitude() < 1e-5);
}

#[test]
fn should_not_animate_models_without_clips() {
    let state = State::new();
    let mut swapper = swapper();

    let ticket = swapper.request("idle.fbx");
    swapper.complete(ticket, Ok(MockAsset::character("idle", &state)));
    swapper.advance(Duration::from_secs(1));

    let attached = swapper.current().expect("model attached");
    assert!(attached.driver.is_none());
    assert_eq!(
        attached.model.tree.nodes()[0].local.position,
        Vector3::new(0.0, 0.0, 0.0)
    );
}

#[test]
fn should_frame_a_new_model_once() {
    let state = State::new();
    let mut swapper = swapper();
    assert!(swapper.take_framing().is_none());

    let ticket = swapper.request("idle.fbx");
    swapper.complete(ticket, Ok(MockAsset::character("idle", &state)));

    // 100 x 200 x 50 scaled by 0.01 is 1 x 2 x 0.5 around (0, 1, 0).
    let framing = swapper.take_framing().expect("fresh model is framed");
    assert!((framing.target - Point3::new(0.0, 1.8, 0.0)).magnitude() < 1e-5);
    assert!((framing.eye - Point3::new(0.0, 1.8, 1.1)).magnitude() < 1e-5);

    assert!(swapper.take_framing().is_none());
}

#[test]
fn should_not_frame_a_superseded_model() {
    let state = State::new();
    let mut swapper = swapper();

    let ticket = swapper.request("idle.fbx");
    swapper.complete(ticket, Ok(MockAsset::character("idle", &state)));
    swapper.request("wave.fbx");
    assert!(swapper.take_framing().is_none());
}
