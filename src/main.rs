/// `avatar-viewer [HOST]`
#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    use avatar_viewer::ViewerConfig;

    let mut config = ViewerConfig::from_env()?;
    if let Some(host) = std::env::args().nth(1) {
        config = config.with_host(host);
    }
    avatar_viewer::run(config)
}

// The browser build starts through `run_web`.
#[cfg(target_arch = "wasm32")]
fn main() {}
