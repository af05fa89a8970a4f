use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

/// Models the default asset table points at.
const STATE_MODELS: [&str; 3] = [
    "model_escuchar.fbx",
    "model_procesar.fbx",
    "model_hablar.fbx",
];

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets/*");

    let out_dir = env::var("OUT_DIR")?;
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets_src = manifest_dir.join("assets");

    // Native builds fall back to this copy when the configured asset root
    // lacks a file.
    let bundled = PathBuf::from(&out_dir).join("assets");
    println!("cargo:rustc-env=AVATAR_VIEWER_BUNDLED_ASSETS={}", bundled.display());

    if !assets_src.exists() {
        println!("cargo:warning=no assets/ directory, state models must be provided at runtime");
        return Ok(());
    }
    for model in STATE_MODELS {
        if !assets_src.join(model).exists() {
            println!("cargo:warning=assets/{} is missing", model);
        }
    }

    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    copy_items(&["assets/"], out_dir, &copy_options)?;

    Ok(())
}
