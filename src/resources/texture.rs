use anyhow::Context as _;

use crate::data_structures::texture;

/// Layout of group 0: the colour map, its sampler and the material constants.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("Model material_bind_group_layout"),
    })
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page origin is not readable"))?;
    let base = reqwest::Url::parse(&format!("{}/", origin))?;
    Ok(base.join(file_name.trim_start_matches('/'))?)
}

/// Where `file_name` lives on disk for native builds.
pub fn local_path(asset_root: &str, file_name: &str) -> std::path::PathBuf {
    std::path::Path::new(asset_root).join(file_name.trim_start_matches('/'))
}

/// Fetches an asset: over HTTP relative to the page origin in the browser,
/// from `asset_root` on native.
pub async fn load_binary(file_name: &str, asset_root: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let _ = asset_root;
        let url = format_url(file_name)?;
        let response = reqwest::get(url.clone()).await?;
        if !response.status().is_success() {
            anyhow::bail!("GET {} returned {}", url, response.status());
        }
        response.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = local_path(asset_root, file_name);
        match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let bundled = local_path(env!("AVATAR_VIEWER_BUNDLED_ASSETS"), file_name);
                log::debug!("{} not found, trying {}", path.display(), bundled.display());
                tokio::fs::read(&bundled)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }
    };

    Ok(data)
}

/// Decodes `bytes` into a texture, guessing the format from the file name.
pub fn texture_from_bytes(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    bytes: &[u8],
    file_name: &str,
) -> anyhow::Result<texture::Texture> {
    let format = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str());
    texture::Texture::from_bytes(device, queue, bytes, file_name, format)
}
