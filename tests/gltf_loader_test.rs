use avatar_viewer::resources::{
    AssetFormat, animation::Keyframes, detect_format, gltf_loader, parse_asset,
};
use base64::Engine as _;
use cgmath::{Matrix4, Vector3};
use serde_json::json;

/// Triangle positions, u16 indices, two key times and two translations.
fn buffer() -> Vec<u8> {
    let mut bytes = Vec::new();
    for v in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for i in [0u16, 1, 2, 0] {
        // The last index is padding.
        bytes.extend_from_slice(&i.to_le_bytes());
    }
    for t in [0.0f32, 1.0] {
        bytes.extend_from_slice(&t.to_le_bytes());
    }
    for v in [0.0f32, 0.0, 0.0, 0.0, 2.0, 0.0] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn document(buffer_uri: String) -> Vec<u8> {
    let gltf = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "hips", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "name": "body", "mesh": 0 }
        ],
        "meshes": [{
            "name": "triangle",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }]
        }],
        "animations": [{
            "name": "wave",
            "samplers": [{ "input": 2, "output": 3 }],
            "channels": [{ "sampler": 0, "target": { "node": 1, "path": "translation" } }]
        }],
        "buffers": [{ "byteLength": 76, "uri": buffer_uri }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 52, "byteLength": 24 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            {
                "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
                "min": [0.0], "max": [1.0]
            },
            { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }
        ]
    });
    serde_json::to_vec(&gltf).expect("serializable")
}

fn embedded() -> Vec<u8> {
    let payload = base64::engine::general_purpose::STANDARD.encode(buffer());
    document(format!("data:application/octet-stream;base64,{}", payload))
}

#[test]
fn should_load_an_embedded_triangle() {
    let asset = parse_asset("/avatar.gltf", &embedded()).expect("valid gltf");

    assert_eq!(asset.tree.len(), 2);
    assert_eq!(asset.tree.node(1).and_then(|n| n.parent), Some(0));
    assert_eq!(asset.meshes.len(), 1);
    assert_eq!(asset.meshes[0].node, 1);
    assert_eq!(asset.meshes[0].indices, vec![0, 1, 2]);
    assert_eq!(asset.meshes[0].vertices[1].position, [1.0, 0.0, 0.0]);

    // No materials in the file, so one default is added.
    assert_eq!(asset.materials.len(), 1);
    assert_eq!(asset.meshes[0].material, 0);

    let bounds = asset.bounds().expect("asset has geometry");
    assert_eq!(bounds.min.y, 1.0);
    assert_eq!(bounds.max.y, 2.0);
}

#[test]
fn should_load_node_animation() {
    let asset = parse_asset("/avatar.gltf", &embedded()).expect("valid gltf");

    assert_eq!(asset.animations.len(), 1);
    let clip = &asset.animations[0];
    assert_eq!(clip.name, "wave");
    assert_eq!(clip.duration, 1.0);
    assert_eq!(clip.channels[0].node, 1);
    match &clip.channels[0].keyframes {
        Keyframes::Translation(values) => {
            assert_eq!(values[1], Vector3::new(0.0, 2.0, 0.0));
        }
        other => panic!("unexpected keyframes {:?}", other),
    }
}

#[test]
fn should_report_unloaded_side_buffers() {
    let bytes = document("avatar.bin".to_string());
    let gltf = gltf::Gltf::from_slice(&bytes).expect("valid gltf");
    assert_eq!(gltf_loader::external_buffer_uris(&gltf), vec!["avatar.bin".to_string()]);

    let err = parse_asset("/avatar.gltf", &bytes).expect_err("buffer is missing");
    assert!(format!("{:#}", err).contains("avatar.bin"));
}

#[test]
fn should_detect_formats_by_content_first() {
    assert_eq!(
        detect_format("/model_hablar.fbx", b"glTF\x02\0\0\0").ok(),
        Some(AssetFormat::Gltf)
    );
    assert_eq!(
        detect_format("/avatar.gltf", &embedded()).ok(),
        Some(AssetFormat::Gltf)
    );
    assert!(detect_format("/avatar.obj", b"v 0 0 0").is_err());
}

/// The triangle of [`buffer`] bound to `hips`, which sits at y = 1.
fn skinned() -> Vec<u8> {
    let mut bytes = buffer();
    for _ in 0..3 {
        for joint in [0u16, 0, 0, 0] {
            bytes.extend_from_slice(&joint.to_le_bytes());
        }
    }
    for _ in 0..3 {
        for weight in [1.0f32, 0.0, 0.0, 0.0] {
            bytes.extend_from_slice(&weight.to_le_bytes());
        }
    }
    let inverse_bind: [[f32; 4]; 4] = Matrix4::from_translation(Vector3::new(0.0, -1.0, 0.0)).into();
    for v in inverse_bind.iter().flatten() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let payload = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let gltf = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "hips", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "name": "body", "mesh": 0, "skin": 0 }
        ],
        "meshes": [{
            "name": "triangle",
            "primitives": [{
                "attributes": { "POSITION": 0, "JOINTS_0": 2, "WEIGHTS_0": 3 },
                "indices": 1
            }]
        }],
        "skins": [{ "name": "rig", "joints": [0], "inverseBindMatrices": 4 }],
        "buffers": [{
            "byteLength": bytes.len(),
            "uri": format!("data:application/octet-stream;base64,{}", payload)
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 },
            { "buffer": 0, "byteOffset": 76, "byteLength": 24, "target": 34962 },
            { "buffer": 0, "byteOffset": 100, "byteLength": 48, "target": 34962 },
            { "buffer": 0, "byteOffset": 148, "byteLength": 64 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 2, "componentType": 5123, "count": 3, "type": "VEC4" },
            { "bufferView": 3, "componentType": 5126, "count": 3, "type": "VEC4" },
            { "bufferView": 4, "componentType": 5126, "count": 1, "type": "MAT4" }
        ]
    });
    serde_json::to_vec(&gltf).expect("serializable")
}

#[test]
fn should_load_skins() {
    let asset = parse_asset("/avatar.gltf", &skinned()).expect("valid gltf");

    assert_eq!(asset.skins.len(), 1);
    assert_eq!(asset.skins[0].name, "rig");
    assert_eq!(asset.skins[0].joints, vec![0]);
    assert_eq!(
        asset.skins[0].inverse_bind[0],
        Matrix4::from_translation(Vector3::new(0.0, -1.0, 0.0))
    );

    let mesh = &asset.meshes[0];
    assert_eq!(mesh.skin, Some(0));
    assert_eq!(mesh.vertices[2].joints, [0, 0, 0, 0]);
    assert_eq!(mesh.vertices[2].weights, [1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn should_keep_unskinned_meshes_rigid() {
    let asset = parse_asset("/avatar.gltf", &embedded()).expect("valid gltf");
    assert!(asset.skins.is_empty());
    assert_eq!(asset.meshes[0].skin, None);
    assert_eq!(asset.meshes[0].vertices[0].weights, [0.0; 4]);
}
