//! Conversion of FBX `Geometry` objects into triangle meshes.

use std::collections::BTreeMap;

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3};

use super::{FbxError, reader::FbxNode};
use crate::data_structures::{model::ModelVertex, skin::Influence};

/// How a layer element maps its values onto the mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mapping {
    ByPolygonVertex,
    ByControlPoint,
    ByPolygon,
    AllSame,
}

/// A layer element (normals, UVs, material ids) resolved to direct lookups.
struct Layer<T> {
    mapping: Mapping,
    values: Vec<T>,
    index: Option<Vec<i64>>,
}

impl<T: Copy> Layer<T> {
    fn get(&self, polygon: usize, polygon_vertex: usize, control_point: usize) -> Option<T> {
        let slot = match self.mapping {
            Mapping::ByPolygonVertex => polygon_vertex,
            Mapping::ByControlPoint => control_point,
            Mapping::ByPolygon => polygon,
            Mapping::AllSame => 0,
        };
        let slot = match &self.index {
            Some(index) => usize::try_from(*index.get(slot)?).ok()?,
            None => slot,
        };
        self.values.get(slot).copied()
    }
}

fn read_layer<T>(
    element: &FbxNode,
    values_name: &str,
    index_name: &str,
    width: usize,
    make: impl Fn(&[f64]) -> T,
) -> Option<Layer<T>> {
    let mapping = match element
        .child("MappingInformationType")
        .and_then(|n| n.prop(0))
        .and_then(|p| p.as_str())
        .unwrap_or("ByPolygonVertex")
    {
        "ByPolygonVertex" => Mapping::ByPolygonVertex,
        "ByVertice" | "ByVertex" | "ByControlPoint" => Mapping::ByControlPoint,
        "ByPolygon" => Mapping::ByPolygon,
        "AllSame" => Mapping::AllSame,
        other => {
            log::warn!("Unsupported FBX layer mapping '{}' for {}", other, element.name);
            return None;
        }
    };
    let indexed = matches!(
        element
            .child("ReferenceInformationType")
            .and_then(|n| n.prop(0))
            .and_then(|p| p.as_str()),
        Some("IndexToDirect") | Some("Index")
    );
    let raw = element.child(values_name)?.prop(0)?.to_f64_vec()?;
    let values = raw.chunks_exact(width).map(make).collect();
    let index = if indexed {
        element.child(index_name).and_then(|n| n.prop(0)).and_then(|p| p.to_i64_vec())
    } else {
        None
    };
    Some(Layer {
        mapping,
        values,
        index,
    })
}

/// Material ids are stored directly, there's no value table to index into.
fn read_material_layer(geometry: &FbxNode) -> Option<Layer<usize>> {
    let element = geometry.child("LayerElementMaterial")?;
    let ids = element.child("Materials")?.prop(0)?.to_i64_vec()?;
    let mapping = match element
        .child("MappingInformationType")
        .and_then(|n| n.prop(0))
        .and_then(|p| p.as_str())
    {
        Some("ByPolygon") => Mapping::ByPolygon,
        _ => Mapping::AllSame,
    };
    Some(Layer {
        mapping,
        values: ids.into_iter().map(|id| id.max(0) as usize).collect(),
        index: None,
    })
}

/// Triangles of one geometry that share a material slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Submesh {
    pub material_slot: usize,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

/// Triangulates a `Geometry` node of class `Mesh`.
///
/// Polygons are fan-triangulated and split by material slot. Every polygon
/// corner becomes its own vertex so per-corner normals and UVs survive.
/// `geometric` is the geometry-only offset of the owning model; it is baked
/// into positions and normals. `influences` holds the skin weights of each
/// control point and is empty for rigid geometry.
pub fn triangulate(
    geometry: &FbxNode,
    geometric: &Matrix4<f32>,
    influences: &[Influence],
) -> Result<Vec<Submesh>, FbxError> {
    let positions = geometry
        .child("Vertices")
        .and_then(|n| n.prop(0))
        .and_then(|p| p.to_f64_vec())
        .ok_or_else(|| FbxError::InvalidGeometry("missing Vertices".into()))?;
    let positions: Vec<Point3<f32>> = positions
        .chunks_exact(3)
        .map(|c| Point3::new(c[0] as f32, c[1] as f32, c[2] as f32))
        .collect();
    let polygon_index = geometry
        .child("PolygonVertexIndex")
        .and_then(|n| n.prop(0))
        .and_then(|p| p.to_i64_vec())
        .ok_or_else(|| FbxError::InvalidGeometry("missing PolygonVertexIndex".into()))?;

    let normals = geometry.child("LayerElementNormal").and_then(|e| {
        read_layer(e, "Normals", "NormalsIndex", 3, |c| {
            Vector3::new(c[0] as f32, c[1] as f32, c[2] as f32)
        })
    });
    let uvs = geometry.child("LayerElementUV").and_then(|e| {
        read_layer(e, "UV", "UVIndex", 2, |c| [c[0] as f32, c[1] as f32])
    });
    let materials = read_material_layer(geometry);

    let normal_matrix = {
        let m = Matrix3::from_cols(
            geometric.x.truncate(),
            geometric.y.truncate(),
            geometric.z.truncate(),
        );
        m.invert().map(|inv| inv.transpose()).unwrap_or(m)
    };

    let mut submeshes: BTreeMap<usize, Submesh> = BTreeMap::new();
    let mut polygon = 0usize;
    let mut corner_start = 0usize;
    let mut corners: Vec<(usize, usize)> = Vec::new();

    for (polygon_vertex, &raw) in polygon_index.iter().enumerate() {
        let (control_point, last) = if raw < 0 { (!raw, true) } else { (raw, false) };
        let control_point = usize::try_from(control_point)
            .ok()
            .filter(|&cp| cp < positions.len())
            .ok_or_else(|| {
                FbxError::InvalidGeometry(format!("vertex index {} out of range", control_point))
            })?;
        corners.push((polygon_vertex, control_point));
        if !last {
            continue;
        }

        if corners.len() >= 3 {
            let slot = materials
                .as_ref()
                .and_then(|m| m.get(polygon, corner_start, control_point))
                .unwrap_or(0);
            let submesh = submeshes.entry(slot).or_insert_with(|| Submesh {
                material_slot: slot,
                ..Default::default()
            });
            emit_polygon(
                submesh,
                &corners,
                polygon,
                &positions,
                normals.as_ref(),
                uvs.as_ref(),
                influences,
                geometric,
                &normal_matrix,
            );
        } else {
            log::debug!("Skipping degenerate polygon #{} with {} corners", polygon, corners.len());
        }

        polygon += 1;
        corner_start = polygon_vertex + 1;
        corners.clear();
    }
    if !corners.is_empty() {
        log::warn!("Geometry ends with an unterminated polygon, ignoring it");
    }

    Ok(submeshes.into_values().collect())
}

#[allow(clippy::too_many_arguments)]
fn emit_polygon(
    submesh: &mut Submesh,
    corners: &[(usize, usize)],
    polygon: usize,
    positions: &[Point3<f32>],
    normals: Option<&Layer<Vector3<f32>>>,
    uvs: Option<&Layer<[f32; 2]>>,
    influences: &[Influence],
    geometric: &Matrix4<f32>,
    normal_matrix: &Matrix3<f32>,
) {
    let face_normal = {
        let a = positions[corners[0].1];
        let b = positions[corners[1].1];
        let c = positions[corners[2].1];
        let n = (b - a).cross(c - a);
        if n.magnitude2() > 0.0 { n.normalize() } else { Vector3::unit_y() }
    };

    let base = submesh.vertices.len() as u32;
    for &(polygon_vertex, control_point) in corners {
        let normal = normals
            .and_then(|n| n.get(polygon, polygon_vertex, control_point))
            .unwrap_or(face_normal);
        let normal = (normal_matrix * normal).normalize();
        let uv = uvs
            .and_then(|u| u.get(polygon, polygon_vertex, control_point))
            .unwrap_or([0.0, 0.0]);
        let position = geometric.transform_point(positions[control_point]);
        let influence = influences.get(control_point).copied().unwrap_or_default();
        submesh.vertices.push(ModelVertex {
            position: position.into(),
            // FBX puts the texture origin at the bottom left.
            tex_coords: [uv[0], 1.0 - uv[1]],
            normal: normal.into(),
            joints: influence.joints,
            weights: influence.weights,
        });
    }
    for i in 1..(corners.len() as u32 - 1) {
        submesh.indices.extend_from_slice(&[base, base + i, base + i + 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fbx::reader::Property;

    fn node(name: &str, properties: Vec<Property>) -> FbxNode {
        FbxNode {
            name: name.into(),
            properties,
            children: Vec::new(),
        }
    }

    #[test]
    fn quad_becomes_two_triangles() {
        let geometry = FbxNode {
            name: "Geometry".into(),
            properties: Vec::new(),
            children: vec![
                node(
                    "Vertices",
                    vec![Property::F64Array(vec![
                        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
                    ])],
                ),
                node("PolygonVertexIndex", vec![Property::I32Array(vec![0, 1, 2, -4])]),
            ],
        };
        let meshes = triangulate(&geometry, &Matrix4::identity(), &[]).expect("valid geometry");
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
        // No normals layer, so the face normal is used.
        assert_eq!(meshes[0].vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(meshes[0].vertices[3].tex_coords, [0.0, 1.0]);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let geometry = FbxNode {
            name: "Geometry".into(),
            properties: Vec::new(),
            children: vec![
                node("Vertices", vec![Property::F64Array(vec![0.0; 9])]),
                node("PolygonVertexIndex", vec![Property::I32Array(vec![0, 1, -8])]),
            ],
        };
        assert!(matches!(
            triangulate(&geometry, &Matrix4::identity(), &[]),
            Err(FbxError::InvalidGeometry(_))
        ));
    }
}
