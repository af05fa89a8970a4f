//! Writes small binary FBX files for loader tests.

use std::io::Write;

use flate2::{Compression, write::ZlibEncoder};

pub const TICKS_PER_SECOND: i64 = 46_186_158_000;

#[derive(Clone, Debug)]
pub enum Prop {
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    F64Array(Vec<f64>),
    F32Array(Vec<f32>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    /// An array header claiming `declared_len` elements in front of `raw`.
    ShortArray {
        type_code: u8,
        declared_len: u32,
        raw: Vec<u8>,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub props: Vec<Prop>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, prop: Prop) -> Self {
        self.props.push(prop);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
}

pub struct Writer {
    version: u32,
    compress: bool,
    out: Vec<u8>,
}

impl Writer {
    pub fn new(version: u32) -> Self {
        let mut out = b"Kaydara FBX Binary  \0".to_vec();
        out.extend_from_slice(&[0x1a, 0x00]);
        out.extend_from_slice(&version.to_le_bytes());
        Self {
            version,
            compress: false,
            out,
        }
    }

    /// Deflate every array property.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn finish(mut self, nodes: &[Node]) -> Vec<u8> {
        for node in nodes {
            self.node(node);
        }
        self.null_record();
        self.out
    }

    fn wide(&self) -> bool {
        self.version >= 7500
    }

    fn header_field(&mut self, value: u64) {
        if self.wide() {
            self.out.extend_from_slice(&value.to_le_bytes());
        } else {
            self.out.extend_from_slice(&(value as u32).to_le_bytes());
        }
    }

    fn patch_header_field(&mut self, at: usize, value: u64) {
        if self.wide() {
            self.out[at..at + 8].copy_from_slice(&value.to_le_bytes());
        } else {
            self.out[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
    }

    fn null_record(&mut self) {
        let len = if self.wide() { 25 } else { 13 };
        self.out.extend(std::iter::repeat_n(0u8, len));
    }

    fn node(&mut self, node: &Node) {
        let start = self.out.len();
        self.header_field(0);
        self.header_field(node.props.len() as u64);
        let props_len_at = self.out.len();
        self.header_field(0);
        self.out.push(node.name.len() as u8);
        self.out.extend_from_slice(node.name.as_bytes());

        let props_start = self.out.len();
        for prop in &node.props {
            self.prop(prop);
        }
        let props_len = (self.out.len() - props_start) as u64;
        self.patch_header_field(props_len_at, props_len);

        if !node.children.is_empty() {
            for child in &node.children {
                self.node(child);
            }
            self.null_record();
        }
        let end = self.out.len() as u64;
        self.patch_header_field(start, end);
    }

    fn prop(&mut self, prop: &Prop) {
        match prop {
            Prop::I32(v) => {
                self.out.push(b'I');
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Prop::I64(v) => {
                self.out.push(b'L');
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Prop::F64(v) => {
                self.out.push(b'D');
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Prop::Str(s) => {
                self.out.push(b'S');
                self.out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                self.out.extend_from_slice(s.as_bytes());
            }
            Prop::F64Array(v) => {
                let raw: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                self.array(b'd', v.len(), raw);
            }
            Prop::F32Array(v) => {
                let raw: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                self.array(b'f', v.len(), raw);
            }
            Prop::I32Array(v) => {
                let raw: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                self.array(b'i', v.len(), raw);
            }
            Prop::I64Array(v) => {
                let raw: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                self.array(b'l', v.len(), raw);
            }
            Prop::ShortArray {
                type_code,
                declared_len,
                raw,
            } => self.array(*type_code, *declared_len as usize, raw.clone()),
        }
    }

    fn array(&mut self, type_code: u8, len: usize, raw: Vec<u8>) {
        let (encoding, payload) = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw).expect("in-memory write");
            (1u32, encoder.finish().expect("in-memory write"))
        } else {
            (0u32, raw)
        };
        self.out.push(type_code);
        self.out.extend_from_slice(&(len as u32).to_le_bytes());
        self.out.extend_from_slice(&encoding.to_le_bytes());
        self.out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.out.extend_from_slice(&payload);
    }
}

fn object_name(name: &str, class: &str) -> Prop {
    Prop::Str(format!("{}\u{0}\u{1}{}", name, class))
}

/// A `P` entry of a `Properties70` block holding three numbers.
pub fn p_vec3(name: &str, kind: &str, v: [f64; 3]) -> Node {
    Node::new("P")
        .prop(Prop::Str(name.to_string()))
        .prop(Prop::Str(kind.to_string()))
        .prop(Prop::Str(String::new()))
        .prop(Prop::Str("A".to_string()))
        .prop(Prop::F64(v[0]))
        .prop(Prop::F64(v[1]))
        .prop(Prop::F64(v[2]))
}

pub fn p_number(name: &str, v: f64) -> Node {
    Node::new("P")
        .prop(Prop::Str(name.to_string()))
        .prop(Prop::Str("Number".to_string()))
        .prop(Prop::Str(String::new()))
        .prop(Prop::Str("A".to_string()))
        .prop(Prop::F64(v))
}

pub fn properties(entries: Vec<Node>) -> Node {
    entries
        .into_iter()
        .fold(Node::new("Properties70"), |node, entry| node.child(entry))
}

pub fn model(id: i64, name: &str, translation: [f64; 3]) -> Node {
    Node::new("Model")
        .prop(Prop::I64(id))
        .prop(object_name(name, "Model"))
        .prop(Prop::Str("Mesh".to_string()))
        .child(properties(vec![p_vec3(
            "Lcl Translation",
            "Lcl Translation",
            translation,
        )]))
}

/// A skeleton bone.
pub fn limb(id: i64, name: &str, translation: [f64; 3]) -> Node {
    Node::new("Model")
        .prop(Prop::I64(id))
        .prop(object_name(name, "Model"))
        .prop(Prop::Str("LimbNode".to_string()))
        .child(properties(vec![p_vec3(
            "Lcl Translation",
            "Lcl Translation",
            translation,
        )]))
}

/// Column-major translation matrix as FBX stores it.
pub fn translation_matrix(t: [f64; 3]) -> Vec<f64> {
    vec![
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        t[0], t[1], t[2], 1.0,
    ]
}

pub fn skin_deformer(id: i64) -> Node {
    Node::new("Deformer")
        .prop(Prop::I64(id))
        .prop(object_name("Skin", "Deformer"))
        .prop(Prop::Str("Skin".to_string()))
}

/// A cluster whose bone sat at `bone_bind_position` when the mesh was bound.
pub fn cluster(id: i64, name: &str, indexes: Vec<i32>, weights: Vec<f64>, bone_bind_position: [f64; 3]) -> Node {
    Node::new("Deformer")
        .prop(Prop::I64(id))
        .prop(object_name(name, "SubDeformer"))
        .prop(Prop::Str("Cluster".to_string()))
        .child(Node::new("Indexes").prop(Prop::I32Array(indexes)))
        .child(Node::new("Weights").prop(Prop::F64Array(weights)))
        .child(Node::new("Transform").prop(Prop::F64Array(translation_matrix([0.0; 3]))))
        .child(Node::new("TransformLink").prop(Prop::F64Array(translation_matrix(bone_bind_position))))
}

pub fn geometry(id: i64, name: &str, vertices: Vec<f64>, polygons: Vec<i32>) -> Node {
    Node::new("Geometry")
        .prop(Prop::I64(id))
        .prop(object_name(name, "Geometry"))
        .prop(Prop::Str("Mesh".to_string()))
        .child(Node::new("Vertices").prop(Prop::F64Array(vertices)))
        .child(Node::new("PolygonVertexIndex").prop(Prop::I32Array(polygons)))
}

pub fn material(id: i64, name: &str, diffuse: [f64; 3]) -> Node {
    Node::new("Material")
        .prop(Prop::I64(id))
        .prop(object_name(name, "Material"))
        .prop(Prop::Str(String::new()))
        .child(properties(vec![p_vec3("DiffuseColor", "Color", diffuse)]))
}

pub fn anim_stack(id: i64, name: &str) -> Node {
    Node::new("AnimationStack")
        .prop(Prop::I64(id))
        .prop(object_name(name, "AnimStack"))
        .prop(Prop::Str(String::new()))
}

pub fn anim_layer(id: i64) -> Node {
    Node::new("AnimationLayer")
        .prop(Prop::I64(id))
        .prop(object_name("BaseLayer", "AnimLayer"))
        .prop(Prop::Str(String::new()))
}

pub fn curve_node(id: i64, kind: &str) -> Node {
    Node::new("AnimationCurveNode")
        .prop(Prop::I64(id))
        .prop(object_name(kind, "AnimCurveNode"))
        .prop(Prop::Str(String::new()))
}

/// An animation curve with key times in seconds.
pub fn curve(id: i64, seconds: &[f64], values: &[f32]) -> Node {
    let ticks = seconds
        .iter()
        .map(|s| (s * TICKS_PER_SECOND as f64) as i64)
        .collect();
    Node::new("AnimationCurve")
        .prop(Prop::I64(id))
        .prop(object_name("", "AnimCurve"))
        .prop(Prop::Str(String::new()))
        .child(Node::new("KeyTime").prop(Prop::I64Array(ticks)))
        .child(Node::new("KeyValueFloat").prop(Prop::F32Array(values.to_vec())))
}

pub fn oo(child: i64, parent: i64) -> Node {
    Node::new("C")
        .prop(Prop::Str("OO".to_string()))
        .prop(Prop::I64(child))
        .prop(Prop::I64(parent))
}

pub fn op(child: i64, parent: i64, property: &str) -> Node {
    Node::new("C")
        .prop(Prop::Str("OP".to_string()))
        .prop(Prop::I64(child))
        .prop(Prop::I64(parent))
        .prop(Prop::Str(property.to_string()))
}

/// Top level `Objects` and `Connections` sections.
pub fn document(objects: Vec<Node>, connections: Vec<Node>) -> Vec<Node> {
    let objects = objects
        .into_iter()
        .fold(Node::new("Objects"), |node, o| node.child(o));
    let connections = connections
        .into_iter()
        .fold(Node::new("Connections"), |node, c| node.child(c));
    vec![objects, connections]
}
