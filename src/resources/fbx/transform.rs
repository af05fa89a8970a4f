//! Local transforms of FBX models, read from `Properties70`.

use cgmath::{Deg, Matrix4, One, Quaternion, Rotation3, Vector3};

use super::reader::{FbxNode, Property};
use crate::data_structures::instance::Instance;

/// Looks up a `P` entry of a `Properties70` block and returns its values.
pub fn property<'a>(object: &'a FbxNode, name: &str) -> Option<&'a [Property]> {
    object
        .child("Properties70")?
        .children_named("P")
        .find(|p| p.prop(0).and_then(Property::as_str) == Some(name))
        .map(|p| p.properties.get(4..).unwrap_or(&[]))
}

pub fn property_vec3(object: &FbxNode, name: &str) -> Option<Vector3<f32>> {
    let values = property(object, name)?;
    let x = values.first()?.as_f64()?;
    let y = values.get(1)?.as_f64()?;
    let z = values.get(2)?.as_f64()?;
    Some(Vector3::new(x as f32, y as f32, z as f32))
}

pub fn property_f64(object: &FbxNode, name: &str) -> Option<f64> {
    property(object, name)?.first()?.as_f64()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationOrder {
    #[default]
    Xyz,
    Xzy,
    Yzx,
    Yxz,
    Zxy,
    Zyx,
}

impl RotationOrder {
    pub fn from_fbx(value: i64) -> Self {
        match value {
            1 => RotationOrder::Xzy,
            2 => RotationOrder::Yzx,
            3 => RotationOrder::Yxz,
            4 => RotationOrder::Zxy,
            5 => RotationOrder::Zyx,
            // 6 is spheric XYZ, which FBX itself evaluates as XYZ.
            _ => RotationOrder::Xyz,
        }
    }

    /// Builds the rotation for Euler angles in degrees. The first named axis is
    /// applied first.
    pub fn quaternion(self, degrees: Vector3<f32>) -> Quaternion<f32> {
        let x = Quaternion::from_angle_x(Deg(degrees.x));
        let y = Quaternion::from_angle_y(Deg(degrees.y));
        let z = Quaternion::from_angle_z(Deg(degrees.z));
        match self {
            RotationOrder::Xyz => z * y * x,
            RotationOrder::Xzy => y * z * x,
            RotationOrder::Yzx => x * z * y,
            RotationOrder::Yxz => z * x * y,
            RotationOrder::Zxy => y * x * z,
            RotationOrder::Zyx => x * y * z,
        }
    }
}

/// Everything needed to turn animated Euler angles into a local rotation.
#[derive(Clone, Debug, PartialEq)]
pub struct EulerRotation {
    pub order: RotationOrder,
    pub pre: Quaternion<f32>,
    pub post: Quaternion<f32>,
}

impl Default for EulerRotation {
    fn default() -> Self {
        Self {
            order: RotationOrder::Xyz,
            pre: Quaternion::one(),
            post: Quaternion::one(),
        }
    }
}

impl EulerRotation {
    /// `pre * R * post⁻¹`
    pub fn to_quaternion(&self, degrees: Vector3<f32>) -> Quaternion<f32> {
        self.pre * self.order.quaternion(degrees) * self.post.conjugate()
    }
}

/// Static local transform of a model. Pivots and offsets are not evaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelTransform {
    pub translation: Vector3<f32>,
    pub rotation_degrees: Vector3<f32>,
    pub scale: Vector3<f32>,
    pub rotation: EulerRotation,
    /// Offset that applies to the model's geometry but not to its children.
    pub geometric: Matrix4<f32>,
}

impl ModelTransform {
    pub fn from_model(model: &FbxNode) -> Self {
        let zero = Vector3::new(0.0, 0.0, 0.0);
        let one = Vector3::new(1.0, 1.0, 1.0);
        let order = property_f64(model, "RotationOrder")
            .map(|v| RotationOrder::from_fbx(v as i64))
            .unwrap_or_default();
        let pre = property_vec3(model, "PreRotation")
            .map(|d| RotationOrder::Xyz.quaternion(d))
            .unwrap_or_else(Quaternion::one);
        let post = property_vec3(model, "PostRotation")
            .map(|d| RotationOrder::Xyz.quaternion(d))
            .unwrap_or_else(Quaternion::one);

        let geometric_translation = property_vec3(model, "GeometricTranslation").unwrap_or(zero);
        let geometric_rotation = property_vec3(model, "GeometricRotation").unwrap_or(zero);
        let geometric_scale = property_vec3(model, "GeometricScaling").unwrap_or(one);
        let geometric = Matrix4::from_translation(geometric_translation)
            * Matrix4::from(RotationOrder::Xyz.quaternion(geometric_rotation))
            * Matrix4::from_nonuniform_scale(geometric_scale.x, geometric_scale.y, geometric_scale.z);

        Self {
            translation: property_vec3(model, "Lcl Translation").unwrap_or(zero),
            rotation_degrees: property_vec3(model, "Lcl Rotation").unwrap_or(zero),
            scale: property_vec3(model, "Lcl Scaling").unwrap_or(one),
            rotation: EulerRotation { order, pre, post },
            geometric,
        }
    }

    pub fn to_instance(&self) -> Instance {
        Instance {
            position: self.translation,
            rotation: self.rotation.to_quaternion(self.rotation_degrees),
            scale: self.scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Rotation};

    use super::*;

    #[test]
    fn xyz_order_applies_x_first() {
        let q = RotationOrder::Xyz.quaternion(Vector3::new(90.0, 0.0, 90.0));
        // x then z: +y -> +z (about x) -> +z (about z)
        let v = q.rotate_vector(Vector3::new(0.0, 1.0, 0.0));
        assert!((v - Vector3::new(0.0, 0.0, 1.0)).magnitude() < 1e-5);
        // +x -> +x (about x) -> +y (about z)
        let v = q.rotate_vector(Vector3::new(1.0, 0.0, 0.0));
        assert!((v - Vector3::new(0.0, 1.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn pre_rotation_is_applied_outside() {
        let rotation = EulerRotation {
            pre: Quaternion::from_angle_y(Deg(90.0)),
            ..Default::default()
        };
        let q = rotation.to_quaternion(Vector3::new(0.0, 0.0, 0.0));
        let v = q.rotate_vector(Vector3::new(1.0, 0.0, 0.0));
        assert!((v - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-5);
    }
}
