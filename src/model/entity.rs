//! Entity capabilities a script may act on.
//!
//! The runtime never owns entity storage. A host hands the runner a
//! `&mut dyn EntityCapabilities` per call, and each capability is optional:
//! an entity without a material simply reports `None`.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::color::Color;

/// Which vector of a transform an instruction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum TransformField {
    Position,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn from_script_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn get(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }

    pub fn set(self, v: &mut DVec3, value: f64) {
        match self {
            Axis::X => v.x = value,
            Axis::Y => v.y = value,
            Axis::Z => v.z = value,
        }
    }
}

/// Scalar material properties in the 0..1 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum MaterialScalar {
    Metalness,
    Roughness,
}

pub trait TransformAccess {
    fn get(&self, field: TransformField) -> DVec3;
    fn set(&mut self, field: TransformField, value: DVec3);
}

pub trait MaterialAccess {
    fn set_color(&mut self, color: Color);
    /// `value` is already clamped to 0..1 by the caller.
    fn set_scalar(&mut self, property: MaterialScalar, value: f64);
}

pub trait EntityCapabilities {
    fn transform(&mut self) -> Option<&mut dyn TransformAccess>;
    fn material(&mut self) -> Option<&mut dyn MaterialAccess>;
}

// ── In-memory reference implementations ──────────────────────────

/// Position, Euler rotation and scale of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DVec3,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DVec3::ZERO,
            scale: DVec3::ONE,
        }
    }
}

impl TransformAccess for Transform {
    fn get(&self, field: TransformField) -> DVec3 {
        match field {
            TransformField::Position => self.position,
            TransformField::Rotation => self.rotation,
            TransformField::Scale => self.scale,
        }
    }

    fn set(&mut self, field: TransformField, value: DVec3) {
        match field {
            TransformField::Position => self.position = value,
            TransformField::Rotation => self.rotation = value,
            TransformField::Scale => self.scale = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Color,
    pub metalness: f64,
    pub roughness: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            metalness: 0.0,
            roughness: 0.5,
        }
    }
}

impl MaterialAccess for Material {
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    fn set_scalar(&mut self, property: MaterialScalar, value: f64) {
        match property {
            MaterialScalar::Metalness => self.metalness = value,
            MaterialScalar::Roughness => self.roughness = value,
        }
    }
}

/// A standalone entity: a transform and optionally a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u64,
    pub transform: Option<Transform>,
    pub material: Option<Material>,
}

impl EntityState {
    /// Entity with a default transform and no material.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            transform: Some(Transform::default()),
            material: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn without_transform(mut self) -> Self {
        self.transform = None;
        self
    }
}

impl EntityCapabilities for EntityState {
    fn transform(&mut self) -> Option<&mut dyn TransformAccess> {
        self.transform.as_mut().map(|t| t as &mut dyn TransformAccess)
    }

    fn material(&mut self) -> Option<&mut dyn MaterialAccess> {
        self.material.as_mut().map(|m| m as &mut dyn MaterialAccess)
    }
}
