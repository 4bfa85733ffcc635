use serde::Serialize;
use ts_rs::TS;

use super::ast::{Expr, MathFn};
use crate::events::LogLevel;
use crate::model::{MaterialScalar, TransformField};

/// Tag of every instruction the runner knows. The set is closed: a script can
/// only ever do what one of these does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[ts(export)]
pub enum Opcode {
    SetPosition,
    SetRotation,
    SetScale,
    Translate,
    Rotate,
    AssignField,
    SetMaterialColor,
    SetMaterialScalar,
    Log,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::SetPosition,
        Opcode::SetRotation,
        Opcode::SetScale,
        Opcode::Translate,
        Opcode::Rotate,
        Opcode::AssignField,
        Opcode::SetMaterialColor,
        Opcode::SetMaterialScalar,
        Opcode::Log,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::SetPosition => "SetPosition",
            Opcode::SetRotation => "SetRotation",
            Opcode::SetScale => "SetScale",
            Opcode::Translate => "Translate",
            Opcode::Rotate => "Rotate",
            Opcode::AssignField => "AssignField",
            Opcode::SetMaterialColor => "SetMaterialColor",
            Opcode::SetMaterialScalar => "SetMaterialScalar",
            Opcode::Log => "Log",
        }
    }
}

/// How a catalog row's operands are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `path(x, y, z)` writing a whole transform vector.
    Vector { field: TransformField, relative: bool },
    /// `path.<axis> = expr`, `+=` or `-=`.
    FieldAssign(TransformField),
    /// `path("#rrggbb")` or `path(0xrrggbb)`.
    Color,
    /// `path(expr)`, value clamped to 0..1.
    Scalar(MaterialScalar),
    /// `path("literal")`.
    Log(LogLevel),
}

/// Catalog row: single source of truth for a statement shape and its opcode.
/// Adding a shape means adding ONE row here plus the matching `Opcode`,
/// `Instruction` variant and runner arm.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub opcode: Opcode,
    /// Member paths this row answers to. The first one is canonical.
    pub paths: &'static [&'static str],
    pub shape: Shape,
    pub description: &'static str,
}

pub static CATALOG: &[CatalogEntry] = &[
    // ── Transform calls ─────────────────────────────────────────
    CatalogEntry {
        opcode: Opcode::SetPosition, paths: &["entity.transform.setPosition"],
        shape: Shape::Vector { field: TransformField::Position, relative: false },
        description: "Set position to (x, y, z)",
    },
    CatalogEntry {
        opcode: Opcode::SetRotation, paths: &["entity.transform.setRotation"],
        shape: Shape::Vector { field: TransformField::Rotation, relative: false },
        description: "Set Euler rotation to (x, y, z)",
    },
    CatalogEntry {
        opcode: Opcode::SetScale, paths: &["entity.transform.setScale"],
        shape: Shape::Vector { field: TransformField::Scale, relative: false },
        description: "Set scale to (x, y, z)",
    },
    CatalogEntry {
        opcode: Opcode::Translate, paths: &["entity.transform.translate"],
        shape: Shape::Vector { field: TransformField::Position, relative: true },
        description: "Add (dx, dy, dz) to position",
    },
    CatalogEntry {
        opcode: Opcode::Rotate, paths: &["entity.transform.rotate"],
        shape: Shape::Vector { field: TransformField::Rotation, relative: true },
        description: "Add (dx, dy, dz) to rotation",
    },
    // ── Field assignment ────────────────────────────────────────
    CatalogEntry {
        opcode: Opcode::AssignField, paths: &["entity.position", "entity.transform.position"],
        shape: Shape::FieldAssign(TransformField::Position),
        description: "Assign one position axis: =, += or -=",
    },
    CatalogEntry {
        opcode: Opcode::AssignField, paths: &["entity.rotation", "entity.transform.rotation"],
        shape: Shape::FieldAssign(TransformField::Rotation),
        description: "Assign one rotation axis: =, += or -=",
    },
    CatalogEntry {
        opcode: Opcode::AssignField, paths: &["entity.scale", "entity.transform.scale"],
        shape: Shape::FieldAssign(TransformField::Scale),
        description: "Assign one scale axis: =, += or -=",
    },
    // ── Material ────────────────────────────────────────────────
    CatalogEntry {
        opcode: Opcode::SetMaterialColor,
        paths: &["entity.material.setColor", "entity.meshRenderer.material.setColor"],
        shape: Shape::Color,
        description: "Set material color from \"#rrggbb\", \"#rgb\" or 0xrrggbb",
    },
    CatalogEntry {
        opcode: Opcode::SetMaterialScalar,
        paths: &["entity.material.setMetalness", "entity.meshRenderer.material.setMetalness"],
        shape: Shape::Scalar(MaterialScalar::Metalness),
        description: "Set metalness, clamped to [0, 1]",
    },
    CatalogEntry {
        opcode: Opcode::SetMaterialScalar,
        paths: &["entity.material.setRoughness", "entity.meshRenderer.material.setRoughness"],
        shape: Shape::Scalar(MaterialScalar::Roughness),
        description: "Set roughness, clamped to [0, 1]",
    },
    // ── Console ─────────────────────────────────────────────────
    CatalogEntry {
        opcode: Opcode::Log, paths: &["console.log"],
        shape: Shape::Log(LogLevel::Log), description: "Log a literal message",
    },
    CatalogEntry {
        opcode: Opcode::Log, paths: &["console.info"],
        shape: Shape::Log(LogLevel::Info), description: "Log a literal message at info level",
    },
    CatalogEntry {
        opcode: Opcode::Log, paths: &["console.warn"],
        shape: Shape::Log(LogLevel::Warn), description: "Log a literal warning",
    },
    CatalogEntry {
        opcode: Opcode::Log, paths: &["console.error"],
        shape: Shape::Log(LogLevel::Error), description: "Log a literal error",
    },
];

/// Values an expression may read by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinVar {
    Time,
    DeltaTime,
    FrameCount,
    Pi,
}

impl BuiltinVar {
    pub fn to_expr(self) -> Expr {
        match self {
            BuiltinVar::Time => Expr::Time,
            BuiltinVar::DeltaTime => Expr::DeltaTime,
            BuiltinVar::FrameCount => Expr::FrameCount,
            BuiltinVar::Pi => Expr::Const(std::f64::consts::PI),
        }
    }
}

pub static IMPLICIT_VARS: &[(&str, BuiltinVar, &str)] = &[
    ("time",           BuiltinVar::Time,       "Seconds since the simulation started"),
    ("time.time",      BuiltinVar::Time,       "Seconds since the simulation started"),
    ("deltaTime",      BuiltinVar::DeltaTime,  "Seconds since the previous frame"),
    ("time.deltaTime", BuiltinVar::DeltaTime,  "Seconds since the previous frame"),
    ("frameCount",     BuiltinVar::FrameCount, "Frames since the simulation started"),
    ("time.frameCount",BuiltinVar::FrameCount, "Frames since the simulation started"),
    ("PI",             BuiltinVar::Pi,         "3.14159..."),
    ("Math.PI",        BuiltinVar::Pi,         "3.14159..."),
];

pub static MATH_FNS: &[(&str, MathFn)] = &[
    ("sin", MathFn::Sin),
    ("Math.sin", MathFn::Sin),
    ("cos", MathFn::Cos),
    ("Math.cos", MathFn::Cos),
];

/// Prefixes that read a script parameter: `parameters.speed`.
pub static PARAM_PREFIXES: &[&str] = &["parameters", "params"];

pub const INPUT_KEY_DOWN: &str = "input.isKeyDown";
pub const INPUT_MOUSE_BUTTON_DOWN: &str = "input.isMouseButtonDown";

pub fn lookup(path: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.paths.contains(&path))
}

pub fn lookup_implicit(path: &str) -> Option<BuiltinVar> {
    IMPLICIT_VARS
        .iter()
        .find(|&&(n, _, _)| n == path)
        .map(|&(_, var, _)| var)
}

pub fn lookup_math(path: &str) -> Option<MathFn> {
    MATH_FNS.iter().find(|&&(n, _)| n == path).map(|&(_, f)| f)
}

/// Catalog rows for one opcode.
pub fn entries_for(opcode: Opcode) -> impl Iterator<Item = &'static CatalogEntry> {
    CATALOG.iter().filter(move |e| e.opcode == opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_row() {
        for opcode in Opcode::ALL {
            assert!(entries_for(opcode).next().is_some(), "{} has no catalog row", opcode.name());
        }
    }

    #[test]
    fn paths_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for entry in CATALOG {
            for path in entry.paths {
                assert!(seen.insert(*path), "duplicate catalog path {path}");
            }
        }
    }

    #[test]
    fn lookups() {
        assert_eq!(lookup("entity.transform.translate").map(|e| e.opcode), Some(Opcode::Translate));
        assert_eq!(
            lookup("entity.meshRenderer.material.setRoughness").map(|e| e.shape),
            Some(Shape::Scalar(MaterialScalar::Roughness))
        );
        assert!(lookup("entity.transform.lookAt").is_none());
        assert_eq!(lookup_implicit("time.deltaTime"), Some(BuiltinVar::DeltaTime));
        assert_eq!(lookup_math("Math.cos"), Some(MathFn::Cos));
        assert_eq!(lookup_math("tan"), None);
    }
}
