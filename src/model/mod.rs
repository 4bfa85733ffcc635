pub mod color;
pub mod entity;
pub mod input;
pub mod params;

// Re-export commonly used types at the model level.
pub use color::Color;
pub use entity::{
    Axis, EntityCapabilities, EntityState, Material, MaterialAccess, MaterialScalar, Transform,
    TransformAccess, TransformField,
};
pub use input::{InputSnapshot, InputState, NoInput, TimeInfo};
pub use params::{ParamValue, ScriptParameters};
