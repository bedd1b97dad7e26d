//! Semantic representations of classes
//!
//! This is the representation patches work on. Names and descriptors are decoded, and method
//! bodies are available as editable instruction sequences.
//!
//!   - __Class__ is represented using [`ClassUnit`]
//!   - __Method__ is represented using [`MethodUnit`]
//!   - __Field__ is represented using [`FieldUnit`]
//!
//! Everything not exposed here (other attributes, the rest of the constant pool) is carried along
//! untouched from the parsed class file.

mod class;
mod field;
mod method;

pub use class::*;
pub use field::*;
pub use method::*;
