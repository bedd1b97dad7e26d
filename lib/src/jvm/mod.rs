//! Read, edit, and write JVM classes
//!
//! ### Layers
//!
//!   - [`class_file`] maps one-to-one onto the bytes of a class file
//!   - [`code`] turns method bodies into editable [instruction sequences](code::InstructionSequence)
//!   - [`verifier`] checks edited bodies and computes their stack map frames
//!   - [`model`] ties these together into classes that can be parsed, edited, and re-emitted
//!
//! ### Simple example
//!
//! Consider a class `me/alec/Point` with a method `int norm()`. Making the method start by
//! calling a static hook can be done as follows:
//!
//! ```no_run
//! use classpatch::jvm::code::{Instruction, InvokeType, MethodRef};
//! use classpatch::jvm::model::ClassUnit;
//! use classpatch::jvm::*;
//!
//! # fn patch_class(bytes: &[u8]) -> Result<Vec<u8>, Error> {
//! let mut class = ClassUnit::parse(bytes)?;
//! let hook = MethodRef {
//!     owner: RefType::from_class_name("me/alec/Hooks")?,
//!     name: UnqualifiedName::from_string(String::from("onNorm")).map_err(Error::MalformedName)?,
//!     descriptor: MethodDescriptor::parse("()V")?,
//!     is_interface: false,
//! };
//!
//! let method = class
//!     .methods
//!     .iter_mut()
//!     .find(|method| method.name.as_str() == "norm")
//!     .expect("no norm method");
//! if let Some(code) = method.code_mut()? {
//!     code.insert_at_start(vec![Instruction::Invoke(InvokeType::Static, hook).into()])?;
//! }
//!
//! // Checks the edit and recomputes max stack, max locals, and stack map frames
//! method.validate()?;
//! class.to_bytes()
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
