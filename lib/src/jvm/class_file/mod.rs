//! Raw class file structures
//!
//! This is the representation that maps one-to-one onto the bytes of a class file. Constant pool
//! references are plain indices and most attributes are left as opaque bytes: only the ones that
//! need to be edited when a method body changes get a typed representation.
//!
//! [Format](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html)

mod attribute;
mod binary_format;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
