//! Targeted patching of compiled JVM classes
//!
//! The crate is split in two layers:
//!
//!   - [`jvm`] decodes class files into an editable model (methods as mutable instruction
//!     sequences with stable node handles), checks that edited methods are still verifiable, and
//!     encodes them back into bytes
//!   - [`patch`] resolves human-readable names against obfuscated binaries, finds anchor
//!     instructions, and runs declarative patch rules over the classes a host loader hands over

pub mod jvm;
pub mod patch;
mod util;
