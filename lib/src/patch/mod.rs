//! Rules and engine for patching classes of an obfuscated binary
//!
//! Everything here is written against canonical (human-readable) names. The [`SymbolTable`]
//! translates them into whatever the binary being patched uses, so the same [`PatchRule`] works
//! on both obfuscated and deobfuscated builds.
//!
//! A [`PatchEngine`] owns the symbol table and the rules. Host class loaders hand it classes
//! through the [`ClassTransformer`] trait. For every class targeted by some rule, the engine:
//!
//!   1. decodes the class into a [`ClassUnit`](crate::jvm::model::ClassUnit)
//!   2. runs the rules in order, each on its own copy of the class (rules that can't find
//!      their target are rolled back under [`FailurePolicy::FailOpen`])
//!   3. validates every edited method, then encodes the class back
//!
//! Rules locate what they edit with the [`Predicate`] matcher, and edit method bodies through
//! [`InstructionSequence`](crate::jvm::code::InstructionSequence).

mod control;
mod engine;
mod errors;
mod matcher;
mod rule;
pub mod rules;
mod settings;
mod symbols;

pub use control::*;
pub use engine::*;
pub use errors::*;
pub use matcher::*;
pub use rule::*;
pub use settings::*;
pub use symbols::*;
