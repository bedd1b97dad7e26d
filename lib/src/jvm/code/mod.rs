//! Bytecode representation and editing
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may branch
//!
//! A method body is decoded into an [`InstructionSequence`]: an ordered list of [`Node`]s where
//! jump targets have become [`Label`]s and the line number and stack map tables have become
//! pseudo nodes interleaved with the instructions. Every node gets a stable [`NodeId`] which stays
//! valid as other nodes get inserted or removed around it.
//!
//! ### Editing
//!
//! Mutations of a sequence are recorded as [`Edit`]s, along with the stack effect of what was
//! inserted and removed. This is what makes it possible to check after the fact that a patch
//! didn't unbalance the operand stack. Once edits are done, [`encode_code`] lays the sequence back
//! out into a `Code` attribute.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod decode;
mod encode;
mod instructions;
mod label;
mod sequence;

pub use decode::*;
pub use encode::*;
pub use instructions::*;
pub use label::*;
pub use sequence::*;
