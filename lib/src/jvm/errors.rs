use super::class_file::{Constant, Version};
use super::code::{Label, NodeId};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Input doesn't start with `0xCAFEBABE`
    BadMagic(u32),

    /// Class file version outside of the range the decoder understands
    UnsupportedClassVersion(Version),

    /// Structurally invalid class file
    MalformedClass(String),

    InvalidConstantIndex(u16),
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
    },
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },

    MalformedName(String),
    BadDescriptor(String),
    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    /// Unknown or reserved opcode in a code array
    InvalidOpcode {
        offset: usize,
        opcode: u8,
    },

    /// Jump into the middle of an instruction (or outside the code array)
    InvalidBranchTarget {
        offset: usize,
        target: i64,
    },

    MethodCodeOverflow(usize),
    MethodCodeMaxStackOverflow(usize),
    MethodCodeMaxLocalsOverflow(usize),

    /// Branch offset doesn't fit in the 16 bits of a regular jump
    JumpOffsetOverflow {
        label: Label,
        offset: isize,
    },

    /// Label is placed more than once in the same sequence
    DuplicateLabel(Label),

    /// Label is referenced but never placed
    DanglingLabel(Label),

    /// Node handle doesn't refer to a node in the sequence (it was removed)
    MissingNode(NodeId),

    /// Replacement operand doesn't fit the instruction
    OperandMismatch {
        node: NodeId,
        operand: String,
    },

    /// Inserted instructions don't have the same net stack effect as what they replaced
    UnbalancedInsertion {
        anchor: Option<NodeId>,
        net_effect: i32,
    },

    /// Instruction was reachable before the method was edited, but isn't anymore
    UnreachableInstruction(NodeId),

    /// An instruction is reached with different stack depths
    StackHeightMismatch {
        node: NodeId,
        expected: usize,
        found: usize,
    },

    /// Instruction pops more than is on the stack
    StackUnderflow {
        instruction: String,
    },

    /// Error trying to verify
    VerifierError {
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// A particular offset has two conflicting frames
    ConflictingFrames(usize),

    /// Frame computation did not produce a frame where one is required
    FrameInference(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

#[derive(Debug)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidIndex(u16),
    InvalidType,

    /// Two frames flowing into the same position have different stack shapes
    IncompatibleFrames,

    UnreachableBranchTarget(Label),
}
