//! This module contains the AST of JVM bytecode. The representations is slightly different from
//! the usual presentation to make it more convenient to search and edit bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - Operands are symbolic: there are no constant pool indices for fields, methods, classes, or
//!     loadable constants. Two instructions that mean the same thing compare equal, regardless of
//!     which class file they were read from.
//!

use crate::jvm::class_file::ConstantIndex;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Width;
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantValue), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),         // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(DynamicCallSite),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    ArrayLength,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<BinaryName>, u8),
}

/// Field operand of `getstatic`, `putstatic`, `getfield`, and `putfield`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Method operand of the `invoke*` instructions (except `invokedynamic`)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Class or interface declaring the method (array types show up for eg. `clone`)
    pub owner: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Is the owner an interface? (selects `InterfaceMethodref` over `Methodref`)
    pub is_interface: bool,
}

/// Call site of an `invokedynamic`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DynamicCallSite {
    /// Index into the `BootstrapMethods` attribute of the class
    pub bootstrap_method: u16,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Values loadable with `ldc`, `ldc_w`, and `ldc2_w`
///
/// Method handles and dynamic constants keep pointing at their constant pool entry: the pool only
/// ever grows, so the index stays meaningful for the class the instruction came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    MethodType(MethodDescriptor<BinaryName>),
    MethodHandle(ConstantIndex),
    Dynamic {
        index: ConstantIndex,
        descriptor: FieldType<BinaryName>,
    },
}

impl ConstantValue {
    /// Literal equality, comparing floating point values bit for bit
    ///
    /// Unlike `==`, this distinguishes `0.0` from `-0.0` and considers a `NaN` equal to itself.
    pub fn same_literal(&self, other: &ConstantValue) -> bool {
        match (self, other) {
            (ConstantValue::Float(f1), ConstantValue::Float(f2)) => f1.to_bits() == f2.to_bits(),
            (ConstantValue::Double(d1), ConstantValue::Double(d2)) => {
                d1.to_bits() == d2.to_bits()
            }
            (c1, c2) => c1 == c2,
        }
    }
}

impl Width for ConstantValue {
    fn width(&self) -> usize {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => 2,
            ConstantValue::Dynamic { descriptor, .. } => descriptor.width(),
            _ => 1,
        }
    }
}

/// Coarse classification of instructions, used when searching for anchors
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OpcodeCategory {
    Nop,
    Constant,
    Load,
    Store,
    ArrayLoad,
    ArrayStore,
    Stack,
    Arithmetic,
    Increment,
    Conversion,
    Comparison,
    FieldAccess,
    Invoke,
    InvokeDynamic,
    Allocation,
    TypeCheck,
    Monitor,
    Branch,
    Switch,
    Subroutine,
    Return,
    Throw,

    /// Pseudo nodes
    Label,
    LineNumber,
    Frame,
}

impl Instruction {
    /// Shortest instruction pushing the given constant
    pub fn push_constant(value: ConstantValue) -> Instruction {
        match value {
            ConstantValue::Integer(-1) => Instruction::IConstM1,
            ConstantValue::Integer(0) => Instruction::IConst0,
            ConstantValue::Integer(1) => Instruction::IConst1,
            ConstantValue::Integer(2) => Instruction::IConst2,
            ConstantValue::Integer(3) => Instruction::IConst3,
            ConstantValue::Integer(4) => Instruction::IConst4,
            ConstantValue::Integer(5) => Instruction::IConst5,
            ConstantValue::Integer(i) if i8::try_from(i).is_ok() => Instruction::BiPush(i as i8),
            ConstantValue::Integer(i) if i16::try_from(i).is_ok() => {
                Instruction::SiPush(i as i16)
            }
            ConstantValue::Long(0) => Instruction::LConst0,
            ConstantValue::Long(1) => Instruction::LConst1,
            ConstantValue::Float(f) if f.to_bits() == 0f32.to_bits() => Instruction::FConst0,
            ConstantValue::Float(f) if f.to_bits() == 1f32.to_bits() => Instruction::FConst1,
            ConstantValue::Float(f) if f.to_bits() == 2f32.to_bits() => Instruction::FConst2,
            ConstantValue::Double(d) if d.to_bits() == 0f64.to_bits() => Instruction::DConst0,
            ConstantValue::Double(d) if d.to_bits() == 1f64.to_bits() => Instruction::DConst1,
            other => Instruction::Ldc(other),
        }
    }

    /// If the instruction pushes a constant (other than `null`), what is it?
    pub fn literal(&self) -> Option<ConstantValue> {
        use Instruction::*;
        Some(match self {
            IConstM1 => ConstantValue::Integer(-1),
            IConst0 => ConstantValue::Integer(0),
            IConst1 => ConstantValue::Integer(1),
            IConst2 => ConstantValue::Integer(2),
            IConst3 => ConstantValue::Integer(3),
            IConst4 => ConstantValue::Integer(4),
            IConst5 => ConstantValue::Integer(5),
            LConst0 => ConstantValue::Long(0),
            LConst1 => ConstantValue::Long(1),
            FConst0 => ConstantValue::Float(0.0),
            FConst1 => ConstantValue::Float(1.0),
            FConst2 => ConstantValue::Float(2.0),
            DConst0 => ConstantValue::Double(0.0),
            DConst1 => ConstantValue::Double(1.0),
            BiPush(b) => ConstantValue::Integer(*b as i32),
            SiPush(s) => ConstantValue::Integer(*s as i32),
            Ldc(constant) => constant.clone(),
            _ => return None,
        })
    }

    /// Local variable slot read or written by the instruction
    pub fn local_slot(&self) -> Option<u16> {
        use Instruction::*;
        match self {
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) | IInc(idx, _) => Some(*idx),
            _ => None,
        }
    }

    pub fn category(&self) -> OpcodeCategory {
        use Instruction::*;
        match self {
            Nop => OpcodeCategory::Nop,
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1 | BiPush(_)
            | SiPush(_) | Ldc(_) => OpcodeCategory::Constant,
            ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) => OpcodeCategory::Load,
            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => OpcodeCategory::Store,
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
                OpcodeCategory::ArrayLoad
            }
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                OpcodeCategory::ArrayStore
            }
            Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | Swap => {
                OpcodeCategory::Stack
            }
            IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul
            | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem | INeg | LNeg | FNeg
            | DNeg | ISh(_) | LSh(_) | IAnd | LAnd | IOr | LOr | IXor | LXor => {
                OpcodeCategory::Arithmetic
            }
            IInc(_, _) => OpcodeCategory::Increment,
            I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D | D2I | D2L | D2F | I2B | I2C
            | I2S => OpcodeCategory::Conversion,
            LCmp | FCmp(_) | DCmp(_) => OpcodeCategory::Comparison,
            GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) => {
                OpcodeCategory::FieldAccess
            }
            Invoke(_, _) => OpcodeCategory::Invoke,
            InvokeDynamic(_) => OpcodeCategory::InvokeDynamic,
            New(_) | NewArray(_) | ANewArray(_) | MultiANewArray(_, _) => {
                OpcodeCategory::Allocation
            }
            ArrayLength => OpcodeCategory::ArrayLoad,
            CheckCast(_) | InstanceOf(_) => OpcodeCategory::TypeCheck,
            MonitorEnter | MonitorExit => OpcodeCategory::Monitor,
        }
    }

    /// Number of stack slots popped and pushed by the instruction
    ///
    /// Slots are what the JVM counts for `max_stack` (`long` and `double` take two), which makes
    /// this independent of what is actually on the stack (eg. `dup2` always pushes two slots).
    pub fn stack_slots(&self) -> (usize, usize) {
        use Instruction::*;
        match self {
            Nop => (0, 0),
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => (0, 1),
            LConst0 | LConst1 | DConst0 | DConst1 => (0, 2),
            Ldc(constant) => (0, constant.width()),
            ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
            LLoad(_) | DLoad(_) => (0, 2),
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
            LALoad | DALoad => (2, 2),
            IStore(_) | FStore(_) | AStore(_) => (1, 0),
            LStore(_) | DStore(_) => (2, 0),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
            LAStore | DAStore => (4, 0),
            Pop => (1, 0),
            Pop2 => (2, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            DupX2 => (3, 4),
            Dup2 => (2, 4),
            Dup2X1 => (3, 5),
            Dup2X2 => (4, 6),
            Swap => (2, 2),
            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem | IAnd | IOr
            | IXor | ISh(_) => (2, 1),
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem | LAnd | LOr
            | LXor => (4, 2),
            LSh(_) => (3, 2),
            INeg | FNeg => (1, 1),
            LNeg | DNeg => (2, 2),
            IInc(_, _) => (0, 0),
            I2F | F2I | I2B | I2C | I2S => (1, 1),
            I2L | I2D | F2L | F2D => (1, 2),
            L2I | L2F | D2I | D2F => (2, 1),
            L2D | D2L => (2, 2),
            LCmp | DCmp(_) => (4, 1),
            FCmp(_) => (2, 1),
            GetStatic(field) => (0, field.descriptor.width()),
            PutStatic(field) => (field.descriptor.width(), 0),
            GetField(field) => (1, field.descriptor.width()),
            PutField(field) => (1 + field.descriptor.width(), 0),
            Invoke(invoke_type, method) => {
                let has_receiver = *invoke_type != InvokeType::Static;
                (
                    method.descriptor.parameter_length(has_receiver),
                    method.descriptor.return_width(),
                )
            }
            InvokeDynamic(call_site) => (
                call_site.descriptor.parameter_length(false),
                call_site.descriptor.return_width(),
            ),
            New(_) => (0, 1),
            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
            MonitorEnter | MonitorExit => (1, 0),
            MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
        }
    }
}

/// Branching JVM bytecode instruction
///
/// The type parameter abstracts over the representation of jump targets: labels while the code is
/// being edited, absolute offsets into the code array while it is being decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(Lbl),
    Jsr(Lbl),
    JsrW(Lbl),
    Ret(u16), // covers `ret` and `wide ret`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    ///
    /// `jsr` counts as falling through, since the subroutine returns to the next instruction.
    pub fn falls_through(&self) -> bool {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Jsr(_)
            | BranchInstruction::JsrW(_) => true,

            BranchInstruction::Goto(_)
            | BranchInstruction::GotoW(_)
            | BranchInstruction::Ret(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => false,
        }
    }

    /// Non-fallthrough jump targets, in order (for switches, the default comes first)
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::GotoW(lbl)
            | BranchInstruction::Jsr(lbl)
            | BranchInstruction::JsrW(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::Ret(_)
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(lbl) => GotoW(map_label(lbl)?),
            Jsr(lbl) => Jsr(map_label(lbl)?),
            JsrW(lbl) => JsrW(map_label(lbl)?),
            Ret(idx) => Ret(*idx),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&mut map_label).collect::<Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| -> Result<(i32, Lbl2), E> { Ok((*key, map_label(lbl)?)) })
                    .collect::<Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    pub fn category(&self) -> OpcodeCategory {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Goto(_)
            | BranchInstruction::GotoW(_) => OpcodeCategory::Branch,
            BranchInstruction::Jsr(_) | BranchInstruction::JsrW(_) | BranchInstruction::Ret(_) => {
                OpcodeCategory::Subroutine
            }
            BranchInstruction::TableSwitch { .. } | BranchInstruction::LookupSwitch { .. } => {
                OpcodeCategory::Switch
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return => OpcodeCategory::Return,
            BranchInstruction::AThrow => OpcodeCategory::Throw,
        }
    }

    /// Number of stack slots popped and pushed by the instruction (see
    /// [`Instruction::stack_slots`])
    pub fn stack_slots(&self) -> (usize, usize) {
        match self {
            BranchInstruction::If(_, _) | BranchInstruction::IfNull(_, _) => (1, 0),
            BranchInstruction::IfICmp(_, _) | BranchInstruction::IfACmp(_, _) => (2, 0),
            BranchInstruction::Goto(_) | BranchInstruction::GotoW(_) => (0, 0),
            BranchInstruction::Jsr(_) | BranchInstruction::JsrW(_) => (0, 1),
            BranchInstruction::Ret(_) => (0, 0),
            BranchInstruction::TableSwitch { .. } | BranchInstruction::LookupSwitch { .. } => {
                (1, 0)
            }
            BranchInstruction::IReturn
            | BranchInstruction::FReturn
            | BranchInstruction::AReturn
            | BranchInstruction::AThrow => (1, 0),
            BranchInstruction::LReturn | BranchInstruction::DReturn => (2, 0),
            BranchInstruction::Return => (0, 0),
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`. The argument count of `invokeinterface` is derived from the descriptor.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{Name, ParseDescriptor};

    fn method(descriptor: &str) -> MethodRef {
        MethodRef {
            owner: RefType::Object(BinaryName::from_string(String::from("a/B")).unwrap()),
            name: UnqualifiedName::from_string(String::from("m")).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            is_interface: false,
        }
    }

    #[test]
    fn shortest_constant_pushes() {
        assert_eq!(
            Instruction::push_constant(ConstantValue::Integer(4)),
            Instruction::IConst4
        );
        assert_eq!(
            Instruction::push_constant(ConstantValue::Integer(-100)),
            Instruction::BiPush(-100)
        );
        assert_eq!(
            Instruction::push_constant(ConstantValue::Integer(1000)),
            Instruction::SiPush(1000)
        );
        assert_eq!(
            Instruction::push_constant(ConstantValue::Integer(100_000)),
            Instruction::Ldc(ConstantValue::Integer(100_000))
        );
        assert_eq!(
            Instruction::push_constant(ConstantValue::Float(-0.0)),
            Instruction::Ldc(ConstantValue::Float(-0.0))
        );
        assert_eq!(
            Instruction::push_constant(ConstantValue::Float(2.0)),
            Instruction::FConst2
        );
    }

    #[test]
    fn literals_compare_bitwise() {
        let neg_zero = ConstantValue::Float(-0.0);
        assert_eq!(neg_zero, ConstantValue::Float(0.0));
        assert!(!neg_zero.same_literal(&ConstantValue::Float(0.0)));
        assert!(ConstantValue::Float(f32::NAN).same_literal(&ConstantValue::Float(f32::NAN)));
        assert!(ConstantValue::Float(-3.0).same_literal(&ConstantValue::Float(-3.0)));
    }

    #[test]
    fn stack_slots() {
        assert_eq!(Instruction::Ldc(ConstantValue::Double(1.5)).stack_slots(), (0, 2));
        assert_eq!(
            Instruction::Invoke(InvokeType::Static, method("(IJ)V")).stack_slots(),
            (3, 0)
        );
        assert_eq!(
            Instruction::Invoke(InvokeType::Virtual, method("(IF)Z")).stack_slots(),
            (3, 1)
        );
        assert_eq!(Instruction::Dup2X1.stack_slots(), (3, 5));
        assert_eq!(BranchInstruction::<()>::LReturn.stack_slots(), (2, 0));
    }

    #[test]
    fn switch_targets() {
        let switch = BranchInstruction::LookupSwitch {
            default: 0,
            targets: vec![(1, 10), (5, 20)],
        };
        assert_eq!(switch.jump_targets(), vec![0, 10, 20]);
        assert!(!switch.falls_through());

        let mapped = switch
            .map_labels(|lbl| Ok::<_, ()>(lbl + 1))
            .unwrap();
        assert_eq!(mapped.jump_targets(), vec![1, 11, 21]);
    }
}
