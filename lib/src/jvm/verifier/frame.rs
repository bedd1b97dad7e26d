use super::*;
use crate::jvm::class_file::{ClassConstantIndex, ConstantPool, StackMapFrame};
use crate::jvm::code::{BranchInstruction, ConstantValue, Instruction, InvokeType, Label};
use crate::jvm::{
    ArrayType, BinaryName, Error, FieldType, MethodDescriptor, RefType, UnqualifiedName,
    VerifierErrorKind,
};
use crate::util::Width;
use std::collections::HashMap;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are indexed by slot: the slot following a `long` or `double` holds [`VerificationType::Top`].
/// The stack holds one entry per value. Use [`Frame::compact_locals`] and [`Frame::from_compact`]
/// to go to and from the one-entry-per-value form used in `StackMapTable`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: Vec<VerificationType<Cls, U>>,
}

/// Stack map frame used while analyzing a method body
pub type VerifierFrame = Frame<RefType<BinaryName>, UninitializedRef>;

type VType = VerificationType<RefType<BinaryName>, UninitializedRef>;
type SerializableType = VerificationType<ClassConstantIndex, u16>;

impl<Cls: Clone, U: Clone> Frame<Cls, U> {
    /// Build a frame from locals stored one entry per value
    pub fn from_compact(
        locals: impl IntoIterator<Item = VerificationType<Cls, U>>,
        stack: Vec<VerificationType<Cls, U>>,
    ) -> Self {
        let mut slots = vec![];
        for local in locals {
            let is_wide = local.width() == 2;
            slots.push(local);
            if is_wide {
                slots.push(VerificationType::Top);
            }
        }
        Frame {
            locals: slots,
            stack,
        }
    }

    /// Locals, one entry per value
    pub fn compact_locals(&self) -> Vec<VerificationType<Cls, U>> {
        let mut compact = vec![];
        let mut slot = 0;
        while let Some(local) = self.locals.get(slot) {
            compact.push(local.clone());
            slot += local.width();
        }
        compact
    }

    /// Drop unusable locals at the end of the frame
    pub fn trim_locals(&mut self) {
        while let Some(VerificationType::Top) = self.locals.last() {
            let len = self.locals.len();
            if len >= 2 && self.locals[len - 2].width() == 2 {
                break;
            }
            self.locals.pop();
        }
    }
}

impl VerifierFrame {
    /// Frame on entry to a method
    ///
    /// In constructors (other than the one of `java/lang/Object`), `this` starts off
    /// uninitialized.
    pub fn entry(
        owner: &BinaryName,
        is_static: bool,
        is_constructor: bool,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> VerifierFrame {
        let mut locals = vec![];
        if !is_static {
            if is_constructor && *owner != BinaryName::OBJECT {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::Object(RefType::Object(owner.clone())));
            }
        }
        locals.extend(descriptor.parameters.iter().map(VType::from));
        VerifierFrame::from_compact(locals, vec![])
    }

    /// Frame described by one entry of a `StackMapTable`, given the frame before it
    pub fn next_declared(
        &self,
        entry: &StackMapFrame,
        mut resolve: impl FnMut(&SerializableType) -> Result<VType, Error>,
    ) -> Result<VerifierFrame, Error> {
        Ok(match entry {
            StackMapFrame::SameLocalsNoStack { .. } => Frame {
                locals: self.locals.clone(),
                stack: vec![],
            },
            StackMapFrame::SameLocalsOneStack { stack, .. } => Frame {
                locals: self.locals.clone(),
                stack: vec![resolve(stack)?],
            },
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let mut locals = self.compact_locals();
                let chopped_k = *chopped_k as usize;
                if chopped_k > locals.len() {
                    return Err(Error::MalformedAttribute {
                        name: "StackMapTable",
                        reason: format!("cannot chop {} locals from {:?}", chopped_k, locals),
                    });
                }
                locals.truncate(locals.len() - chopped_k);
                VerifierFrame::from_compact(locals, vec![])
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut compact = self.compact_locals();
                for local in locals {
                    compact.push(resolve(local)?);
                }
                VerifierFrame::from_compact(compact, vec![])
            }
            StackMapFrame::Full { locals, stack, .. } => VerifierFrame::from_compact(
                locals.iter().map(&mut resolve).collect::<Result<Vec<_>, _>>()?,
                stack.iter().map(&mut resolve).collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `new_site` is the label right before the instruction, which is needed to track the object
    /// created by a `new`.
    pub fn verify_instruction(
        &mut self,
        insn: &Instruction,
        new_site: Option<Label>,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        verify_instruction(self, this_class, insn, new_site)
    }

    /// Update the frame to reflect the effects of the given branching instruction
    ///
    /// The frame is the one flowing into the jump targets (and the next instruction, if there is
    /// a fallthrough).
    pub fn verify_branch_instruction(
        &mut self,
        insn: &BranchInstruction<Label>,
    ) -> Result<(), VerifierErrorKind> {
        verify_branch_instruction(self, insn)
    }

    /// Unify the frames flowing into the same instruction
    ///
    /// Locals that disagree become unusable and references that disagree generalize to
    /// `java/lang/Object`. Stacks must have the same shape.
    pub fn merge(&self, other: &VerifierFrame) -> Result<VerifierFrame, VerifierErrorKind> {
        if self.stack.len() != other.stack.len() {
            return Err(VerifierErrorKind::IncompatibleFrames);
        }
        let stack = self
            .stack
            .iter()
            .zip(other.stack.iter())
            .map(|(t1, t2)| merge_types(t1, t2).ok_or(VerifierErrorKind::IncompatibleFrames))
            .collect::<Result<Vec<_>, _>>()?;

        let locals_len = self.locals.len().max(other.locals.len());
        let locals = (0..locals_len)
            .map(|slot| match (self.locals.get(slot), other.locals.get(slot)) {
                (Some(t1), Some(t2)) => merge_types(t1, t2).unwrap_or(VType::Top),
                _ => VType::Top,
            })
            .collect();

        let mut merged = Frame { locals, stack };
        merged.trim_locals();
        Ok(merged)
    }

    /// Resolve the frame into its serializable form
    pub fn into_serializable(
        &self,
        constants: &mut ConstantPool,
        label_offsets: &HashMap<Label, usize>,
    ) -> Result<Frame<ClassConstantIndex, u16>, Error> {
        let mut resolve = |vtype: &VType| -> Result<SerializableType, Error> {
            vtype.map(
                |ref_type| constants.get_class(ref_type).map_err(Error::from),
                |uninitialized| {
                    label_offsets
                        .get(&uninitialized.label)
                        .map(|offset| *offset as u16)
                        .ok_or(Error::DanglingLabel(uninitialized.label))
                },
            )
        };
        Ok(Frame {
            locals: self.locals.iter().map(&mut resolve).collect::<Result<_, _>>()?,
            stack: self.stack.iter().map(&mut resolve).collect::<Result<_, _>>()?,
        })
    }
}

impl Frame<ClassConstantIndex, u16> {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none of the
    /// other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_locals = self.compact_locals();
        let prev_locals = previous_frame.compact_locals();

        match self.stack.len() {
            0 => {
                if this_locals.len() <= prev_locals.len() {
                    let len_difference = prev_locals.len() - this_locals.len();
                    let this_is_prefix_of_prev = this_locals
                        .iter()
                        .zip(prev_locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals.len() - prev_locals.len() < 4 {
                    let prev_is_prefix_of_this = prev_locals
                        .iter()
                        .zip(this_locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: this_locals[prev_locals.len()..].to_vec(),
                        };
                    }
                }
            }
            1 if this_locals == prev_locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0].clone(),
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.compact_locals(),
        }
    }
}

/// Common type of two values, if there is one
fn merge_types(t1: &VType, t2: &VType) -> Option<VType> {
    match (t1, t2) {
        _ if t1 == t2 => Some(t1.clone()),
        (VType::Null, VType::Object(_)) => Some(t2.clone()),
        (VType::Object(_), VType::Null) => Some(t1.clone()),
        (VType::Object(_), VType::Object(_)) => {
            Some(VType::Object(RefType::Object(BinaryName::OBJECT)))
        }
        _ => None,
    }
}

fn verify_instruction(
    frame: &mut VerifierFrame,
    this_class: &BinaryName,
    insn: &Instruction,
    new_site: Option<Label>,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let Frame {
        ref mut stack,
        ref mut locals,
    } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(constant) => {
            stack.push(match constant {
                ConstantValue::Integer(_) => Integer,
                ConstantValue::Float(_) => Float,
                ConstantValue::Long(_) => Long,
                ConstantValue::Double(_) => Double,
                ConstantValue::String(_) => Object(RefType::Object(BinaryName::STRING)),
                ConstantValue::Class(_) => Object(RefType::Object(BinaryName::CLASS)),
                ConstantValue::MethodType(_) => Object(RefType::Object(BinaryName::METHODTYPE)),
                ConstantValue::MethodHandle(_) => {
                    Object(RefType::Object(BinaryName::METHODHANDLE))
                }
                ConstantValue::Dynamic { descriptor, .. } => VType::from(descriptor),
            });
        }

        ILoad(offset) => {
            get_local_expecting_type(locals, *offset, Integer)?;
            stack.push(Integer);
        }
        LLoad(offset) => {
            get_local_expecting_type(locals, *offset, Long)?;
            stack.push(Long);
        }
        FLoad(offset) => {
            get_local_expecting_type(locals, *offset, Float)?;
            stack.push(Float);
        }
        DLoad(offset) => {
            get_local_expecting_type(locals, *offset, Double)?;
            stack.push(Double);
        }
        ALoad(offset) => {
            let typ = get_local(locals, *offset)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            stack.push(typ);
        }

        IALoad | BALoad | CALoad | SALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
            stack.push(Integer);
        }
        LALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
            stack.push(Long);
        }
        FALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
            stack.push(Float);
        }
        DALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
            stack.push(Double);
        }
        AALoad => {
            pop_expecting_type(stack, Integer)?;
            let array_type = pop_reference(stack)?;
            match array_type {
                Object(RefType::ObjectArray(arr)) => match arr.additional_dimensions {
                    0 => stack.push(Object(RefType::Object(arr.element_type))),
                    n => stack.push(Object(RefType::ObjectArray(ArrayType {
                        additional_dimensions: n - 1,
                        ..arr
                    }))),
                },
                Object(RefType::PrimitiveArray(arr)) if arr.additional_dimensions > 0 => {
                    stack.push(Object(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions: arr.additional_dimensions - 1,
                        ..arr
                    })))
                }
                Null => stack.push(Null),
                Object(RefType::Object(_)) => {
                    stack.push(Object(RefType::Object(BinaryName::OBJECT)))
                }
                _ => return Err(VerifierErrorKind::NotArrayType),
            };
        }

        IStore(offset) => {
            pop_expecting_type(stack, Integer)?;
            set_local(locals, *offset, Integer);
        }
        FStore(offset) => {
            pop_expecting_type(stack, Float)?;
            set_local(locals, *offset, Float);
        }
        LStore(offset) => {
            pop_expecting_type(stack, Long)?;
            set_local(locals, *offset, Long);
        }
        DStore(offset) => {
            pop_expecting_type(stack, Double)?;
            set_local(locals, *offset, Double);
        }
        AStore(offset) => {
            // `Top` is how return addresses of `jsr` are tracked
            let popped_type = pop(stack)?;
            if !popped_type.is_reference() && popped_type != Top {
                return Err(VerifierErrorKind::InvalidType);
            }
            set_local(locals, *offset, popped_type);
        }

        IAStore | BAStore | CAStore | SAStore => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
        }
        LAStore => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
        }
        FAStore => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
        }
        DAStore => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
        }
        AAStore => {
            pop_reference(stack)?;
            pop_expecting_type(stack, Integer)?;
            pop_reference(stack)?;
        }

        Pop => {
            let _ = pop_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let _ = pop_expecting_width(stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup => {
            let arg1 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        2 => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                2 => {
                    let arg2 = pop(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        2 => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Swap => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
            stack.push(Integer);
        }

        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        FAdd | FSub | FDiv | FMul | FRem => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Float)?;
            stack.push(Float);
        }

        DAdd | DSub | DDiv | DMul | DRem => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Double)?;
            stack.push(Double);
        }

        INeg | I2B | I2C | I2S => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Integer);
        }

        LNeg => {
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        FNeg => {
            pop_expecting_type(stack, Float)?;
            stack.push(Float);
        }

        DNeg => {
            pop_expecting_type(stack, Double)?;
            stack.push(Double);
        }

        LSh(_) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        IInc(offset, _) => {
            get_local_expecting_type(locals, *offset, Integer)?;
        }

        I2L | F2L | D2L => {
            let from = match insn {
                I2L => Integer,
                F2L => Float,
                _ => Double,
            };
            pop_expecting_type(stack, from)?;
            stack.push(Long);
        }
        I2F | L2F | D2F => {
            let from = match insn {
                I2F => Integer,
                L2F => Long,
                _ => Double,
            };
            pop_expecting_type(stack, from)?;
            stack.push(Float);
        }
        I2D | L2D | F2D => {
            let from = match insn {
                I2D => Integer,
                L2D => Long,
                _ => Float,
            };
            pop_expecting_type(stack, from)?;
            stack.push(Double);
        }
        L2I | F2I | D2I => {
            let from = match insn {
                L2I => Long,
                F2I => Float,
                _ => Double,
            };
            pop_expecting_type(stack, from)?;
            stack.push(Integer);
        }

        LCmp => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Integer);
        }
        FCmp(_) => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Float)?;
            stack.push(Integer);
        }
        DCmp(_) => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Double)?;
            stack.push(Integer);
        }

        GetStatic(field) => {
            stack.push(VType::from(&field.descriptor));
        }
        PutStatic(field) => {
            pop_expecting_type(stack, VType::from(&field.descriptor))?;
        }
        GetField(field) => {
            pop_reference(stack)?;
            stack.push(VType::from(&field.descriptor));
        }
        PutField(field) => {
            pop_expecting_type(stack, VType::from(&field.descriptor))?;
            pop_reference(stack)?;
        }

        Invoke(invoke_type, method) => {
            let is_init = method.name == UnqualifiedName::INIT;
            let desc = &method.descriptor;

            // Check that all the arguments match
            for expected_arg_type in desc.parameters.iter().rev() {
                pop_expecting_type(stack, VType::from(expected_arg_type))?;
            }

            if let (InvokeType::Special, true) = (invoke_type, is_init) {
                // Initialize
                match pop(stack)? {
                    UninitializedThis => {
                        let initialized = Object(RefType::Object(this_class.clone()));
                        replace_all(stack, &UninitializedThis, &initialized);
                        replace_all(locals, &UninitializedThis, &initialized);
                    }

                    Uninitialized(uninit) => {
                        let initialized = Object(RefType::Object(uninit.class.clone()));
                        let uninitialized = Uninitialized(uninit);
                        replace_all(stack, &uninitialized, &initialized);
                        replace_all(locals, &uninitialized, &initialized);
                    }

                    _ => return Err(VerifierErrorKind::InvalidType),
                }

                if desc.return_type.is_some() {
                    return Err(VerifierErrorKind::InvalidType);
                }
            } else {
                if *invoke_type != InvokeType::Static {
                    pop_reference(stack)?;
                }
                if let Some(return_type) = &desc.return_type {
                    stack.push(VType::from(return_type));
                }
            }
        }

        InvokeDynamic(call_site) => {
            for expected_arg_type in call_site.descriptor.parameters.iter().rev() {
                pop_expecting_type(stack, VType::from(expected_arg_type))?;
            }
            if let Some(return_type) = &call_site.descriptor.return_type {
                stack.push(VType::from(return_type));
            }
        }

        New(class) => {
            let label = new_site.ok_or(VerifierErrorKind::InvalidType)?;
            stack.push(Uninitialized(UninitializedRef {
                class: class.clone(),
                label,
            }));
        }
        NewArray(base_type) => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        MultiANewArray(ref_type, dimensions) => {
            for _ in 0..*dimensions {
                pop_expecting_type(stack, Integer)?;
            }
            stack.push(Object(ref_type.clone()));
        }
        ArrayLength => {
            pop_reference(stack)?;
            stack.push(Integer);
        }

        CheckCast(ref_type) => {
            pop_reference(stack)?;
            stack.push(Object(ref_type.clone()));
        }
        InstanceOf(_) => {
            pop_reference(stack)?;
            stack.push(Integer);
        }

        MonitorEnter | MonitorExit => {
            pop_reference(stack)?;
        }
    }

    Ok(())
}

fn verify_branch_instruction(
    frame: &mut VerifierFrame,
    insn: &BranchInstruction<Label>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;
    use VerificationType::*;

    let Frame {
        ref mut stack,
        locals: _,
    } = frame;

    match insn {
        If(_, _) => pop_expecting_type(stack, Integer)?,
        IfICmp(_, _) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
        }
        IfACmp(_, _) => {
            pop_reference(stack)?;
            pop_reference(stack)?;
        }
        IfNull(_, _) => {
            pop_reference(stack)?;
        }
        Goto(_) | GotoW(_) | Ret(_) => (),

        // The return address is not a type that can be named in a stack map frame
        Jsr(_) | JsrW(_) => stack.push(Top),

        TableSwitch { .. } | LookupSwitch { .. } => pop_expecting_type(stack, Integer)?,
        IReturn => pop_expecting_type(stack, Integer)?,
        LReturn => pop_expecting_type(stack, Long)?,
        FReturn => pop_expecting_type(stack, Float)?,
        DReturn => pop_expecting_type(stack, Double)?,
        AReturn => {
            pop_reference(stack)?;
        }
        Return => (),
        AThrow => {
            let atype = pop_reference(stack)?;
            stack.clear();
            stack.push(atype);
        }
    }

    Ok(())
}

fn replace_all(types: &mut [VType], original: &VType, updated: &VType) {
    for typ in types.iter_mut() {
        if typ == original {
            *typ = updated.clone();
        }
    }
}

fn get_local(locals: &[VType], offset: u16) -> Result<VType, VerifierErrorKind> {
    locals
        .get(offset as usize)
        .cloned()
        .ok_or(VerifierErrorKind::InvalidIndex(offset))
}

fn get_local_expecting_type(
    locals: &[VType],
    offset: u16,
    expected_type: VType,
) -> Result<(), VerifierErrorKind> {
    if get_local(locals, offset)? == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Overwrite a local, invalidating any wide value it was part of
fn set_local(locals: &mut Vec<VType>, offset: u16, new_type: VType) {
    let slot = offset as usize;
    let width = new_type.width();
    if locals.len() < slot + width {
        locals.resize(slot + width, VType::Top);
    }
    if slot > 0 && locals[slot - 1].width() == 2 {
        locals[slot - 1] = VType::Top;
    }
    if width == 2 {
        locals[slot + 1] = VType::Top;
    }
    locals[slot] = new_type;
}

fn pop(stack: &mut Vec<VType>) -> Result<VType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_reference(stack: &mut Vec<VType>) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    if typ.is_reference() {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

fn pop_expecting_width(
    stack: &mut Vec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

/// Pop a value of the expected type
///
/// Without a class hierarchy at hand, any reference is accepted where a reference is expected.
fn pop_expecting_type(
    stack: &mut Vec<VType>,
    expected_type: VType,
) -> Result<(), VerifierErrorKind> {
    let typ = pop(stack)?;
    let compatible = if expected_type.is_reference() {
        typ.is_reference()
    } else {
        typ == expected_type
    };
    if compatible {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::code::{FieldRef, LabelCounter, LabelGenerator, MethodRef};
    use crate::jvm::{Name, ParseDescriptor};
    use VerificationType::*;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn new_frame(locals: Vec<VType>, stack: Vec<VType>) -> VerifierFrame {
        Frame { locals, stack }
    }

    #[test]
    fn arithmetic() {
        let this_class = name("MyClass");
        let binops = [
            (Integer, vec![IAdd, ISub, IDiv, IMul, IRem, IAnd, IOr, IXor]),
            (Long, vec![LAdd, LSub, LDiv, LMul, LRem, LAnd, LOr, LXor]),
            (Float, vec![FAdd, FSub, FDiv, FMul, FRem]),
            (Double, vec![DAdd, DSub, DDiv, DMul, DRem]),
        ];

        for (good_typ, instructions) in binops {
            for instruction in instructions {
                for typ in [Integer, Long, Float, Double, Null, UninitializedThis] {
                    let mut frame_in = new_frame(vec![], vec![typ.clone(), typ.clone()]);
                    let result = frame_in.verify_instruction(&instruction, None, &this_class);
                    if typ == good_typ {
                        assert!(result.is_ok(), "Verification of {:?}", instruction);
                        assert_eq!(frame_in, new_frame(vec![], vec![typ]));
                    } else {
                        assert!(
                            matches!(result, Err(VerifierErrorKind::InvalidType)),
                            "Verification of {:?}",
                            instruction
                        );
                    }
                }

                let mut frame_in = new_frame(vec![], vec![good_typ.clone()]);
                assert!(matches!(
                    frame_in.verify_instruction(&instruction, None, &this_class),
                    Err(VerifierErrorKind::EmptyStack)
                ));
            }
        }
    }

    #[test]
    fn entry_frames() {
        let owner = name("a/B");
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;I)V").unwrap();

        let instance = VerifierFrame::entry(&owner, false, false, &descriptor);
        assert_eq!(
            instance.locals,
            vec![
                Object(RefType::Object(owner.clone())),
                Long,
                Top,
                Object(RefType::Object(BinaryName::STRING)),
                Integer,
            ]
        );
        assert_eq!(instance.compact_locals().len(), 4);

        let constructor = VerifierFrame::entry(&owner, false, true, &descriptor);
        assert_eq!(constructor.locals[0], UninitializedThis);

        let static_method = VerifierFrame::entry(&owner, true, false, &descriptor);
        assert_eq!(static_method.locals[0], Long);
    }

    #[test]
    fn storing_over_wide_locals() {
        let this_class = name("MyClass");
        let mut frame = new_frame(vec![Long, Top, Integer], vec![Integer]);
        frame
            .verify_instruction(&IStore(1), None, &this_class)
            .unwrap();
        assert_eq!(frame.locals, vec![Top, Integer, Integer]);

        let mut frame = new_frame(vec![], vec![Double]);
        frame
            .verify_instruction(&DStore(2), None, &this_class)
            .unwrap();
        assert_eq!(frame.locals, vec![Top, Top, Double, Top]);
    }

    #[test]
    fn constructor_initializes_uninitialized() {
        let this_class = name("MyClass");
        let mut labels = LabelCounter::new();
        let site = labels.fresh_label();
        let init = MethodRef {
            owner: RefType::Object(name("a/Thing")),
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            is_interface: false,
        };

        let mut frame = new_frame(vec![], vec![]);
        frame
            .verify_instruction(&New(name("a/Thing")), Some(site), &this_class)
            .unwrap();
        frame.verify_instruction(&Dup, None, &this_class).unwrap();
        assert_eq!(
            frame.stack[0],
            Uninitialized(UninitializedRef {
                class: name("a/Thing"),
                label: site
            })
        );
        frame
            .verify_instruction(&Invoke(InvokeType::Special, init), None, &this_class)
            .unwrap();
        assert_eq!(frame.stack, vec![Object(RefType::Object(name("a/Thing")))]);

        let missing_site = new_frame(vec![], vec![]).verify_instruction(
            &New(name("a/Thing")),
            None,
            &this_class,
        );
        assert!(missing_site.is_err());
    }

    #[test]
    fn fields_are_typed_by_descriptor() {
        let this_class = name("MyClass");
        let field = FieldRef {
            owner: name("a/B"),
            name: UnqualifiedName::from_string(String::from("flag")).unwrap(),
            descriptor: FieldType::boolean(),
        };
        let mut frame = new_frame(vec![], vec![]);
        frame
            .verify_instruction(&GetStatic(field.clone()), None, &this_class)
            .unwrap();
        assert_eq!(frame.stack, vec![Integer]);

        let mut frame = new_frame(vec![], vec![Float]);
        assert!(frame
            .verify_instruction(&PutStatic(field), None, &this_class)
            .is_err());
    }

    #[test]
    fn merging() {
        let string = Object(RefType::Object(BinaryName::STRING));
        let thing = Object(RefType::Object(name("a/Thing")));

        let f1 = new_frame(vec![Integer, string.clone(), Long, Top], vec![Null]);
        let f2 = new_frame(vec![Integer, thing, Integer], vec![string.clone()]);
        let merged = f1.merge(&f2).unwrap();
        assert_eq!(
            merged.locals,
            vec![Integer, Object(RefType::Object(BinaryName::OBJECT))]
        );
        assert_eq!(merged.stack, vec![string]);

        let f3 = new_frame(vec![], vec![Integer]);
        let f4 = new_frame(vec![], vec![Float]);
        assert!(matches!(
            f3.merge(&f4),
            Err(VerifierErrorKind::IncompatibleFrames)
        ));
        assert!(matches!(
            f3.merge(&new_frame(vec![], vec![])),
            Err(VerifierErrorKind::IncompatibleFrames)
        ));
    }

    #[test]
    fn stack_map_frame_compression() {
        type Ser = Frame<ClassConstantIndex, u16>;
        let cls = ClassConstantIndex(crate::jvm::class_file::ConstantIndex(3));

        let previous: Ser = Frame::from_compact(vec![Object(cls), Long], vec![]);

        let same: Ser = Frame::from_compact(vec![Object(cls), Long], vec![]);
        assert_eq!(
            same.stack_map_frame(4, &previous),
            StackMapFrame::SameLocalsNoStack { offset_delta: 4 }
        );

        let chopped: Ser = Frame::from_compact(vec![Object(cls)], vec![]);
        assert_eq!(
            chopped.stack_map_frame(4, &previous),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 4,
                chopped_k: 1
            }
        );

        let appended: Ser = Frame::from_compact(vec![Object(cls), Long, Integer], vec![]);
        assert_eq!(
            appended.stack_map_frame(4, &previous),
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 4,
                locals: vec![Integer]
            }
        );

        let one_stack: Ser = Frame::from_compact(vec![Object(cls), Long], vec![Float]);
        assert_eq!(
            one_stack.stack_map_frame(4, &previous),
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 4,
                stack: Float
            }
        );

        let other: Ser = Frame::from_compact(vec![Integer], vec![Float, Float]);
        assert_eq!(
            other.stack_map_frame(4, &previous),
            StackMapFrame::Full {
                offset_delta: 4,
                locals: vec![Integer],
                stack: vec![Float, Float]
            }
        );
    }

    #[test]
    fn declared_frames_expand() {
        type Ser = VerificationType<ClassConstantIndex, u16>;
        let initial = new_frame(vec![Integer, Long, Top], vec![]);
        let resolve = |t: &Ser| -> Result<VType, Error> {
            t.map(
                |_| Ok(RefType::Object(BinaryName::STRING)),
                |_| Err(Error::MalformedClass(String::from("no uninitialized"))),
            )
        };

        let chopped = initial
            .next_declared(
                &StackMapFrame::ChopLocalsNoStack {
                    offset_delta: 0,
                    chopped_k: 1,
                },
                resolve,
            )
            .unwrap();
        assert_eq!(chopped.locals, vec![Integer]);

        let appended = chopped
            .next_declared(
                &StackMapFrame::AppendLocalsNoStack {
                    offset_delta: 0,
                    locals: vec![Double, Float],
                },
                resolve,
            )
            .unwrap();
        assert_eq!(appended.locals, vec![Integer, Double, Top, Float]);

        let too_many = chopped.next_declared(
            &StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 2,
            },
            resolve,
        );
        assert!(too_many.is_err());
    }
}
