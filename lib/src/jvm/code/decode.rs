use super::encode::switch_padding;
use super::{
    BranchInstruction, CompareMode, ConstantValue, DynamicCallSite, EqComparison, FieldRef,
    Instruction, InstructionSequence, InvokeType, Label, LocalVariableRange, MethodRef, Node,
    OrdComparison, ShiftType, TryCatchBlock,
};
use crate::jvm::class_file::{
    AttributeLike, ClassConstantIndex, Code, Constant, ConstantIndex, ConstantPool, Deserialize,
    LineNumberTable, LocalVariable, LocalVariableTable, LocalVariableTypeTable, StackMapTable,
};
use crate::jvm::verifier::{UninitializedRef, VerificationType, VerifierFrame};
use crate::jvm::{
    BaseType, BinaryName, Error, Name, ParseDescriptor, RefType, UnqualifiedName,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;

/// Instruction as read from the code array, before jump targets become labels
enum Decoded {
    Insn(Instruction),
    Branch(BranchInstruction<usize>),
}

/// Decode a `Code` attribute into an instruction sequence
///
/// Labels are placed at every jump target, at both ends of exception ranges and local variable
/// ranges, and right before every `new` instruction. Declared stack map frames are expanded into
/// [`Node::Frame`] nodes, relative to `entry_frame` (when there is no entry frame, the method
/// comes from a class too old to carry a `StackMapTable` and any such table is ignored).
///
/// Entries of the line number and local variable tables that don't land on instruction
/// boundaries are dropped, as are code attributes other than the ones listed above.
pub fn decode_code(
    code: &Code,
    constants: &ConstantPool,
    entry_frame: Option<&VerifierFrame>,
) -> Result<InstructionSequence, Error> {
    let bytes = &code.code_array.0;
    let code_length = bytes.len();

    // First pass: instructions, with jumps still pointing at absolute offsets
    let mut decoded: BTreeMap<usize, Decoded> = BTreeMap::new();
    let mut reader = Cursor::new(&bytes[..]);
    while (reader.position() as usize) < code_length {
        let offset = reader.position() as usize;
        let insn = decode_instruction(&mut reader, offset, code_length, constants).map_err(
            |err| match err {
                Error::IoError(err) => Error::MalformedAttribute {
                    name: Code::NAME,
                    reason: format!("truncated instruction at {}: {}", offset, err),
                },
                other => other,
            },
        )?;
        decoded.insert(offset, insn);
    }
    let is_boundary = |offset: usize| offset == code_length || decoded.contains_key(&offset);

    let mut label_offsets: BTreeSet<usize> = BTreeSet::new();
    for (offset, insn) in &decoded {
        match insn {
            Decoded::Branch(branch) => {
                for target in branch.jump_targets() {
                    if !decoded.contains_key(&target) {
                        return Err(Error::InvalidBranchTarget {
                            offset: *offset,
                            target: target as i64,
                        });
                    }
                    label_offsets.insert(target);
                }
            }
            Decoded::Insn(Instruction::New(_)) => {
                label_offsets.insert(*offset);
            }
            Decoded::Insn(_) => (),
        }
    }

    for handler in &code.exception_table {
        let start = handler.start_pc.0 as usize;
        let end = handler.end_pc.0 as usize;
        let handler_pc = handler.handler_pc.0 as usize;
        if start >= end
            || !decoded.contains_key(&start)
            || !is_boundary(end)
            || !decoded.contains_key(&handler_pc)
        {
            return Err(Error::MalformedAttribute {
                name: Code::NAME,
                reason: format!("invalid exception handler {:?}", handler),
            });
        }
        label_offsets.extend([start, end, handler_pc]);
    }

    // Code attributes
    let mut line_numbers: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    let mut local_variables: Vec<(LocalVariable, bool)> = vec![];
    let mut stack_map_table: Option<StackMapTable> = None;
    for attribute in &code.attributes {
        let name = constants.utf8(attribute.name_index)?;
        if name == LineNumberTable::NAME {
            for entry in attribute.decode::<LineNumberTable>()?.0 {
                let offset = entry.start_pc.0 as usize;
                if decoded.contains_key(&offset) {
                    line_numbers
                        .entry(offset)
                        .or_default()
                        .push(entry.line_number);
                } else {
                    log::debug!("Dropping line number entry {:?}", entry);
                }
            }
        } else if name == LocalVariableTable::NAME || name == LocalVariableTypeTable::NAME {
            let is_signature = name == LocalVariableTypeTable::NAME;
            let entries = if is_signature {
                attribute.decode::<LocalVariableTypeTable>()?.0
            } else {
                attribute.decode::<LocalVariableTable>()?.0
            };
            for entry in entries {
                let start = entry.start_pc.0 as usize;
                let end = start + entry.length as usize;
                if is_boundary(start) && is_boundary(end) {
                    label_offsets.extend([start, end]);
                    local_variables.push((entry, is_signature));
                } else {
                    log::debug!("Dropping local variable entry {:?}", entry);
                }
            }
        } else if name == StackMapTable::NAME {
            stack_map_table = Some(attribute.decode()?);
        } else {
            log::debug!("Dropping unsupported code attribute {}", name);
        }
    }

    let mut sequence = InstructionSequence::new();
    let labels: HashMap<usize, Label> = label_offsets
        .iter()
        .map(|offset| (*offset, sequence.new_label()))
        .collect();
    let label_at = |offset: usize| -> Result<Label, Error> {
        labels
            .get(&offset)
            .copied()
            .ok_or_else(|| Error::MalformedAttribute {
                name: Code::NAME,
                reason: format!("no label at {}", offset),
            })
    };

    // Declared frames
    let mut frames: HashMap<usize, VerifierFrame> = HashMap::new();
    match (stack_map_table, entry_frame) {
        (None, _) => (),
        (Some(_), None) => log::debug!("Ignoring StackMapTable of a method without an entry frame"),
        (Some(table), Some(entry_frame)) => {
            let mut resolve = |vtype: &VerificationType<ClassConstantIndex, u16>| {
                vtype.map(
                    |class| constants.class_type(*class),
                    |new_offset| {
                        let new_offset = *new_offset as usize;
                        match (decoded.get(&new_offset), labels.get(&new_offset)) {
                            (Some(Decoded::Insn(Instruction::New(class))), Some(label)) => {
                                Ok(UninitializedRef {
                                    class: class.clone(),
                                    label: *label,
                                })
                            }
                            _ => Err(Error::MalformedAttribute {
                                name: StackMapTable::NAME,
                                reason: format!("no `new` instruction at {}", new_offset),
                            }),
                        }
                    },
                )
            };

            let mut previous_frame = entry_frame.clone();
            let mut previous_offset: Option<usize> = None;
            for entry in &table.0 {
                let offset = match previous_offset {
                    None => entry.offset_delta() as usize,
                    Some(previous) => previous + entry.offset_delta() as usize + 1,
                };
                if !decoded.contains_key(&offset) {
                    return Err(Error::MalformedAttribute {
                        name: StackMapTable::NAME,
                        reason: format!("frame at {} is not on an instruction", offset),
                    });
                }
                let frame = previous_frame.next_declared(entry, &mut resolve)?;
                frames.insert(offset, frame.clone());
                previous_frame = frame;
                previous_offset = Some(offset);
            }
        }
    }

    // Second pass: lay out the nodes
    for (offset, insn) in decoded {
        if let Some(label) = labels.get(&offset) {
            sequence.push(Node::Label(*label))?;
        }
        for line in line_numbers.remove(&offset).unwrap_or_default() {
            sequence.push(Node::LineNumber(line))?;
        }
        if let Some(frame) = frames.remove(&offset) {
            sequence.push(Node::Frame(frame))?;
        }
        match insn {
            Decoded::Insn(insn) => sequence.push(Node::Insn(insn))?,
            Decoded::Branch(branch) => {
                let branch = branch.map_labels(|target| {
                    labels
                        .get(target)
                        .copied()
                        .ok_or(Error::InvalidBranchTarget {
                            offset,
                            target: *target as i64,
                        })
                })?;
                sequence.push(Node::Branch(branch))?
            }
        };
    }
    if let Some(label) = labels.get(&code_length) {
        sequence.push(Node::Label(*label))?;
    }

    for handler in &code.exception_table {
        let catch_type = if handler.catch_type.0 == ConstantIndex::NONE {
            None
        } else {
            match constants.class_type(handler.catch_type)? {
                RefType::Object(class) => Some(class),
                other => {
                    return Err(Error::MalformedAttribute {
                        name: Code::NAME,
                        reason: format!("cannot catch array type {:?}", other),
                    })
                }
            }
        };
        sequence.try_catch_blocks.push(TryCatchBlock {
            start: label_at(handler.start_pc.0 as usize)?,
            end: label_at(handler.end_pc.0 as usize)?,
            handler: label_at(handler.handler_pc.0 as usize)?,
            catch_type,
        });
    }

    for (entry, is_signature) in local_variables {
        let start = entry.start_pc.0 as usize;
        sequence.local_variables.push(LocalVariableRange {
            name: constants.utf8(entry.name_index)?.to_owned(),
            descriptor: constants.utf8(entry.descriptor_index)?.to_owned(),
            start: label_at(start)?,
            end: label_at(start + entry.length as usize)?,
            index: entry.index,
            is_signature,
        });
    }

    Ok(sequence)
}

fn parse_descriptor<D: ParseDescriptor>(descriptor: &str) -> Result<D, Error> {
    D::parse(descriptor).map_err(|err| Error::BadDescriptor(format!("{}: {}", descriptor, err)))
}

fn binary_name(name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName)
}

fn unqualified_name(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)
}

fn object_class(constants: &ConstantPool, index: ConstantIndex) -> Result<BinaryName, Error> {
    match constants.class_type(ClassConstantIndex(index))? {
        RefType::Object(class) => Ok(class),
        _ => Err(Error::UnexpectedConstant {
            index: index.0,
            expected: "non-array Class",
        }),
    }
}

fn field_ref(constants: &ConstantPool, index: ConstantIndex) -> Result<FieldRef, Error> {
    let member = constants.member(index)?;
    Ok(FieldRef {
        owner: binary_name(member.owner)?,
        name: unqualified_name(member.name)?,
        descriptor: parse_descriptor(member.descriptor)?,
    })
}

fn method_ref(constants: &ConstantPool, index: ConstantIndex) -> Result<MethodRef, Error> {
    let member = constants.member(index)?;
    Ok(MethodRef {
        owner: RefType::from_class_name(member.owner)
            .map_err(|err| Error::BadDescriptor(err.to_string()))?,
        name: unqualified_name(member.name)?,
        descriptor: parse_descriptor(member.descriptor)?,
        is_interface: member.is_interface,
    })
}

fn dynamic_call_site(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<DynamicCallSite, Error> {
    match constants.constant(index)? {
        Constant::InvokeDynamic {
            bootstrap_method,
            method_descriptor,
        } => {
            let (name, descriptor) = constants.name_and_type(*method_descriptor)?;
            Ok(DynamicCallSite {
                bootstrap_method: *bootstrap_method,
                name: unqualified_name(name)?,
                descriptor: parse_descriptor(descriptor)?,
            })
        }
        _ => Err(Error::UnexpectedConstant {
            index: index.0,
            expected: "InvokeDynamic",
        }),
    }
}

/// Symbolic form of the operand of an `ldc`, `ldc_w`, or `ldc2_w`
fn loadable_constant(constants: &ConstantPool, index: ConstantIndex) -> Result<ConstantValue, Error> {
    Ok(match constants.constant(index)? {
        Constant::Integer(integer) => ConstantValue::Integer(*integer),
        Constant::Float(float) => ConstantValue::Float(*float),
        Constant::Long(long) => ConstantValue::Long(*long),
        Constant::Double(double) => ConstantValue::Double(*double),
        Constant::String(string) => ConstantValue::String(constants.utf8(*string)?.to_owned()),
        Constant::Class(_) => ConstantValue::Class(constants.class_type(ClassConstantIndex(index))?),
        Constant::MethodType { descriptor } => {
            ConstantValue::MethodType(parse_descriptor(constants.utf8(*descriptor)?)?)
        }
        Constant::MethodHandle { .. } => ConstantValue::MethodHandle(index),
        Constant::Dynamic { name_and_type, .. } => {
            let (_, descriptor) = constants.name_and_type(*name_and_type)?;
            ConstantValue::Dynamic {
                index,
                descriptor: parse_descriptor(descriptor)?,
            }
        }
        _ => {
            return Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "loadable constant",
            })
        }
    })
}

fn ord_comparison(n: u8) -> OrdComparison {
    match n {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

/// Decode the instruction starting at `offset`
///
/// Jump targets are checked to be inside the code array, but not yet that they land on the start
/// of an instruction.
fn decode_instruction(
    reader: &mut Cursor<&[u8]>,
    offset: usize,
    code_length: usize,
    constants: &ConstantPool,
) -> Result<Decoded, Error> {
    use BranchInstruction as B;
    use Instruction as I;

    let jump = |relative: i64| -> Result<usize, Error> {
        let target = offset as i64 + relative;
        if target < 0 || target >= code_length as i64 {
            Err(Error::InvalidBranchTarget { offset, target })
        } else {
            Ok(target as usize)
        }
    };
    let malformed = |reason: String| Error::MalformedAttribute {
        name: Code::NAME,
        reason,
    };

    let opcode = u8::deserialize(reader)?;
    let insn = match opcode {
        0x00 => I::Nop,
        0x01 => I::AConstNull,
        0x02 => I::IConstM1,
        0x03 => I::IConst0,
        0x04 => I::IConst1,
        0x05 => I::IConst2,
        0x06 => I::IConst3,
        0x07 => I::IConst4,
        0x08 => I::IConst5,
        0x09 => I::LConst0,
        0x0a => I::LConst1,
        0x0b => I::FConst0,
        0x0c => I::FConst1,
        0x0d => I::FConst2,
        0x0e => I::DConst0,
        0x0f => I::DConst1,
        0x10 => I::BiPush(i8::deserialize(reader)?),
        0x11 => I::SiPush(i16::deserialize(reader)?),
        0x12 => {
            let idx = ConstantIndex(u8::deserialize(reader)? as u16);
            I::Ldc(loadable_constant(constants, idx)?)
        }
        0x13 | 0x14 => I::Ldc(loadable_constant(constants, ConstantIndex::deserialize(reader)?)?),
        0x15 => I::ILoad(u8::deserialize(reader)? as u16),
        0x16 => I::LLoad(u8::deserialize(reader)? as u16),
        0x17 => I::FLoad(u8::deserialize(reader)? as u16),
        0x18 => I::DLoad(u8::deserialize(reader)? as u16),
        0x19 => I::ALoad(u8::deserialize(reader)? as u16),
        0x1a..=0x2d => {
            let idx = ((opcode - 0x1a) % 4) as u16;
            match (opcode - 0x1a) / 4 {
                0 => I::ILoad(idx),
                1 => I::LLoad(idx),
                2 => I::FLoad(idx),
                3 => I::DLoad(idx),
                _ => I::ALoad(idx),
            }
        }
        0x2e => I::IALoad,
        0x2f => I::LALoad,
        0x30 => I::FALoad,
        0x31 => I::DALoad,
        0x32 => I::AALoad,
        0x33 => I::BALoad,
        0x34 => I::CALoad,
        0x35 => I::SALoad,
        0x36 => I::IStore(u8::deserialize(reader)? as u16),
        0x37 => I::LStore(u8::deserialize(reader)? as u16),
        0x38 => I::FStore(u8::deserialize(reader)? as u16),
        0x39 => I::DStore(u8::deserialize(reader)? as u16),
        0x3a => I::AStore(u8::deserialize(reader)? as u16),
        0x3b..=0x4e => {
            let idx = ((opcode - 0x3b) % 4) as u16;
            match (opcode - 0x3b) / 4 {
                0 => I::IStore(idx),
                1 => I::LStore(idx),
                2 => I::FStore(idx),
                3 => I::DStore(idx),
                _ => I::AStore(idx),
            }
        }
        0x4f => I::IAStore,
        0x50 => I::LAStore,
        0x51 => I::FAStore,
        0x52 => I::DAStore,
        0x53 => I::AAStore,
        0x54 => I::BAStore,
        0x55 => I::CAStore,
        0x56 => I::SAStore,
        0x57 => I::Pop,
        0x58 => I::Pop2,
        0x59 => I::Dup,
        0x5a => I::DupX1,
        0x5b => I::DupX2,
        0x5c => I::Dup2,
        0x5d => I::Dup2X1,
        0x5e => I::Dup2X2,
        0x5f => I::Swap,
        0x60 => I::IAdd,
        0x61 => I::LAdd,
        0x62 => I::FAdd,
        0x63 => I::DAdd,
        0x64 => I::ISub,
        0x65 => I::LSub,
        0x66 => I::FSub,
        0x67 => I::DSub,
        0x68 => I::IMul,
        0x69 => I::LMul,
        0x6a => I::FMul,
        0x6b => I::DMul,
        0x6c => I::IDiv,
        0x6d => I::LDiv,
        0x6e => I::FDiv,
        0x6f => I::DDiv,
        0x70 => I::IRem,
        0x71 => I::LRem,
        0x72 => I::FRem,
        0x73 => I::DRem,
        0x74 => I::INeg,
        0x75 => I::LNeg,
        0x76 => I::FNeg,
        0x77 => I::DNeg,
        0x78 => I::ISh(ShiftType::Left),
        0x79 => I::LSh(ShiftType::Left),
        0x7a => I::ISh(ShiftType::ArithmeticRight),
        0x7b => I::LSh(ShiftType::ArithmeticRight),
        0x7c => I::ISh(ShiftType::LogicalRight),
        0x7d => I::LSh(ShiftType::LogicalRight),
        0x7e => I::IAnd,
        0x7f => I::LAnd,
        0x80 => I::IOr,
        0x81 => I::LOr,
        0x82 => I::IXor,
        0x83 => I::LXor,
        0x84 => {
            let idx = u8::deserialize(reader)? as u16;
            let diff = i8::deserialize(reader)? as i16;
            I::IInc(idx, diff)
        }
        0x85 => I::I2L,
        0x86 => I::I2F,
        0x87 => I::I2D,
        0x88 => I::L2I,
        0x89 => I::L2F,
        0x8a => I::L2D,
        0x8b => I::F2I,
        0x8c => I::F2L,
        0x8d => I::F2D,
        0x8e => I::D2I,
        0x8f => I::D2L,
        0x90 => I::D2F,
        0x91 => I::I2B,
        0x92 => I::I2C,
        0x93 => I::I2S,
        0x94 => I::LCmp,
        0x95 => I::FCmp(CompareMode::L),
        0x96 => I::FCmp(CompareMode::G),
        0x97 => I::DCmp(CompareMode::L),
        0x98 => I::DCmp(CompareMode::G),
        0x99..=0x9e => {
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::If(ord_comparison(opcode - 0x99), target)));
        }
        0x9f..=0xa4 => {
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::IfICmp(
                ord_comparison(opcode - 0x9f),
                target,
            )));
        }
        0xa5 | 0xa6 => {
            let comparison = if opcode == 0xa5 {
                EqComparison::EQ
            } else {
                EqComparison::NE
            };
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::IfACmp(comparison, target)));
        }
        0xa7 => {
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::Goto(target)));
        }
        0xa8 => {
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::Jsr(target)));
        }
        0xa9 => return Ok(Decoded::Branch(B::Ret(u8::deserialize(reader)? as u16))),
        0xaa => {
            for _ in 0..switch_padding(offset) {
                u8::deserialize(reader)?;
            }
            let default = jump(i32::deserialize(reader)? as i64)?;
            let low = i32::deserialize(reader)?;
            let high = i32::deserialize(reader)?;
            if high < low {
                return Err(malformed(format!(
                    "tableswitch at {} has bounds {} > {}",
                    offset, low, high
                )));
            }
            let mut targets = vec![];
            for _ in low as i64..=high as i64 {
                targets.push(jump(i32::deserialize(reader)? as i64)?);
            }
            return Ok(Decoded::Branch(B::TableSwitch {
                default,
                low,
                targets,
            }));
        }
        0xab => {
            for _ in 0..switch_padding(offset) {
                u8::deserialize(reader)?;
            }
            let default = jump(i32::deserialize(reader)? as i64)?;
            let npairs = i32::deserialize(reader)?;
            if npairs < 0 {
                return Err(malformed(format!(
                    "lookupswitch at {} has {} pairs",
                    offset, npairs
                )));
            }
            let mut targets = vec![];
            for _ in 0..npairs {
                let key = i32::deserialize(reader)?;
                targets.push((key, jump(i32::deserialize(reader)? as i64)?));
            }
            return Ok(Decoded::Branch(B::LookupSwitch { default, targets }));
        }
        0xac => return Ok(Decoded::Branch(B::IReturn)),
        0xad => return Ok(Decoded::Branch(B::LReturn)),
        0xae => return Ok(Decoded::Branch(B::FReturn)),
        0xaf => return Ok(Decoded::Branch(B::DReturn)),
        0xb0 => return Ok(Decoded::Branch(B::AReturn)),
        0xb1 => return Ok(Decoded::Branch(B::Return)),
        0xb2 => I::GetStatic(field_ref(constants, ConstantIndex::deserialize(reader)?)?),
        0xb3 => I::PutStatic(field_ref(constants, ConstantIndex::deserialize(reader)?)?),
        0xb4 => I::GetField(field_ref(constants, ConstantIndex::deserialize(reader)?)?),
        0xb5 => I::PutField(field_ref(constants, ConstantIndex::deserialize(reader)?)?),
        0xb6 => I::Invoke(
            InvokeType::Virtual,
            method_ref(constants, ConstantIndex::deserialize(reader)?)?,
        ),
        0xb7 => I::Invoke(
            InvokeType::Special,
            method_ref(constants, ConstantIndex::deserialize(reader)?)?,
        ),
        0xb8 => I::Invoke(
            InvokeType::Static,
            method_ref(constants, ConstantIndex::deserialize(reader)?)?,
        ),
        0xb9 => {
            let method = method_ref(constants, ConstantIndex::deserialize(reader)?)?;
            let _count = u8::deserialize(reader)?;
            let _zero = u8::deserialize(reader)?;
            I::Invoke(InvokeType::Interface, method)
        }
        0xba => {
            let call_site = dynamic_call_site(constants, ConstantIndex::deserialize(reader)?)?;
            let _zero = u16::deserialize(reader)?;
            I::InvokeDynamic(call_site)
        }
        0xbb => I::New(object_class(constants, ConstantIndex::deserialize(reader)?)?),
        0xbc => I::NewArray(match u8::deserialize(reader)? {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            other => {
                return Err(malformed(format!(
                    "newarray at {} has unknown type {}",
                    offset, other
                )))
            }
        }),
        0xbd => I::ANewArray(constants.class_type(ClassConstantIndex::deserialize(reader)?)?),
        0xbe => I::ArrayLength,
        0xbf => return Ok(Decoded::Branch(B::AThrow)),
        0xc0 => I::CheckCast(constants.class_type(ClassConstantIndex::deserialize(reader)?)?),
        0xc1 => I::InstanceOf(constants.class_type(ClassConstantIndex::deserialize(reader)?)?),
        0xc2 => I::MonitorEnter,
        0xc3 => I::MonitorExit,
        0xc4 => match u8::deserialize(reader)? {
            0x15 => I::ILoad(u16::deserialize(reader)?),
            0x16 => I::LLoad(u16::deserialize(reader)?),
            0x17 => I::FLoad(u16::deserialize(reader)?),
            0x18 => I::DLoad(u16::deserialize(reader)?),
            0x19 => I::ALoad(u16::deserialize(reader)?),
            0x36 => I::IStore(u16::deserialize(reader)?),
            0x37 => I::LStore(u16::deserialize(reader)?),
            0x38 => I::FStore(u16::deserialize(reader)?),
            0x39 => I::DStore(u16::deserialize(reader)?),
            0x3a => I::AStore(u16::deserialize(reader)?),
            0x84 => {
                let idx = u16::deserialize(reader)?;
                let diff = i16::deserialize(reader)?;
                I::IInc(idx, diff)
            }
            0xa9 => return Ok(Decoded::Branch(B::Ret(u16::deserialize(reader)?))),
            other => {
                return Err(Error::InvalidOpcode {
                    offset: offset + 1,
                    opcode: other,
                })
            }
        },
        0xc5 => {
            let array_type = constants.class_type(ClassConstantIndex::deserialize(reader)?)?;
            I::MultiANewArray(array_type, u8::deserialize(reader)?)
        }
        0xc6 | 0xc7 => {
            let comparison = if opcode == 0xc6 {
                EqComparison::EQ
            } else {
                EqComparison::NE
            };
            let target = jump(i16::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::IfNull(comparison, target)));
        }
        0xc8 => {
            let target = jump(i32::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::GotoW(target)));
        }
        0xc9 => {
            let target = jump(i32::deserialize(reader)? as i64)?;
            return Ok(Decoded::Branch(B::JsrW(target)));
        }
        other => {
            return Err(Error::InvalidOpcode {
                offset,
                opcode: other,
            })
        }
    };
    Ok(Decoded::Insn(insn))
}

#[cfg(test)]
mod test {
    use super::super::encode_code;
    use super::*;
    use crate::jvm::class_file::{BytecodeArray, BytecodeIndex, ExceptionHandler};

    fn code(bytes: Vec<u8>) -> Code {
        Code {
            max_stack: 2,
            max_locals: 2,
            code_array: BytecodeArray(bytes),
            exception_table: vec![],
            attributes: vec![],
        }
    }

    fn round_trip(code: &Code) -> Code {
        let mut constants = ConstantPool::new();
        let sequence = decode_code(code, &constants, None).unwrap();
        encode_code(&sequence, &mut constants, code.max_stack, code.max_locals, None).unwrap()
    }

    #[test]
    fn conditional_jumps() {
        let bytes = vec![0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let sequence = decode_code(&code(bytes.clone()), &ConstantPool::new(), None).unwrap();

        let nodes: Vec<&Node> = sequence.iter().map(|(_, node)| node).collect();
        assert_eq!(nodes.len(), 7);
        assert_eq!(nodes[0], &Node::Insn(Instruction::ILoad(0)));
        assert_eq!(nodes[2], &Node::Insn(Instruction::IConst1));
        assert_eq!(nodes[5], &Node::Insn(Instruction::IConst0));
        let target = match nodes[1] {
            Node::Branch(BranchInstruction::If(OrdComparison::EQ, target)) => *target,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(nodes[4], &Node::Label(target));

        assert_eq!(round_trip(&code(bytes.clone())).code_array.0, bytes);
    }

    #[test]
    fn switches_are_padded() {
        let mut bytes = vec![0x1a, 0xaa, 0x00, 0x00];
        for word in [23i32, 0, 1, 23, 25] {
            bytes.extend(word.to_be_bytes());
        }
        bytes.extend([0x03, 0xac, 0x04, 0xac]);

        let sequence = decode_code(&code(bytes.clone()), &ConstantPool::new(), None).unwrap();
        let switch = sequence
            .iter()
            .find_map(|(_, node)| node.as_branch().cloned())
            .unwrap();
        match switch {
            BranchInstruction::TableSwitch { low, targets, .. } => {
                assert_eq!(low, 0);
                assert_eq!(targets.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(round_trip(&code(bytes.clone())).code_array.0, bytes);
    }

    #[test]
    fn wide_instructions() {
        let bytes = vec![0xc4, 0x84, 0x01, 0x00, 0x00, 0x05, 0xb1];
        let sequence = decode_code(&code(bytes.clone()), &ConstantPool::new(), None).unwrap();
        assert_eq!(sequence.get(0), Some(&Node::Insn(Instruction::IInc(256, 5))));
        assert_eq!(round_trip(&code(bytes.clone())).code_array.0, bytes);
    }

    #[test]
    fn jumps_into_instructions_are_rejected() {
        let bytes = vec![0xa7, 0x00, 0x02, 0x00, 0xb1];
        match decode_code(&code(bytes), &ConstantPool::new(), None) {
            Err(Error::InvalidBranchTarget { offset, target }) => {
                assert_eq!(offset, 0);
                assert_eq!(target, 2);
            }
            other => panic!("unexpected {:?}", other.map(|seq| seq.len())),
        }
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        let bytes = vec![0x00, 0xfe];
        assert!(matches!(
            decode_code(&code(bytes), &ConstantPool::new(), None),
            Err(Error::InvalidOpcode {
                offset: 1,
                opcode: 0xfe
            })
        ));
    }

    #[test]
    fn constants_are_symbolic() {
        let mut constants = ConstantPool::new();
        let ConstantIndex(idx) = constants.get_integer(100_000).unwrap();
        let bytes = vec![0x12, idx as u8, 0xac];

        let sequence = decode_code(&code(bytes.clone()), &constants, None).unwrap();
        assert_eq!(
            sequence.get(0),
            Some(&Node::Insn(Instruction::Ldc(ConstantValue::Integer(100_000))))
        );

        let encoded = encode_code(&sequence, &mut constants, 1, 1, None).unwrap();
        assert_eq!(encoded.code_array.0, bytes);
    }

    #[test]
    fn exception_ranges() {
        let mut with_handler = code(vec![0x00, 0xb1, 0x4c, 0xb1]);
        with_handler.exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(0),
            end_pc: BytecodeIndex(1),
            handler_pc: BytecodeIndex(2),
            catch_type: ClassConstantIndex(ConstantIndex::NONE),
        });

        let sequence = decode_code(&with_handler, &ConstantPool::new(), None).unwrap();
        assert_eq!(sequence.try_catch_blocks.len(), 1);
        assert_eq!(sequence.try_catch_blocks[0].catch_type, None);

        let encoded = round_trip(&with_handler);
        assert_eq!(encoded.exception_table, with_handler.exception_table);
        assert_eq!(encoded.code_array.0, with_handler.code_array.0);
    }

    #[test]
    fn long_jumps_overflow() {
        let mut sequence = InstructionSequence::new();
        let end = sequence.new_label();
        sequence
            .push(Node::Branch(BranchInstruction::Goto(end)))
            .unwrap();
        for _ in 0..40_000 {
            sequence.push(Node::Insn(Instruction::Nop)).unwrap();
        }
        sequence.push(Node::Label(end)).unwrap();
        sequence
            .push(Node::Branch(BranchInstruction::Return))
            .unwrap();

        let result = encode_code(&sequence, &mut ConstantPool::new(), 0, 0, None);
        assert!(matches!(
            result,
            Err(Error::JumpOffsetOverflow { label, .. }) if label == end
        ));
    }
}
