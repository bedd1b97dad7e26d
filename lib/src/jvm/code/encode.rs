use super::{
    BranchInstruction, CompareMode, ConstantValue, EqComparison, Instruction, InstructionSequence,
    InvokeType, Label, Node, OrdComparison, ShiftType,
};
use crate::jvm::class_file::{
    BytecodeArray, BytecodeIndex, ClassConstantIndex, Code, ConstantIndex, ConstantPool,
    ExceptionHandler, LineNumber, LineNumberTable, LocalVariable, LocalVariableTable,
    LocalVariableTypeTable, Serialize, StackMapTable,
};
use crate::jvm::verifier::VerifierFrame;
use crate::jvm::{BaseType, Error, Name, RefType, RenderDescriptor};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Encode an instruction sequence into a `Code` attribute
///
/// Constants referenced by the instructions are looked up in (or appended to) the constant pool.
/// Jumps are always encoded in their regular form: a jump whose offset doesn't fit in 16 bits is
/// an error rather than something that gets rewritten.
///
/// When `entry_frame` is provided, the frame nodes of the sequence are compressed into a
/// `StackMapTable` (relative to that implicit initial frame).
pub fn encode_code(
    sequence: &InstructionSequence,
    constants: &mut ConstantPool,
    max_stack: u16,
    max_locals: u16,
    entry_frame: Option<&VerifierFrame>,
) -> Result<Code, Error> {
    enum Chunk<'a> {
        Bytes(Vec<u8>),
        Branch(usize, &'a BranchInstruction<Label>),
    }

    // Lay out the instructions, recording where labels, lines, and frames land
    let mut chunks: Vec<Chunk> = vec![];
    let mut label_offsets: HashMap<Label, usize> = HashMap::new();
    let mut lines: Vec<(usize, u16)> = vec![];
    let mut frames: Vec<(usize, &VerifierFrame)> = vec![];
    let mut offset = 0;
    for (_, node) in sequence.iter() {
        match node {
            Node::Label(label) => {
                label_offsets.insert(*label, offset);
            }
            Node::LineNumber(line) => lines.push((offset, *line)),
            Node::Frame(frame) => frames.push((offset, frame)),
            Node::Insn(insn) => {
                let mut bytes = vec![];
                write_instruction(insn, constants, &mut bytes)?;
                offset += bytes.len();
                chunks.push(Chunk::Bytes(bytes));
            }
            Node::Branch(branch) => {
                chunks.push(Chunk::Branch(offset, branch));
                offset += branch_width(branch, offset);
            }
        }
    }
    let code_length = offset;
    if code_length > u16::MAX as usize {
        return Err(Error::MethodCodeOverflow(code_length));
    }

    // Now that all labels have an offset, jumps can be written
    let mut code_array = Vec::with_capacity(code_length);
    for chunk in chunks {
        match chunk {
            Chunk::Bytes(bytes) => code_array.extend(bytes),
            Chunk::Branch(offset, branch) => {
                write_branch(branch, offset, &label_offsets, &mut code_array)?
            }
        }
    }

    let mut exception_table = vec![];
    for block in &sequence.try_catch_blocks {
        let start_pc = label_offset(&label_offsets, block.start)?;
        let end_pc = label_offset(&label_offsets, block.end)?;
        let handler_pc = label_offset(&label_offsets, block.handler)?;
        if start_pc >= end_pc {
            log::debug!("Dropping empty exception range {:?}", block);
            continue;
        }
        let catch_type = match &block.catch_type {
            None => ClassConstantIndex(ConstantIndex::NONE),
            Some(class) => constants.get_class(&RefType::Object(class.clone()))?,
        };
        exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(start_pc as u16),
            end_pc: BytecodeIndex(end_pc as u16),
            handler_pc: BytecodeIndex(handler_pc as u16),
            catch_type,
        });
    }

    let mut attributes = vec![];

    let line_numbers: Vec<LineNumber> = lines
        .into_iter()
        .filter(|(offset, _)| *offset < code_length)
        .map(|(offset, line_number)| LineNumber {
            start_pc: BytecodeIndex(offset as u16),
            line_number,
        })
        .collect();
    if !line_numbers.is_empty() {
        attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
    }

    let mut local_variables = vec![];
    let mut local_variable_types = vec![];
    for local in &sequence.local_variables {
        let start = label_offset(&label_offsets, local.start)?;
        let end = label_offset(&label_offsets, local.end)?;
        if end < start {
            log::debug!("Dropping inverted local variable range {:?}", local);
            continue;
        }
        let entry = LocalVariable {
            start_pc: BytecodeIndex(start as u16),
            length: (end - start) as u16,
            name_index: constants.get_utf8(local.name.as_str())?,
            descriptor_index: constants.get_utf8(local.descriptor.as_str())?,
            index: local.index,
        };
        if local.is_signature {
            local_variable_types.push(entry);
        } else {
            local_variables.push(entry);
        }
    }
    if !local_variables.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTable(local_variables))?);
    }
    if !local_variable_types.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTypeTable(local_variable_types))?);
    }

    if let Some(entry_frame) = entry_frame {
        let mut previous_frame = entry_frame.into_serializable(constants, &label_offsets)?;
        let mut previous_offset: Option<usize> = None;
        let mut stack_map_frames = vec![];
        for (offset, frame) in frames {
            if offset >= code_length {
                log::debug!("Dropping frame past the end of the code at {}", offset);
                continue;
            }
            let frame = frame.into_serializable(constants, &label_offsets)?;
            if previous_offset == Some(offset) {
                if frame == previous_frame {
                    continue;
                }
                return Err(Error::ConflictingFrames(offset));
            }
            let offset_delta = match previous_offset {
                None => offset,
                Some(previous_offset) => offset - previous_offset - 1,
            };
            stack_map_frames.push(frame.stack_map_frame(offset_delta as u16, &previous_frame));
            previous_frame = frame;
            previous_offset = Some(offset);
        }
        if !stack_map_frames.is_empty() {
            attributes.push(constants.get_attribute(StackMapTable(stack_map_frames))?);
        }
    }

    Ok(Code {
        max_stack,
        max_locals,
        code_array: BytecodeArray(code_array),
        exception_table,
        attributes,
    })
}

fn label_offset(label_offsets: &HashMap<Label, usize>, label: Label) -> Result<usize, Error> {
    label_offsets
        .get(&label)
        .copied()
        .ok_or(Error::DanglingLabel(label))
}

/// Constant pool entry for a loadable constant
fn loadable_constant(
    value: &ConstantValue,
    constants: &mut ConstantPool,
) -> Result<ConstantIndex, Error> {
    Ok(match value {
        ConstantValue::Integer(integer) => constants.get_integer(*integer)?,
        ConstantValue::Float(float) => constants.get_float(*float)?,
        ConstantValue::Long(long) => constants.get_long(*long)?,
        ConstantValue::Double(double) => constants.get_double(*double)?,
        ConstantValue::String(string) => constants.get_string(string.as_str())?,
        ConstantValue::Class(class) => constants.get_class(class)?.0,
        ConstantValue::MethodType(descriptor) => constants.get_method_type(descriptor.render())?,
        ConstantValue::MethodHandle(index) => *index,
        ConstantValue::Dynamic { index, .. } => *index,
    })
}

/// Write out a non-branching instruction
///
/// Loads, stores, and `iinc` use the shortest encoding available for their operands.
fn write_instruction<W: WriteBytesExt>(
    insn: &Instruction,
    constants: &mut ConstantPool,
    writer: &mut W,
) -> Result<(), Error> {
    /* The load/store instructions follow the same pattern:
     *
     *   - short form (0-3) have special bytes
     *   - normal form (0-255) use `iload` plus a byte operand
     *   - wide form (255-65535) use `wide iload` plus two byte operands
     */
    fn write_load_or_store<W: WriteBytesExt>(
        idx: u16,
        short_form_start: u8,
        normal_form: u8,
        writer: &mut W,
    ) -> std::io::Result<()> {
        match u8::try_from(idx) {
            Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
            Ok(n) => {
                normal_form.serialize(writer)?;
                n.serialize(writer)
            }
            Err(_) => {
                0xC4u8.serialize(writer)?;
                normal_form.serialize(writer)?;
                idx.serialize(writer)
            }
        }
    }

    match insn {
        Instruction::Nop => 0x00u8.serialize(writer)?,
        Instruction::AConstNull => 0x01u8.serialize(writer)?,
        Instruction::IConstM1 => 0x02u8.serialize(writer)?,
        Instruction::IConst0 => 0x03u8.serialize(writer)?,
        Instruction::IConst1 => 0x04u8.serialize(writer)?,
        Instruction::IConst2 => 0x05u8.serialize(writer)?,
        Instruction::IConst3 => 0x06u8.serialize(writer)?,
        Instruction::IConst4 => 0x07u8.serialize(writer)?,
        Instruction::IConst5 => 0x08u8.serialize(writer)?,
        Instruction::LConst0 => 0x09u8.serialize(writer)?,
        Instruction::LConst1 => 0x0au8.serialize(writer)?,
        Instruction::FConst0 => 0x0bu8.serialize(writer)?,
        Instruction::FConst1 => 0x0cu8.serialize(writer)?,
        Instruction::FConst2 => 0x0du8.serialize(writer)?,
        Instruction::DConst0 => 0x0eu8.serialize(writer)?,
        Instruction::DConst1 => 0x0fu8.serialize(writer)?,
        Instruction::BiPush(b) => {
            0x10u8.serialize(writer)?;
            b.serialize(writer)?;
        }
        Instruction::SiPush(s) => {
            0x11u8.serialize(writer)?;
            s.serialize(writer)?;
        }
        Instruction::Ldc(constant) => {
            let ConstantIndex(idx) = loadable_constant(constant, constants)?;
            if constant.width() == 2 {
                0x14u8.serialize(writer)?;
                idx.serialize(writer)?;
            } else {
                match u8::try_from(idx) {
                    Ok(b) => {
                        0x12u8.serialize(writer)?;
                        b.serialize(writer)?;
                    }
                    Err(_) => {
                        0x13u8.serialize(writer)?;
                        idx.serialize(writer)?;
                    }
                }
            }
        }
        Instruction::ILoad(idx) => write_load_or_store(*idx, 0x1A, 0x15, writer)?,
        Instruction::LLoad(idx) => write_load_or_store(*idx, 0x1E, 0x16, writer)?,
        Instruction::FLoad(idx) => write_load_or_store(*idx, 0x22, 0x17, writer)?,
        Instruction::DLoad(idx) => write_load_or_store(*idx, 0x26, 0x18, writer)?,
        Instruction::ALoad(idx) => write_load_or_store(*idx, 0x2A, 0x19, writer)?,
        Instruction::IALoad => 0x2eu8.serialize(writer)?,
        Instruction::LALoad => 0x2fu8.serialize(writer)?,
        Instruction::FALoad => 0x30u8.serialize(writer)?,
        Instruction::DALoad => 0x31u8.serialize(writer)?,
        Instruction::AALoad => 0x32u8.serialize(writer)?,
        Instruction::BALoad => 0x33u8.serialize(writer)?,
        Instruction::CALoad => 0x34u8.serialize(writer)?,
        Instruction::SALoad => 0x35u8.serialize(writer)?,
        Instruction::IStore(idx) => write_load_or_store(*idx, 0x3B, 0x36, writer)?,
        Instruction::LStore(idx) => write_load_or_store(*idx, 0x3F, 0x37, writer)?,
        Instruction::FStore(idx) => write_load_or_store(*idx, 0x43, 0x38, writer)?,
        Instruction::DStore(idx) => write_load_or_store(*idx, 0x47, 0x39, writer)?,
        Instruction::AStore(idx) => write_load_or_store(*idx, 0x4B, 0x3A, writer)?,
        Instruction::IAStore => 0x4fu8.serialize(writer)?,
        Instruction::LAStore => 0x50u8.serialize(writer)?,
        Instruction::FAStore => 0x51u8.serialize(writer)?,
        Instruction::DAStore => 0x52u8.serialize(writer)?,
        Instruction::AAStore => 0x53u8.serialize(writer)?,
        Instruction::BAStore => 0x54u8.serialize(writer)?,
        Instruction::CAStore => 0x55u8.serialize(writer)?,
        Instruction::SAStore => 0x56u8.serialize(writer)?,
        Instruction::Pop => 0x57u8.serialize(writer)?,
        Instruction::Pop2 => 0x58u8.serialize(writer)?,
        Instruction::Dup => 0x59u8.serialize(writer)?,
        Instruction::DupX1 => 0x5au8.serialize(writer)?,
        Instruction::DupX2 => 0x5bu8.serialize(writer)?,
        Instruction::Dup2 => 0x5cu8.serialize(writer)?,
        Instruction::Dup2X1 => 0x5du8.serialize(writer)?,
        Instruction::Dup2X2 => 0x5eu8.serialize(writer)?,
        Instruction::Swap => 0x5fu8.serialize(writer)?,
        Instruction::IAdd => 0x60u8.serialize(writer)?,
        Instruction::LAdd => 0x61u8.serialize(writer)?,
        Instruction::FAdd => 0x62u8.serialize(writer)?,
        Instruction::DAdd => 0x63u8.serialize(writer)?,
        Instruction::ISub => 0x64u8.serialize(writer)?,
        Instruction::LSub => 0x65u8.serialize(writer)?,
        Instruction::FSub => 0x66u8.serialize(writer)?,
        Instruction::DSub => 0x67u8.serialize(writer)?,
        Instruction::IMul => 0x68u8.serialize(writer)?,
        Instruction::LMul => 0x69u8.serialize(writer)?,
        Instruction::FMul => 0x6au8.serialize(writer)?,
        Instruction::DMul => 0x6bu8.serialize(writer)?,
        Instruction::IDiv => 0x6cu8.serialize(writer)?,
        Instruction::LDiv => 0x6du8.serialize(writer)?,
        Instruction::FDiv => 0x6eu8.serialize(writer)?,
        Instruction::DDiv => 0x6fu8.serialize(writer)?,
        Instruction::IRem => 0x70u8.serialize(writer)?,
        Instruction::LRem => 0x71u8.serialize(writer)?,
        Instruction::FRem => 0x72u8.serialize(writer)?,
        Instruction::DRem => 0x73u8.serialize(writer)?,
        Instruction::INeg => 0x74u8.serialize(writer)?,
        Instruction::LNeg => 0x75u8.serialize(writer)?,
        Instruction::FNeg => 0x76u8.serialize(writer)?,
        Instruction::DNeg => 0x77u8.serialize(writer)?,
        Instruction::ISh(ShiftType::Left) => 0x78u8.serialize(writer)?,
        Instruction::LSh(ShiftType::Left) => 0x79u8.serialize(writer)?,
        Instruction::ISh(ShiftType::ArithmeticRight) => 0x7au8.serialize(writer)?,
        Instruction::LSh(ShiftType::ArithmeticRight) => 0x7bu8.serialize(writer)?,
        Instruction::ISh(ShiftType::LogicalRight) => 0x7cu8.serialize(writer)?,
        Instruction::LSh(ShiftType::LogicalRight) => 0x7du8.serialize(writer)?,
        Instruction::IAnd => 0x7eu8.serialize(writer)?,
        Instruction::LAnd => 0x7fu8.serialize(writer)?,
        Instruction::IOr => 0x80u8.serialize(writer)?,
        Instruction::LOr => 0x81u8.serialize(writer)?,
        Instruction::IXor => 0x82u8.serialize(writer)?,
        Instruction::LXor => 0x83u8.serialize(writer)?,
        Instruction::IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
            (Ok(b), Ok(d)) => {
                0x84u8.serialize(writer)?;
                b.serialize(writer)?;
                d.serialize(writer)?;
            }
            _ => {
                0xc4u8.serialize(writer)?;
                0x84u8.serialize(writer)?;
                idx.serialize(writer)?;
                diff.serialize(writer)?;
            }
        },
        Instruction::I2L => 0x85u8.serialize(writer)?,
        Instruction::I2F => 0x86u8.serialize(writer)?,
        Instruction::I2D => 0x87u8.serialize(writer)?,
        Instruction::L2I => 0x88u8.serialize(writer)?,
        Instruction::L2F => 0x89u8.serialize(writer)?,
        Instruction::L2D => 0x8au8.serialize(writer)?,
        Instruction::F2I => 0x8bu8.serialize(writer)?,
        Instruction::F2L => 0x8cu8.serialize(writer)?,
        Instruction::F2D => 0x8du8.serialize(writer)?,
        Instruction::D2I => 0x8eu8.serialize(writer)?,
        Instruction::D2L => 0x8fu8.serialize(writer)?,
        Instruction::D2F => 0x90u8.serialize(writer)?,
        Instruction::I2B => 0x91u8.serialize(writer)?,
        Instruction::I2C => 0x92u8.serialize(writer)?,
        Instruction::I2S => 0x93u8.serialize(writer)?,
        Instruction::LCmp => 0x94u8.serialize(writer)?,
        Instruction::FCmp(CompareMode::L) => 0x95u8.serialize(writer)?,
        Instruction::FCmp(CompareMode::G) => 0x96u8.serialize(writer)?,
        Instruction::DCmp(CompareMode::L) => 0x97u8.serialize(writer)?,
        Instruction::DCmp(CompareMode::G) => 0x98u8.serialize(writer)?,
        Instruction::GetStatic(field)
        | Instruction::PutStatic(field)
        | Instruction::GetField(field)
        | Instruction::PutField(field) => {
            let opcode: u8 = match insn {
                Instruction::GetStatic(_) => 0xb2,
                Instruction::PutStatic(_) => 0xb3,
                Instruction::GetField(_) => 0xb4,
                _ => 0xb5,
            };
            let idx = constants.get_field_ref(
                &field.owner,
                field.name.as_str(),
                field.descriptor.render(),
            )?;
            opcode.serialize(writer)?;
            idx.serialize(writer)?;
        }
        Instruction::Invoke(invoke_type, method) => {
            let idx = constants.get_method_ref(
                &method.owner,
                method.name.as_str(),
                method.descriptor.render(),
                method.is_interface,
            )?;
            match invoke_type {
                InvokeType::Virtual => 0xb6u8.serialize(writer)?,
                InvokeType::Special => 0xb7u8.serialize(writer)?,
                InvokeType::Static => 0xb8u8.serialize(writer)?,
                InvokeType::Interface => 0xb9u8.serialize(writer)?,
            }
            idx.serialize(writer)?;
            if let InvokeType::Interface = invoke_type {
                (method.descriptor.parameter_length(true) as u8).serialize(writer)?;
                0u8.serialize(writer)?;
            }
        }
        Instruction::InvokeDynamic(call_site) => {
            let idx = constants.get_invoke_dynamic(
                call_site.bootstrap_method,
                call_site.name.as_str(),
                call_site.descriptor.render(),
            )?;
            0xbau8.serialize(writer)?;
            idx.serialize(writer)?;
            0u16.serialize(writer)?;
        }
        Instruction::New(class) => {
            let idx = constants.get_class(&RefType::Object(class.clone()))?;
            0xbbu8.serialize(writer)?;
            idx.serialize(writer)?;
        }
        Instruction::NewArray(basetype) => {
            let atype: u8 = match basetype {
                BaseType::Boolean => 4,
                BaseType::Char => 5,
                BaseType::Float => 6,
                BaseType::Double => 7,
                BaseType::Byte => 8,
                BaseType::Short => 9,
                BaseType::Int => 10,
                BaseType::Long => 11,
            };
            0xbcu8.serialize(writer)?;
            atype.serialize(writer)?;
        }
        Instruction::ANewArray(element_type) => {
            let idx = constants.get_class(element_type)?;
            0xbdu8.serialize(writer)?;
            idx.serialize(writer)?;
        }
        Instruction::ArrayLength => 0xbeu8.serialize(writer)?,
        Instruction::CheckCast(ref_type) => {
            let idx = constants.get_class(ref_type)?;
            0xc0u8.serialize(writer)?;
            idx.serialize(writer)?;
        }
        Instruction::InstanceOf(ref_type) => {
            let idx = constants.get_class(ref_type)?;
            0xc1u8.serialize(writer)?;
            idx.serialize(writer)?;
        }
        Instruction::MonitorEnter => 0xc2u8.serialize(writer)?,
        Instruction::MonitorExit => 0xc3u8.serialize(writer)?,
        Instruction::MultiANewArray(array_type, dimensions) => {
            let idx = constants.get_class(array_type)?;
            0xc5u8.serialize(writer)?;
            idx.serialize(writer)?;
            dimensions.serialize(writer)?;
        }
    }
    Ok(())
}

/// Padding after the opcode of a switch, so that its operands are 4-byte aligned
pub(super) fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Number of bytes taken by a branch instruction at a given offset
fn branch_width(branch: &BranchInstruction<Label>, offset: usize) -> usize {
    match branch {
        BranchInstruction::IReturn
        | BranchInstruction::LReturn
        | BranchInstruction::FReturn
        | BranchInstruction::DReturn
        | BranchInstruction::AReturn
        | BranchInstruction::Return
        | BranchInstruction::AThrow => 1,

        BranchInstruction::Ret(idx) if *idx <= u8::MAX as u16 => 2,
        BranchInstruction::Ret(_) => 4,

        BranchInstruction::Goto(_)
        | BranchInstruction::Jsr(_)
        | BranchInstruction::If(_, _)
        | BranchInstruction::IfICmp(_, _)
        | BranchInstruction::IfACmp(_, _)
        | BranchInstruction::IfNull(_, _) => 3,

        BranchInstruction::GotoW(_) | BranchInstruction::JsrW(_) => 5,

        BranchInstruction::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 4 * (3 + targets.len())
        }

        BranchInstruction::LookupSwitch { targets, .. } => {
            1 + switch_padding(offset) + 8 * (1 + targets.len())
        }
    }
}

/// Write out a branch instruction located at `offset`
fn write_branch<W: WriteBytesExt>(
    branch: &BranchInstruction<Label>,
    offset: usize,
    label_offsets: &HashMap<Label, usize>,
    writer: &mut W,
) -> Result<(), Error> {
    let wide_jump = |label: &Label| -> Result<i32, Error> {
        let target = label_offset(label_offsets, *label)?;
        Ok(target as i32 - offset as i32)
    };
    let jump = |label: &Label| -> Result<i16, Error> {
        let relative = wide_jump(label)?;
        i16::try_from(relative).map_err(|_| Error::JumpOffsetOverflow {
            label: *label,
            offset: relative as isize,
        })
    };

    match branch {
        BranchInstruction::If(comp, lbl) => {
            let opcode: u8 = match comp {
                OrdComparison::EQ => 0x99,
                OrdComparison::NE => 0x9a,
                OrdComparison::LT => 0x9b,
                OrdComparison::GE => 0x9c,
                OrdComparison::GT => 0x9d,
                OrdComparison::LE => 0x9e,
            };
            opcode.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::IfICmp(comp, lbl) => {
            let opcode: u8 = match comp {
                OrdComparison::EQ => 0x9f,
                OrdComparison::NE => 0xa0,
                OrdComparison::LT => 0xa1,
                OrdComparison::GE => 0xa2,
                OrdComparison::GT => 0xa3,
                OrdComparison::LE => 0xa4,
            };
            opcode.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::IfACmp(comp, lbl) => {
            let opcode: u8 = match comp {
                EqComparison::EQ => 0xa5,
                EqComparison::NE => 0xa6,
            };
            opcode.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::IfNull(comp, lbl) => {
            let opcode: u8 = match comp {
                EqComparison::EQ => 0xc6,
                EqComparison::NE => 0xc7,
            };
            opcode.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::Goto(lbl) => {
            0xa7u8.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::Jsr(lbl) => {
            0xa8u8.serialize(writer)?;
            jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::GotoW(lbl) => {
            0xc8u8.serialize(writer)?;
            wide_jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::JsrW(lbl) => {
            0xc9u8.serialize(writer)?;
            wide_jump(lbl)?.serialize(writer)?;
        }
        BranchInstruction::Ret(idx) => match u8::try_from(*idx) {
            Ok(b) => {
                0xa9u8.serialize(writer)?;
                b.serialize(writer)?;
            }
            Err(_) => {
                0xc4u8.serialize(writer)?;
                0xa9u8.serialize(writer)?;
                idx.serialize(writer)?;
            }
        },
        BranchInstruction::TableSwitch {
            default,
            low,
            targets,
        } => {
            0xaau8.serialize(writer)?;
            for _ in 0..switch_padding(offset) {
                0x00u8.serialize(writer)?;
            }
            wide_jump(default)?.serialize(writer)?;
            low.serialize(writer)?;
            (low + targets.len() as i32 - 1).serialize(writer)?;
            for target in targets {
                wide_jump(target)?.serialize(writer)?;
            }
        }
        BranchInstruction::LookupSwitch { default, targets } => {
            0xabu8.serialize(writer)?;
            for _ in 0..switch_padding(offset) {
                0x00u8.serialize(writer)?;
            }
            wide_jump(default)?.serialize(writer)?;
            (targets.len() as i32).serialize(writer)?;
            for (key, target) in targets {
                key.serialize(writer)?;
                wide_jump(target)?.serialize(writer)?;
            }
        }
        BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
        BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
        BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
        BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
        BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
        BranchInstruction::Return => 0xb1u8.serialize(writer)?,
        BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
    }
    Ok(())
}
