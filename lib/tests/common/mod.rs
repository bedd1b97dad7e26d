//! Assembling test classes with the library's own encoder

#![allow(dead_code)]

use classpatch::jvm::class_file::{self, ClassFile, ConstantPool, Version};
use classpatch::jvm::code::{
    encode_code, ConstantValue, Instruction, InstructionSequence, InvokeType, Label, MethodRef,
    Node,
};
use classpatch::jvm::verifier::{analyze_stack, infer_frames, VerifierFrame};
use classpatch::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    RefType, UnqualifiedName,
};
use std::collections::HashMap;

pub const GL_STATE_MANAGER: &str = "net/minecraft/client/renderer/GlStateManager";
pub const RENDER_GLOBAL: &str = "net/minecraft/client/renderer/RenderGlobal";
pub const PATCHER_CONFIG: &str = "club/sk1er/patcher/config/PatcherConfig";

/// Builds class files one method at a time
///
/// Max stack and locals are computed, and so are stack map frames for versions that need them.
pub struct ClassAssembler {
    name: BinaryName,
    version: Version,
    constants: ConstantPool,
    methods: Vec<class_file::Method>,
}

impl ClassAssembler {
    pub fn new(name: &str, version: Version) -> ClassAssembler {
        ClassAssembler {
            name: BinaryName::from_string(name.to_owned()).unwrap(),
            version,
            constants: ConstantPool::new(),
            methods: vec![],
        }
    }

    pub fn method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        mut code: InstructionSequence,
    ) -> &mut ClassAssembler {
        let parsed: MethodDescriptor<BinaryName> = MethodDescriptor::parse(descriptor).unwrap();
        let is_static = access_flags.contains(MethodAccessFlags::STATIC);
        let analysis = analyze_stack(&code, parsed.parameter_length(!is_static)).unwrap();

        let entry_frame = if self.version.uses_stack_map_frames() {
            let frame = VerifierFrame::entry(&self.name, is_static, name == "<init>", &parsed);
            infer_frames(&mut code, &frame, &self.name).unwrap();
            Some(frame)
        } else {
            None
        };
        let code = encode_code(
            &code,
            &mut self.constants,
            analysis.max_stack as u16,
            analysis.max_locals as u16,
            entry_frame.as_ref(),
        )
        .unwrap();
        let code = self.constants.get_attribute(code).unwrap();

        let method = class_file::Method {
            access_flags,
            name_index: self.constants.get_utf8(name).unwrap(),
            descriptor_index: self.constants.get_utf8(descriptor).unwrap(),
            attributes: vec![code],
        };
        self.methods.push(method);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let this_class = self
            .constants
            .get_class(&RefType::Object(self.name.clone()))
            .unwrap();
        let super_class = self
            .constants
            .get_class(&RefType::from_class_name("java/lang/Object").unwrap())
            .unwrap();
        ClassFile {
            version: self.version,
            constants: self.constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: self.methods,
            attributes: vec![],
        }
        .to_bytes()
        .unwrap()
    }
}

pub fn invoke(invoke_type: InvokeType, owner: &str, name: &str, descriptor: &str) -> Node {
    Instruction::Invoke(
        invoke_type,
        MethodRef {
            owner: RefType::from_class_name(owner).unwrap(),
            name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            is_interface: false,
        },
    )
    .into()
}

/// `enableBlend; tryBlendFuncSeparate(770, 771, 1, 0); <work>; disableBlend; return`
///
/// Member names are the obfuscated ones.
pub fn cloud_body() -> InstructionSequence {
    let mut code = InstructionSequence::new();
    code.push(invoke(InvokeType::Static, GL_STATE_MANAGER, "func_179147_l", "()V"))
        .unwrap();
    code.push(Instruction::SiPush(770)).unwrap();
    code.push(Instruction::SiPush(771)).unwrap();
    code.push(Instruction::IConst1).unwrap();
    code.push(Instruction::IConst0).unwrap();
    code.push(invoke(
        InvokeType::Static,
        GL_STATE_MANAGER,
        "func_179120_a",
        "(IIII)V",
    ))
    .unwrap();
    code.push(Instruction::Nop).unwrap();
    code.push(invoke(InvokeType::Static, GL_STATE_MANAGER, "func_179084_k", "()V"))
        .unwrap();
    code.push(classpatch::jvm::code::BranchInstruction::Return)
        .unwrap();
    code
}

/// `glPolygonOffset(-3.0F, -3.0F); return`
pub fn damaged_blocks_body() -> InstructionSequence {
    let mut code = InstructionSequence::new();
    code.push(Instruction::Ldc(ConstantValue::Float(-3.0)))
        .unwrap();
    code.push(Instruction::Ldc(ConstantValue::Float(-3.0)))
        .unwrap();
    code.push(invoke(
        InvokeType::Static,
        GL_STATE_MANAGER,
        "func_179136_a",
        "(FF)V",
    ))
    .unwrap();
    code.push(classpatch::jvm::code::BranchInstruction::Return)
        .unwrap();
    code
}

/// Obfuscated `RenderGlobal` with the cloud methods and, optionally, the damaged block method
pub fn render_global(version: Version, with_damaged_blocks: bool) -> Vec<u8> {
    let mut assembler = ClassAssembler::new(RENDER_GLOBAL, version);
    assembler
        .method(MethodAccessFlags::PUBLIC, "func_180447_b", "(FI)V", cloud_body())
        .method(
            MethodAccessFlags::PRIVATE,
            "func_180445_c",
            "(FI)V",
            cloud_body(),
        );
    if with_damaged_blocks {
        assembler.method(
            MethodAccessFlags::PRIVATE,
            "func_180443_s",
            "()V",
            damaged_blocks_body(),
        );
    }
    assembler.finish()
}

/// Run a method body with abstract values, returning the names of the static methods called
///
/// Only what the test bodies use is supported: constants, static field reads (config
/// flags read their value from `flags`, anything else reads as zero), static calls, `if<cond>`,
/// `goto`, and `return`.
pub fn static_calls(code: &InstructionSequence, flags: &HashMap<&str, bool>) -> Vec<String> {
    use classpatch::jvm::code::{BranchInstruction, OrdComparison};

    let mut stack: Vec<i64> = vec![];
    let mut calls = vec![];
    let mut position = 0;
    let jump = |label: Label| -> usize {
        let node = code.label_node(label).unwrap();
        code.position(node).unwrap()
    };

    while let Some(node) = code.get(position) {
        position += 1;
        match node {
            Node::Label(_) | Node::LineNumber(_) | Node::Frame(_) => {}
            Node::Insn(Instruction::Nop) => {}
            Node::Insn(Instruction::GetStatic(field)) => {
                let value = field.owner.as_str() == PATCHER_CONFIG
                    && flags.get(field.name.as_str()).copied().unwrap_or(false);
                stack.push(value as i64);
            }
            Node::Insn(Instruction::Invoke(InvokeType::Static, method)) => {
                for _ in &method.descriptor.parameters {
                    stack.pop().unwrap();
                }
                if method.descriptor.return_type.is_some() {
                    stack.push(0);
                }
                calls.push(method.name.as_str().to_owned());
            }
            Node::Insn(insn) => match insn.literal() {
                Some(ConstantValue::Integer(value)) => stack.push(value as i64),
                Some(_) => stack.push(0),
                None => panic!("unsupported instruction {:?}", insn),
            },
            Node::Branch(BranchInstruction::If(comparison, label)) => {
                let value = stack.pop().unwrap();
                let taken = match comparison {
                    OrdComparison::EQ => value == 0,
                    OrdComparison::NE => value != 0,
                    OrdComparison::LT => value < 0,
                    OrdComparison::GE => value >= 0,
                    OrdComparison::GT => value > 0,
                    OrdComparison::LE => value <= 0,
                };
                if taken {
                    position = jump(*label);
                }
            }
            Node::Branch(BranchInstruction::Goto(label)) => position = jump(*label),
            Node::Branch(BranchInstruction::Return) => return calls,
            Node::Branch(branch) => panic!("unsupported branch {:?}", branch),
        }
    }
    panic!("fell off the end of the method")
}
