use crate::jvm::class_file::{self, Code, ConstantPool};
use crate::jvm::code::{decode_code, encode_code, InstructionSequence, NodeId};
use crate::jvm::verifier::{
    analyze_stack, check_labels, check_reachability, check_stack_neutrality, infer_frames,
    StackAnalysis, VerifierFrame,
};
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
};
use std::collections::BTreeSet;

/// Decoded body of a method
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub sequence: InstructionSequence,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Instructions reachable before the first edit (computed when editing starts)
    reachable_before: Option<BTreeSet<NodeId>>,
}

impl MethodBody {
    fn check(&self, parameter_slots: usize) -> Result<StackAnalysis, Error> {
        check_stack_neutrality(&self.sequence)?;
        check_labels(&self.sequence)?;
        let analysis = analyze_stack(&self.sequence, parameter_slots)?;
        if let Some(reachable_before) = &self.reachable_before {
            check_reachability(&self.sequence, reachable_before, &analysis)?;
        }
        Ok(analysis)
    }
}

/// Semantic representation of a method
///
/// Methods that are `abstract` or `native` have no body.
#[derive(Debug, Clone)]
pub struct MethodUnit {
    /// Position of the method in the class file
    pub(super) index: usize,

    pub access_flags: MethodAccessFlags,

    /// Name as it appears in the class file
    pub name: UnqualifiedName,

    /// Human readable name, when the symbol table knows one
    pub canonical_name: Option<UnqualifiedName>,

    pub descriptor: MethodDescriptor<BinaryName>,

    /// Class declaring the method
    pub owner: BinaryName,

    /// Frame on entry to the method (only for class versions that carry stack map frames)
    entry_frame: Option<VerifierFrame>,

    body: Option<MethodBody>,
}

impl MethodUnit {
    /// Decode a method of a class file, including its body
    pub(super) fn decode(
        index: usize,
        method: &class_file::Method,
        constants: &ConstantPool,
        owner: &BinaryName,
        uses_stack_map_frames: bool,
    ) -> Result<MethodUnit, Error> {
        let name = UnqualifiedName::from_string(method.name(constants)?.to_owned())
            .map_err(Error::MalformedName)?;
        let descriptor_str = method.descriptor(constants)?;
        let descriptor = MethodDescriptor::parse(descriptor_str)
            .map_err(|_| Error::BadDescriptor(descriptor_str.to_owned()))?;
        let access_flags = method.access_flags;

        let entry_frame = if uses_stack_map_frames {
            Some(VerifierFrame::entry(
                owner,
                access_flags.contains(MethodAccessFlags::STATIC),
                name == UnqualifiedName::INIT,
                &descriptor,
            ))
        } else {
            None
        };

        let mut body = None;
        for attribute in &method.attributes {
            if constants.utf8(attribute.name_index)? != <Code as class_file::AttributeLike>::NAME {
                continue;
            }
            let code: Code = attribute.decode()?;
            let sequence = decode_code(&code, constants, entry_frame.as_ref())?;
            body = Some(MethodBody {
                sequence,
                max_stack: code.max_stack,
                max_locals: code.max_locals,
                reachable_before: None,
            });
            break;
        }
        log::trace!("Decoded {}.{}{:?}", owner, name, descriptor);

        Ok(MethodUnit {
            index,
            access_flags,
            name,
            canonical_name: None,
            descriptor,
            owner: owner.clone(),
            entry_frame,
            body,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Name to use in diagnostics (canonical if known)
    pub fn display_name(&self) -> &str {
        self.canonical_name.as_ref().unwrap_or(&self.name).as_str()
    }

    /// Number of local slots taken by the parameters (including `this`)
    pub fn parameter_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    pub fn has_code(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    pub fn code(&self) -> Option<&InstructionSequence> {
        self.body.as_ref().map(|body| &body.sequence)
    }

    /// Get the instruction sequence for editing
    ///
    /// The first call records which instructions are reachable, so that [`Self::validate`] can
    /// tell if an edit cut some of them off. Returns `Ok(None)` for methods without a body.
    pub fn code_mut(&mut self) -> Result<Option<&mut InstructionSequence>, Error> {
        let parameter_slots = self.parameter_slots();
        let body = match self.body.as_mut() {
            Some(body) => body,
            None => return Ok(None),
        };
        if body.reachable_before.is_none() {
            let analysis = analyze_stack(&body.sequence, parameter_slots)?;
            body.reachable_before = Some(analysis.reachable());
        }
        Ok(Some(&mut body.sequence))
    }

    /// Has the body been edited?
    pub fn is_modified(&self) -> bool {
        self.body
            .as_ref()
            .map_or(false, |body| body.sequence.is_modified())
    }

    /// Check an edited body, without updating anything
    ///
    /// This is the part of [`Self::validate`] that can be run after every round of edits.
    pub fn check(&self) -> Result<(), Error> {
        match &self.body {
            Some(body) if body.sequence.is_modified() => {
                body.check(self.parameter_slots())?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Check an edited body and bring its bookkeeping back up to date
    ///
    /// Checks that edits are stack neutral, that every referenced label is placed, that the stack
    /// depth is consistent everywhere, and that nothing reachable before the edits became
    /// unreachable. Then max stack and locals are updated and the missing stack map frames are
    /// computed. Unmodified bodies are left alone.
    pub fn validate(&mut self) -> Result<(), Error> {
        let parameter_slots = self.parameter_slots();
        let body = match self.body.as_mut() {
            Some(body) if body.sequence.is_modified() => body,
            _ => return Ok(()),
        };

        let analysis = body.check(parameter_slots)?;
        let max_stack = analysis.max_stack.max(body.max_stack as usize);
        body.max_stack =
            u16::try_from(max_stack).map_err(|_| Error::MethodCodeMaxStackOverflow(max_stack))?;
        let max_locals = analysis.max_locals.max(body.max_locals as usize);
        body.max_locals = u16::try_from(max_locals)
            .map_err(|_| Error::MethodCodeMaxLocalsOverflow(max_locals))?;

        if let Some(entry_frame) = &self.entry_frame {
            let added = infer_frames(&mut body.sequence, entry_frame, &self.owner)?;
            log::debug!("Computed {} stack map frames for {}", added, self.name);
        }
        Ok(())
    }

    /// Encode the body back into a `Code` attribute
    pub fn encode(&self, constants: &mut ConstantPool) -> Result<Option<Code>, Error> {
        match &self.body {
            None => Ok(None),
            Some(body) => encode_code(
                &body.sequence,
                constants,
                body.max_stack,
                body.max_locals,
                self.entry_frame.as_ref(),
            )
            .map(Some),
        }
    }
}
