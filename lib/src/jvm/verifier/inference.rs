use super::{Frame, VerificationType, VerifierFrame};
use crate::jvm::code::{Instruction, InstructionSequence, Label, Node, NodeId};
use crate::jvm::{BinaryName, Error, RefType, VerifierErrorKind};
use std::collections::{BTreeSet, HashMap};

/// Exception handler, in terms of positions in the sequence
struct Handler {
    start: usize,
    end: usize,
    head: usize,
    caught: VerificationType<RefType<BinaryName>, super::UninitializedRef>,
}

/// Add the stack map frames missing from an edited method body
///
/// A frame is needed on every jump target, every exception handler, and every instruction
/// following an unconditional branch. Frames that are already in the sequence (usually decoded
/// from the `StackMapTable`) are taken as given. The others are computed by simulating the
/// method from its entry frame until the frames flowing into every position stop changing.
///
/// Returns the number of frames added.
pub fn infer_frames(
    sequence: &mut InstructionSequence,
    entry_frame: &VerifierFrame,
    this_class: &BinaryName,
) -> Result<usize, Error> {
    let new_sites = label_new_sites(sequence)?;

    let entry = match sequence.instruction_from(0) {
        Some(entry) => sequence.position(entry)?,
        None => return Ok(0),
    };

    // Positions of the instructions that need a frame
    let mut frame_points: BTreeSet<usize> = BTreeSet::new();
    for (position, (_, node)) in sequence.iter().enumerate() {
        if let Node::Branch(branch) = node {
            for target in branch.jump_targets() {
                frame_points.insert(target_position(sequence, target)?);
            }
            if !branch.falls_through() {
                if let Some(next) = sequence.instruction_from(position + 1) {
                    frame_points.insert(sequence.position(next)?);
                }
            }
        }
    }

    let mut handlers = vec![];
    for block in &sequence.try_catch_blocks {
        let head = target_position(sequence, block.handler)?;
        let caught = block
            .catch_type
            .clone()
            .unwrap_or(BinaryName::THROWABLE);
        handlers.push(Handler {
            start: label_position(sequence, block.start)?,
            end: label_position(sequence, block.end)?,
            head,
            caught: VerificationType::Object(RefType::Object(caught)),
        });
        frame_points.insert(head);
    }

    // Frames already present apply to the next real instruction
    let mut declared: HashMap<usize, VerifierFrame> = HashMap::new();
    let mut pending: Option<&VerifierFrame> = None;
    for (position, (_, node)) in sequence.iter().enumerate() {
        match node {
            Node::Frame(frame) => pending = Some(frame),
            Node::Label(_) | Node::LineNumber(_) => (),
            Node::Insn(_) | Node::Branch(_) => {
                if let Some(frame) = pending.take() {
                    declared.insert(position, frame.clone());
                }
            }
        }
    }

    let mut heads: BTreeSet<usize> = frame_points.clone();
    heads.extend(declared.keys().copied());
    heads.insert(entry);

    let mut incoming: HashMap<usize, VerifierFrame> = HashMap::new();
    let mut worklist: BTreeSet<usize> = BTreeSet::new();
    propagate(entry, entry_frame, &declared, &mut incoming, &mut worklist)?;

    while let Some(head) = worklist.iter().next().copied() {
        worklist.remove(&head);
        let mut frame = match declared.get(&head).or_else(|| incoming.get(&head)) {
            Some(frame) => frame.clone(),
            None => continue,
        };

        let mut position = head;
        loop {
            let node = match sequence.get(position) {
                Some(node) => node,
                None => {
                    return Err(Error::FrameInference(String::from(
                        "execution falls off the end of the method",
                    )))
                }
            };
            if position != head && !node.is_pseudo() && heads.contains(&position) {
                propagate(position, &frame, &declared, &mut incoming, &mut worklist)?;
                break;
            }

            if !node.is_pseudo() {
                for handler in &handlers {
                    if handler.start <= position && position < handler.end {
                        let handler_frame = Frame {
                            locals: frame.locals.clone(),
                            stack: vec![handler.caught.clone()],
                        };
                        propagate(
                            handler.head,
                            &handler_frame,
                            &declared,
                            &mut incoming,
                            &mut worklist,
                        )?;
                    }
                }
            }

            match node {
                Node::Insn(insn) => {
                    let new_site = match insn {
                        Instruction::New(_) => sequence
                            .id_at(position)
                            .and_then(|id| new_sites.get(&id).copied()),
                        _ => None,
                    };
                    frame
                        .verify_instruction(insn, new_site, this_class)
                        .map_err(|kind| verifier_error(node, kind))?;
                }
                Node::Branch(branch) => {
                    frame
                        .verify_branch_instruction(branch)
                        .map_err(|kind| verifier_error(node, kind))?;
                    for target in branch.jump_targets() {
                        let target = target_position(sequence, target)?;
                        propagate(target, &frame, &declared, &mut incoming, &mut worklist)?;
                    }
                    if !branch.falls_through() {
                        break;
                    }
                }
                Node::Label(_) | Node::LineNumber(_) | Node::Frame(_) => (),
            }
            position += 1;
        }
    }

    let mut missing: Vec<(usize, VerifierFrame)> = vec![];
    for point in &frame_points {
        if declared.contains_key(point) {
            continue;
        }
        match incoming.get(point) {
            Some(frame) => missing.push((*point, frame.clone())),
            None => {
                return Err(Error::FrameInference(format!(
                    "no frame reaches unreachable {:?}",
                    sequence.get(*point)
                )))
            }
        }
    }

    // Back to front, so that earlier positions stay valid
    let added = missing.len();
    for (position, frame) in missing.into_iter().rev() {
        log::trace!("Inferred frame at {}: {:?}", position, frame);
        sequence.insert_unrecorded(position, Node::Frame(frame))?;
    }
    Ok(added)
}

/// Record a frame flowing into a position, queueing the position if anything changed
fn propagate(
    position: usize,
    frame: &VerifierFrame,
    declared: &HashMap<usize, VerifierFrame>,
    incoming: &mut HashMap<usize, VerifierFrame>,
    worklist: &mut BTreeSet<usize>,
) -> Result<(), Error> {
    if declared.contains_key(&position) {
        if !incoming.contains_key(&position) {
            incoming.insert(position, frame.clone());
            worklist.insert(position);
        }
        return Ok(());
    }

    let merged = match incoming.get(&position) {
        None => {
            let mut frame = frame.clone();
            frame.trim_locals();
            frame
        }
        Some(existing) => existing
            .merge(frame)
            .map_err(|kind| Error::VerifierError {
                instruction: format!("join at position {}", position),
                kind,
            })?,
    };
    if incoming.get(&position) != Some(&merged) {
        incoming.insert(position, merged);
        worklist.insert(position);
    }
    Ok(())
}

fn verifier_error(node: &Node, kind: VerifierErrorKind) -> Error {
    Error::VerifierError {
        instruction: format!("{:?}", node),
        kind,
    }
}

fn label_position(sequence: &InstructionSequence, label: Label) -> Result<usize, Error> {
    match sequence.label_node(label) {
        Some(node) => sequence.position(node),
        None => Err(Error::DanglingLabel(label)),
    }
}

/// Position of the real instruction a label refers to
fn target_position(sequence: &InstructionSequence, label: Label) -> Result<usize, Error> {
    match sequence.label_target(label)? {
        Some(node) => sequence.position(node),
        None => Err(Error::FrameInference(format!(
            "{:?} is at the end of the method",
            label
        ))),
    }
}

/// Make sure every `new` is preceded by a label, returning those labels
///
/// Uninitialized types in frames refer to the `new` that created them through this label.
fn label_new_sites(sequence: &mut InstructionSequence) -> Result<HashMap<NodeId, Label>, Error> {
    let new_instructions: Vec<NodeId> = sequence
        .iter()
        .filter(|(_, node)| matches!(node, Node::Insn(Instruction::New(_))))
        .map(|(id, _)| id)
        .collect();

    let mut sites = HashMap::new();
    for id in new_instructions {
        let existing = sequence
            .pseudo_nodes_before(id)?
            .into_iter()
            .rev()
            .find_map(|pseudo| sequence.node(pseudo).ok().and_then(Node::as_label));
        let label = match existing {
            Some(label) => label,
            None => {
                let label = sequence.new_label();
                let position = sequence.position(id)?;
                sequence.insert_unrecorded(position, Node::Label(label))?;
                label
            }
        };
        sites.insert(id, label);
    }
    Ok(sites)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BranchInstruction, OrdComparison, TryCatchBlock};
    use crate::jvm::Name;

    fn this_class() -> BinaryName {
        BinaryName::from_string(String::from("me/Test")).unwrap()
    }

    fn frames(sequence: &InstructionSequence) -> Vec<(usize, VerifierFrame)> {
        sequence
            .iter()
            .enumerate()
            .filter_map(|(position, (_, node))| match node {
                Node::Frame(frame) => Some((position, frame.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn jump_targets_get_frames() {
        let mut sequence = InstructionSequence::new();
        let zero = sequence.new_label();
        sequence.push(Instruction::ILoad(0)).unwrap();
        sequence
            .push(BranchInstruction::If(OrdComparison::EQ, zero))
            .unwrap();
        sequence.push(Instruction::IConst1).unwrap();
        sequence.push(BranchInstruction::IReturn).unwrap();
        sequence.push(Node::Label(zero)).unwrap();
        sequence.push(Instruction::IConst0).unwrap();
        sequence.push(BranchInstruction::IReturn).unwrap();

        let entry = VerifierFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        };
        assert_eq!(infer_frames(&mut sequence, &entry, &this_class()).unwrap(), 1);

        let frames = frames(&sequence);
        assert_eq!(frames, vec![(5, entry)]);
        assert_eq!(sequence.get(4), Some(&Node::Label(zero)));
        assert_eq!(sequence.get(6), Some(&Node::Insn(Instruction::IConst0)));
    }

    #[test]
    fn declared_frames_are_kept() {
        let mut sequence = InstructionSequence::new();
        let zero = sequence.new_label();
        let declared = VerifierFrame {
            locals: vec![VerificationType::Integer, VerificationType::Top],
            stack: vec![],
        };
        sequence.push(Instruction::ILoad(0)).unwrap();
        sequence
            .push(BranchInstruction::If(OrdComparison::EQ, zero))
            .unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.push(Node::Label(zero)).unwrap();
        sequence.push(Node::Frame(declared.clone())).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();

        let entry = VerifierFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        };
        assert_eq!(infer_frames(&mut sequence, &entry, &this_class()).unwrap(), 0);
        assert_eq!(frames(&sequence), vec![(4, declared)]);
    }

    #[test]
    fn handlers_get_the_caught_type() {
        let mut sequence = InstructionSequence::new();
        let start = sequence.new_label();
        let end = sequence.new_label();
        let handler = sequence.new_label();
        sequence.push(Node::Label(start)).unwrap();
        sequence.push(Instruction::Nop).unwrap();
        sequence.push(Node::Label(end)).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.push(Node::Label(handler)).unwrap();
        sequence.push(Instruction::AStore(0)).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: None,
        });

        let entry = VerifierFrame {
            locals: vec![],
            stack: vec![],
        };
        assert_eq!(infer_frames(&mut sequence, &entry, &this_class()).unwrap(), 1);
        let frames = frames(&sequence);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].1.stack,
            vec![VerificationType::Object(RefType::Object(
                BinaryName::THROWABLE
            ))]
        );
    }

    #[test]
    fn new_sites_are_labelled() {
        let mut sequence = InstructionSequence::new();
        let new = sequence
            .push(Instruction::New(BinaryName::OBJECT))
            .unwrap();
        sequence.push(Instruction::Pop).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();

        let entry = VerifierFrame {
            locals: vec![],
            stack: vec![],
        };
        assert_eq!(infer_frames(&mut sequence, &entry, &this_class()).unwrap(), 0);
        let group = sequence.pseudo_nodes_before(new).unwrap();
        assert_eq!(group.len(), 1);
        assert!(sequence.node(group[0]).unwrap().as_label().is_some());
    }

    #[test]
    fn unreachable_frame_points() {
        let mut sequence = InstructionSequence::new();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.push(Instruction::Nop).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();

        let entry = VerifierFrame {
            locals: vec![],
            stack: vec![],
        };
        assert!(matches!(
            infer_frames(&mut sequence, &entry, &this_class()),
            Err(Error::FrameInference(_))
        ));
    }
}
