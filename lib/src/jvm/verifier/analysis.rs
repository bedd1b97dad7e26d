use crate::jvm::code::{BranchInstruction, Instruction, InstructionSequence, Label, Node, NodeId};
use crate::jvm::Error;
use std::collections::{BTreeSet, HashMap};

/// Depth-only dataflow over a method body
#[derive(Debug, Clone)]
pub struct StackAnalysis {
    /// Stack depth (in slots) on entry to every reachable node, pseudo nodes included
    pub depths: HashMap<NodeId, usize>,

    /// Largest stack depth reached
    pub max_stack: usize,

    /// Number of local slots used (at least the slots of the parameters)
    pub max_locals: usize,
}

impl StackAnalysis {
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.depths.contains_key(&node)
    }

    /// Reachable nodes, in handle order
    pub fn reachable(&self) -> BTreeSet<NodeId> {
        self.depths.keys().copied().collect()
    }
}

/// Highest local slot touched by an instruction, plus one
fn local_extent(insn: &Instruction) -> Option<usize> {
    use Instruction::*;
    match insn {
        LLoad(idx) | DLoad(idx) | LStore(idx) | DStore(idx) => Some(*idx as usize + 2),
        _ => insn.local_slot().map(|idx| idx as usize + 1),
    }
}

fn label_position(sequence: &InstructionSequence, label: Label) -> Result<usize, Error> {
    match sequence.label_node(label) {
        Some(node) => sequence.position(node),
        None => Err(Error::DanglingLabel(label)),
    }
}

/// Compute the stack depth at every reachable node of a method body
///
/// Exception handlers are entered with one slot on the stack (the exception), as soon as any
/// instruction in their protected range is reachable. Subroutines entered with `jsr` are assumed to
/// return to the instruction after the `jsr` with the stack as it was before the call.
///
/// Fails if a position is reached with two different depths, if an instruction pops more than is
/// on the stack, or if execution can fall off the end of the method.
pub fn analyze_stack(
    sequence: &InstructionSequence,
    parameter_slots: usize,
) -> Result<StackAnalysis, Error> {
    let mut analysis = StackAnalysis {
        depths: HashMap::new(),
        max_stack: 0,
        max_locals: parameter_slots,
    };
    if sequence.is_empty() {
        return Ok(analysis);
    }

    let mut handlers_seeded = vec![false; sequence.try_catch_blocks.len()];
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];
    loop {
        while let Some((position, depth)) = worklist.pop() {
            flow_from(sequence, position, depth, &mut analysis, &mut worklist)?;
        }

        // Handlers whose protected range has become reachable
        for (block, seeded) in sequence.try_catch_blocks.iter().zip(&mut handlers_seeded) {
            if *seeded {
                continue;
            }
            let start = label_position(sequence, block.start)?;
            let end = label_position(sequence, block.end)?;
            let covers_reachable = (start..end).any(|position| {
                match (sequence.id_at(position), sequence.get(position)) {
                    (Some(id), Some(node)) => !node.is_pseudo() && analysis.is_reachable(id),
                    _ => false,
                }
            });
            if covers_reachable {
                *seeded = true;
                worklist.push((label_position(sequence, block.handler)?, 1));
            }
        }
        if worklist.is_empty() {
            break;
        }
    }

    Ok(analysis)
}

/// Follow straight-line flow from a position, queueing jump targets
fn flow_from(
    sequence: &InstructionSequence,
    mut position: usize,
    mut depth: usize,
    analysis: &mut StackAnalysis,
    worklist: &mut Vec<(usize, usize)>,
) -> Result<(), Error> {
    loop {
        let (id, node) = match (sequence.id_at(position), sequence.get(position)) {
            (Some(id), Some(node)) => (id, node),
            _ => {
                return Err(Error::FrameInference(String::from(
                    "execution falls off the end of the method",
                )))
            }
        };
        match analysis.depths.get(&id) {
            Some(expected) if *expected == depth => return Ok(()),
            Some(expected) => {
                return Err(Error::StackHeightMismatch {
                    node: id,
                    expected: *expected,
                    found: depth,
                })
            }
            None => {
                analysis.depths.insert(id, depth);
            }
        }

        let (pops, pushes) = node.stack_slots();
        if pops > depth {
            return Err(Error::StackUnderflow {
                instruction: format!("{:?}", node),
            });
        }
        let after = depth - pops + pushes;
        analysis.max_stack = analysis.max_stack.max(after);

        match node {
            Node::Insn(insn) => {
                if let Some(extent) = local_extent(insn) {
                    analysis.max_locals = analysis.max_locals.max(extent);
                }
                depth = after;
            }
            Node::Branch(branch) => {
                for target in branch.jump_targets() {
                    worklist.push((label_position(sequence, target)?, after));
                }
                match branch {
                    BranchInstruction::Ret(idx) => {
                        analysis.max_locals = analysis.max_locals.max(*idx as usize + 1);
                    }
                    BranchInstruction::Jsr(_) | BranchInstruction::JsrW(_) => {
                        // Back from the subroutine, the return address is gone
                        position += 1;
                        continue;
                    }
                    _ => (),
                }
                if !branch.falls_through() {
                    return Ok(());
                }
                depth = after;
            }
            Node::Label(_) | Node::LineNumber(_) | Node::Frame(_) => (),
        }
        position += 1;
    }
}

/// Check that every label referenced by a branch, an exception range, or a local variable scope is
/// placed somewhere in the sequence
pub fn check_labels(sequence: &InstructionSequence) -> Result<(), Error> {
    let jump_targets = sequence
        .iter()
        .filter_map(|(_, node)| node.as_branch())
        .flat_map(|branch| branch.jump_targets());
    let handlers = sequence
        .try_catch_blocks
        .iter()
        .flat_map(|block| [block.start, block.end, block.handler]);
    let scopes = sequence
        .local_variables
        .iter()
        .flat_map(|variable| [variable.start, variable.end]);

    for label in jump_targets.chain(handlers).chain(scopes) {
        if sequence.label_node(label).is_none() {
            return Err(Error::DanglingLabel(label));
        }
    }
    Ok(())
}

/// Check that every edit of the sequence left the stack depth unchanged after it
pub fn check_stack_neutrality(sequence: &InstructionSequence) -> Result<(), Error> {
    for edit in sequence.edits() {
        if !edit.is_stack_neutral() {
            return Err(Error::UnbalancedInsertion {
                anchor: edit.anchor,
                net_effect: edit.inserted_effect - edit.removed_effect,
            });
        }
    }
    Ok(())
}

/// Check that instructions reachable before editing still are
///
/// Instructions that were removed from the sequence are exempt.
pub fn check_reachability(
    sequence: &InstructionSequence,
    reachable_before: &BTreeSet<NodeId>,
    after: &StackAnalysis,
) -> Result<(), Error> {
    for id in reachable_before {
        let is_instruction = match sequence.node(*id) {
            Ok(node) => !node.is_pseudo(),
            Err(_) => false,
        };
        if is_instruction && !after.is_reachable(*id) {
            return Err(Error::UnreachableInstruction(*id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{OrdComparison, TryCatchBlock};

    #[test]
    fn straight_line() {
        let mut sequence = InstructionSequence::new();
        sequence.push(Instruction::ILoad(0)).unwrap();
        sequence.push(Instruction::LLoad(1)).unwrap();
        sequence.push(Instruction::L2I).unwrap();
        sequence.push(Instruction::IAdd).unwrap();
        sequence.push(BranchInstruction::IReturn).unwrap();

        let analysis = analyze_stack(&sequence, 1).unwrap();
        assert_eq!(analysis.max_stack, 3);
        assert_eq!(analysis.max_locals, 3);
        assert_eq!(analysis.depths.len(), 5);
    }

    #[test]
    fn branches_join() {
        let mut sequence = InstructionSequence::new();
        let else_branch = sequence.new_label();
        let join = sequence.new_label();
        sequence.push(Instruction::ILoad(0)).unwrap();
        sequence
            .push(BranchInstruction::If(OrdComparison::EQ, else_branch))
            .unwrap();
        sequence.push(Instruction::IConst1).unwrap();
        sequence.push(BranchInstruction::Goto(join)).unwrap();
        sequence.push(Node::Label(else_branch)).unwrap();
        sequence.push(Instruction::IConst0).unwrap();
        let join_node = sequence.push(Node::Label(join)).unwrap();
        sequence.push(BranchInstruction::IReturn).unwrap();

        let analysis = analyze_stack(&sequence, 1).unwrap();
        assert_eq!(analysis.depths.get(&join_node), Some(&1));
        assert_eq!(analysis.max_stack, 1);
    }

    #[test]
    fn mismatched_depths() {
        let mut sequence = InstructionSequence::new();
        let join = sequence.new_label();
        sequence.push(Instruction::ILoad(0)).unwrap();
        sequence
            .push(BranchInstruction::If(OrdComparison::EQ, join))
            .unwrap();
        sequence.push(Instruction::IConst1).unwrap();
        let join_node = sequence.push(Node::Label(join)).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();

        match analyze_stack(&sequence, 1) {
            Err(Error::StackHeightMismatch { node, .. }) => assert_eq!(node, join_node),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn underflow() {
        let mut sequence = InstructionSequence::new();
        sequence.push(Instruction::Pop).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        assert!(matches!(
            analyze_stack(&sequence, 0),
            Err(Error::StackUnderflow { .. })
        ));
    }

    #[test]
    fn handlers_are_reachable() {
        let mut sequence = InstructionSequence::new();
        let start = sequence.new_label();
        let end = sequence.new_label();
        let handler = sequence.new_label();
        sequence.push(Node::Label(start)).unwrap();
        sequence.push(Instruction::Nop).unwrap();
        sequence.push(Node::Label(end)).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.push(Node::Label(handler)).unwrap();
        let store = sequence.push(Instruction::AStore(1)).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        sequence.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: None,
        });

        let analysis = analyze_stack(&sequence, 1).unwrap();
        assert_eq!(analysis.depths.get(&store), Some(&1));
        assert_eq!(analysis.max_locals, 2);
    }

    #[test]
    fn removed_code_is_exempt() {
        let mut sequence = InstructionSequence::new();
        let first = sequence.push(Instruction::Nop).unwrap();
        let second = sequence.push(Instruction::Nop).unwrap();
        sequence.push(BranchInstruction::Return).unwrap();
        let before = analyze_stack(&sequence, 0).unwrap().reachable();

        sequence.remove(second).unwrap();
        let after = analyze_stack(&sequence, 0).unwrap();
        check_reachability(&sequence, &before, &after).unwrap();

        sequence
            .insert_at_start(vec![BranchInstruction::Return.into()])
            .unwrap();
        let after = analyze_stack(&sequence, 0).unwrap();
        match check_reachability(&sequence, &before, &after) {
            Err(Error::UnreachableInstruction(id)) => assert_eq!(id, first),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dangling_labels() {
        let mut sequence = InstructionSequence::new();
        let target = sequence.new_label();
        sequence.push(Instruction::IConst0).unwrap();
        let branch = sequence
            .push(BranchInstruction::If(OrdComparison::NE, target))
            .unwrap();
        let ret = sequence.push(BranchInstruction::Return).unwrap();
        assert!(matches!(
            check_labels(&sequence),
            Err(Error::DanglingLabel(l)) if l == target
        ));

        sequence.insert_before(ret, vec![Node::Label(target)]).unwrap();
        check_labels(&sequence).unwrap();

        sequence.remove(branch).unwrap();
        let end = sequence.new_label();
        sequence.try_catch_blocks.push(TryCatchBlock {
            start: target,
            end,
            handler: target,
            catch_type: None,
        });
        assert!(matches!(
            check_labels(&sequence),
            Err(Error::DanglingLabel(l)) if l == end
        ));
    }

    #[test]
    fn unbalanced_insertions() {
        let mut sequence = InstructionSequence::new();
        let ret = sequence.push(BranchInstruction::Return).unwrap();
        sequence
            .insert_before(ret, vec![Instruction::IConst0.into()])
            .unwrap();
        assert!(matches!(
            check_stack_neutrality(&sequence),
            Err(Error::UnbalancedInsertion { net_effect: 1, .. })
        ));
    }
}
