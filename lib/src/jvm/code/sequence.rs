use super::{
    BranchInstruction, ConstantValue, FieldRef, Instruction, Label, LabelCounter, LabelGenerator,
    MethodRef, OpcodeCategory,
};
use crate::jvm::verifier::VerifierFrame;
use crate::jvm::{BinaryName, Error, RefType};
use crate::util::Width;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Stable handle to a node in an [`InstructionSequence`]
///
/// Handles stay valid across insertions and removals of other nodes. Once the node itself is
/// removed (or replaced), the handle is dead and lookups through it fail with
/// [`Error::MissingNode`].
#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct NodeId(u32);

impl fmt::Debug for NodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("n{}", self.0))
    }
}

/// Element of an instruction sequence
///
/// Besides real instructions, a sequence contains pseudo nodes which mark positions: labels (jump
/// targets, exception ranges, local variable scopes), line numbers, and declared stack map frames.
/// Pseudo nodes apply to the first real instruction following them.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Insn(Instruction),
    Branch(BranchInstruction<Label>),
    Label(Label),
    LineNumber(u16),
    Frame(VerifierFrame),
}

impl Node {
    /// Pseudo nodes don't correspond to any bytes in the code array
    pub fn is_pseudo(&self) -> bool {
        matches!(self, Node::Label(_) | Node::LineNumber(_) | Node::Frame(_))
    }

    pub fn category(&self) -> OpcodeCategory {
        match self {
            Node::Insn(insn) => insn.category(),
            Node::Branch(branch) => branch.category(),
            Node::Label(_) => OpcodeCategory::Label,
            Node::LineNumber(_) => OpcodeCategory::LineNumber,
            Node::Frame(_) => OpcodeCategory::Frame,
        }
    }

    /// Number of stack slots popped and pushed (zero for pseudo nodes)
    pub fn stack_slots(&self) -> (usize, usize) {
        match self {
            Node::Insn(insn) => insn.stack_slots(),
            Node::Branch(branch) => branch.stack_slots(),
            _ => (0, 0),
        }
    }

    /// Net change in stack slots
    pub fn stack_effect(&self) -> i32 {
        let (pops, pushes) = self.stack_slots();
        pushes as i32 - pops as i32
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match self {
            Node::Insn(insn) => Some(insn),
            _ => None,
        }
    }

    pub fn as_branch(&self) -> Option<&BranchInstruction<Label>> {
        match self {
            Node::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<Label> {
        match self {
            Node::Label(label) => Some(*label),
            _ => None,
        }
    }
}

impl From<Instruction> for Node {
    fn from(insn: Instruction) -> Node {
        Node::Insn(insn)
    }
}

impl From<BranchInstruction<Label>> for Node {
    fn from(branch: BranchInstruction<Label>) -> Node {
        Node::Branch(branch)
    }
}

/// Replacement for the operand of a single instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Constant pushed by `iconst_*`, `bipush`, `sipush`, `ldc`, etc.
    Literal(ConstantValue),

    /// Local variable slot of a load, store, or `iinc`
    Local(u16),

    /// Field of a field access
    Field(FieldRef),

    /// Method of an invocation
    Method(MethodRef),

    /// Type of `new`, `checkcast`, `instanceof`, `anewarray`, or `multianewarray`
    Type(RefType<BinaryName>),

    /// Target of a single-target jump
    Target(Label),
}

/// Entry of the exception table, in terms of labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the protected range (inclusive)
    pub start: Label,

    /// End of the protected range (exclusive)
    pub end: Label,

    pub handler: Label,

    /// `None` catches everything (eg. for `finally`)
    pub catch_type: Option<BinaryName>,
}

/// Debug information about a local variable, in terms of labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableRange {
    pub name: String,

    /// Field descriptor (or generic signature if `is_signature`)
    pub descriptor: String,

    pub start: Label,
    pub end: Label,
    pub index: u16,

    /// Comes from `LocalVariableTypeTable` rather than `LocalVariableTable`
    pub is_signature: bool,
}

/// Record of one mutation of a sequence
///
/// Stack effects are counted in slots, as returned by [`Node::stack_slots`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    /// Node next to which the mutation happened (`None` for insertions at the start)
    pub anchor: Option<NodeId>,

    /// Nodes added by the mutation
    pub inserted: Vec<NodeId>,

    /// Nodes taken out of the sequence by the mutation
    pub removed: Vec<NodeId>,

    /// Net stack effect of what was inserted
    pub inserted_effect: i32,

    /// Net stack effect of what was removed (or of the instruction before an operand was
    /// replaced)
    pub removed_effect: i32,
}

impl Edit {
    /// Does the mutation leave the stack depth unchanged for the code that follows it?
    pub fn is_stack_neutral(&self) -> bool {
        self.inserted_effect == self.removed_effect
    }
}

/// Ordered and editable list of nodes making up a method body
///
/// Indices are positions in the current order (pseudo nodes included) and shift as nodes are
/// inserted and removed. [`NodeId`] handles are stable instead. Every mutation done through the
/// public editing methods is recorded as an [`Edit`].
#[derive(Clone, Debug)]
pub struct InstructionSequence {
    /// Node storage, indexed by `NodeId` (removed nodes leave a `None`)
    nodes: Vec<Option<Node>>,

    /// Order of the live nodes
    order: Vec<NodeId>,

    /// Position of every live node in `order`, indexed by `NodeId`
    positions: Vec<Option<usize>>,

    /// Where is every placed label?
    label_nodes: HashMap<Label, NodeId>,

    labels: LabelCounter,

    /// Incremented on every mutation
    version: u64,

    edits: Vec<Edit>,

    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariableRange>,
}

impl Default for InstructionSequence {
    fn default() -> Self {
        InstructionSequence::new()
    }
}

impl InstructionSequence {
    pub fn new() -> InstructionSequence {
        InstructionSequence {
            nodes: vec![],
            order: vec![],
            positions: vec![],
            label_nodes: HashMap::new(),
            labels: LabelCounter::new(),
            version: 0,
            edits: vec![],
            try_catch_blocks: vec![],
            local_variables: vec![],
        }
    }

    /// Fresh label, unique within this sequence
    ///
    /// The label is not placed anywhere until a [`Node::Label`] carrying it is inserted.
    pub fn new_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Append a node without recording an edit
    ///
    /// This is for building up a method body from scratch (or decoding one), not for patching.
    pub fn push(&mut self, node: impl Into<Node>) -> Result<NodeId, Error> {
        let node = node.into();
        self.check_labels(std::slice::from_ref(&node))?;
        let id = self.allocate(node);
        self.positions[id.0 as usize] = Some(self.order.len());
        self.order.push(id);
        self.version += 1;
        Ok(id)
    }

    /// Number of nodes (pseudo nodes included)
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Counter bumped by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mutations recorded so far, in order
    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Has any edit been recorded?
    pub fn is_modified(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Node at a position
    pub fn get(&self, index: usize) -> Option<&Node> {
        self.order
            .get(index)
            .and_then(|id| self.nodes[id.0 as usize].as_ref())
    }

    /// Handle of the node at a position
    pub fn id_at(&self, index: usize) -> Option<NodeId> {
        self.order.get(index).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.positions.get(id.0 as usize), Some(Some(_)))
    }

    /// Current position of a node
    pub fn position(&self, id: NodeId) -> Result<usize, Error> {
        self.positions
            .get(id.0 as usize)
            .copied()
            .flatten()
            .ok_or(Error::MissingNode(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingNode(id))
    }

    pub fn first(&self) -> Option<NodeId> {
        self.order.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.order.last().copied()
    }

    /// Node immediately after
    pub fn next(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        let position = self.position(id)?;
        Ok(self.id_at(position + 1))
    }

    /// Node immediately before
    pub fn previous(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        let position = self.position(id)?;
        Ok(position.checked_sub(1).and_then(|pos| self.id_at(pos)))
    }

    /// Closest following node that is a real instruction
    pub fn next_instruction(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        let position = self.position(id)?;
        Ok(self.instruction_from(position + 1))
    }

    /// Closest preceding node that is a real instruction
    pub fn previous_instruction(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        let position = self.position(id)?;
        Ok(self.order[..position]
            .iter()
            .rev()
            .find(|id| !self.node_unchecked(**id).is_pseudo())
            .copied())
    }

    /// First real instruction at or after a position
    pub fn instruction_from(&self, index: usize) -> Option<NodeId> {
        self.order
            .iter()
            .skip(index)
            .find(|id| !self.node_unchecked(**id).is_pseudo())
            .copied()
    }

    /// Iterate over the nodes in order (use `.rev()` for backwards iteration)
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NodeId, &Node)> + '_ {
        self.order.iter().map(|id| (*id, self.node_unchecked(*id)))
    }

    /// Where is the label placed?
    pub fn label_node(&self, label: Label) -> Option<NodeId> {
        self.label_nodes.get(&label).copied()
    }

    /// Labels that are placed anywhere in the sequence
    pub fn placed_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.label_nodes.keys().copied()
    }

    /// Real instruction a label refers to
    ///
    /// `Ok(None)` means the label is placed at the very end of the code.
    pub fn label_target(&self, label: Label) -> Result<Option<NodeId>, Error> {
        let label_id = self.label_node(label).ok_or(Error::DanglingLabel(label))?;
        let position = self.position(label_id)?;
        Ok(self.instruction_from(position))
    }

    /// Pseudo nodes that apply to a real instruction (the run of pseudo nodes just before it)
    pub fn pseudo_nodes_before(&self, id: NodeId) -> Result<Vec<NodeId>, Error> {
        let position = self.position(id)?;
        let mut group: Vec<NodeId> = self.order[..position]
            .iter()
            .rev()
            .take_while(|id| self.node_unchecked(**id).is_pseudo())
            .copied()
            .collect();
        group.reverse();
        Ok(group)
    }

    /// Insert nodes immediately before the anchor
    ///
    /// The inserted nodes end up between the anchor and any labels, line numbers, or frames that
    /// precede it. Code jumping to those labels will therefore run the inserted nodes.
    pub fn insert_before(
        &mut self,
        anchor: NodeId,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<NodeId>, Error> {
        let position = self.position(anchor)?;
        self.splice(position, Some(anchor), nodes.into_iter().collect(), vec![])
    }

    /// Insert nodes immediately after the anchor
    pub fn insert_after(
        &mut self,
        anchor: NodeId,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<NodeId>, Error> {
        let position = self.position(anchor)?;
        self.splice(position + 1, Some(anchor), nodes.into_iter().collect(), vec![])
    }

    /// Insert nodes at the very start of the method body (before any label)
    pub fn insert_at_start(
        &mut self,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<NodeId>, Error> {
        self.splice(0, None, nodes.into_iter().collect(), vec![])
    }

    /// Replace a node with some other nodes (possibly none), as one edit
    pub fn replace(
        &mut self,
        node: NodeId,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<NodeId>, Error> {
        let position = self.position(node)?;
        self.splice(position, Some(node), nodes.into_iter().collect(), vec![node])
    }

    /// Remove a node
    pub fn remove(&mut self, node: NodeId) -> Result<Node, Error> {
        let removed = self.node(node)?.clone();
        self.replace(node, vec![])?;
        Ok(removed)
    }

    /// Change the operand of an instruction in place
    ///
    /// The node keeps its handle. Replacement literals must have the same width as the original
    /// one (a `long` can't become an `int`).
    pub fn replace_operand(&mut self, id: NodeId, operand: Operand) -> Result<(), Error> {
        let node = self.node(id)?;
        let updated = operand_replaced(node, &operand).ok_or_else(|| Error::OperandMismatch {
            node: id,
            operand: format!("{:?} for {:?}", operand, node),
        })?;
        self.check_labels(std::slice::from_ref(&updated))?;

        let removed_effect = node.stack_effect();
        let inserted_effect = updated.stack_effect();
        self.nodes[id.0 as usize] = Some(updated);
        self.version += 1;
        self.edits.push(Edit {
            anchor: Some(id),
            inserted: vec![id],
            removed: vec![],
            inserted_effect,
            removed_effect,
        });
        Ok(())
    }

    /// Insert a node before another one without recording an edit
    ///
    /// Used for bookkeeping nodes (labels, frames) that don't change what the code does.
    pub(crate) fn insert_unrecorded(&mut self, position: usize, node: Node) -> Result<NodeId, Error> {
        self.check_labels(std::slice::from_ref(&node))?;
        let id = self.allocate(node);
        self.order.insert(position, id);
        self.reindex(position);
        self.version += 1;
        Ok(id)
    }

    fn node_unchecked(&self, id: NodeId) -> &Node {
        // Only called with ids taken from `order`, which are all live
        match &self.nodes[id.0 as usize] {
            Some(node) => node,
            None => unreachable!("{:?} is in the order but was removed", id),
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        if let Node::Label(label) = &node {
            self.label_nodes.insert(*label, id);
        }
        self.nodes.push(Some(node));
        self.positions.push(None);
        id
    }

    /// Check that none of the labels to be placed are already placed
    fn check_labels(&self, nodes: &[Node]) -> Result<(), Error> {
        let mut placing = HashSet::new();
        for label in nodes.iter().filter_map(Node::as_label) {
            if self.label_nodes.contains_key(&label) || !placing.insert(label) {
                return Err(Error::DuplicateLabel(label));
            }
        }
        Ok(())
    }

    /// Recompute positions of the nodes starting at some position
    fn reindex(&mut self, from: usize) {
        for (position, id) in self.order.iter().enumerate().skip(from) {
            self.positions[id.0 as usize] = Some(position);
        }
    }

    fn splice(
        &mut self,
        position: usize,
        anchor: Option<NodeId>,
        nodes: Vec<Node>,
        removed: Vec<NodeId>,
    ) -> Result<Vec<NodeId>, Error> {
        self.check_labels(&nodes)?;

        let mut removed_effect = 0;
        for id in &removed {
            let node = self.nodes[id.0 as usize]
                .take()
                .ok_or(Error::MissingNode(*id))?;
            removed_effect += node.stack_effect();
            if let Node::Label(label) = node {
                self.label_nodes.remove(&label);
            }
            self.positions[id.0 as usize] = None;
        }
        self.order.drain(position..position + removed.len());

        let inserted_effect = nodes.iter().map(Node::stack_effect).sum();
        let inserted: Vec<NodeId> = nodes.into_iter().map(|node| self.allocate(node)).collect();
        self.order
            .splice(position..position, inserted.iter().copied());
        self.reindex(position);
        self.version += 1;

        log::trace!(
            "Edit at {:?}: inserted {:?}, removed {:?}",
            anchor,
            inserted,
            removed
        );
        self.edits.push(Edit {
            anchor,
            inserted: inserted.clone(),
            removed,
            inserted_effect,
            removed_effect,
        });
        Ok(inserted)
    }
}

/// Same node, but with a different operand
fn operand_replaced(node: &Node, operand: &Operand) -> Option<Node> {
    use Instruction::*;

    let insn = match (node, operand) {
        (Node::Branch(branch), Operand::Target(target)) => {
            if branch.jump_targets().len() != 1 {
                return None;
            }
            return branch
                .map_labels(|_| Ok::<Label, ()>(*target))
                .ok()
                .map(Node::Branch);
        }
        (Node::Insn(insn), operand) => (insn, operand),
        _ => return None,
    };

    let updated = match insn {
        (insn, Operand::Literal(value)) => {
            let original = insn.literal()?;
            if original.width() != value.width() {
                return None;
            }
            Instruction::push_constant(value.clone())
        }
        (ILoad(_), Operand::Local(idx)) => ILoad(*idx),
        (LLoad(_), Operand::Local(idx)) => LLoad(*idx),
        (FLoad(_), Operand::Local(idx)) => FLoad(*idx),
        (DLoad(_), Operand::Local(idx)) => DLoad(*idx),
        (ALoad(_), Operand::Local(idx)) => ALoad(*idx),
        (IStore(_), Operand::Local(idx)) => IStore(*idx),
        (LStore(_), Operand::Local(idx)) => LStore(*idx),
        (FStore(_), Operand::Local(idx)) => FStore(*idx),
        (DStore(_), Operand::Local(idx)) => DStore(*idx),
        (AStore(_), Operand::Local(idx)) => AStore(*idx),
        (IInc(_, amount), Operand::Local(idx)) => IInc(*idx, *amount),
        (GetStatic(_), Operand::Field(field)) => GetStatic(field.clone()),
        (PutStatic(_), Operand::Field(field)) => PutStatic(field.clone()),
        (GetField(_), Operand::Field(field)) => GetField(field.clone()),
        (PutField(_), Operand::Field(field)) => PutField(field.clone()),
        (Invoke(invoke_type, _), Operand::Method(method)) => Invoke(*invoke_type, method.clone()),
        (New(_), Operand::Type(RefType::Object(class))) => New(class.clone()),
        (CheckCast(_), Operand::Type(ref_type)) => CheckCast(ref_type.clone()),
        (InstanceOf(_), Operand::Type(ref_type)) => InstanceOf(ref_type.clone()),
        (ANewArray(_), Operand::Type(ref_type)) => ANewArray(ref_type.clone()),
        (MultiANewArray(_, dimensions), Operand::Type(ref_type)) => {
            MultiANewArray(ref_type.clone(), *dimensions)
        }
        _ => return None,
    };
    Some(Node::Insn(updated))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{EqComparison, OrdComparison};

    fn build(nodes: Vec<Node>) -> (InstructionSequence, Vec<NodeId>) {
        let mut seq = InstructionSequence::new();
        let ids = nodes
            .into_iter()
            .map(|node| seq.push(node).unwrap())
            .collect();
        (seq, ids)
    }

    fn nodes(seq: &InstructionSequence) -> Vec<Node> {
        seq.iter().map(|(_, node)| node.clone()).collect()
    }

    #[test]
    fn handles_survive_edits() {
        let (mut seq, ids) = build(vec![
            Instruction::IConst1.into(),
            Instruction::Pop.into(),
            BranchInstruction::Return.into(),
        ]);
        assert!(!seq.is_modified());

        let inserted = seq
            .insert_before(ids[1], vec![Instruction::Nop.into()])
            .unwrap();
        assert_eq!(seq.position(ids[1]).unwrap(), 2);
        assert_eq!(seq.position(inserted[0]).unwrap(), 1);
        assert_eq!(seq.previous(ids[1]).unwrap(), Some(inserted[0]));
        assert_eq!(seq.next(ids[1]).unwrap(), Some(ids[2]));

        seq.remove(inserted[0]).unwrap();
        assert!(matches!(
            seq.position(inserted[0]),
            Err(Error::MissingNode(_))
        ));
        assert_eq!(seq.position(ids[2]).unwrap(), 2);
        assert_eq!(seq.edits().len(), 2);
        assert!(seq.edits().iter().all(Edit::is_stack_neutral));
    }

    #[test]
    fn insert_before_goes_after_labels() {
        let mut seq = InstructionSequence::new();
        let label = seq.new_label();
        seq.push(Node::Label(label)).unwrap();
        seq.push(Node::LineNumber(12)).unwrap();
        let ret = seq.push(BranchInstruction::Return).unwrap();

        seq.insert_before(ret, vec![Instruction::Nop.into()])
            .unwrap();
        seq.insert_at_start(vec![Instruction::IConst0.into(), Instruction::Pop.into()])
            .unwrap();
        assert_eq!(
            nodes(&seq),
            vec![
                Node::Insn(Instruction::IConst0),
                Node::Insn(Instruction::Pop),
                Node::Label(label),
                Node::LineNumber(12),
                Node::Insn(Instruction::Nop),
                Node::Branch(BranchInstruction::Return),
            ]
        );
        assert_eq!(seq.label_target(label).unwrap(), seq.id_at(4));
        assert_eq!(seq.pseudo_nodes_before(ret).unwrap().len(), 0);
    }

    #[test]
    fn labels_are_placed_once() {
        let mut seq = InstructionSequence::new();
        let label = seq.new_label();
        let ret = seq.push(BranchInstruction::Return).unwrap();
        seq.insert_before(ret, vec![Node::Label(label)]).unwrap();
        assert!(matches!(
            seq.insert_after(ret, vec![Node::Label(label)]),
            Err(Error::DuplicateLabel(l)) if l == label
        ));

        let other = seq.new_label();
        assert!(matches!(
            seq.insert_after(ret, vec![Node::Label(other), Node::Label(other)]),
            Err(Error::DuplicateLabel(_))
        ));
        assert_eq!(seq.edits().len(), 1);
    }

    #[test]
    fn stack_effects_are_recorded() {
        let mut seq = InstructionSequence::new();
        let target = seq.new_label();
        let load = seq.push(Instruction::ALoad(0)).unwrap();
        let branch = seq
            .push(BranchInstruction::IfNull(EqComparison::EQ, target))
            .unwrap();
        seq.push(Node::Label(target)).unwrap();
        seq.push(BranchInstruction::Return).unwrap();

        seq.replace(
            branch,
            vec![
                Instruction::IConst1.into(),
                BranchInstruction::IfICmp(OrdComparison::EQ, target).into(),
            ],
        )
        .unwrap();
        let edit = &seq.edits()[0];
        assert_eq!(edit.removed, vec![branch]);
        assert_eq!((edit.inserted_effect, edit.removed_effect), (-1, -1));
        assert!(edit.is_stack_neutral());

        seq.insert_after(load, vec![Instruction::Dup.into()])
            .unwrap();
        assert!(!seq.edits()[1].is_stack_neutral());
    }

    #[test]
    fn operands_are_replaced_in_place() {
        let (mut seq, ids) = build(vec![
            Instruction::Ldc(ConstantValue::Integer(1000)).into(),
            Instruction::LConst0.into(),
            Instruction::ILoad(2).into(),
            BranchInstruction::IReturn.into(),
        ]);

        seq.replace_operand(ids[0], Operand::Literal(ConstantValue::Integer(-1)))
            .unwrap();
        assert_eq!(seq.node(ids[0]).unwrap(), &Node::Insn(Instruction::IConstM1));

        assert!(matches!(
            seq.replace_operand(ids[1], Operand::Literal(ConstantValue::Integer(3))),
            Err(Error::OperandMismatch { .. })
        ));
        assert!(matches!(
            seq.replace_operand(ids[3], Operand::Local(1)),
            Err(Error::OperandMismatch { .. })
        ));

        seq.replace_operand(ids[2], Operand::Local(5)).unwrap();
        assert_eq!(seq.node(ids[2]).unwrap(), &Node::Insn(Instruction::ILoad(5)));
        assert_eq!(seq.edits().len(), 2);
        assert_eq!(seq.len(), 4);
    }

    #[test]
    fn navigation_skips_pseudo_nodes() {
        let mut seq = InstructionSequence::new();
        let label = seq.new_label();
        let first = seq.push(Instruction::IConst0).unwrap();
        seq.push(Node::Label(label)).unwrap();
        seq.push(Node::LineNumber(3)).unwrap();
        let second = seq.push(BranchInstruction::IReturn).unwrap();

        assert_eq!(seq.next_instruction(first).unwrap(), Some(second));
        assert_eq!(seq.previous_instruction(second).unwrap(), Some(first));
        assert_eq!(seq.next_instruction(second).unwrap(), None);
        assert_eq!(
            seq.iter().rev().map(|(id, _)| id).next(),
            Some(second)
        );
    }
}
