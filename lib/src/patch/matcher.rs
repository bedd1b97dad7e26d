use super::{Error, SymbolTable};
use crate::jvm;
use crate::jvm::code::{
    ConstantValue, Instruction, InstructionSequence, InvokeType, Node, NodeId, OpcodeCategory,
};
use crate::jvm::{BinaryName, Name, RefType, UnqualifiedName};
use std::ops::Not;

/// Field instructions
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldAccess {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

/// Shape of the instructions to look for
///
/// Symbolic predicates are built from canonical names, which get resolved through the
/// [`SymbolTable`] when the predicate is made. The same predicate definition therefore matches
/// both obfuscated and deobfuscated binaries.
#[derive(Clone, Debug)]
pub enum Predicate {
    /// Matches every node (pseudo nodes included)
    Any,

    Category(OpcodeCategory),

    /// Instruction pushing this constant (floating point values are compared bit for bit)
    Literal(ConstantValue),

    /// Load, store, or increment of a local variable slot
    Local(OpcodeCategory, u16),

    /// Method call, by resolved name
    Invoke {
        invoke_type: Option<InvokeType>,

        /// Class in the method reference (`None` matches any owner)
        owner: Option<BinaryName>,
        name: UnqualifiedName,
    },

    /// Field access, by resolved name
    Field {
        access: FieldAccess,
        owner: Option<BinaryName>,
        name: UnqualifiedName,
    },

    /// Node equal to this one
    Exact(Node),

    /// The first predicate matches, and the next real instruction matches the second
    FollowedBy(Box<Predicate>, Box<Predicate>),

    /// The first predicate matches, and the previous real instruction matches the second
    PrecededBy(Box<Predicate>, Box<Predicate>),

    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Call to a method, matched by its resolved owner and name
    pub fn invokes(
        symbols: &SymbolTable,
        invoke_type: InvokeType,
        owner: &str,
        name: &str,
    ) -> Result<Predicate, Error> {
        let resolved_owner = make_name(symbols.resolve_class(owner)?)?;
        Ok(Predicate::Invoke {
            invoke_type: Some(invoke_type),
            owner: Some(resolved_owner),
            name: make_name(symbols.resolve_method(owner, name)?)?,
        })
    }

    /// Call to a method, matched by its resolved name only
    ///
    /// The owner is still needed to resolve the name, but calls through subclasses (where the
    /// method reference names the subclass) match too.
    pub fn invokes_named(
        symbols: &SymbolTable,
        invoke_type: InvokeType,
        owner: &str,
        name: &str,
    ) -> Result<Predicate, Error> {
        Ok(Predicate::Invoke {
            invoke_type: Some(invoke_type),
            owner: None,
            name: make_name(symbols.resolve_method(owner, name)?)?,
        })
    }

    /// Access to a field, matched by its resolved owner and name
    pub fn accesses(
        symbols: &SymbolTable,
        access: FieldAccess,
        owner: &str,
        name: &str,
    ) -> Result<Predicate, Error> {
        let resolved_owner = make_name(symbols.resolve_class(owner)?)?;
        Ok(Predicate::Field {
            access,
            owner: Some(resolved_owner),
            name: make_name(symbols.resolve_field(owner, name)?)?,
        })
    }

    pub fn exact(node: impl Into<Node>) -> Predicate {
        Predicate::Exact(node.into())
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn followed_by(self, next: Predicate) -> Predicate {
        Predicate::FollowedBy(Box::new(self), Box::new(next))
    }

    pub fn preceded_by(self, previous: Predicate) -> Predicate {
        Predicate::PrecededBy(Box::new(self), Box::new(previous))
    }

    /// Does the node at a position match?
    pub fn matches(&self, sequence: &InstructionSequence, position: usize) -> bool {
        let node = match sequence.get(position) {
            Some(node) => node,
            None => return false,
        };
        match self {
            Predicate::Any => true,
            Predicate::Category(category) => node.category() == *category,
            Predicate::Literal(value) => node
                .as_instruction()
                .and_then(Instruction::literal)
                .map_or(false, |literal| literal.same_literal(value)),
            Predicate::Local(category, slot) => node.as_instruction().map_or(false, |insn| {
                insn.category() == *category && insn.local_slot() == Some(*slot)
            }),
            Predicate::Invoke {
                invoke_type,
                owner,
                name,
            } => match node {
                Node::Insn(Instruction::Invoke(actual_type, method)) => {
                    invoke_type.map_or(true, |expected| expected == *actual_type)
                        && owner.as_ref().map_or(true, |owner| {
                            matches!(&method.owner, RefType::Object(class) if class == owner)
                        })
                        && method.name == *name
                }
                _ => false,
            },
            Predicate::Field {
                access,
                owner,
                name,
            } => {
                let (actual_access, field) = match node {
                    Node::Insn(Instruction::GetStatic(field)) => (FieldAccess::GetStatic, field),
                    Node::Insn(Instruction::PutStatic(field)) => (FieldAccess::PutStatic, field),
                    Node::Insn(Instruction::GetField(field)) => (FieldAccess::GetField, field),
                    Node::Insn(Instruction::PutField(field)) => (FieldAccess::PutField, field),
                    _ => return false,
                };
                actual_access == *access
                    && owner.as_ref().map_or(true, |owner| field.owner == *owner)
                    && field.name == *name
            }
            Predicate::Exact(expected) => same_node(node, expected),
            Predicate::FollowedBy(this, next) => {
                this.matches(sequence, position)
                    && next_instruction(sequence, position)
                        .map_or(false, |next_position| next.matches(sequence, next_position))
            }
            Predicate::PrecededBy(this, previous) => {
                this.matches(sequence, position)
                    && previous_instruction(sequence, position).map_or(false, |previous_position| {
                        previous.matches(sequence, previous_position)
                    })
            }
            Predicate::And(left, right) => {
                left.matches(sequence, position) && right.matches(sequence, position)
            }
            Predicate::Or(left, right) => {
                left.matches(sequence, position) || right.matches(sequence, position)
            }
            Predicate::Not(inner) => !inner.matches(sequence, position),
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

fn make_name<N: Name>(name: &str) -> Result<N, Error> {
    N::from_string(name.to_owned()).map_err(Error::MalformedName)
}

/// Equality of nodes, with constants compared bit for bit
fn same_node(node: &Node, expected: &Node) -> bool {
    match (node, expected) {
        (Node::Insn(insn), Node::Insn(expected_insn)) => {
            match (insn.literal(), expected_insn.literal()) {
                (Some(literal), Some(expected_literal)) => literal.same_literal(&expected_literal),
                _ => insn == expected_insn,
            }
        }
        _ => node == expected,
    }
}

/// Position of the closest real instruction after a position
fn next_instruction(sequence: &InstructionSequence, position: usize) -> Option<usize> {
    sequence
        .instruction_from(position + 1)
        .and_then(|id| sequence.position(id).ok())
}

/// Position of the closest real instruction before a position
fn previous_instruction(sequence: &InstructionSequence, position: usize) -> Option<usize> {
    (0..position)
        .rev()
        .find(|previous| sequence.get(*previous).map_or(false, |node| !node.is_pseudo()))
}

/// Lowest position where the predicate holds
pub fn find_first(sequence: &InstructionSequence, predicate: &Predicate) -> Option<usize> {
    (0..sequence.len()).find(|position| predicate.matches(sequence, *position))
}

/// Lowest position strictly after `after` where the predicate holds
pub fn find_next(
    sequence: &InstructionSequence,
    after: usize,
    predicate: &Predicate,
) -> Option<usize> {
    (after + 1..sequence.len()).find(|position| predicate.matches(sequence, *position))
}

/// Highest position where the predicate holds
pub fn find_last(sequence: &InstructionSequence, predicate: &Predicate) -> Option<usize> {
    (0..sequence.len())
        .rev()
        .find(|position| predicate.matches(sequence, *position))
}

/// Every position where the predicate holds, in order
pub fn find_all(sequence: &InstructionSequence, predicate: &Predicate) -> Vec<usize> {
    (0..sequence.len())
        .filter(|position| predicate.matches(sequence, *position))
        .collect()
}

/// Like [`find_first`], but returning a stable handle
pub fn first_node(sequence: &InstructionSequence, predicate: &Predicate) -> Option<NodeId> {
    find_first(sequence, predicate).and_then(|position| sequence.id_at(position))
}

/// Like [`find_last`], but returning a stable handle
pub fn last_node(sequence: &InstructionSequence, predicate: &Predicate) -> Option<NodeId> {
    find_last(sequence, predicate).and_then(|position| sequence.id_at(position))
}

/// Like [`find_all`], but returning stable handles
///
/// Unlike positions, the handles stay valid while the matches are being edited.
pub fn all_nodes(sequence: &InstructionSequence, predicate: &Predicate) -> Vec<NodeId> {
    find_all(sequence, predicate)
        .into_iter()
        .filter_map(|position| sequence.id_at(position))
        .collect()
}

/// First match after a node
pub fn next_node(
    sequence: &InstructionSequence,
    after: NodeId,
    predicate: &Predicate,
) -> Result<Option<NodeId>, jvm::Error> {
    let position = sequence.position(after)?;
    Ok(find_next(sequence, position, predicate).and_then(|position| sequence.id_at(position)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BranchInstruction, MethodRef};
    use crate::jvm::{MethodDescriptor, ParseDescriptor};
    use crate::patch::Environment;

    fn symbols(environment: Environment) -> SymbolTable {
        SymbolTable::builder()
            .class("a/Gl", "a/Gl")
            .class("a/Renderer", "xy")
            .method("a/Gl", "enableBlend", "func_1")
            .field("a/Renderer", "ticks", "field_2")
            .build(environment)
            .unwrap()
    }

    fn call(owner: &str, name: &str) -> Node {
        Instruction::Invoke(
            InvokeType::Static,
            MethodRef {
                owner: RefType::from_class_name(owner).unwrap(),
                name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
                descriptor: MethodDescriptor::parse("()V").unwrap(),
                is_interface: false,
            },
        )
        .into()
    }

    fn sequence(nodes: Vec<Node>) -> InstructionSequence {
        let mut sequence = InstructionSequence::new();
        for node in nodes {
            sequence.push(node).unwrap();
        }
        sequence
    }

    /// Deterministic pseudo-random numbers (xorshift)
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn first_match_is_lowest() {
        let mut rng = Rng(0x5eed);
        let palette = [
            Instruction::IConst0,
            Instruction::IConst1,
            Instruction::Ldc(ConstantValue::Float(-3.0)),
            Instruction::Pop,
            Instruction::ILoad(2),
        ];
        let predicate = Predicate::Literal(ConstantValue::Float(-3.0));

        for _ in 0..200 {
            let length = (rng.next() % 12) as usize;
            let insns: Vec<Instruction> = (0..length)
                .map(|_| palette[(rng.next() % palette.len() as u64) as usize].clone())
                .collect();
            let expected = insns
                .iter()
                .position(|insn| *insn == Instruction::Ldc(ConstantValue::Float(-3.0)));
            let seq = sequence(insns.into_iter().map(Node::from).collect());

            assert_eq!(find_first(&seq, &predicate), expected);
            let all = find_all(&seq, &predicate);
            assert_eq!(all.first().copied(), expected);
            assert_eq!(find_last(&seq, &predicate), all.last().copied());
            if let Some(first) = expected {
                assert_eq!(find_next(&seq, first, &predicate), all.get(1).copied());
            }
        }
    }

    #[test]
    fn literals_compare_bits() {
        let seq = sequence(vec![
            Instruction::FConst0.into(),
            Instruction::Ldc(ConstantValue::Float(-0.0)).into(),
            Instruction::BiPush(7).into(),
        ]);
        assert_eq!(
            find_first(&seq, &Predicate::Literal(ConstantValue::Float(-0.0))),
            Some(1)
        );
        assert_eq!(
            find_first(&seq, &Predicate::Literal(ConstantValue::Integer(7))),
            Some(2)
        );
        assert_eq!(
            find_first(&seq, &Predicate::exact(Instruction::Ldc(ConstantValue::Float(0.0)))),
            Some(0)
        );
    }

    #[test]
    fn symbols_match_after_resolution() {
        let obfuscated = sequence(vec![call("a/Gl", "func_1"), call("a/Sub", "func_1")]);
        let deobfuscated = sequence(vec![call("a/Gl", "enableBlend")]);

        let table = symbols(Environment::Obfuscated);
        let predicate = Predicate::invokes(&table, InvokeType::Static, "a/Gl", "enableBlend").unwrap();
        assert_eq!(find_all(&obfuscated, &predicate), vec![0]);
        assert_eq!(find_first(&deobfuscated, &predicate), None);
        let by_name =
            Predicate::invokes_named(&table, InvokeType::Static, "a/Gl", "enableBlend").unwrap();
        assert_eq!(find_all(&obfuscated, &by_name), vec![0, 1]);
        assert!(matches!(
            Predicate::invokes(&table, InvokeType::Static, "a/Gl", "disableBlend"),
            Err(Error::UnknownSymbol { .. })
        ));

        let table = symbols(Environment::Deobfuscated);
        let predicate = Predicate::invokes(&table, InvokeType::Static, "a/Gl", "enableBlend").unwrap();
        assert_eq!(find_first(&deobfuscated, &predicate), Some(0));
        assert_eq!(find_first(&obfuscated, &predicate), None);
    }

    #[test]
    fn field_owners_are_resolved() {
        let table = symbols(Environment::Obfuscated);
        let field = crate::jvm::code::FieldRef {
            owner: BinaryName::from_string(String::from("xy")).unwrap(),
            name: UnqualifiedName::from_string(String::from("field_2")).unwrap(),
            descriptor: crate::jvm::FieldType::int(),
        };
        let seq = sequence(vec![
            Instruction::PutField(field.clone()).into(),
            Instruction::GetField(field).into(),
        ]);
        let predicate =
            Predicate::accesses(&table, FieldAccess::GetField, "a/Renderer", "ticks").unwrap();
        assert_eq!(find_first(&seq, &predicate), Some(1));
    }

    #[test]
    fn neighbours_skip_pseudo_nodes() {
        let mut seq = InstructionSequence::new();
        let label = seq.new_label();
        seq.push(Instruction::Ldc(ConstantValue::Float(-3.0))).unwrap();
        seq.push(Node::Label(label)).unwrap();
        seq.push(Node::LineNumber(40)).unwrap();
        seq.push(Instruction::Ldc(ConstantValue::Float(-3.0))).unwrap();
        seq.push(BranchInstruction::Return).unwrap();

        let minus_three = Predicate::Literal(ConstantValue::Float(-3.0));
        let followed = minus_three
            .clone()
            .followed_by(Predicate::Category(OpcodeCategory::Constant));
        assert_eq!(find_all(&seq, &followed), vec![0]);

        let preceded = minus_three
            .clone()
            .preceded_by(Predicate::Category(OpcodeCategory::Constant));
        assert_eq!(find_all(&seq, &preceded), vec![3]);

        let either = Predicate::Category(OpcodeCategory::Return).or(followed);
        assert_eq!(find_all(&seq, &either), vec![0, 4]);
        let real_non_constant = !Predicate::Category(OpcodeCategory::Constant)
            .or(Predicate::Category(OpcodeCategory::Label))
            .or(Predicate::Category(OpcodeCategory::LineNumber));
        assert_eq!(find_all(&seq, &real_non_constant), vec![4]);
    }

    #[test]
    fn handles() {
        let mut seq = sequence(vec![
            Instruction::ILoad(1).into(),
            Instruction::IStore(2).into(),
            Instruction::ILoad(2).into(),
            BranchInstruction::IReturn.into(),
        ]);
        let loads = Predicate::Local(OpcodeCategory::Load, 2);
        let load = first_node(&seq, &loads).unwrap();
        assert_eq!(seq.position(load).unwrap(), 2);

        let store = first_node(&seq, &Predicate::Local(OpcodeCategory::Store, 2)).unwrap();
        assert_eq!(next_node(&seq, store, &loads).unwrap(), Some(load));
        assert_eq!(
            last_node(&seq, &Predicate::Category(OpcodeCategory::Load)),
            Some(load)
        );

        seq.insert_before(store, vec![Instruction::Nop.into()]).unwrap();
        assert_eq!(all_nodes(&seq, &loads), vec![load]);
        assert_eq!(find_first(&seq, &loads), Some(3));

        seq.remove(store).unwrap();
        assert!(next_node(&seq, store, &loads).is_err());
    }
}
