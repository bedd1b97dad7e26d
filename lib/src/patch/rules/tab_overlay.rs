use super::{GUI, NETWORK_PLAYER_INFO, PLAYER_MODEL_PARTS, TAB_OVERLAY};
use crate::jvm::code::{
    BranchInstruction, EqComparison, Instruction, InstructionSequence, InvokeType, Node,
    OrdComparison,
};
use crate::patch::{
    all_nodes, first_node, last_node, FieldAccess, MethodPatch, PatchContext, PatchRule, Predicate,
    Procedure, ProcedureError, Symbol,
};

const HOOK: &str = "GuiPlayerTabOverlayHook";

pub(super) fn rules() -> Vec<PatchRule> {
    let render_player_list = |apply: MethodPatch| Procedure {
        method: "renderPlayerlist",
        required: true,
        apply,
    };
    vec![
        PatchRule {
            name: "tab-overlay-colors",
            class: TAB_OVERLAY,
            procedures: vec![render_player_list(recolor_backgrounds)],
            class_patch: None,
            symbols: vec![Symbol::Class(GUI), Symbol::Method(GUI, "drawRect")],
        },
        PatchRule {
            name: "tab-overlay-hat-layer",
            class: TAB_OVERLAY,
            procedures: vec![render_player_list(hat_layer_toggle)],
            class_patch: None,
            symbols: vec![
                Symbol::Class(PLAYER_MODEL_PARTS),
                Symbol::Field(PLAYER_MODEL_PARTS, "HAT"),
            ],
        },
        PatchRule {
            name: "tab-overlay-offset",
            class: TAB_OVERLAY,
            procedures: vec![render_player_list(move_tab_down)],
            class_patch: None,
            symbols: vec![],
        },
        PatchRule {
            name: "tab-overlay-number-ping",
            class: TAB_OVERLAY,
            procedures: vec![Procedure {
                method: "drawPing",
                required: true,
                apply: draw_number_ping,
            }],
            class_patch: None,
            symbols: vec![Symbol::Class(NETWORK_PLAYER_INFO)],
        },
    ]
}

/// Pass the color of every background rectangle through the hook
///
/// `drawRect` is inherited from `Gui`, so calls may name any subclass as the owner.
fn recolor_backgrounds(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let draw_rect = Predicate::invokes_named(context.symbols, InvokeType::Static, GUI, "drawRect")?;
    let get_new_color = context.hook(HOOK, "getNewColor", "(I)I")?;

    let calls = all_nodes(code, &draw_rect);
    if calls.is_empty() {
        return Err(ProcedureError::TargetMissing(String::from("call to drawRect")));
    }
    for call in calls {
        code.insert_before(
            call,
            vec![Instruction::Invoke(InvokeType::Static, get_new_color.clone()).into()],
        )?;
    }
    Ok(())
}

/// Draw the hat layer of players without a loaded entity when `layersInTab` is set
///
/// The vanilla check reads `player != null && player.isWearing(HAT)`. The `ifnull` of the first
/// half gets replaced so that a missing player falls back on the flag.
fn hat_layer_toggle(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let missing = |what: &str| ProcedureError::TargetMissing(what.to_owned());

    let hat = Predicate::accesses(
        context.symbols,
        FieldAccess::GetStatic,
        PLAYER_MODEL_PARTS,
        "HAT",
    )?;
    let anchor = first_node(code, &hat).ok_or_else(|| missing("getstatic HAT"))?;

    let null_check = match code.previous_instruction(anchor)? {
        Some(previous) => code.previous_instruction(previous)?,
        None => None,
    }
    .ok_or_else(|| missing("ifnull before HAT"))?;
    if !matches!(
        code.node(null_check)?,
        Node::Branch(BranchInstruction::IfNull(EqComparison::EQ, _))
    ) {
        return Err(missing("ifnull before HAT"));
    }

    let wearing_check = match code.next_instruction(anchor)? {
        Some(next) => code.next_instruction(next)?,
        None => None,
    }
    .ok_or_else(|| missing("branch after HAT"))?;
    let skip_layer = match code.node(wearing_check)?.as_branch() {
        Some(branch) if branch.falls_through() && branch.jump_targets().len() == 1 => {
            branch.jump_targets()[0]
        }
        _ => return Err(missing("branch after HAT")),
    };

    let existing = match code.next(wearing_check)? {
        Some(following) => code.node(following)?.as_label(),
        None => None,
    };
    let draw_layer = match existing {
        Some(label) => label,
        None => {
            let label = code.new_label();
            code.insert_after(wearing_check, vec![Node::Label(label)])?;
            label
        }
    };

    let has_player = code.new_label();
    code.replace(
        null_check,
        vec![
            BranchInstruction::IfNull(EqComparison::NE, has_player).into(),
            Instruction::GetStatic(context.config_flag("layersInTab")?).into(),
            BranchInstruction::If(OrdComparison::EQ, skip_layer).into(),
            BranchInstruction::Goto(draw_layer).into(),
            Node::Label(has_player),
        ],
    )?;
    Ok(())
}

/// Shift the whole list down (the matrix pushed at the start is popped before returning)
fn move_tab_down(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let push = context.hook(HOOK, "moveTabDownPushMatrix", "()V")?;
    let pop = context.hook(HOOK, "moveTabDownPopMatrix", "()V")?;

    // Only the last return gets the pop: an early return (empty player list) leaves the matrix
    // pushed.
    let last_return = last_node(code, &Predicate::exact(BranchInstruction::Return))
        .ok_or_else(|| ProcedureError::TargetMissing(String::from("return")))?;
    code.insert_before(
        last_return,
        vec![Instruction::Invoke(InvokeType::Static, pop).into()],
    )?;
    code.insert_at_start(vec![Instruction::Invoke(InvokeType::Static, push).into()])?;
    Ok(())
}

/// Draw the ping as a number instead of bars when `numberPing` is set
fn draw_number_ping(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let draw_ping = context.hook(
        HOOK,
        "drawPatcherPing",
        &format!("(IIIL{};)V", NETWORK_PLAYER_INFO),
    )?;

    let bars = code.new_label();
    code.insert_at_start(vec![
        Instruction::GetStatic(context.config_flag("numberPing")?).into(),
        BranchInstruction::If(OrdComparison::EQ, bars).into(),
        Instruction::ILoad(1).into(),
        Instruction::ILoad(2).into(),
        Instruction::ILoad(3).into(),
        Instruction::ALoad(4).into(),
        Instruction::Invoke(InvokeType::Static, draw_ping).into(),
        BranchInstruction::Return.into(),
        Node::Label(bars),
    ])?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::test::{call, config_flag, run_patch};
    use super::*;
    use crate::jvm::code::FieldRef;
    use crate::jvm::verifier::{analyze_stack, check_labels, check_stack_neutrality};
    use crate::jvm::{BinaryName, FieldType, Name};
    use crate::patch::Environment;

    const HOOKS: &str = "club/sk1er/patcher/hooks/GuiPlayerTabOverlayHook";

    fn assert_valid(code: &InstructionSequence, parameter_slots: usize) {
        check_stack_neutrality(code).unwrap();
        check_labels(code).unwrap();
        analyze_stack(code, parameter_slots).unwrap();
    }

    fn nodes(code: &InstructionSequence) -> Vec<Node> {
        code.iter().map(|(_, node)| node.clone()).collect()
    }

    fn hat_field() -> Node {
        let owner = BinaryName::from_string(PLAYER_MODEL_PARTS.to_owned()).unwrap();
        Instruction::GetStatic(FieldRef {
            owner: owner.clone(),
            name: Name::from_string(String::from("HAT")).unwrap(),
            descriptor: FieldType::object(owner),
        })
        .into()
    }

    fn is_wearing() -> Node {
        call(
            InvokeType::Virtual,
            "net/minecraft/entity/player/EntityPlayer",
            "func_175148_a",
            "(Lnet/minecraft/entity/player/EnumPlayerModelParts;)Z",
        )
    }

    #[test]
    fn backgrounds_are_recolored() {
        let draw_rect = |owner| call(InvokeType::Static, owner, "func_73734_a", "(IIIII)V");
        let mut code = InstructionSequence::new();
        for owner in [GUI, TAB_OVERLAY] {
            for _ in 0..5 {
                code.push(Instruction::IConst0).unwrap();
            }
            code.push(draw_rect(owner)).unwrap();
        }
        code.push(BranchInstruction::Return).unwrap();

        run_patch(Environment::Obfuscated, TAB_OVERLAY, recolor_backgrounds, &mut code).unwrap();
        assert_valid(&code, 1);

        let hook = call(InvokeType::Static, HOOKS, "getNewColor", "(I)I");
        let nodes = nodes(&code);
        assert_eq!(nodes[5], hook);
        assert_eq!(nodes[6], draw_rect(GUI));
        assert_eq!(nodes[12], hook);
        assert_eq!(nodes[13], draw_rect(TAB_OVERLAY));
    }

    #[test]
    fn hat_layer_falls_back_on_flag() {
        let mut code = InstructionSequence::new();
        let skip = code.new_label();
        code.push(Instruction::ALoad(5)).unwrap();
        code.push(BranchInstruction::IfNull(EqComparison::EQ, skip))
            .unwrap();
        code.push(Instruction::ALoad(5)).unwrap();
        code.push(hat_field()).unwrap();
        code.push(is_wearing()).unwrap();
        code.push(BranchInstruction::If(OrdComparison::EQ, skip))
            .unwrap();
        code.push(Instruction::Nop).unwrap();
        code.push(Node::Label(skip)).unwrap();
        code.push(BranchInstruction::Return).unwrap();

        run_patch(Environment::Obfuscated, TAB_OVERLAY, hat_layer_toggle, &mut code).unwrap();
        assert_valid(&code, 1);

        let nodes = nodes(&code);
        assert_eq!(nodes.len(), 14);
        let has_player = match &nodes[1] {
            Node::Branch(BranchInstruction::IfNull(EqComparison::NE, label)) => *label,
            other => panic!("expected ifnonnull, got {:?}", other),
        };
        assert_eq!(
            nodes[2],
            Node::from(Instruction::GetStatic(config_flag("layersInTab")))
        );
        assert_eq!(
            nodes[3],
            Node::from(BranchInstruction::If(OrdComparison::EQ, skip))
        );
        let draw_layer = match &nodes[4] {
            Node::Branch(BranchInstruction::Goto(label)) => *label,
            other => panic!("expected goto, got {:?}", other),
        };
        assert_eq!(nodes[5], Node::Label(has_player));
        assert_eq!(nodes[7], hat_field());
        assert_eq!(nodes[10], Node::Label(draw_layer));
        assert_eq!(nodes[11], Node::from(Instruction::Nop));
    }

    #[test]
    fn hat_layer_needs_null_check() {
        let mut code = InstructionSequence::new();
        let skip = code.new_label();
        code.push(Instruction::Nop).unwrap();
        code.push(Instruction::ALoad(5)).unwrap();
        code.push(hat_field()).unwrap();
        code.push(is_wearing()).unwrap();
        code.push(BranchInstruction::If(OrdComparison::EQ, skip))
            .unwrap();
        code.push(Node::Label(skip)).unwrap();
        code.push(BranchInstruction::Return).unwrap();

        assert!(matches!(
            run_patch(Environment::Obfuscated, TAB_OVERLAY, hat_layer_toggle, &mut code),
            Err(ProcedureError::TargetMissing(_))
        ));
        assert!(!code.is_modified());
    }

    #[test]
    fn matrix_is_popped_before_last_return() {
        let mut code = InstructionSequence::new();
        let rest = code.new_label();
        code.push(Instruction::ILoad(1)).unwrap();
        code.push(BranchInstruction::If(OrdComparison::NE, rest))
            .unwrap();
        code.push(BranchInstruction::Return).unwrap();
        code.push(Node::Label(rest)).unwrap();
        code.push(Instruction::Nop).unwrap();
        code.push(BranchInstruction::Return).unwrap();

        run_patch(Environment::Obfuscated, TAB_OVERLAY, move_tab_down, &mut code).unwrap();
        assert_valid(&code, 2);

        let nodes = nodes(&code);
        assert_eq!(
            nodes[0],
            call(InvokeType::Static, HOOKS, "moveTabDownPushMatrix", "()V")
        );
        assert_eq!(nodes[3], Node::from(BranchInstruction::Return));
        assert_eq!(
            nodes[6],
            call(InvokeType::Static, HOOKS, "moveTabDownPopMatrix", "()V")
        );
        assert_eq!(nodes[7], Node::from(BranchInstruction::Return));

        let pop = call(InvokeType::Static, HOOKS, "moveTabDownPopMatrix", "()V");
        assert_eq!(nodes.iter().filter(|node| **node == pop).count(), 1);
    }

    #[test]
    fn number_ping() {
        let mut code = InstructionSequence::new();
        code.push(Instruction::Nop).unwrap();
        code.push(BranchInstruction::Return).unwrap();

        run_patch(Environment::Deobfuscated, TAB_OVERLAY, draw_number_ping, &mut code).unwrap();
        assert_valid(&code, 5);

        let nodes = nodes(&code);
        assert_eq!(nodes.len(), 11);
        assert_eq!(
            nodes[0],
            Node::from(Instruction::GetStatic(config_flag("numberPing")))
        );
        assert_eq!(
            nodes[6],
            call(
                InvokeType::Static,
                HOOKS,
                "drawPatcherPing",
                "(IIILnet/minecraft/client/network/NetworkPlayerInfo;)V"
            )
        );
        assert!(matches!(nodes[8], Node::Label(_)));
    }
}
