use super::{GL_STATE_MANAGER, RENDER_GLOBAL, VIS_GRAPH};
use crate::jvm;
use crate::jvm::code::{
    BranchInstruction, ConstantValue, FieldRef, Instruction, InstructionSequence, InvokeType,
    Node, NodeId, OpcodeCategory, Operand, OrdComparison,
};
use crate::jvm::Name;
use crate::patch::{
    all_nodes, first_node, next_node, PatchContext, PatchRule, Predicate, Procedure,
    ProcedureError, Symbol,
};

pub(super) fn rules() -> Vec<PatchRule> {
    vec![
        PatchRule {
            name: "cloud-renderer",
            class: RENDER_GLOBAL,
            procedures: vec![Procedure {
                method: "renderClouds",
                required: true,
                apply: delegate_cloud_rendering,
            }],
            class_patch: None,
            symbols: vec![Symbol::Field(RENDER_GLOBAL, "cloudTickCounter")],
        },
        PatchRule {
            name: "cloud-transparency",
            class: RENDER_GLOBAL,
            procedures: vec![
                Procedure {
                    method: "renderClouds",
                    required: true,
                    apply: remove_cloud_transparency,
                },
                Procedure {
                    method: "renderCloudsFancy",
                    required: true,
                    apply: remove_cloud_transparency,
                },
            ],
            class_patch: None,
            symbols: vec![
                Symbol::Class(GL_STATE_MANAGER),
                Symbol::Method(GL_STATE_MANAGER, "enableBlend"),
                Symbol::Method(GL_STATE_MANAGER, "disableBlend"),
                Symbol::Method(GL_STATE_MANAGER, "tryBlendFuncSeparate"),
            ],
        },
        PatchRule {
            name: "damaged-block-offset",
            class: RENDER_GLOBAL,
            procedures: vec![Procedure {
                method: "preRenderDamagedBlocks",
                required: true,
                apply: move_damaged_block_overlay,
            }],
            class_patch: None,
            symbols: vec![],
        },
        PatchRule {
            name: "visibility-scan-limit",
            class: RENDER_GLOBAL,
            procedures: vec![Procedure {
                method: "getVisibleFacings",
                required: true,
                apply: limit_visibility_scan,
            }],
            class_patch: None,
            symbols: vec![Symbol::Class(VIS_GRAPH)],
        },
    ]
}

/// Let the cloud handler render clouds, and return early if it did
fn delegate_cloud_rendering(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let settings = context.settings;
    let main_class = &settings.main_class;
    let handler_class = &settings.cloud_handler_class;

    let instance = context.unmapped_field_ref(
        main_class,
        "instance",
        &format!("L{};", main_class.as_str()),
    )?;
    let get_handler = context.unmapped_method_ref(
        main_class,
        "getCloudHandler",
        &format!("()L{};", handler_class.as_str()),
    )?;
    let tick_counter = context.field_ref(RENDER_GLOBAL, "cloudTickCounter", "I")?;
    let render = context.unmapped_method_ref(handler_class, "renderClouds", "(IF)Z")?;

    let vanilla = code.new_label();
    code.insert_at_start(vec![
        Instruction::GetStatic(instance).into(),
        Instruction::Invoke(InvokeType::Virtual, get_handler).into(),
        Instruction::ALoad(0).into(),
        Instruction::GetField(tick_counter).into(),
        Instruction::FLoad(1).into(),
        Instruction::Invoke(InvokeType::Virtual, render).into(),
        BranchInstruction::If(OrdComparison::EQ, vanilla).into(),
        BranchInstruction::Return.into(),
        Node::Label(vanilla),
    ])?;
    Ok(())
}

/// Skip blending when `removeCloudTransparency` is set
///
/// The guard in front of `enableBlend` also skips the `tryBlendFuncSeparate` that goes with it.
fn remove_cloud_transparency(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let symbols = context.symbols;
    let enable = Predicate::invokes(symbols, InvokeType::Static, GL_STATE_MANAGER, "enableBlend")?;
    let disable =
        Predicate::invokes(symbols, InvokeType::Static, GL_STATE_MANAGER, "disableBlend")?;
    let blend_func = Predicate::invokes(
        symbols,
        InvokeType::Static,
        GL_STATE_MANAGER,
        "tryBlendFuncSeparate",
    )?;
    let flag = context.config_flag("removeCloudTransparency")?;

    let enable_calls = all_nodes(code, &enable);
    if enable_calls.is_empty() {
        return Err(ProcedureError::TargetMissing(String::from(
            "call to enableBlend",
        )));
    }

    for call in enable_calls {
        let next_enable = next_node(code, call, &enable)?;
        let end = match next_node(code, call, &blend_func)? {
            Some(blend) => match next_enable {
                Some(next) if code.position(next)? < code.position(blend)? => call,
                _ => blend,
            },
            None => call,
        };
        skip_when_set(code, &flag, call, end)?;
    }
    for call in all_nodes(code, &disable) {
        skip_when_set(code, &flag, call, call)?;
    }
    Ok(())
}

/// Jump over `first..=last` when a flag is set
fn skip_when_set(
    code: &mut InstructionSequence,
    flag: &FieldRef,
    first: NodeId,
    last: NodeId,
) -> Result<(), jvm::Error> {
    let skip = code.new_label();
    code.insert_before(
        first,
        vec![
            Instruction::GetStatic(flag.clone()).into(),
            BranchInstruction::If(OrdComparison::NE, skip).into(),
        ],
    )?;
    code.insert_after(last, vec![Node::Label(skip)])?;
    Ok(())
}

/// Bring the block breaking overlay closer to the block
///
/// The polygon offset of `-3.0` comes in pairs (`glPolygonOffset(-3.0F, -3.0F)`): the first one
/// becomes `-1.0` and the second `-10.0`.
fn move_damaged_block_overlay(
    _context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let offset = Predicate::Literal(ConstantValue::Float(-3.0));
    let before_constant = offset
        .clone()
        .followed_by(Predicate::Category(OpcodeCategory::Constant));

    let mut rewrites = vec![];
    for node in all_nodes(code, &offset) {
        let position = code.position(node)?;
        let value = if before_constant.matches(code, position) {
            -1.0
        } else {
            -10.0
        };
        rewrites.push((node, value));
    }
    if rewrites.is_empty() {
        return Err(ProcedureError::TargetMissing(String::from("ldc -3.0f")));
    }

    for (node, value) in rewrites {
        code.replace_operand(node, Operand::Literal(ConstantValue::Float(value)))?;
    }
    Ok(())
}

/// Flag the fresh `VisGraph` (local 2) so that it stops scanning early
fn limit_visibility_scan(
    context: &PatchContext<'_>,
    code: &mut InstructionSequence,
) -> Result<(), ProcedureError> {
    let store = first_node(code, &Predicate::exact(Instruction::AStore(2)))
        .ok_or_else(|| ProcedureError::TargetMissing(String::from("astore 2")))?;
    let vis_graph = context.class_name(VIS_GRAPH)?;
    let limit_scan = context.unmapped_field_ref(&vis_graph, "patcherLimitScan", "Z")?;
    code.insert_after(
        store,
        vec![
            Instruction::ALoad(2).into(),
            Instruction::IConst1.into(),
            Instruction::PutField(limit_scan).into(),
        ],
    )?;
    Ok(())
}
