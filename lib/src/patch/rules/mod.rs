//! Rules shipped with the patcher, and the mappings they need

mod render_global;
mod tab_overlay;
mod vis_graph;

use super::{Environment, Error, PatchRule, SymbolTable, SymbolTableBuilder};

pub const RENDER_GLOBAL: &str = "net/minecraft/client/renderer/RenderGlobal";
pub const GL_STATE_MANAGER: &str = "net/minecraft/client/renderer/GlStateManager";
pub const VIS_GRAPH: &str = "net/minecraft/client/renderer/chunk/VisGraph";
pub const TAB_OVERLAY: &str = "net/minecraft/client/gui/GuiPlayerTabOverlay";
pub const GUI: &str = "net/minecraft/client/gui/Gui";
pub const PLAYER_MODEL_PARTS: &str = "net/minecraft/entity/player/EnumPlayerModelParts";
pub const NETWORK_PLAYER_INFO: &str = "net/minecraft/client/network/NetworkPlayerInfo";

/// Mappings for every symbol used by [`shipped_rules`]
pub const MAPPINGS: &str = include_str!("mappings.txt");

/// Builder already holding [`MAPPINGS`] (more can be added before building)
pub fn builtin_mappings() -> Result<SymbolTableBuilder, Error> {
    let mut builder = SymbolTable::builder();
    builder.parse_mappings(MAPPINGS)?;
    Ok(builder)
}

pub fn builtin_symbols(environment: Environment) -> Result<SymbolTable, Error> {
    builtin_mappings()?.build(environment)
}

/// Every shipped rule, in the order they get applied
pub fn shipped_rules() -> Vec<PatchRule> {
    let mut rules = render_global::rules();
    rules.extend(vis_graph::rules());
    rules.extend(tab_overlay::rules());
    rules
}
