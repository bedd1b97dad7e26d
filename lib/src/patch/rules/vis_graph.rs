use super::VIS_GRAPH;
use crate::jvm::model::ClassUnit;
use crate::jvm::{FieldAccessFlags, FieldType};
use crate::patch::{member_name, PatchContext, PatchRule, ProcedureError};

/// Field set by `visibility-scan-limit` (read by the hooked flood fill)
const LIMIT_SCAN: &str = "patcherLimitScan";

pub(super) fn rules() -> Vec<PatchRule> {
    vec![PatchRule {
        name: "vis-graph-scan-flag",
        class: VIS_GRAPH,
        procedures: vec![],
        class_patch: Some(add_scan_flag),
        symbols: vec![],
    }]
}

fn add_scan_flag(
    _context: &PatchContext<'_>,
    class: &mut ClassUnit,
) -> Result<(), ProcedureError> {
    if class.has_field(LIMIT_SCAN) {
        log::debug!("{} already has {}", class.display_name(), LIMIT_SCAN);
        return Ok(());
    }
    class.add_field(
        FieldAccessFlags::PUBLIC,
        member_name(LIMIT_SCAN)?,
        FieldType::boolean(),
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ClassFile, ConstantPool, Version};
    use crate::jvm::{ClassAccessFlags, RefType};
    use crate::patch::rules::builtin_symbols;
    use crate::patch::{Environment, FailurePolicy, PatchEngine, Settings};

    fn empty_class(name: &str) -> Vec<u8> {
        let mut constants = ConstantPool::new();
        let this_class = constants
            .get_class(&RefType::from_class_name(name).unwrap())
            .unwrap();
        let super_class = constants
            .get_class(&RefType::from_class_name("java/lang/Object").unwrap())
            .unwrap();
        ClassFile {
            version: Version::JAVA6,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn flag_is_added_once() {
        let engine = PatchEngine::new(
            Settings::new(FailurePolicy::FailClosed, Environment::Obfuscated).unwrap(),
            builtin_symbols(Environment::Obfuscated).unwrap(),
            rules(),
        )
        .unwrap();
        let transformation = engine
            .transform_class(VIS_GRAPH, &empty_class(VIS_GRAPH))
            .unwrap();
        assert_eq!(transformation.applied, vec!["vis-graph-scan-flag"]);

        let mut class = ClassUnit::parse(&transformation.bytes).unwrap();
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].descriptor, FieldType::boolean());
        assert!(class.fields[0].access_flags.contains(FieldAccessFlags::PUBLIC));

        let symbols = builtin_symbols(Environment::Obfuscated).unwrap();
        let settings = Settings::new(FailurePolicy::FailClosed, Environment::Obfuscated).unwrap();
        let binary_name = class.binary_name.clone();
        let context = PatchContext {
            symbols: &symbols,
            settings: &settings,
            class: &binary_name,
        };
        add_scan_flag(&context, &mut class).unwrap();
        assert_eq!(class.fields.len(), 1);
        assert!(!class.is_modified());
    }
}
