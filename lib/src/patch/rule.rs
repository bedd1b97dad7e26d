use super::{Error, Settings, Symbol, SymbolTable};
use crate::jvm;
use crate::jvm::code::{FieldRef, InstructionSequence, MethodRef};
use crate::jvm::model::ClassUnit;
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType, UnqualifiedName,
};
use std::fmt;

/// Why a procedure couldn't patch its method
#[derive(Debug)]
pub enum ProcedureError {
    /// An anchor the procedure needs wasn't found (names what was looked for)
    TargetMissing(String),

    /// Editing the instruction sequence failed
    Edit(jvm::Error),

    /// A name didn't resolve
    Symbol(Error),
}

impl From<jvm::Error> for ProcedureError {
    fn from(err: jvm::Error) -> ProcedureError {
        ProcedureError::Edit(err)
    }
}

impl From<Error> for ProcedureError {
    fn from(err: Error) -> ProcedureError {
        ProcedureError::Symbol(err)
    }
}

/// Patch of one method body
pub type MethodPatch =
    fn(&PatchContext<'_>, &mut InstructionSequence) -> Result<(), ProcedureError>;

/// Patch of the class itself (eg. adding fields)
pub type ClassPatch = fn(&PatchContext<'_>, &mut ClassUnit) -> Result<(), ProcedureError>;

/// Method body patch, keyed by the canonical name of the method
#[derive(Clone)]
pub struct Procedure {
    pub method: &'static str,

    /// Is it an error for the class not to have this method?
    pub required: bool,

    pub apply: MethodPatch,
}

/// Declarative unit of patching
///
/// A rule targets one class (by canonical name). Its procedures run on every method of that
/// class whose name matches, in order. Everything the rule resolves through the symbol table must
/// be listed in `symbols`, so that missing mappings are caught before any class gets patched.
#[derive(Clone)]
pub struct PatchRule {
    /// Unique name of the rule (recorded in patched classes)
    pub name: &'static str,

    /// Canonical name of the targeted class
    pub class: &'static str,

    pub procedures: Vec<Procedure>,

    /// Runs before the procedures
    pub class_patch: Option<ClassPatch>,

    /// Symbols used by the procedures
    pub symbols: Vec<Symbol>,
}

impl PatchRule {
    /// Symbols that need to resolve for the rule to work (targets included)
    pub fn required_symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        std::iter::once(Symbol::Class(self.class))
            .chain(
                self.procedures
                    .iter()
                    .map(move |procedure| Symbol::Method(self.class, procedure.method)),
            )
            .chain(self.symbols.iter().cloned())
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("method", &self.method)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for PatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRule")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("procedures", &self.procedures)
            .field("has_class_patch", &self.class_patch.is_some())
            .field("symbols", &self.symbols)
            .finish()
    }
}

/// What procedures get to see while they run
pub struct PatchContext<'a> {
    pub symbols: &'a SymbolTable,
    pub settings: &'a Settings,

    /// Class being patched, as named in the binary
    pub class: &'a BinaryName,
}

impl<'a> PatchContext<'a> {
    /// Class, resolved from its canonical name
    pub fn class_name(&self, canonical: &str) -> Result<BinaryName, ProcedureError> {
        Ok(make_name(self.symbols.resolve_class(canonical)?)?)
    }

    /// Method of a mapped class, with the descriptor remapped
    pub fn method_ref(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodRef, ProcedureError> {
        let name = make_name(self.symbols.resolve_method(owner, name)?)?;
        Ok(MethodRef {
            owner: RefType::Object(self.class_name(owner)?),
            name,
            descriptor: self.method_descriptor(descriptor)?,
            is_interface: false,
        })
    }

    /// Field of a mapped class, with the descriptor remapped
    pub fn field_ref(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRef, ProcedureError> {
        let name = make_name(self.symbols.resolve_field(owner, name)?)?;
        Ok(FieldRef {
            owner: self.class_name(owner)?,
            name,
            descriptor: self.field_type(descriptor)?,
        })
    }

    /// Method of a class that isn't mapped (eg. a hook), with the descriptor remapped
    pub fn unmapped_method_ref(
        &self,
        owner: &BinaryName,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodRef, ProcedureError> {
        Ok(MethodRef {
            owner: RefType::Object(owner.clone()),
            name: make_name(name)?,
            descriptor: self.method_descriptor(descriptor)?,
            is_interface: false,
        })
    }

    /// Field of a class that isn't mapped, with the descriptor remapped
    pub fn unmapped_field_ref(
        &self,
        owner: &BinaryName,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRef, ProcedureError> {
        Ok(FieldRef {
            owner: owner.clone(),
            name: make_name(name)?,
            descriptor: self.field_type(descriptor)?,
        })
    }

    /// Static boolean configuration flag
    pub fn config_flag(&self, flag: &str) -> Result<FieldRef, ProcedureError> {
        self.unmapped_field_ref(&self.settings.config_class, flag, "Z")
    }

    /// Static method on a hook class
    pub fn hook(
        &self,
        hook_class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodRef, ProcedureError> {
        let owner = self.settings.hook_class(hook_class)?;
        self.unmapped_method_ref(&owner, name, descriptor)
    }

    fn method_descriptor(
        &self,
        canonical: &str,
    ) -> Result<MethodDescriptor<BinaryName>, ProcedureError> {
        let remapped = self.symbols.remap_descriptor(canonical)?;
        MethodDescriptor::parse(&remapped).map_err(|err| ProcedureError::Edit(err.into()))
    }

    fn field_type(&self, canonical: &str) -> Result<FieldType<BinaryName>, ProcedureError> {
        let remapped = self.symbols.remap_descriptor(canonical)?;
        FieldType::parse(&remapped).map_err(|err| ProcedureError::Edit(err.into()))
    }
}

fn make_name<N: Name>(name: &str) -> Result<N, Error> {
    N::from_string(name.to_owned()).map_err(Error::MalformedName)
}

/// Name as an [`UnqualifiedName`], for procedures adding members
pub fn member_name(name: &str) -> Result<UnqualifiedName, ProcedureError> {
    Ok(make_name(name)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::{Environment, FailurePolicy};

    #[test]
    fn references_are_resolved() {
        let symbols = SymbolTable::builder()
            .class("a/Player", "bdc")
            .class("a/Renderer", "a/Renderer")
            .method("a/Renderer", "render", "func_1")
            .field("a/Renderer", "ticks", "field_2")
            .build(Environment::Obfuscated)
            .unwrap();
        let settings = Settings::new(FailurePolicy::FailOpen, Environment::Obfuscated).unwrap();
        let class = BinaryName::from_string(String::from("a/Renderer")).unwrap();
        let context = PatchContext {
            symbols: &symbols,
            settings: &settings,
            class: &class,
        };

        let method = context.method_ref("a/Renderer", "render", "(La/Player;)V").unwrap();
        assert_eq!(method.name.as_str(), "func_1");
        assert_eq!(method.descriptor.parameters, vec![FieldType::object(
            BinaryName::from_string(String::from("bdc")).unwrap()
        )]);

        let field = context.field_ref("a/Renderer", "ticks", "I").unwrap();
        assert_eq!(field.name.as_str(), "field_2");

        let hook = context.hook("TabHook", "getNewColor", "(I)I").unwrap();
        assert_eq!(
            hook.owner,
            RefType::from_class_name("club/sk1er/patcher/hooks/TabHook").unwrap()
        );

        let flag = context.config_flag("numberPing").unwrap();
        assert_eq!(flag.owner, settings.config_class);
        assert_eq!(flag.descriptor, FieldType::boolean());

        assert!(matches!(
            context.method_ref("a/Renderer", "update", "()V"),
            Err(ProcedureError::Symbol(Error::UnknownSymbol { .. }))
        ));
    }
}
