use super::{
    check_complete, Error, FailurePolicy, PatchContext, PatchRule, ProcedureError, Settings,
    Symbol, SymbolTable,
};
use crate::jvm;
use crate::jvm::model::ClassUnit;
use crate::jvm::{BinaryName, Name, UnqualifiedName};
use log::{debug, error, info, warn};
use std::collections::HashMap;

/// Hook through which a host class loader hands classes over
pub trait ClassTransformer: Send + Sync {
    /// Does the transformer want to see this class? (binary name, `/` or `.` separated)
    fn interested_in(&self, binary_name: &str) -> bool;

    /// Transform the bytes of a class
    ///
    /// Returning an error means the class must not be loaded.
    fn transform(&self, binary_name: &str, bytes: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Stages a class goes through in [`PatchEngine::transform_class`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassState {
    /// Raw bytes received
    Loaded,

    /// Decoded into a [`ClassUnit`]
    Parsed,

    /// Applicable rules identified
    Matched,

    /// Rule procedures ran
    Mutated,

    /// Edited methods checked, max stack/locals and frames recomputed
    Validated,

    /// Bytes handed back
    Emitted,

    /// Class can't be patched (the original bytes are handed back under fail-open)
    Rejected,
}

/// Outcome of running the engine on one class
#[derive(Debug)]
pub struct Transformation {
    /// Binary name of the class
    pub class: String,

    /// Either `Emitted` or `Rejected`
    pub state: ClassState,

    pub bytes: Vec<u8>,

    /// Names of the rules whose effects are in `bytes`, in order
    pub applied: Vec<&'static str>,

    /// Rules rolled back because their target was missing
    pub skipped: Vec<Error>,

    /// Why the class was rejected
    pub rejection: Option<Error>,
}

impl Transformation {
    /// Do the emitted bytes differ from the input?
    pub fn is_patched(&self) -> bool {
        self.state == ClassState::Emitted && !self.applied.is_empty()
    }

    fn advance(&mut self, state: ClassState) {
        debug!("{}: {:?} -> {:?}", self.class, self.state, state);
        self.state = state;
    }

    fn emit(mut self, bytes: Vec<u8>) -> Transformation {
        self.advance(ClassState::Emitted);
        self.bytes = bytes;
        self
    }
}

/// Runs patch rules over the classes they target
///
/// The rules and symbol table are fixed when the engine is built, at which point every symbol
/// the rules need is checked to resolve. After that, the engine is immutable and can be shared
/// across threads.
pub struct PatchEngine {
    settings: Settings,
    symbols: SymbolTable,
    rules: Vec<PatchRule>,

    /// Indices into `rules`, keyed by binary name of the targeted class
    by_class: HashMap<String, Vec<usize>>,
}

impl PatchEngine {
    pub fn new(
        settings: Settings,
        symbols: SymbolTable,
        rules: Vec<PatchRule>,
    ) -> Result<PatchEngine, Error> {
        let required: Vec<Symbol> = rules
            .iter()
            .flat_map(|rule| rule.required_symbols())
            .collect();
        check_complete(&symbols, &required)?;

        let mut by_class: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            let binary_class = symbols.resolve_class(rule.class)?;
            by_class
                .entry(binary_class.to_owned())
                .or_default()
                .push(index);
        }

        info!(
            "Patch engine ready with {} rules over {} classes ({:?}, {:?})",
            rules.len(),
            by_class.len(),
            symbols.environment(),
            settings.failure_policy,
        );
        Ok(PatchEngine {
            settings,
            symbols,
            rules,
            by_class,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Binary names of the classes targeted by at least one rule
    pub fn interested_classes(&self) -> impl Iterator<Item = &str> + '_ {
        self.by_class.keys().map(String::as_str)
    }

    pub fn is_interested(&self, binary_name: &str) -> bool {
        self.by_class.contains_key(&normalize(binary_name))
    }

    /// Run every rule targeting the class
    ///
    /// Errors are only returned under [`FailurePolicy::FailClosed`]. Under fail-open, a rejected
    /// class comes back in its original form, with the error in [`Transformation::rejection`].
    pub fn transform_class(
        &self,
        binary_name: &str,
        bytes: &[u8],
    ) -> Result<Transformation, Error> {
        let name = normalize(binary_name);
        let mut transformation = Transformation {
            class: name.clone(),
            state: ClassState::Loaded,
            bytes: vec![],
            applied: vec![],
            skipped: vec![],
            rejection: None,
        };
        debug!("{}: {:?}", name, transformation.state);

        let rule_indices = match self.by_class.get(&name) {
            Some(indices) => indices,
            None => return Ok(transformation.emit(bytes.to_vec())),
        };

        let mut class = match ClassUnit::parse(bytes) {
            Ok(class) => class,
            Err(jvm::Error::UnsupportedClassVersion(version)) => {
                let err = Error::UnsupportedClassVersion {
                    class: name,
                    version,
                };
                return self.reject(transformation, bytes, err);
            }
            Err(cause) => {
                let err = Error::ClassFormat { class: name, cause };
                return self.reject(transformation, bytes, err);
            }
        };
        transformation.advance(ClassState::Parsed);

        if class
            .attribute(self.settings.marker_attribute.as_str())
            .is_some()
        {
            debug!("{} is already patched", name);
            return Ok(transformation.emit(bytes.to_vec()));
        }
        self.label_canonical_names(&mut class);
        transformation.advance(ClassState::Matched);

        for index in rule_indices {
            let rule = &self.rules[*index];
            let mut working = class.clone();
            match self.apply_rule(rule, &mut working) {
                Ok(()) => {
                    info!("Applied '{}' to {}", rule.name, class.display_name());
                    class = working;
                    transformation.applied.push(rule.name);
                }
                Err(err @ Error::PatchTargetMissing { .. })
                    if self.settings.failure_policy == FailurePolicy::FailOpen =>
                {
                    warn!("Rolled back '{}': {}", rule.name, err);
                    transformation.skipped.push(err);
                }
                Err(err) => return self.reject(transformation, bytes, err),
            }
        }
        transformation.advance(ClassState::Mutated);

        if transformation.applied.is_empty() {
            debug!("No rule applied to {}", name);
            return Ok(transformation.emit(bytes.to_vec()));
        }

        for method in class.methods.iter_mut() {
            if let Err(cause) = method.validate() {
                let err = Error::InvariantViolation {
                    class: name.clone(),
                    rule: transformation.applied.join(","),
                    method: method.display_name().to_owned(),
                    cause,
                };
                return self.reject(transformation, bytes, err);
            }
        }
        transformation.advance(ClassState::Validated);

        let patched = self
            .mark_patched(&mut class, &transformation.applied)
            .and_then(|()| class.to_bytes());
        match patched {
            Ok(patched) => Ok(transformation.emit(patched)),
            Err(cause) => {
                let err = Error::ClassFormat { class: name, cause };
                self.reject(transformation, bytes, err)
            }
        }
    }

    /// Run one rule on a copy of the class
    fn apply_rule(&self, rule: &PatchRule, class: &mut ClassUnit) -> Result<(), Error> {
        let binary_class = class.binary_name.clone();
        let context = PatchContext {
            symbols: &self.symbols,
            settings: &self.settings,
            class: &binary_class,
        };
        let class_name = class.display_name().to_owned();
        let target_missing = |target: String| Error::PatchTargetMissing {
            class: class_name.clone(),
            rule: rule.name.to_owned(),
            target,
        };
        let procedure_failed = |method: &str, err: ProcedureError| match err {
            ProcedureError::TargetMissing(target) => {
                target_missing(format!("{} in {}", target, method))
            }
            ProcedureError::Edit(cause) => Error::InvariantViolation {
                class: class_name.clone(),
                rule: rule.name.to_owned(),
                method: method.to_owned(),
                cause,
            },
            ProcedureError::Symbol(err) => err,
        };

        if let Some(class_patch) = rule.class_patch {
            debug!("Running class patch of '{}' on {}", rule.name, class_name);
            class_patch(&context, class)
                .map_err(|err| procedure_failed(&class_name, err))?;
        }

        for procedure in &rule.procedures {
            let method_name = self.symbols.resolve_method(rule.class, procedure.method)?;
            let targets: Vec<usize> = class
                .methods_named(method_name)
                .map(|(index, _)| index)
                .collect();
            if targets.is_empty() {
                if procedure.required {
                    return Err(target_missing(format!("method {}", procedure.method)));
                }
                debug!("'{}' skips missing {}", rule.name, procedure.method);
                continue;
            }

            for index in targets {
                let method = &mut class.methods[index];
                let display_name = method.display_name().to_owned();
                let code = match method.code_mut() {
                    Ok(Some(code)) => code,
                    Ok(None) if procedure.required => {
                        return Err(target_missing(format!("body of {}", display_name)));
                    }
                    Ok(None) => continue,
                    Err(cause) => {
                        return Err(Error::ClassFormat {
                            class: class_name.clone(),
                            cause,
                        })
                    }
                };
                debug!("Running '{}' on {}", rule.name, display_name);
                (procedure.apply)(&context, code)
                    .map_err(|err| procedure_failed(&display_name, err))?;
            }
        }

        // Full validation (frame inference included) on throwaway copies, so that type errors
        // are pinned on this rule. Frames are only kept from the final pass.
        for method in class.methods.iter().filter(|method| method.is_modified()) {
            let mut trial = method.clone();
            trial.validate().map_err(|cause| Error::InvariantViolation {
                class: class_name.clone(),
                rule: rule.name.to_owned(),
                method: method.display_name().to_owned(),
                cause,
            })?;
        }
        Ok(())
    }

    /// Attach the canonical names the symbol table knows about
    fn label_canonical_names(&self, class: &mut ClassUnit) {
        let binary_class = class.binary_name.as_str().to_owned();
        class.canonical_name = self
            .symbols
            .canonical_class(&binary_class)
            .and_then(|name| BinaryName::from_string(name.to_owned()).ok());
        for method in class.methods.iter_mut() {
            method.canonical_name = self
                .symbols
                .canonical_method(&binary_class, method.name.as_str())
                .and_then(|name| UnqualifiedName::from_string(name.to_owned()).ok());
        }
    }

    /// Record the applied rules in a class attribute
    ///
    /// The attribute holds a `u16` count followed by the `Utf8` constant index of every rule name.
    fn mark_patched(&self, class: &mut ClassUnit, applied: &[&str]) -> Result<(), jvm::Error> {
        let mut info = Vec::with_capacity(2 + 2 * applied.len());
        info.extend_from_slice(&(applied.len() as u16).to_be_bytes());
        for rule in applied {
            let index = class.constants_mut().get_utf8(*rule)?;
            info.extend_from_slice(&(index.0).0.to_be_bytes());
        }
        class.set_attribute(self.settings.marker_attribute.as_str(), info)
    }

    fn reject(
        &self,
        mut transformation: Transformation,
        original: &[u8],
        err: Error,
    ) -> Result<Transformation, Error> {
        match self.settings.failure_policy {
            FailurePolicy::FailClosed => {
                error!("Aborting on {}: {}", transformation.class, err);
                Err(err)
            }
            FailurePolicy::FailOpen => {
                warn!("Rejected {}: {}", transformation.class, err);
                transformation.advance(ClassState::Rejected);
                transformation.bytes = original.to_vec();
                transformation.applied.clear();
                transformation.rejection = Some(err);
                Ok(transformation)
            }
        }
    }
}

impl ClassTransformer for PatchEngine {
    fn interested_in(&self, binary_name: &str) -> bool {
        self.is_interested(binary_name)
    }

    fn transform(&self, binary_name: &str, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        self.transform_class(binary_name, bytes)
            .map(|transformation| transformation.bytes)
    }
}

/// Class loaders tend to use `.` as a separator
fn normalize(binary_name: &str) -> String {
    binary_name.replace('.', "/")
}
