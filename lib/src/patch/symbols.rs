use super::{Error, SymbolKind};
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor,
    UnqualifiedName,
};
use std::collections::HashMap;
use std::fmt;

/// Which identifier space the target binary uses
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Human readable names (development builds)
    Deobfuscated,

    /// Minified names (shipped builds)
    Obfuscated,
}

impl Environment {
    /// Environment variable read by [`Environment::detect`]
    pub const VARIABLE: &'static str = "CLASSPATCH_ENVIRONMENT";

    pub fn from_name(name: &str) -> Option<Environment> {
        match name.trim().to_ascii_lowercase().as_str() {
            "deobfuscated" | "dev" => Some(Environment::Deobfuscated),
            "obfuscated" => Some(Environment::Obfuscated),
            _ => None,
        }
    }

    /// Read the environment from `CLASSPATCH_ENVIRONMENT`, defaulting to obfuscated
    pub fn detect() -> Environment {
        match std::env::var(Environment::VARIABLE) {
            Ok(value) => match Environment::from_name(&value) {
                Some(environment) => environment,
                None => {
                    log::warn!(
                        "Ignoring unrecognized {}={:?}",
                        Environment::VARIABLE,
                        value
                    );
                    Environment::Obfuscated
                }
            },
            Err(_) => Environment::Obfuscated,
        }
    }
}

/// Symbol named by its canonical names
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Class(&'static str),
    Method(&'static str, &'static str),
    Field(&'static str, &'static str),
}

impl Symbol {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Class(_) => SymbolKind::Class,
            Symbol::Method(_, _) => SymbolKind::Method,
            Symbol::Field(_, _) => SymbolKind::Field,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Class(class) => f.write_str(class),
            Symbol::Method(owner, name) | Symbol::Field(owner, name) => {
                write!(f, "{}.{}", owner, name)
            }
        }
    }
}

/// One line of the mapping table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub kind: SymbolKind,

    /// Canonical class declaring the member (`None` for classes)
    pub owner: Option<String>,

    pub canonical: String,
    pub minified: String,
}

/// Key of a member: kind, owning class, and name
type MemberKey = (SymbolKind, String, String);

/// Mapping from canonical names to the names used by the running binary
///
/// The table is immutable once built. Member names are looked up by their canonical owner, so the
/// same minified name may appear on several classes.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    environment: Environment,

    /// Canonical class name to active class name
    classes: HashMap<String, String>,

    /// Canonical member to active member name
    members: HashMap<MemberKey, String>,

    /// Active class name to canonical class name
    canonical_classes: HashMap<String, String>,

    /// Active member (with active owner) to canonical member name
    canonical_members: HashMap<MemberKey, String>,
}

impl SymbolTable {
    pub fn builder() -> SymbolTableBuilder {
        SymbolTableBuilder::default()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Resolve a canonical name (members are written `owner.name`)
    pub fn resolve(&self, kind: SymbolKind, canonical: &str) -> Result<&str, Error> {
        match kind {
            SymbolKind::Class => self.resolve_class(canonical),
            SymbolKind::Method | SymbolKind::Field => {
                let (owner, name) = canonical.rsplit_once('.').ok_or_else(|| {
                    Error::MalformedName(format!(
                        "'{}' is not of the form 'owner.name'",
                        canonical
                    ))
                })?;
                self.resolve_member(kind, owner, name)
            }
        }
    }

    pub fn resolve_class(&self, canonical_class: &str) -> Result<&str, Error> {
        self.classes
            .get(canonical_class)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownSymbol {
                kind: SymbolKind::Class,
                name: canonical_class.to_owned(),
            })
    }

    pub fn resolve_method(
        &self,
        canonical_class: &str,
        canonical_method: &str,
    ) -> Result<&str, Error> {
        self.resolve_member(SymbolKind::Method, canonical_class, canonical_method)
    }

    pub fn resolve_field(&self, canonical_class: &str, canonical_field: &str) -> Result<&str, Error> {
        self.resolve_member(SymbolKind::Field, canonical_class, canonical_field)
    }

    /// Resolve any symbol, returning the name of the symbol itself (not its owner)
    pub fn resolve_symbol(&self, symbol: &Symbol) -> Result<&str, Error> {
        match symbol {
            Symbol::Class(class) => self.resolve_class(class),
            Symbol::Method(owner, name) => self.resolve_method(owner, name),
            Symbol::Field(owner, name) => self.resolve_field(owner, name),
        }
    }

    fn resolve_member(&self, kind: SymbolKind, owner: &str, name: &str) -> Result<&str, Error> {
        self.members
            .get(&(kind, owner.to_owned(), name.to_owned()))
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownSymbol {
                kind,
                name: format!("{}.{}", owner, name),
            })
    }

    /// Canonical name of a class, given its name in the binary
    pub fn canonical_class(&self, binary_class: &str) -> Option<&str> {
        self.canonical_classes.get(binary_class).map(String::as_str)
    }

    /// Canonical name of a method, given the names in the binary of the method and its class
    pub fn canonical_method(&self, binary_class: &str, binary_method: &str) -> Option<&str> {
        self.canonical_members
            .get(&(
                SymbolKind::Method,
                binary_class.to_owned(),
                binary_method.to_owned(),
            ))
            .map(String::as_str)
    }

    /// Rewrite the class names inside a field or method descriptor into the active environment
    ///
    /// Classes the table doesn't know about (eg. `java/lang/String`) are left alone.
    pub fn remap_descriptor(&self, canonical_descriptor: &str) -> Result<String, Error> {
        let bad_descriptor =
            || Error::MalformedName(format!("bad descriptor '{}'", canonical_descriptor));

        // Active class names were validated when the table was built
        let remap_class = |class: &BinaryName| -> BinaryName {
            self.classes
                .get(class.as_str())
                .and_then(|active| BinaryName::from_string(active.clone()).ok())
                .unwrap_or_else(|| class.clone())
        };

        if canonical_descriptor.starts_with('(') {
            let descriptor: MethodDescriptor<BinaryName> =
                MethodDescriptor::parse(canonical_descriptor).map_err(|_| bad_descriptor())?;
            Ok(descriptor.map_classes(remap_class).render())
        } else {
            let descriptor: FieldType<BinaryName> =
                FieldType::parse(canonical_descriptor).map_err(|_| bad_descriptor())?;
            Ok(descriptor.map_classes(remap_class).render())
        }
    }
}

/// Check that every symbol resolves
///
/// Every missing symbol gets logged, then the first one is returned as the error.
pub fn check_complete<'a>(
    table: &SymbolTable,
    symbols: impl IntoIterator<Item = &'a Symbol>,
) -> Result<(), Error> {
    let mut first_missing = None;
    for symbol in symbols {
        if let Err(err) = table.resolve_symbol(symbol) {
            log::error!("Missing {} mapping for '{}'", symbol.kind(), symbol);
            first_missing.get_or_insert(err);
        }
    }
    match first_missing {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Accumulates mapping entries before the table gets built
#[derive(Debug, Clone, Default)]
pub struct SymbolTableBuilder {
    entries: Vec<SymbolEntry>,
}

impl SymbolTableBuilder {
    pub fn class(&mut self, canonical: &str, minified: &str) -> &mut Self {
        self.entries.push(SymbolEntry {
            kind: SymbolKind::Class,
            owner: None,
            canonical: canonical.to_owned(),
            minified: minified.to_owned(),
        });
        self
    }

    pub fn method(&mut self, owner: &str, canonical: &str, minified: &str) -> &mut Self {
        self.member(SymbolKind::Method, owner, canonical, minified)
    }

    pub fn field(&mut self, owner: &str, canonical: &str, minified: &str) -> &mut Self {
        self.member(SymbolKind::Field, owner, canonical, minified)
    }

    fn member(&mut self, kind: SymbolKind, owner: &str, canonical: &str, minified: &str) -> &mut Self {
        self.entries.push(SymbolEntry {
            kind,
            owner: Some(owner.to_owned()),
            canonical: canonical.to_owned(),
            minified: minified.to_owned(),
        });
        self
    }

    /// Add the entries of a mapping file
    ///
    /// Lines look like `CL: <canonical> <minified>` for classes, and like
    /// `MD: <canonical owner> <canonical name> <minified name>` or
    /// `FD: <canonical owner> <canonical name> <minified name>` for methods and fields. Blank lines
    /// and everything after a `#` are ignored.
    pub fn parse_mappings(&mut self, text: &str) -> Result<&mut Self, Error> {
        for (line_index, line) in text.lines().enumerate() {
            let line_number = line_index + 1;
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            };
            let mut words = line.split_whitespace();
            let tag = match words.next() {
                None => continue,
                Some(tag) => tag,
            };
            let words: Vec<&str> = words.collect();
            let malformed = |reason: String| Error::MalformedMappings {
                line: line_number,
                reason,
            };

            match (tag, words.as_slice()) {
                ("CL:", [canonical, minified]) => {
                    self.class(canonical, minified);
                }
                ("MD:", [owner, canonical, minified]) => {
                    self.method(owner, canonical, minified);
                }
                ("FD:", [owner, canonical, minified]) => {
                    self.field(owner, canonical, minified);
                }
                ("CL:", _) => return Err(malformed(format!("expected 2 names, got {}", words.len()))),
                ("MD:" | "FD:", _) => {
                    return Err(malformed(format!("expected 3 names, got {}", words.len())))
                }
                (other, _) => return Err(malformed(format!("unknown entry kind '{}'", other))),
            }
        }
        Ok(self)
    }

    /// Build the table for one environment
    ///
    /// Names are checked to be valid binary (or unqualified) names. When the same symbol is mapped
    /// more than once, the last mapping wins.
    pub fn build(&self, environment: Environment) -> Result<SymbolTable, Error> {
        let mut table = SymbolTable {
            environment,
            classes: HashMap::new(),
            members: HashMap::new(),
            canonical_classes: HashMap::new(),
            canonical_members: HashMap::new(),
        };

        for entry in self.entries.iter().filter(|entry| entry.kind == SymbolKind::Class) {
            BinaryName::check_valid(&entry.canonical).map_err(Error::MalformedName)?;
            BinaryName::check_valid(&entry.minified).map_err(Error::MalformedName)?;
            let active = match environment {
                Environment::Deobfuscated => &entry.canonical,
                Environment::Obfuscated => &entry.minified,
            };
            if let Some(previous) = table.classes.insert(entry.canonical.clone(), active.clone()) {
                log::warn!("Class '{}' was already mapped to '{}'", entry.canonical, previous);
            }
            table
                .canonical_classes
                .insert(active.clone(), entry.canonical.clone());
        }

        for entry in self.entries.iter().filter(|entry| entry.kind != SymbolKind::Class) {
            let owner = match &entry.owner {
                Some(owner) => owner,
                None => continue,
            };
            BinaryName::check_valid(owner).map_err(Error::MalformedName)?;
            UnqualifiedName::check_valid(&entry.canonical)
                .map_err(Error::MalformedName)?;
            UnqualifiedName::check_valid(&entry.minified)
                .map_err(Error::MalformedName)?;

            let active = match environment {
                Environment::Deobfuscated => &entry.canonical,
                Environment::Obfuscated => &entry.minified,
            };
            let active_owner = table
                .classes
                .get(owner)
                .cloned()
                .unwrap_or_else(|| owner.clone());
            let key = (entry.kind, owner.clone(), entry.canonical.clone());
            if let Some(previous) = table.members.insert(key, active.clone()) {
                log::warn!(
                    "{} '{}.{}' was already mapped to '{}'",
                    entry.kind,
                    owner,
                    entry.canonical,
                    previous
                );
            }
            table.canonical_members.insert(
                (entry.kind, active_owner, active.clone()),
                entry.canonical.clone(),
            );
        }

        log::debug!(
            "Built {:?} symbol table with {} classes and {} members",
            environment,
            table.classes.len(),
            table.members.len()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MAPPINGS: &str = "
        # Renderer
        CL: net/minecraft/client/renderer/RenderGlobal net/minecraft/client/renderer/RenderGlobal
        CL: net/minecraft/client/network/NetworkPlayerInfo bdc
        MD: net/minecraft/client/renderer/RenderGlobal renderClouds func_180447_b
        FD: net/minecraft/client/renderer/RenderGlobal cloudTickCounter field_72773_u  # counter
    ";

    fn table(environment: Environment) -> SymbolTable {
        SymbolTable::builder()
            .parse_mappings(MAPPINGS)
            .unwrap()
            .build(environment)
            .unwrap()
    }

    #[test]
    fn resolves_per_environment() {
        let obfuscated = table(Environment::Obfuscated);
        assert_eq!(
            obfuscated
                .resolve_method("net/minecraft/client/renderer/RenderGlobal", "renderClouds")
                .unwrap(),
            "func_180447_b"
        );
        assert_eq!(
            obfuscated
                .resolve(
                    SymbolKind::Field,
                    "net/minecraft/client/renderer/RenderGlobal.cloudTickCounter"
                )
                .unwrap(),
            "field_72773_u"
        );
        assert_eq!(
            obfuscated
                .resolve_class("net/minecraft/client/network/NetworkPlayerInfo")
                .unwrap(),
            "bdc"
        );

        let deobfuscated = table(Environment::Deobfuscated);
        assert_eq!(
            deobfuscated
                .resolve_method("net/minecraft/client/renderer/RenderGlobal", "renderClouds")
                .unwrap(),
            "renderClouds"
        );
    }

    #[test]
    fn reverse_lookup() {
        let obfuscated = table(Environment::Obfuscated);
        assert_eq!(
            obfuscated.canonical_method("net/minecraft/client/renderer/RenderGlobal", "func_180447_b"),
            Some("renderClouds")
        );
        assert_eq!(obfuscated.canonical_class("bdc"), Some("net/minecraft/client/network/NetworkPlayerInfo"));
        assert_eq!(
            obfuscated.canonical_method("net/minecraft/client/renderer/RenderGlobal", "renderClouds"),
            None
        );
    }

    #[test]
    fn unknown_symbols() {
        let obfuscated = table(Environment::Obfuscated);
        match obfuscated.resolve_method("net/minecraft/client/renderer/RenderGlobal", "renderSky") {
            Err(Error::UnknownSymbol { kind, name }) => {
                assert_eq!(kind, SymbolKind::Method);
                assert_eq!(name, "net/minecraft/client/renderer/RenderGlobal.renderSky");
            }
            other => panic!("unexpected {:?}", other),
        }

        let symbols = vec![
            Symbol::Class("net/minecraft/client/renderer/RenderGlobal"),
            Symbol::Field("a/B", "c"),
            Symbol::Method("d/E", "f"),
        ];
        match check_complete(&obfuscated, &symbols) {
            Err(Error::UnknownSymbol { name, .. }) => assert_eq!(name, "a/B.c"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn descriptors_are_remapped() {
        let obfuscated = table(Environment::Obfuscated);
        assert_eq!(
            obfuscated
                .remap_descriptor("(IIILnet/minecraft/client/network/NetworkPlayerInfo;)V")
                .unwrap(),
            "(IIILbdc;)V"
        );
        assert_eq!(
            obfuscated
                .remap_descriptor("[Lnet/minecraft/client/network/NetworkPlayerInfo;")
                .unwrap(),
            "[Lbdc;"
        );
        assert_eq!(
            obfuscated.remap_descriptor("Ljava/lang/String;").unwrap(),
            "Ljava/lang/String;"
        );
        assert!(obfuscated.remap_descriptor("(I").is_err());
    }

    #[test]
    fn malformed_mappings() {
        let mut builder = SymbolTable::builder();
        match builder.parse_mappings("CL: a/B c\nMD: a/B m\n") {
            Err(Error::MalformedMappings { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            SymbolTable::builder().parse_mappings("XX: a b"),
            Err(Error::MalformedMappings { line: 1, .. })
        ));
        assert!(matches!(
            SymbolTable::builder()
                .class("a.b", "c")
                .build(Environment::Obfuscated),
            Err(Error::MalformedName(_))
        ));
    }

    #[test]
    fn environment_names() {
        assert_eq!(Environment::from_name("dev"), Some(Environment::Deobfuscated));
        assert_eq!(Environment::from_name(" Obfuscated "), Some(Environment::Obfuscated));
        assert_eq!(Environment::from_name("production"), None);
    }
}
