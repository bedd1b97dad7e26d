use crate::jvm;
use crate::jvm::class_file::Version;
use std::fmt;

/// Kinds of symbols the symbol table maps
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Class,
    Method,
    Field,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
        })
    }
}

#[derive(Debug)]
pub enum Error {
    /// No mapping for a canonical name (members are written `owner.name`)
    UnknownSymbol { kind: SymbolKind, name: String },

    /// A rule couldn't find the method or instruction it patches
    PatchTargetMissing {
        class: String,
        rule: String,
        target: String,
    },

    /// A patched method failed validation
    InvariantViolation {
        class: String,
        rule: String,
        method: String,
        cause: jvm::Error,
    },

    /// Class file version outside of what can be decoded
    UnsupportedClassVersion { class: String, version: Version },

    /// Class bytes could not be decoded (or re-encoded)
    ClassFormat { class: String, cause: jvm::Error },

    MalformedName(String),

    /// Line of a mapping file that doesn't parse
    MalformedMappings { line: usize, reason: String },

    /// No enhancement is registered under that name
    UnknownEnhancement(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownSymbol { kind, name } => write!(f, "unknown {} symbol '{}'", kind, name),
            Error::PatchTargetMissing {
                class,
                rule,
                target,
            } => write!(
                f,
                "rule '{}' could not find '{}' in class '{}'",
                rule, target, class
            ),
            Error::InvariantViolation {
                class,
                rule,
                method,
                cause,
            } => write!(
                f,
                "rule '{}' broke method '{}' of class '{}': {:?}",
                rule, method, class, cause
            ),
            Error::UnsupportedClassVersion { class, version } => write!(
                f,
                "class '{}' has unsupported version {}.{}",
                class, version.major_version, version.minor_version
            ),
            Error::ClassFormat { class, cause } => {
                write!(f, "class '{}' is malformed: {:?}", class, cause)
            }
            Error::MalformedName(msg) => f.write_str(msg),
            Error::MalformedMappings { line, reason } => {
                write!(f, "mappings line {}: {}", line, reason)
            }
            Error::UnknownEnhancement(name) => write!(f, "no enhancement named '{}'", name),
        }
    }
}

impl std::error::Error for Error {}
