use classpatch::patch;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Ways a run of the command line tool can go wrong
#[derive(Debug)]
pub enum CliError {
    Io(io::Error),

    /// Reading a particular file failed
    File(PathBuf, io::Error),

    /// Building the engine failed, or a class was rejected under fail-closed
    Patch(patch::Error),
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> CliError {
        CliError::Io(err)
    }
}

impl From<patch::Error> for CliError {
    fn from(err: patch::Error) -> CliError {
        CliError::Patch(err)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(err) => write!(f, "IO - {}", err),
            CliError::File(path, err) => write!(f, "{} - {}", path.display(), err),
            CliError::Patch(err) => write!(f, "Patch - {}", err),
        }
    }
}

impl std::error::Error for CliError {}
