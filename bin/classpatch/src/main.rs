mod error;

use classpatch::jvm::class_file::ClassFile;
use classpatch::patch::{
    rules, ClassState, Environment, FailurePolicy, PatchEngine, Settings, Transformation,
};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use error::CliError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

fn main() -> Result<(), CliError> {
    env_logger::init();

    let matches = Command::new("classpatch")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Apply the shipped patch rules to compiled classes")
        .arg(
            Arg::new("deobfuscated")
                .long("deobfuscated")
                .action(ArgAction::SetTrue)
                .conflicts_with("obfuscated")
                .help("Classes use readable names (overrides CLASSPATCH_ENVIRONMENT)"),
        )
        .arg(
            Arg::new("obfuscated")
                .long("obfuscated")
                .action(ArgAction::SetTrue)
                .help("Classes use obfuscated names (overrides CLASSPATCH_ENVIRONMENT)"),
        )
        .arg(
            Arg::new("fail-closed")
                .long("fail-closed")
                .action(ArgAction::SetTrue)
                .help("Abort on the first class that can't be fully patched"),
        )
        .arg(
            Arg::new("mappings")
                .long("mappings")
                .value_name("FILE")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Extra mappings (`CL:`/`MD:`/`FD:` lines), applied after the builtin ones"),
        )
        .arg(
            Arg::new("output")
                .long("output-directory")
                .value_name("DIRECTORY")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .default_value("out")
                .help("Sets the output directory"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Report what would be patched without writing anything"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input class file or folder")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .get_matches();

    let environment = if matches.get_flag("deobfuscated") {
        Environment::Deobfuscated
    } else if matches.get_flag("obfuscated") {
        Environment::Obfuscated
    } else {
        Environment::detect()
    };
    let failure_policy = if matches.get_flag("fail-closed") {
        FailurePolicy::FailClosed
    } else {
        FailurePolicy::FailOpen
    };
    let dry_run = matches.get_flag("dry-run");

    // Build the engine (this fails if any symbol the rules need is missing)
    let mut mappings = rules::builtin_mappings()?;
    for path in matches.get_many::<PathBuf>("mappings").into_iter().flatten() {
        log::info!("Reading mappings from {:?}", path);
        let text = fs::read_to_string(path).map_err(|err| CliError::File(path.clone(), err))?;
        mappings.parse_mappings(&text)?;
    }
    let engine = PatchEngine::new(
        Settings::new(failure_policy, environment)?,
        mappings.build(environment)?,
        rules::shipped_rules(),
    )?;

    let input_path: &PathBuf = matches
        .get_one("INPUT")
        .ok_or_else(|| CliError::Io(std::io::ErrorKind::InvalidInput.into()))?;
    let output_path: Option<&PathBuf> = matches.get_one("output");

    // Find all of the classes
    let class_files: Vec<PathBuf> = if input_path.is_file() {
        vec![input_path.clone()]
    } else {
        WalkDir::new(input_path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "class"))
            .collect()
    };

    let mut count_patched = 0;
    let mut count_unchanged = 0;
    let mut count_rejected = 0;
    let mut count_ignored = 0;
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    for class_file in class_files {
        let bytes = fs::read(&class_file).map_err(|err| CliError::File(class_file.clone(), err))?;
        let class_name = binary_name(&bytes, input_path, &class_file);
        if !engine.is_interested(&class_name) {
            log::debug!("Ignoring {}", class_name);
            count_ignored += 1;
            continue;
        }

        let transformation: Transformation = engine.transform_class(&class_name, &bytes)?;
        let (color, summary) = match transformation.state {
            ClassState::Rejected => {
                count_rejected += 1;
                (Color::Red, b"REJECTED".as_ref())
            }
            _ if transformation.is_patched() => {
                count_patched += 1;
                (Color::Green, b"PATCHED".as_ref())
            }
            _ => {
                count_unchanged += 1;
                (Color::Yellow, b"UNCHANGED".as_ref())
            }
        };
        if let Some(err) = &transformation.rejection {
            log::error!("{}", err);
        }

        // Print out the class result
        let mut s = stdout.lock();
        s.write_all(b" - ")?;
        s.set_color(ColorSpec::new().set_bold(true))?;
        s.write_all(transformation.class.as_bytes())?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b" [")?;
        s.set_color(ColorSpec::new().set_fg(Some(color)))?;
        s.write_all(summary)?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b"]")?;
        if !transformation.applied.is_empty() {
            write!(s, " {}", transformation.applied.join(", "))?;
        }
        s.write_all(b"\n")?;
        s.reset()?;

        if let (Some(output_path), false) = (output_path, dry_run) {
            write_class(output_path, &transformation)?;
        }
    }

    println!(
        "{} patched, {} unchanged, {} rejected, {} ignored",
        count_patched, count_unchanged, count_rejected, count_ignored
    );

    // Exit code
    exit(if count_rejected > 0 { 1 } else { 0 })
}

/// Name of the class in the header, falling back on its path relative to the input
fn binary_name(bytes: &[u8], input_path: &Path, class_file: &Path) -> String {
    let from_header = ClassFile::parse(bytes).ok().and_then(|parsed| {
        parsed
            .constants
            .class_name(parsed.this_class)
            .ok()
            .map(str::to_owned)
    });
    from_header.unwrap_or_else(|| {
        let relative = class_file.strip_prefix(input_path).unwrap_or(class_file);
        let relative = if relative.as_os_str().is_empty() {
            Path::new(class_file.file_name().unwrap_or_default())
        } else {
            relative
        };
        relative
            .with_extension("")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/")
    })
}

/// Write the resulting bytes under the output directory, by binary name
fn write_class(output_path: &Path, transformation: &Transformation) -> Result<(), CliError> {
    let destination = output_path.join(format!("{}.class", transformation.class));
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    log::info!("Writing {:?}", destination);
    fs::write(&destination, &transformation.bytes)
        .map_err(|err| CliError::File(destination.clone(), err))
}
