//! Pipeline drivers behind the `sofl` command-line tool.
//!
//! Each function implements one subcommand over files named by extension:
//! `.sofl` source, `.json` parsed syntax trees, `.sasm` textual assembly,
//! `.bsasm` binary images.

pub mod debug;

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use soflc::ast::Decl;
use soflc::parser::ParseMode;
use sovm::{Board, StackVm};

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error, PathBuf),
    BadExtension {
        path: PathBuf,
        expected: &'static str,
    },
    Parse(Box<soflc::parser::Error>),
    Preprocess(soflc::PreprocessError),
    Analyze(soflc::AnalyzeError),
    Validation(Vec<soflc::AnalysisError>),
    Translate(soflc::TranslateError),
    Asm(sasmfile::Error),
    Encode(sovm::EncodeError),
    Trap(sovm::Trap),
    Fault(sovm::Fault),
    Load(sovm::board::LoadError),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading \"{}\" failed: {}", path.display(), err),
            Error::BadExtension { path, expected } => write!(
                f,
                "\"{}\" should have the {} extension",
                path.display(),
                expected
            ),
            Error::Parse(err) => {
                writeln!(f, "Parsing input failed:")?;
                write!(f, "{}", err)
            }
            Error::Preprocess(err) => write!(f, "{}", err),
            Error::Analyze(err) => write!(f, "{}", err),
            Error::Validation(errors) => {
                writeln!(f, "Found errors:")?;
                for err in errors {
                    writeln!(f, "- {}", err)?;
                }
                Ok(())
            }
            Error::Translate(err) => write!(f, "{}", err),
            Error::Asm(err) => write!(f, "{}", err),
            Error::Encode(err) => write!(f, "{}", err),
            Error::Trap(err) => write!(f, "runtime trap: {}", err),
            Error::Fault(err) => write!(f, "runtime trap: {}", err),
            Error::Load(err) => write!(f, "{}", err),
            Error::Json(err) => write!(f, "{}", err),
        }
    }
}

impl StdError for Error {}

impl From<soflc::PreprocessError> for Error {
    fn from(err: soflc::PreprocessError) -> Error {
        Error::Preprocess(err)
    }
}

impl From<soflc::AnalyzeError> for Error {
    fn from(err: soflc::AnalyzeError) -> Error {
        Error::Analyze(err)
    }
}

impl From<soflc::TranslateError> for Error {
    fn from(err: soflc::TranslateError) -> Error {
        Error::Translate(err)
    }
}

impl From<sasmfile::Error> for Error {
    fn from(err: sasmfile::Error) -> Error {
        Error::Asm(err)
    }
}

impl From<sovm::EncodeError> for Error {
    fn from(err: sovm::EncodeError) -> Error {
        Error::Encode(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

fn check_extension(path: &Path, expected: &'static str) -> Result<(), Error> {
    if path.extension().and_then(|e| e.to_str()) == Some(expected) {
        Ok(())
    } else {
        Err(Error::BadExtension {
            path: path.to_owned(),
            expected,
        })
    }
}

fn read_text(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|err| Error::Io(err, path.to_owned()))
}

/// `parse`: source to a JSON syntax tree next to the input.
pub fn parse(input: &Path) -> Result<PathBuf, Error> {
    check_extension(input, "sofl")?;
    let text = read_text(input)?;
    let decls = soflc::parse_program(&text, ParseMode::Expanded)
        .map_err(|err| Error::Parse(Box::new(err)))?;
    let output = input.with_extension("json");
    let json = serde_json::to_string_pretty(&decls)?;
    fs::write(&output, json).map_err(|err| Error::Io(err, output.clone()))?;
    info!(output = %output.display(), "wrote syntax tree");
    Ok(output)
}

fn check_validation(analysis: &soflc::Analysis) -> Result<(), Error> {
    let errors = soflc::validate(analysis);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

/// `analyze-validate-translate`: JSON syntax tree to textual assembly.
pub fn analyze_validate_translate(input: &Path) -> Result<PathBuf, Error> {
    check_extension(input, "json")?;
    let text = read_text(input)?;
    let decls: Vec<Decl> = serde_json::from_str(&text)?;
    let analysis = soflc::analyze(&decls)?;
    check_validation(&analysis)?;
    let translated = soflc::translate(&analysis, false)?;
    let output = input.with_extension("sasm");
    sasmfile::write_sasm_file(&output, &translated.instructions)
        .map_err(|err| Error::Io(err, output.clone()))?;
    info!(output = %output.display(), "wrote assembly");
    Ok(output)
}

/// What an executor leaves behind: the program's visible output and the
/// number of executed steps or cycles.
pub struct Execution {
    pub output: String,
    pub steps: u64,
}

/// `execute`: run a `.sasm` or `.bsasm` file on the abstract machine.
pub fn execute(input: &Path) -> Result<Execution, Error> {
    let vm = StackVm::default();
    let outcome = match input.extension().and_then(|e| e.to_str()) {
        Some("sasm") => {
            let program = sasmfile::read_sasm_file(input)?;
            vm.run(&program).map_err(Error::Trap)?
        }
        Some("bsasm") => {
            let image = sasmfile::read_bsasm_file(input)
                .map_err(|err| Error::Io(err, input.to_owned()))?;
            vm.run_binary(&image).map_err(Error::Trap)?
        }
        _ => {
            return Err(Error::BadExtension {
                path: input.to_owned(),
                expected: "sasm or bsasm",
            })
        }
    };
    Ok(Execution {
        output: outcome.output(),
        steps: outcome.steps,
    })
}

/// `binarify`: textual assembly to the binary image.
pub fn binarify(input: &Path) -> Result<PathBuf, Error> {
    check_extension(input, "sasm")?;
    let program = sasmfile::read_sasm_file(input)?;
    let (image, _) = sovm::encode(&program)?;
    let output = input.with_extension("bsasm");
    sasmfile::write_bsasm_file(&output, &image)
        .map_err(|err| Error::Io(err, output.clone()))?;
    info!(output = %output.display(), bytes = image.len(), "wrote binary image");
    Ok(output)
}

fn compile(
    input: &Path,
    lib_root: &Path,
    with_debug: bool,
) -> Result<(soflc::TranslationResult, String), Error> {
    check_extension(input, "sofl")?;
    let (decls, text) = soflc::load_program(input, lib_root)?;
    let analysis = soflc::analyze(&decls)?;
    check_validation(&analysis)?;
    let translated = soflc::translate(&analysis, with_debug)?;
    Ok((translated, text))
}

/// `compile-and-run`: the whole pipeline, executed on the board.
pub fn compile_and_run(input: &Path, lib_root: &Path) -> Result<Execution, Error> {
    let (translated, _) = compile(input, lib_root, false)?;
    let (image, _) = sovm::encode(&translated.instructions)?;
    let mut board = Board::default();
    board.load_program(&image).map_err(Error::Load)?;
    let cycles = board.run().map_err(Error::Fault)?;
    Ok(Execution {
        output: board.output().map_err(Error::Fault)?,
        steps: cycles,
    })
}

/// `compile-and-debug`: the whole pipeline, stepped interactively on the
/// board.
pub fn compile_and_debug(input: &Path, lib_root: &Path) -> Result<(), Error> {
    let (translated, text) = compile(input, lib_root, true)?;
    let (image, starts) = sovm::encode(&translated.instructions)?;
    let mut board = Board::default();
    board.load_program(&image).map_err(Error::Load)?;
    let backend = debug::BoardBackend::new(board, starts);
    let mut debugger = debug::Debugger::new(backend, translated, text);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    debug::run_debugger(&mut debugger, stdin.lock(), &mut stdout.lock())
        .map_err(|err| Error::Io(err, input.to_owned()))
}
