pub mod ast;
pub mod logging;
pub mod parser;
pub mod preprocessor;
pub mod resolver;
pub mod tokenizer;
pub mod tree_walk_interpreter;

use tree_walk_interpreter::{ExecutionError, Interpreter};

pub const EXIT_USAGE: i32 = 64;
pub const EXIT_DATA: i32 = 65;
pub const EXIT_SOFTWARE: i32 = 70;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    Tokenize(#[from] tokenizer::TokenizeErrors),
    #[error(transparent)]
    Parse(#[from] parser::ParseErrors),
    #[error(transparent)]
    Resolve(#[from] resolver::ResolveErrors),
    #[error(transparent)]
    Preprocess(#[from] preprocessor::PreprocessError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl SchemaError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::Tokenize(_)
            | SchemaError::Parse(_)
            | SchemaError::Resolve(_)
            | SchemaError::Preprocess(_) => EXIT_DATA,
            SchemaError::Execution(ExecutionError::Runtime { .. }) => EXIT_SOFTWARE,
            SchemaError::Execution(ExecutionError::Exit(code)) => *code,
        }
    }
}

/// Tokenizes and parses without running anything.
pub fn parse(source: &str) -> Result<ast::Program, SchemaError> {
    let tokens = tokenizer::tokens(source)?;
    Ok(parser::program(&tokens)?)
}

/// Runs `source` against an interpreter whose globals persist across calls.
pub fn run(interpreter: &mut Interpreter, source: &str) -> Result<(), SchemaError> {
    let program = parse(source)?;
    let resolutions = resolver::Resolver::new().resolve(&program)?;
    interpreter.interpret(&program, resolutions)?;
    Ok(())
}

/// Preprocesses the script at `path` and runs it.
pub fn run_file(
    interpreter: &mut Interpreter,
    path: impl Into<std::path::PathBuf>,
) -> Result<(), SchemaError> {
    let source = preprocessor::Preprocessor::new(path).process()?;
    run(interpreter, &source)
}
