use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::Parser;
use schema::{tree_walk_interpreter::Interpreter, SchemaError, EXIT_SOFTWARE, EXIT_USAGE};

const EXTENSIONS: &[&str] = &["sch", "schema"];

#[derive(Debug, Parser)]
#[command(version, about = "Interpreter for the Schema scripting language")]
struct Cli {
    /// Script to run; starts a REPL when omitted
    script: Option<PathBuf>,

    /// Print the parsed program instead of running it
    #[arg(long)]
    dump_ast: bool,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => exit_code(EXIT_USAGE),
            };
        }
    };

    schema::logging::init(cli.verbose);

    match &cli.script {
        None => repl_command(&cli),
        Some(script) => run_command(&cli, script),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code as u8)
}

fn repl_command(cli: &Cli) -> ExitCode {
    let mut interpreter = Interpreter::default();
    let mut input = String::new();

    loop {
        print!("> ");
        if std::io::stdout().flush().is_err() {
            return exit_code(EXIT_SOFTWARE);
        }

        input.clear();
        match std::io::stdin().read_line(&mut input) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to read input: {e}");
                return exit_code(EXIT_SOFTWARE);
            }
        }

        let source = input.trim();
        if source.is_empty() {
            continue;
        }

        let result = if cli.dump_ast {
            schema::parse(source).map(|program| print!("{program}"))
        } else {
            schema::run(&mut interpreter, source)
        };

        match result {
            Ok(()) => {}
            // exit() and abort() still end the session
            Err(SchemaError::Execution(schema::tree_walk_interpreter::ExecutionError::Exit(
                code,
            ))) => return exit_code(code),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn run_command(cli: &Cli, script: &std::path::Path) -> ExitCode {
    let extension = script.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !EXTENSIONS.contains(&extension) {
        eprintln!(
            "Expected a script ending in .{}, got '{}'",
            EXTENSIONS.join(" or ."),
            script.display()
        );
        return exit_code(EXIT_USAGE);
    }

    let result = if cli.dump_ast {
        schema::preprocessor::Preprocessor::new(script)
            .process()
            .map_err(SchemaError::from)
            .and_then(|source| schema::parse(&source))
            .map(|program| print!("{program}"))
    } else {
        schema::run_file(&mut Interpreter::default(), script)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !matches!(
                e,
                SchemaError::Execution(schema::tree_walk_interpreter::ExecutionError::Exit(_))
            ) {
                eprintln!("{e}");
            }
            exit_code(e.exit_code())
        }
    }
}
