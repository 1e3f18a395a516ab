//! Marmot CLI: execute files, evaluate strings, or run the REPL.

use std::process;

use colored::Colorize;

use marmot::{repl::Repl, run_file, run_with_options, ExecutionMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Start the REPL
    Repl,
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    mode: ExecutionMode,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Marmot {} - a small scripting language", VERSION);
    eprintln!();
    eprintln!("Usage: marmot [options] [script.mt]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e, --eval <code>   Evaluate a string and print the result");
    eprintln!("  --interp            Use the tree-walking interpreter");
    eprintln!("  --disassemble       Print bytecode before running");
    eprintln!("  -h, --help          Show this help");
    eprintln!("  -v, --version       Show the version");
    eprintln!();
    eprintln!("With no script, an interactive prompt is started.");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut command = None;
    let mut mode = ExecutionMode::Bytecode;
    let mut disassemble = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                println!("marmot {}", VERSION);
                process::exit(0);
            }
            "--interp" => mode = ExecutionMode::TreeWalk,
            "--disassemble" => disassemble = true,
            "-e" | "--eval" => {
                i += 1;
                let code = args
                    .get(i)
                    .ok_or_else(|| "missing argument to --eval".to_string())?;
                command = Some(Command::Eval { code: code.clone() });
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option '{}'", arg));
            }
            file => {
                command = Some(Command::Run {
                    file: file.to_string(),
                });
            }
        }
        i += 1;
    }

    Ok(Options {
        command: command.unwrap_or(Command::Repl),
        mode,
        disassemble,
    })
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message.red());
            print_usage();
            process::exit(2);
        }
    };

    match options.command {
        Command::Repl => Repl::new().run(),
        Command::Run { file } => {
            let path = std::path::Path::new(&file);
            if let Err(err) = run_file(path, options.mode, options.disassemble) {
                eprintln!("{}", err.to_string().red());
                process::exit(1);
            }
        }
        Command::Eval { code } => {
            match run_with_options(&code, options.mode, options.disassemble) {
                Ok(value) => println!("{}", value),
                Err(err) => {
                    eprintln!("{}", err.to_string().red());
                    process::exit(1);
                }
            }
        }
    }
}
