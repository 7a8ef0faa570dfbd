use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use pastac::codegen::TacGen;
use pastac::lexer::Lexer;
use pastac::{parser, sema, CompileError};

/// Compiles a Pascal subset to three-address intermediate code.
#[derive(Parser)]
#[command(name = "pastac", version)]
struct Cli {
    /// Input Pascal source file
    input: PathBuf,

    /// Write the intermediate code to this file instead of stdout
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Print phase markers and statistics to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error reading input file '{}': {err}", cli.input.display());
            process::exit(2);
        }
    };

    let code = match run(&source, cli.verbose) {
        Ok(code) => code,
        Err(diag) => {
            eprintln!("{diag}");
            process::exit(1);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(err) = fs::write(path, &code) {
                eprintln!("Error writing output file '{}': {err}", path.display());
                process::exit(2);
            }
        }
        None => print!("{code}"),
    }
}

fn run(source: &str, verbose: bool) -> Result<String, CompileError> {
    if verbose {
        eprintln!("-- Lexing --");
    }
    let tokens = Lexer::new(source).tokenize()?;
    if verbose {
        eprintln!("{} tokens", tokens.len());
        eprintln!("-- Parsing --");
    }
    let program = parser::Parser::new(tokens).parse()?;
    if verbose {
        eprintln!("parsed program '{}'", program.name);
        eprintln!("-- Semantic Analysis --");
    }
    let env = sema::check(&program)?;
    if verbose {
        eprintln!("-- Code Generation --");
    }
    let code = TacGen::new(&env).generate(&program);
    if verbose {
        eprintln!("{} instructions", code.lines().count());
    }
    Ok(code)
}
