//! Tern compiler CLI
//!
//! Command-line interface for compiling .tern programs to WebAssembly
//! modules, dumping compiled bytes, and inspecting parse output.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use ternc::CompilerConfig;

#[derive(ClapParser)]
#[command(name = "ternc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tern compiler - compile .tern programs to WebAssembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .tern file to a .wasm module
    Build {
        /// Input .tern source file
        input: PathBuf,

        /// Output module path (defaults to the input with a .wasm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Host import manifest (TOML) describing host functions and memory
        #[arg(long = "host-manifest", value_name = "PATH")]
        host_manifest: Option<PathBuf>,
    },

    /// Compile and print the module as hex
    Dump {
        /// Input .tern source file
        input: PathBuf,

        /// Host import manifest (TOML)
        #[arg(long = "host-manifest", value_name = "PATH")]
        host_manifest: Option<PathBuf>,
    },

    /// Parse and print the AST and layout table as JSON
    Parse {
        /// Input .tern source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            host_manifest,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("wasm"));
            run_build(&input, &output, host_manifest.as_deref());
        }
        Commands::Dump {
            input,
            host_manifest,
        } => run_dump(&input, host_manifest.as_deref()),
        Commands::Parse { input } => run_parse(&input),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ternc", &mut io::stdout());
}

fn load_config(manifest: Option<&Path>) -> CompilerConfig {
    match manifest {
        None => CompilerConfig::default(),
        Some(path) => {
            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error reading host manifest '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            match CompilerConfig::from_manifest(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}

fn read_source(input: &Path) -> String {
    match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn run_build(input: &Path, output: &Path, manifest: Option<&Path>) {
    let config = load_config(manifest);
    let source = read_source(input);

    match ternc::compile(&source, &config) {
        Ok(out) => {
            if let Err(e) = fs::write(output, &out.bytes) {
                eprintln!("Error writing '{}': {}", output.display(), e);
                process::exit(1);
            }
            println!("Compiled {} -> {}", input.display(), output.display());
            if let Some(table) = &out.table {
                println!("Table slots: {}", table.len());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_dump(input: &Path, manifest: Option<&Path>) {
    let config = load_config(manifest);
    let source = read_source(input);

    match ternc::dump(&source, &config) {
        Ok(hex) => {
            // 16 bytes per line.
            for line in hex.as_bytes().chunks(32) {
                println!("{}", std::str::from_utf8(line).unwrap_or_default());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_parse(input: &Path) {
    let source = read_source(input);

    match ternc::parse(&source) {
        Ok((program, layouts)) => {
            let doc = serde_json::json!({
                "program": program,
                "layouts": layouts,
            });
            match serde_json::to_string_pretty(&doc) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
