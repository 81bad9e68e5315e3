use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use timbre_core::{normalize, parse_expression, type_with, Context, Expr, ProtocolVersion};
use timbre_import::{hash_expression_to_code, load_with, Status};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Timbre configuration language toolchain.
#[derive(Parser)]
#[command(name = "timbre", version, about = "Timbre configuration language toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve all imports in a source file and print the result
    Resolve {
        /// Path to the source file
        file: PathBuf,
    },
    /// Resolve a source file and print its type
    Type {
        /// Path to the source file
        file: PathBuf,
    },
    /// Resolve, normalize, and print the sha256 integrity hash
    Hash {
        /// Path to the source file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Resolve { file } => cmd_resolve(file, cli.output),
        Commands::Type { file } => cmd_type(file, cli.output),
        Commands::Hash { file } => cmd_hash(file, cli.output),
    };
    if let Err(message) = result {
        eprintln!("error: {}", message);
        process::exit(1);
    }
}

/// Parse `file` and resolve its imports, rooted at the file's directory.
fn resolve_file(file: &Path) -> Result<Expr, String> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
    let parsed =
        parse_expression(&file.display().to_string(), &text).map_err(|e| e.to_string())?;
    let root = file.parent().unwrap_or(Path::new("."));
    let root = if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    };
    let mut status = Status::new(root);
    load_with(&mut status, parsed).map_err(|e| e.to_string())
}

fn cmd_resolve(file: &Path, output: OutputFormat) -> Result<(), String> {
    let resolved = resolve_file(file)?;
    match output {
        OutputFormat::Text => println!("{}", resolved),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "resolved": resolved.to_string() })
        ),
    }
    Ok(())
}

fn cmd_type(file: &Path, output: OutputFormat) -> Result<(), String> {
    let resolved = resolve_file(file)?;
    let ty = type_with(&Context::new(), &resolved).map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Text => println!("{}", ty),
        OutputFormat::Json => println!("{}", serde_json::json!({ "type": ty.to_string() })),
    }
    Ok(())
}

fn cmd_hash(file: &Path, output: OutputFormat) -> Result<(), String> {
    let resolved = resolve_file(file)?;
    type_with(&Context::new(), &resolved).map_err(|e| e.to_string())?;
    let normalized = normalize(&resolved);
    let code = hash_expression_to_code(ProtocolVersion::V1, &normalized)
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Text => println!("{}", code),
        OutputFormat::Json => println!("{}", serde_json::json!({ "hash": code })),
    }
    Ok(())
}
