//! Excel-Cleaner CLI - Clean, validate and summarise CSV files
//!
//! # Main Commands
//!
//! ```bash
//! excel-cleaner serve                          # Start HTTP server (port 3000)
//! excel-cleaner run input.csv -s spec.json     # Full run, JSON report on stdout
//! excel-cleaner clean input.csv -s spec.json   # Cleaned CSV only
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! excel-cleaner profile input.xlsx             # Column profiles (first sheet)
//! excel-cleaner validate input.csv -s spec.json
//! excel-cleaner stages                         # Show available cleaning stages
//! excel-cleaner example-spec                   # Show an example pipeline spec
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use excel_cleaner::{
    analyze, example_spec, load_file, profile_table, run_pipeline, stages_description, validate, write_table,
    AppConfig, LoadedTable, PipelineSpec, LOG_BROADCASTER,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "excel-cleaner")]
#[command(about = "Clean, validate and summarise CSV files", long_about = None)]
struct Cli {
    /// Do not echo progress logs to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile every column of a CSV file
    Profile {
        /// Input CSV or Excel file
        input: PathBuf,

        /// Pipeline spec (only its `profiler` section is used)
        #[arg(short, long)]
        spec: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check validation rules; exits with status 1 on violations
    Validate {
        /// Input CSV or Excel file
        input: PathBuf,

        /// Pipeline spec holding the rules
        #[arg(short, long)]
        spec: PathBuf,

        /// Output file for violations (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the cleaning stages and write the cleaned CSV
    Clean {
        /// Input CSV or Excel file
        input: PathBuf,

        /// Pipeline spec holding the stages
        #[arg(short, long)]
        spec: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the cleaning log as JSON
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Full run: profile, validate, clean, calculate, aggregate
    Run {
        /// Input CSV or Excel file
        input: PathBuf,

        /// Pipeline spec (default: profile only)
        #[arg(short, long)]
        spec: Option<PathBuf>,

        /// Output file for the JSON report (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the cleaned table as CSV
        #[arg(long)]
        cleaned: Option<PathBuf>,
    },

    /// Show an example pipeline spec
    ExampleSpec,

    /// Show available cleaning stages
    Stages,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: EXCEL_CLEANER_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let result = match cli.command {
        Commands::Profile { input, spec, output } => cmd_profile(&input, spec.as_deref(), output.as_deref()),
        Commands::Validate { input, spec, output } => cmd_validate(&input, &spec, output.as_deref()),
        Commands::Clean {
            input,
            spec,
            output,
            log,
        } => cmd_clean(&input, &spec, output.as_deref(), log.as_deref()),
        Commands::Run {
            input,
            spec,
            output,
            cleaned,
        } => cmd_run(&input, spec.as_deref(), output.as_deref(), cleaned.as_deref()),
        Commands::ExampleSpec => cmd_example_spec(),
        Commands::Stages => cmd_stages(),
        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_profile(input: &Path, spec: Option<&Path>, output: Option<&Path>) -> CmdResult {
    let loaded = load_input(input)?;
    let options = read_spec(spec)?.profiler_options();

    let profiles = profile_table(&loaded.table, &options);
    for profile in profiles.values() {
        eprintln!(
            "   {:<24} {:<12} nulls {:>5.1}%  distinct {}",
            profile.name,
            profile.inferred_type.as_str(),
            profile.null_percentage(),
            profile.distinct_count
        );
    }

    write_output(&serde_json::to_string_pretty(&profiles)?, output)
}

fn cmd_validate(input: &Path, spec: &Path, output: Option<&Path>) -> CmdResult {
    let loaded = load_input(input)?;
    let spec = read_spec(Some(spec))?;

    let profiles = profile_table(&loaded.table, &spec.profiler_options());
    let violations = validate(&loaded.table, &spec.rules, &profiles);

    for v in violations.iter().take(10) {
        eprintln!("   ❌ row {} '{}' [{}]: {}", v.row_index, v.column, v.kind.as_str(), v.message);
    }
    if violations.len() > 10 {
        eprintln!("   ... {} more", violations.len() - 10);
    }
    eprintln!("\n📊 Results: {} violation(s)", violations.len());

    write_output(&serde_json::to_string_pretty(&violations)?, output)?;
    if !violations.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_clean(input: &Path, spec: &Path, output: Option<&Path>, log: Option<&Path>) -> CmdResult {
    let loaded = load_input(input)?;
    let spec = read_spec(Some(spec))?;

    let outcome = run_pipeline(&loaded.table, &spec.stages, &CancellationToken::new())?;

    if let Some(path) = log {
        fs::write(path, serde_json::to_string_pretty(&outcome.log)?)?;
        eprintln!("💾 Cleaning log written to: {}", path.display());
    }
    write_csv(&outcome.table, loaded.delimiter, output)
}

fn cmd_run(input: &Path, spec: Option<&Path>, output: Option<&Path>, cleaned: Option<&Path>) -> CmdResult {
    let loaded = load_input(input)?;
    let spec = read_spec(spec)?;

    let analysis = analyze(&loaded.table, &spec, &CancellationToken::new())?;

    if let Some(path) = cleaned {
        write_csv(&analysis.cleaned, loaded.delimiter, Some(path))?;
    }
    write_output(&serde_json::to_string_pretty(&analysis.report)?, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_example_spec() -> CmdResult {
    let spec = example_spec()?;
    println!("{}", spec.to_json()?);
    Ok(())
}

fn cmd_stages() -> CmdResult {
    println!("{}", stages_description());
    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> CmdResult {
    let mut config = AppConfig::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    excel_cleaner::start_server(config).await
}

fn load_input(input: &Path) -> Result<LoadedTable, Box<dyn std::error::Error>> {
    eprintln!("📄 Reading: {}", input.display());
    Ok(load_file(input)?)
}

fn read_spec(path: Option<&Path>) -> Result<PipelineSpec, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            let content = fs::read_to_string(p)?;
            Ok(PipelineSpec::from_json(&content)?)
        }
        None => Ok(PipelineSpec::default()),
    }
}

fn write_csv(table: &excel_cleaner::Table, delimiter: char, path: Option<&Path>) -> CmdResult {
    match path {
        Some(p) => {
            write_table(table, fs::File::create(p)?, delimiter)?;
            eprintln!("💾 Cleaned table written to: {}", p.display());
        }
        None => write_table(table, io::stdout().lock(), delimiter)?,
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CmdResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
