mod commands;
mod output;

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "mtc",
    version,
    about = "Fill Material Test Certificate workbooks from microstructure, tensile and hardness reports"
)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    log_level: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract all reports and write the values into a certificate workbook
    #[command(group(
        ArgGroup::new("sources")
            .required(true)
            .multiple(true)
            .args(["micro", "tensile", "hardness"])
    ))]
    Fill {
        /// Microstructure report (docx)
        #[arg(long, value_name = "DOCX")]
        micro: Option<PathBuf>,

        /// Tensile report (PDF)
        #[arg(long, value_name = "PDF")]
        tensile: Option<PathBuf>,

        /// Hardness report (PDF)
        #[arg(long, value_name = "PDF")]
        hardness: Option<PathBuf>,

        /// Certificate workbook to update in place
        #[arg(short, long, value_name = "XLSX")]
        workbook: PathBuf,

        /// Custom JSON cell map (default: the standard certificate layout)
        #[arg(short, long, value_name = "FILE")]
        cells: Option<PathBuf>,

        /// PDF text backend: auto, lopdf or pdftotext
        #[arg(short, long, default_value = "auto", value_parser = ["auto", "lopdf", "pdftotext"])]
        backend: String,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Show how each value was located
        #[arg(long)]
        verbose: bool,
    },
    /// Run one extraction pipeline and print what it found
    Extract {
        /// Report kind
        #[arg(value_parser = ["micro", "tensile", "hardness"])]
        kind: String,

        /// Path to the report
        input_file: PathBuf,

        /// PDF text backend: auto, lopdf or pdftotext
        #[arg(short, long, default_value = "auto", value_parser = ["auto", "lopdf", "pdftotext"])]
        backend: String,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Show how each value was located
        #[arg(long)]
        verbose: bool,
    },
    /// Print the mapped cells of a certificate workbook
    Inspect {
        /// Certificate workbook
        workbook: PathBuf,

        /// Custom JSON cell map
        #[arg(short, long, value_name = "FILE")]
        cells: Option<PathBuf>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Show or validate cell maps
    Cells {
        #[command(subcommand)]
        action: CellsAction,
    },
}

#[derive(Subcommand)]
enum CellsAction {
    /// Print the built-in cell map
    Show,
    /// Validate a custom cell map file
    Validate {
        /// Path to JSON cell map
        file: PathBuf,
    },
}

/// Directives from `RUST_LOG` win; otherwise `-v` picks the level.
fn log_filter(verbosity: u8, directives: &str) -> EnvFilter {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(directives)
}

fn main() {
    let cli = Cli::parse();

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.log_level, &directives))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging disabled: {e}");
    }

    let result = match cli.command {
        Commands::Fill {
            micro,
            tensile,
            hardness,
            workbook,
            cells,
            backend,
            output,
            verbose,
        } => commands::fill::run(
            commands::fill::FillArgs {
                micro,
                tensile,
                hardness,
                workbook,
                cells,
            },
            &backend,
            &output,
            verbose,
        ),
        Commands::Extract {
            kind,
            input_file,
            backend,
            output,
            verbose,
        } => commands::extract::run(&kind, &input_file, &backend, &output, verbose),
        Commands::Inspect {
            workbook,
            cells,
            output,
        } => commands::inspect::run(&workbook, cells.as_deref(), &output),
        Commands::Cells { action } => match action {
            CellsAction::Show => commands::cells::show(),
            CellsAction::Validate { file } => commands::cells::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
