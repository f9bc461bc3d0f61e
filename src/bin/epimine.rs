use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use epigenomic_miner::app::{
    App, ConcatResult, MineResult, PlanResult, ProgressSinkKind, StatusResult,
};
use epigenomic_miner::concatenate::TableStatus;
use epigenomic_miner::config::{ConfigLoader, Overrides};
use epigenomic_miner::domain::{Grouping, Statistic};
use epigenomic_miner::error::MinerError;
use epigenomic_miner::executor::{TaskStatus, Workers};
use epigenomic_miner::output::{BarProgress, JsonOutput, OutputMode};
use epigenomic_miner::tui::Tui;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "epimine")]
#[command(about = "Mine per-region statistics from replicate epigenomic tracks")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show the groups that would be mined")]
    Plan,
    #[command(about = "Mine every group that has no output yet")]
    Mine,
    #[command(about = "Join mined tables into one table per cell line")]
    Concat,
    #[command(about = "List mined files and tables per cell line")]
    Status,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Config file (default: ./epimine.json, then the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Metadata table (CSV with cell_line, target, accession columns).
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,

    /// Directory holding <accession>.bed.gz signal files.
    #[arg(long, global = true)]
    sources: Option<Utf8PathBuf>,

    /// Directory receiving mined and concatenated tables.
    #[arg(long, global = true)]
    targets: Option<Utf8PathBuf>,

    #[arg(long = "cell-line", global = true)]
    cell_lines: Vec<String>,

    #[arg(long, global = true)]
    assembly: Option<String>,

    /// Worker threads: a positive count, or `all` / -1.
    #[arg(long, global = true, allow_hyphen_values = true)]
    workers: Option<Workers>,

    #[arg(long, global = true, value_enum)]
    grouping: Option<Grouping>,

    /// Statistic to compute; repeat for several.
    #[arg(long = "stat", global = true, value_enum)]
    statistics: Vec<Statistic>,

    #[arg(long, global = true)]
    missing_threshold: Option<f64>,

    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    verify_alignment: Option<bool>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            metadata: self.metadata.clone(),
            sources: self.sources.clone(),
            targets: self.targets.clone(),
            cell_lines: self.cell_lines.clone(),
            assembly: self.assembly.clone(),
            workers: self.workers,
            grouping: self.grouping,
            statistics: self.statistics.clone(),
            missing_threshold: self.missing_threshold,
            verify_alignment: self.verify_alignment,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MinerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MinerError) -> u8 {
    if error.is_configuration() {
        return 2;
    }
    match error {
        MinerError::MetadataRead(_)
        | MinerError::MetadataParse(_)
        | MinerError::MissingMetadataColumn(_)
        | MinerError::MisalignedSources { .. }
        | MinerError::MalformedSource { .. }
        | MinerError::MisalignedTables { .. }
        | MinerError::MalformedTable { .. }
        | MinerError::EmptyGroup(_)
        | MinerError::InvalidStrand(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.run.config.as_deref(), cli.run.overrides())
        .map_err(miette::Report::new)?;
    let app = App::new(config);

    match cli.command {
        Commands::Plan => run_plan(app, output_mode),
        Commands::Mine => run_mine(app, output_mode),
        Commands::Concat => run_concat(app, output_mode),
        Commands::Status => run_status(app, output_mode),
    }
}

fn run_plan(app: App, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.plan(&JsonOutput).map_err(miette::Report::new)?;
            JsonOutput::print_plan(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            // Plan only reads the metadata table.
            let result = app.plan(&JsonOutput).map_err(miette::Report::new)?;
            print_plan_summary(&result);
            Ok(())
        }
    }
}

fn run_mine(app: App, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.mine(&BarProgress::new()).map_err(miette::Report::new)?;
            JsonOutput::print_mine(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Mine, app.config());
            let result = tui.run(move |sink| app.mine(sink))?;
            print_mine_summary(&result);
            Ok(())
        }
    }
}

fn run_concat(app: App, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .concatenate(&BarProgress::new())
                .map_err(miette::Report::new)?;
            JsonOutput::print_concat(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Concatenate, app.config());
            let result = tui.run(move |sink| app.concatenate(sink))?;
            print_concat_summary(&result);
            Ok(())
        }
    }
}

fn run_status(app: App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.status(&JsonOutput).map_err(miette::Report::new)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_status(&result).into_diagnostic(),
        OutputMode::Interactive => {
            print_status_summary(&result);
            Ok(())
        }
    }
}

fn print_plan_summary(result: &PlanResult) {
    println!("{CYAN}epimine plan{RESET}");
    println!(
        "{GREEN}groups to mine: {}{RESET}   {YELLOW}already mined: {}{RESET}",
        result.tasks.len(),
        result.skipped
    );
    for task in &result.tasks {
        println!(
            "{CYAN}* {}/{}{RESET} <- {} source(s)",
            task.cell_line,
            task.name,
            task.sources.len()
        );
        println!("    -> {}", task.target);
    }
}

fn print_mine_summary(result: &MineResult) {
    println!("{CYAN}epimine summary{RESET}");
    if result.nothing_to_do {
        println!(
            "{YELLOW}nothing to mine ({} groups already done){RESET}",
            result.skipped
        );
        return;
    }
    println!("{GREEN}mined: {}{RESET}", result.mined);
    println!("{YELLOW}already mined: {}{RESET}", result.skipped);
    let color = if result.corrupted > 0 { RED } else { GREEN };
    println!("{color}corrupted: {}{RESET}", result.corrupted);
    for task in &result.tasks {
        match &task.status {
            TaskStatus::Mined { rows } => {
                println!("{GREEN}+ {}/{} ({rows} regions){RESET}", task.cell_line, task.name)
            }
            TaskStatus::Corrupted { sources, reason } => {
                println!("{RED}! {}/{}: {reason}{RESET}", task.cell_line, task.name);
                for source in sources {
                    println!("{RED}    removed {source}{RESET}");
                }
            }
        }
    }
}

fn print_concat_summary(result: &ConcatResult) {
    println!("{CYAN}epimine concat{RESET}");
    println!("{GREEN}tables written: {}{RESET}", result.written);
    for table in &result.tables {
        match &table.status {
            TableStatus::Written { rows, columns } => println!(
                "{GREEN}+ {} ({rows} regions x {columns} features){RESET}",
                table.path
            ),
            TableStatus::Skipped => println!("{YELLOW}= {} (exists){RESET}", table.path),
            TableStatus::Missing => {
                println!("{YELLOW}? {} (no group in the metadata){RESET}", table.cell_line)
            }
            TableStatus::Incomplete { missing } => println!(
                "{RED}! {} (not mined yet: {}){RESET}",
                table.cell_line,
                missing.join(", ")
            ),
        }
    }
}

fn print_status_summary(result: &StatusResult) {
    println!("{CYAN}epimine status{RESET} ({})", result.targets);
    for entry in &result.cell_lines {
        let table = match &entry.table {
            Some(_) => format!("{GREEN}table ready{RESET}"),
            None => format!("{YELLOW}no table{RESET}"),
        };
        println!("{} - {} mined, {table}", entry.cell_line, entry.mined.len());
        for feature in &entry.mined {
            println!("    {feature}");
        }
    }
}
