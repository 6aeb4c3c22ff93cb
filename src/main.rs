#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use pua_surface::config::PipelineConfig;
use pua_surface::data::load_rows;
use pua_surface::pipeline::{PipelineRun, fit_models, prepare};
use pua_surface::report::{write_preparation, write_run};

#[derive(Args)]
pub struct InputArgs {
    /// Delimited patient-level input file with a header row
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory receiving datasets, records, and tables
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// TOML configuration overriding the built-in defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read comma-separated input instead of tab-separated
    #[arg(long)]
    pub comma: bool,
}

#[derive(Parser)]
#[command(
    name = "pua-surface",
    about = "Attachment response-surface analysis of perioperative care intensity",
    long_about = "Rescores attachment questionnaires, builds the perioperative intensity index, \
                 and fits the objective-burden baseline and the attachment response-surface \
                 regressions with HC3 robust standard errors."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the data and fit every model
    #[command(about = "Run the full analysis (outputs: model_results.toml, tables/)")]
    Run(InputArgs),

    /// Derive the analysis columns without fitting
    #[command(about = "Prepare the dataset (outputs: prepared_dataset.tsv, audit.toml)")]
    Prepare(InputArgs),

    /// Print the default configuration
    #[command(about = "Print the default configuration as TOML")]
    Config,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            println!("Using configuration from '{}'", path.display());
            Ok(PipelineConfig::load(path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn separator(args: &InputArgs) -> u8 {
    if args.comma { b',' } else { b'\t' }
}

fn run_analysis(args: InputArgs, fit: bool) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_deref())?;
    fs::create_dir_all(args.out_dir.join("tables"))?;

    let rows = load_rows(&args.input, &config.columns.patient_id, separator(&args))?;
    let mut prepared = prepare(rows, &config)?;
    println!(
        "Prepared {} rows; attachment scores: {:?}",
        prepared.rows.n_rows(),
        prepared.audit.attachment_source
    );
    for omission in &prepared.audit.omissions {
        println!("  omitted: {omission}");
    }

    let written = if fit {
        let results = fit_models(&mut prepared, &config)?;
        match results.delta_r_squared {
            Some(delta) => println!("Delta R² (extended - baseline): {delta:.4}"),
            None => println!("Delta R² undefined"),
        }
        let run = PipelineRun { prepared, results };
        write_run(&args.out_dir, &run, &config)?
    } else {
        write_preparation(&args.out_dir, &prepared, &config)?
    };

    for path in &written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Run(args)) => run_analysis(args, true),
        Some(Commands::Prepare(args)) => run_analysis(args, false),
        Some(Commands::Config) => PipelineConfig::default()
            .to_toml()
            .map(|text| print!("{text}"))
            .map_err(Into::into),
        None => Cli::command().print_help().map(|()| println!()).map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
