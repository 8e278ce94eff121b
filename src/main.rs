use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::ProgressIterator;

use reweight::plot::plot_audit;
use reweight::toy::{generate_dataset, SampleType};
use reweight::{Campaign, CampaignConfig, WeightStore};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write toy data and MC samples as CSV
    Generate {
        data: PathBuf,
        mc: PathBuf,
        #[arg(short, long, value_name = "N", default_value_t = 10000)]
        n: usize,
        #[arg(short, long, value_name = "SEED", default_value_t = 0)]
        seed: u64,
    },
    /// Run a single reweighting iteration
    Iterate { config: PathBuf },
    /// Iterate until every variable has converged
    Run {
        config: PathBuf,
        #[arg(short, long, value_name = "ITERS")]
        iterations: Option<usize>,
    },
    /// Add the current weights to an event file
    Apply {
        config: PathBuf,
        #[arg(short, long, value_name = "INPUT")]
        input: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// List the chains stored in a weights database
    Inspect { database: PathBuf },
    /// Plot the latest comparison recorded for an address
    Plot {
        database: PathBuf,
        address: String,
        #[arg(short, long, value_name = "OUTPUT", default_value = "reweighting.svg")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match cli.command {
        Some(Commands::Generate { data, mc, n, seed }) => {
            generate_dataset(n, SampleType::Data, seed)?.write_csv(&data)?;
            generate_dataset(n, SampleType::Simulation, seed + 1)?.write_csv(&mc)?;
            println!("Wrote {n} events to {:?} and {:?}", data, mc);
        }
        Some(Commands::Iterate { config }) => {
            let mut campaign = Campaign::new(CampaignConfig::load(config)?)?;
            let active = campaign.iterate()?;
            println!("{active} variable(s) still need reweighting");
        }
        Some(Commands::Run { config, iterations }) => {
            let mut campaign = Campaign::new(CampaignConfig::load(config)?)?;
            let iters = iterations.unwrap_or(campaign.config().max_iterations);
            let mut converged = None;
            for i in (0..iters).progress() {
                if campaign.iterate()? == 0 {
                    converged = Some(i + 1);
                    break;
                }
            }
            match converged {
                Some(i) => println!("Converged after {i} iteration(s)"),
                None => println!("Not converged after {iters} iteration(s)"),
            }
        }
        Some(Commands::Apply { config, input, output }) => {
            let campaign = Campaign::new(CampaignConfig::load(config)?)?;
            let n = campaign.apply(&input, &output)?;
            println!("Wrote {n} weighted events to {:?}", output);
        }
        Some(Commands::Inspect { database }) => {
            let store = WeightStore::open_read_only(&database)?;
            for (key, len) in store.chain_lengths()? {
                println!("{key}\t{len}");
            }
        }
        Some(Commands::Plot { database, address, output }) => {
            let store = WeightStore::open_read_only(&database)?;
            plot_audit(&store, &address, &output)?;
            println!("Writing plot to {:?}", output);
        }
        None => Cli::command().print_help()?,
    }
    Ok(())
}
