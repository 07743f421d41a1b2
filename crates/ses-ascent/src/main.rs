//! ses-fit: grid-searched extra-trees fit of SES ascent.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use ses_ascent::{pipeline, FitConfig, Scoring};

#[derive(Parser)]
#[command(
    name = "ses-fit",
    about = "Fit an extra-trees model of neighbourhood SES ascent",
    version
)]
struct Cli {
    /// Path to a JSON config file (also SES_FIT_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data, run the grid search and write the reports.
    Run {
        /// Directory holding the input tables.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory for the fit log and importance table.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Input file prefix (e.g. Untransformed).
        #[arg(short, long)]
        mode: Option<String>,

        /// Random seed for the split and the trees.
        #[arg(long)]
        seed: Option<u64>,

        /// Cross-validation folds.
        #[arg(long)]
        folds: Option<usize>,

        /// neg_mean_squared_error, neg_mean_absolute_error or r2.
        #[arg(long)]
        scoring: Option<Scoring>,

        /// Share of rows held out for testing.
        #[arg(long)]
        test_size: Option<f64>,

        /// Worker threads.
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Print the hyperparameter grid and its permutation count.
    Grid,

    /// Print the effective configuration as JSON.
    Config,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            data_dir,
            output_dir,
            mode,
            seed,
            folds,
            scoring,
            test_size,
            threads,
        } => {
            let mut config = FitConfig::resolve(cli.config.as_deref())?;
            if let Some(v) = data_dir {
                config.data_dir = v;
            }
            if let Some(v) = output_dir {
                config.output_dir = v;
            }
            if let Some(v) = mode {
                config.mode = v;
            }
            if let Some(v) = seed {
                config.seed = v;
            }
            if let Some(v) = folds {
                config.folds = v;
            }
            if let Some(v) = scoring {
                config.scoring = v;
            }
            if let Some(v) = test_size {
                config.test_size = v;
            }
            if threads.is_some() {
                config.threads = threads;
            }

            let fit = pipeline::run(&config)?;

            println!("Best score ({}): {}", fit.scoring, fit.best_score);
            println!("Best parameters: {}", fit.best_params);
            println!();
            println!("{}", fit.model);
            println!();
            print!("{}", fit.test_report);
            println!();
            for fi in fit.importances.iter().take(config.top_features) {
                println!("{:<40} {:.6}", fi.feature, fi.importance);
            }
        }

        Commands::Grid => {
            let config = FitConfig::resolve(cli.config.as_deref())?;
            for line in config.grid.summary() {
                println!("{line}");
            }
        }

        Commands::Config => {
            let config = FitConfig::resolve(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ses-fit", &mut std::io::stdout());
        }
    }

    Ok(())
}
