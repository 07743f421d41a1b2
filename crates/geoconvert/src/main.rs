//! geoconvert: command-line entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use geoconvert::{ParsedForm, SessionWalker, Snapshot, WizardConfig};

#[derive(Parser)]
#[command(
    name = "geoconvert",
    about = "Convert a geography-keyed CSV through the GeoConvert web service",
    version
)]
struct Cli {
    /// Path to a JSON config file (also GEOCONVERT_CONFIG).
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
    /// Upload a file, walk the wizard and download the converted results.
    Convert {
        /// File to convert.
        file: PathBuf,

        /// Directory for downloaded results.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Service base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Override a step selection: STEP.FIELD=TEXT (e.g. step4.find_lut=LUT_OA01_OA11).
        /// Can be repeated.
        #[arg(long = "set", value_name = "STEP.FIELD=TEXT")]
        overrides: Vec<String>,

        /// Request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Parse the first form of a saved page and print it as JSON.
    Inspect {
        /// HTML file to parse.
        page: PathBuf,
    },

    /// Print the effective configuration as JSON.
    Config,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            file,
            output_dir,
            base_url,
            overrides,
            timeout_ms,
        } => {
            let mut config = WizardConfig::resolve(cli.config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(url) = base_url {
                config.base_url = url;
            }
            if timeout_ms.is_some() {
                config.timeout_ms = timeout_ms;
            }
            for assignment in &overrides {
                config.apply_override(assignment)?;
            }

            let files = SessionWalker::run(config, &file).await?;
            for f in &files {
                println!("{}", f.path.display());
            }
        }

        Commands::Inspect { page } => {
            let body = std::fs::read_to_string(&page)?;
            let snapshot = Snapshot::parse(page.display().to_string(), &body);
            let form = snapshot.first_form()?;
            let attributes: serde_json::Map<String, serde_json::Value> = form
                .attributes()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                .collect();
            let parsed = ParsedForm::from_snapshot(&snapshot)?;
            let out = serde_json::json!({
                "attributes": attributes,
                "form": parsed,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Config => {
            let config = WizardConfig::resolve(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "geoconvert", &mut std::io::stdout());
        }
    }

    Ok(())
}
