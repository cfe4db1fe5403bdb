use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("seiva error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    match cli.command {
        cli::Commands::Versions => {
            commands::versions::handle();
            Ok(())
        }
        cli::Commands::ConfigCheck => {
            let config = seiva_config::SeivaConfig::load_with_dotenv()?;
            commands::config_check::handle(&config)
        }
        cli::Commands::Scrape(args) => {
            let config = seiva_config::SeivaConfig::load_with_dotenv()?;
            commands::scrape::handle(args, &config).await
        }
        cli::Commands::Document(args) => {
            let config = seiva_config::SeivaConfig::load_with_dotenv()?;
            commands::document::handle(args, &config).await
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("SEIVA_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
