use anyhow::Result;
use clap::{Parser, Subcommand};
use toyshop::config::ConfigArgs;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "toyshop",
    about = "Toy shop HTTP API server",
    version,
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Print the route table the server would mount
    Routes,

    /// Print the resolved configuration
    CheckConfig,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load `.env` from the working directory. A missing file is fine.
fn load_dotenv() -> Result<(), toyshop::error::StartupError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be applied before RUST_LOG and clap's env fallbacks are read.
    let dotenv = load_dotenv();
    init_tracing();
    dotenv?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = cli.config.resolve()?;
            tracing::info!(addr = %config.socket_addr(), "Starting toyshop");
            toyshop::serve(config).await?;
        }
        Commands::Routes => {
            let config = cli.config.resolve()?;
            let validator = toyshop::api::validate::IdValidator::for_kind(config.id_format);
            let loaded =
                toyshop::api::loader::load_routes(&toyshop::api::routes::registry(), &validator)?;
            print!("{}", loaded.table);
        }
        Commands::CheckConfig => {
            let config = cli.config.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
