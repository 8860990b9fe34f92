//! Parallax CLI entry point.

use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use parallax::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { json, command } = Cli::parse();
    let correlation_id = Uuid::new_v4();
    let span = tracing::info_span!("command", correlation_id = %correlation_id);

    let result = async {
        match command {
            Commands::Init(args) => parallax::cli::commands::init::execute(args, json).await,
            Commands::Research(args) => {
                parallax::cli::commands::research::execute(args, json).await
            }
        }
    }
    .instrument(span)
    .await;

    if let Err(err) = result {
        parallax::cli::handle_error(err, json, correlation_id);
    }
}
