//! `parallax init` - set up the project-local workspace.

use clap::Args;
use std::path::Path;

use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: InitArgs, json: bool) -> anyhow::Result<()> {
    let dir = Path::new(".parallax");
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let config_path = dir.join("config.yaml");
    let wrote_config = if config_path.exists() && !args.force {
        false
    } else {
        let config = Config::default();
        std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;
        true
    };

    let config = Config::default();
    initialize_database(&format!("sqlite:{}", config.database.path)).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "config": config_path.display().to_string(),
                "config_written": wrote_config,
                "database": config.database.path,
            })
        );
    } else {
        if wrote_config {
            println!("Wrote {}", config_path.display());
        } else {
            println!("{} already exists (use --force to overwrite)", config_path.display());
        }
        println!("Database ready at {}", config.database.path);
    }
    Ok(())
}
