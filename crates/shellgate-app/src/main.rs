use anyhow::Result;
use clap::Parser;

mod cli;
mod connect;
mod logging;
mod serve;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"), cli.log_json)?;
            serve::run(args).await
        }
        Commands::Connect(args) => {
            // Raw-mode terminal: keep the log quiet unless asked
            logging::init(cli.log_level.as_deref().unwrap_or("warn"), cli.log_json)?;
            let code = connect::run(args).await?;
            // stdin is read on a blocking thread that would hold up runtime shutdown
            std::process::exit(code);
        }
    }
}
