use clap::Parser;
use flowpilot::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Run(args) => cli::run::run(args).await,
    }
}
