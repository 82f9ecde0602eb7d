//! CLI module for flowpilot
//!
//! - `serve`: HTTP server streaming workflow events over SSE
//! - `run`: execute a definition file locally and print events as JSON lines

pub mod run;
pub mod serve;

use clap::{Parser, Subcommand};

/// flowpilot - workflow execution engine
#[derive(Parser)]
#[command(name = "flowpilot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Execute a workflow definition file
    Run(run::RunArgs),
}
