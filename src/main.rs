//! Vital File Tools (VFT) - CLI entry point

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Tracks { file, json, strict } => commands::tracks::run(&file, json, strict),
        Commands::Export {
            file,
            grid,
            render,
            output,
        } => commands::export::run(&file, &grid, &render, output.as_deref()),
        Commands::Copy {
            input,
            output,
            tracks,
            max_length,
        } => commands::copy::run(&input, &output, tracks.as_deref(), max_length),
        Commands::Deid {
            input,
            output,
            shift,
            target_epoch,
        } => commands::deid::run(&input, &output, shift, target_epoch),
        Commands::Batch {
            dir,
            out,
            grid,
            render,
        } => commands::batch::run(&dir, out.as_deref(), &grid, &render),
    }
}
