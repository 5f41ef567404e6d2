use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;
mod target;

use commands::hex_utils::parse_hex_address;
use target::TargetArgs;

#[derive(Parser)]
#[command(name = "typescout")]
#[command(version, about = "Reflection layout discovery for game runtimes")]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    /// TOML file overriding discovery thresholds and sample sizes
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full discovery pipeline and print the offset table
    Discover {
        /// Write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the module's sections
    Sections,

    /// Search a section for a byte pattern (e.g. "48 8D 0D ? ? ? ?")
    Scan {
        pattern: String,

        #[arg(short, long, default_value = ".text")]
        section: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Hexdump memory at an address
    Hexdump {
        #[arg(value_parser = parse_hex_address)]
        address: u64,

        #[arg(short, long, default_value_t = 256)]
        size: usize,

        /// Show the ASCII column
        #[arg(short, long)]
        ascii: bool,
    },

    /// Copy the module sections and extra regions into a snapshot directory
    Capture {
        output: PathBuf,

        /// Extra region as ADDRESS:SIZE, both hex (repeatable)
        #[arg(short, long = "region")]
        regions: Vec<String>,

        #[arg(short, long)]
        note: Option<String>,

        /// Skip the discovery pass that records which heap pages to keep
        #[arg(long)]
        shallow: bool,
    },

    /// Run discovery, then list the properties of a class or struct by name
    Layout { name: String },

    /// Print the effective discovery settings as TOML
    Settings,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("typescout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref())?;

    // only the commands that read memory attach to a target
    let open = || cli.target.open();
    match cli.command {
        Command::Settings => {
            print!("{}", settings::render(&config)?);
            Ok(())
        }
        Command::Discover { output } => commands::discover::run(&open()?, config, output.as_deref()),
        Command::Sections => commands::sections::run(&open()?),
        Command::Scan {
            pattern,
            section,
            limit,
        } => commands::scan::run(&open()?, &pattern, &section, limit),
        Command::Hexdump {
            address,
            size,
            ascii,
        } => commands::hexdump::run(&open()?, address, size, ascii),
        Command::Capture {
            output,
            regions,
            note,
            shallow,
        } => commands::capture::run(&open()?, &output, &regions, note, shallow, config),
        Command::Layout { name } => commands::layout::run(&open()?, &name, config),
    }
}
