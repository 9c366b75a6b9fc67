//! previewsync CLI - edit a live JSX preview by pointing at it.
//!
//! This is the main binary entry point. See the `previewsync` library for the
//! core functionality.

use anyhow::Result;
use clap::{Parser, Subcommand};
use previewsync::{commands, Config};
use std::path::PathBuf;

/// Opens the log file, or `None` to log to stderr.
///
/// Uses `PREVIEWSYNC_LOG_FILE`, else `<config dir>/previewsync.log`.
fn log_file() -> Option<std::fs::File> {
    let path = match std::env::var("PREVIEWSYNC_LOG_FILE") {
        Ok(path) => PathBuf::from(path),
        Err(_) => Config::config_dir().ok()?.join("previewsync.log"),
    };
    std::fs::File::create(&path).ok()
}

fn init_logging() {
    let default_filter = previewsync::env::Environment::current().default_log_filter();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(file) = log_file() {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.format_timestamp_secs().init();
}

// CLI
#[derive(Parser)]
#[command(name = "previewsync")]
#[command(version)]
#[command(about = "Point at a live preview element and edit its classes in source")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a project in a local sandbox and print its preview URL
    Serve {
        /// Project directory (the built-in template is used without a package.json)
        project_dir: PathBuf,
    },
    /// Replace the classes of the first matching element in a file
    Patch {
        /// Source file
        file: PathBuf,
        /// Tag name of the element
        #[arg(long)]
        tag: String,
        /// Current classes of the element
        #[arg(long, default_value = "")]
        class: String,
        /// New classes
        #[arg(long)]
        set: String,
        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },
    /// Print the position of the first matching element in a file
    Locate {
        /// Source file
        file: PathBuf,
        /// Tag name of the element
        #[arg(long)]
        tag: String,
        /// Current classes of the element
        #[arg(long, default_value = "")]
        class: String,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to config.json so the overrides persist
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { project_dir } => {
            let config = Config::load()?;
            commands::serve::run(&project_dir, &config)?;
        }
        Commands::Patch {
            file,
            tag,
            class,
            set,
            write,
        } => {
            commands::patch(&file, &tag, &class, &set, write)?;
        }
        Commands::Locate { file, tag, class } => {
            commands::locate(&file, &tag, &class)?;
        }
        Commands::Config { save } => {
            let config = Config::load()?;
            if save {
                config.save()?;
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
