//! rootbox: entry point and subcommand dispatch.
//!
//! No positional arguments carry configuration; every subcommand loads its
//! parameters from the environment (see [`rootbox::options`]).

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rootbox::commands;

#[derive(Parser, Debug)]
#[command(name = "rootbox", version, about = "Rootless, daemonless container driver for development containers")]
struct Cli {
    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Container init: runs inside the fresh namespaces.
    ///
    /// Takes the base64-encoded workspace id as a positional argument so the
    /// re-exec'd sentinel argv (`<self> enter <base64(id)>`, see
    /// [`rootbox::process::sentinel_argv`]) parses; the id itself is still
    /// read from `DEVCONTAINER_ID`, not from this argument.
    Enter { sentinel_id: String },
    /// Print current container details for the configured id.
    Find,
    /// Stop then tear down rootfs and status.
    Delete,
    /// Launch namespaces and container init, detached.
    Start,
    /// Pull, then Create, then Start.
    Run,
    /// Exec a command inside a running container.
    Command,
    /// SIGKILL the container's helper PID.
    Stop,
    /// Print the host's CPU architecture tag.
    TargetArchitecture,
    /// Extracts one layer tarball into a rootfs. Only ever invoked by
    /// `rootbox`'s own re-exec from inside the namespace helper; never run
    /// this directly.
    #[command(hide = true)]
    ExtractLayer {
        layer_path: std::path::PathBuf,
        rootfs_dir: std::path::PathBuf,
    },
}

fn main() -> ExitCode {
    rootbox::logger::init();

    if let Err(e) = rootbox::helpers::install() {
        log::warn!("failed to install embedded helper binaries: {}", e);
    }

    let cli = Cli::parse();

    let result = match cli.subcommand {
        Command::Enter { .. } => commands::enter(),
        Command::Find => commands::find(),
        Command::Delete => commands::delete(),
        Command::Start => commands::start(),
        Command::Run => commands::run(),
        Command::Command => commands::command(),
        Command::Stop => commands::stop(),
        Command::TargetArchitecture => commands::target_architecture(),
        Command::ExtractLayer { layer_path, rootfs_dir } => {
            commands::extract_layer(&layer_path, &rootfs_dir)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
