//! Thin subcommand wrappers: each loads [`Options`](crate::options) from the
//! environment and calls into the core engine.

use std::io::BufReader;
use std::path::Path;
use std::process::{ExitCode, Stdio};

use anyhow::{Context, Result};

use crate::image;
use crate::launcher;
use crate::lifecycle;
use crate::options::{self, CoreOptions};
use crate::rootfs;
use crate::state::Store;

fn store_for(core: &CoreOptions) -> Store {
    Store::new(core.target_dir.clone())
}

pub fn enter() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    let sc = crate::syscall::create_syscall();
    let status = crate::enter::run(&store, &core.id, sc.as_ref())
        .with_context(|| format!("running container init for {}", core.id))?;
    Ok(exit_code_from(status))
}

pub fn find() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    let details = lifecycle::find(&store, &core.id)
        .with_context(|| format!("finding container {}", core.id))?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(ExitCode::SUCCESS)
}

pub fn delete() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    lifecycle::delete(&store, &core.id)
        .with_context(|| format!("deleting container {}", core.id))?;
    Ok(ExitCode::SUCCESS)
}

pub fn start() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    launcher::start(&store, &core.id)
        .with_context(|| format!("starting container {}", core.id))?;
    Ok(ExitCode::SUCCESS)
}

pub fn run() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    let run_options = options::load_run_options().context("loading run options")?;

    image::pull(&store, &run_options.image).context("pulling image")?;
    rootfs::create(&store, &core.id, run_options).context("creating rootfs")?;
    launcher::start(&store, &core.id).context("starting container")?;
    Ok(ExitCode::SUCCESS)
}

pub fn command() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    let store = store_for(&core);
    let cmd = options::command().context("loading command to execute")?;
    let user = options::user();

    let status = crate::exec::execute(
        &store,
        &core.id,
        user.as_deref(),
        &cmd,
        (Stdio::inherit(), Stdio::inherit(), Stdio::inherit()),
    )
    .with_context(|| format!("executing command in container {}", core.id))?;
    Ok(exit_code_from(status))
}

pub fn stop() -> Result<ExitCode> {
    let core = CoreOptions::load().context("loading core options")?;
    lifecycle::stop(&core.id).with_context(|| format!("stopping container {}", core.id))?;
    Ok(ExitCode::SUCCESS)
}

pub fn target_architecture() -> Result<ExitCode> {
    println!("{}", std::env::consts::ARCH);
    Ok(ExitCode::SUCCESS)
}

/// Runs inside `rootless::helper_command`'s namespaces, re-exec'd by
/// [`rootfs::HelperExtractor`](crate::rootfs::HelperExtractor); never
/// invoked directly by a user.
pub fn extract_layer(layer_path: &Path, rootfs_dir: &Path) -> Result<ExitCode> {
    let file = std::fs::File::open(layer_path)
        .with_context(|| format!("opening layer {}", layer_path.display()))?;
    crate::rootfs::tar::extract_layer(BufReader::new(file), rootfs_dir)
        .with_context(|| format!("extracting layer {} into {}", layer_path.display(), rootfs_dir.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Propagates a child's exit code when one is available; `1` otherwise.
fn exit_code_from(status: Option<i32>) -> ExitCode {
    match status {
        Some(0) => ExitCode::SUCCESS,
        Some(code) if (0..=255).contains(&code) => ExitCode::from(code as u8),
        _ => ExitCode::FAILURE,
    }
}
