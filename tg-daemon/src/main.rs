//! Thermguard Daemon (thermguardd)
//!
//! Polls every temperature sensor of the configured subsystems, publishes
//! their state and powers the system off on a confirmed emergency reading.
//!
//! # Security Model
//! - **Privilege**: Runs as root for /sys and /dev/i2c-* access
//! - **Socket**: Unix domain socket with owner-only permissions (0600)
//! - **Audit**: Peer credential logging (UID/GID/PID) for control requests
//! - **Isolation**: Restrictive umask, working directory set to /
//! - **Signals**: Shutdown between ticks with resource cleanup

mod poll_loop;
mod power;
mod server;

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use tg_core::constants::paths;
use tg_core::{
    BackendRegistry, DaemonSettings, JsonDescriptionLoader, JsonFileStore, Monitor, Reconciler, ThermError,
};

use crate::poll_loop::{run_poll_loop, LoopExit};
use crate::power::CommandPowerOff;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter environment variable
const LOG_ENV: &str = "THERMGUARD_LOG";

/// Queue depth between the control server and the poll loop
const COMMAND_QUEUE: usize = 16;

// ============================================================================
// Security Hardening
// ============================================================================

/// Set restrictive umask
fn set_secure_umask() {
    // SAFETY: umask only replaces the process file creation mask.
    unsafe { libc::umask(0o077) };
    debug!("Umask set to 0077");
}

/// Change to root directory
fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

/// Hardware access needs root; say so early instead of failing every read
fn verify_privileges() -> tg_core::Result<()> {
    // SAFETY: geteuid and getuid only return the process's user IDs.
    let euid = unsafe { libc::geteuid() };
    let uid = unsafe { libc::getuid() };
    check_privileges(euid, uid)
}

fn check_privileges(euid: libc::uid_t, uid: libc::uid_t) -> tg_core::Result<()> {
    if euid != 0 {
        return Err(ThermError::PermissionDenied(format!(
            "thermguardd must run as root (euid={}) for hardware access",
            euid
        )));
    }
    if uid != 0 {
        warn!(uid, euid, "Running as setuid root");
    }
    Ok(())
}

fn validate_socket_path(path: &Path) -> anyhow::Result<()> {
    if !path.is_absolute() {
        bail!("Socket path must be absolute: {}", path.display());
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        bail!("Socket path contains path traversal: {}", path.display());
    }
    if path.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        bail!("Socket path is a symlink, refusing: {}", path.display());
    }
    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

/// Write the PID file, refusing to start next to a live instance
fn write_pid_file(path: &Path) -> anyhow::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Ok(content) = std::fs::read_to_string(path) {
        if let Ok(old_pid) = content.trim().parse::<i32>() {
            // SAFETY: signal 0 only checks whether the process exists.
            if old_pid > 0 && unsafe { libc::kill(old_pid, 0) } == 0 {
                bail!("Another instance is running (PID {})", old_pid);
            }
        }
        let _ = std::fs::remove_file(path);
        debug!(path = %path.display(), "Removed stale PID file");
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
        .with_context(|| format!("Could not create PID file {}", path.display()))?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;
    Ok(())
}

fn cleanup(socket_path: &Path, pid_path: &Path) {
    for path in [socket_path, pid_path] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Cleanup failed");
            }
        }
    }
    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

struct Args {
    config: PathBuf,
    socket: Option<PathBuf>,
    platform: Option<String>,
}

fn print_help() {
    eprintln!("thermguardd {} - platform temperature daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermguardd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH     Settings file (default {}/{})", paths::CONFIG_DIR, paths::SETTINGS_FILE);
    eprintln!("    -s, --socket PATH     Control socket path");
    eprintln!("    -p, --platform NAME   Backend platform identifier");
    eprintln!("    -f, --foreground      Run in foreground (always on)");
    eprintln!("    -v, --version         Print version");
    eprintln!("    -h, --help            Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}        Log filter (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    {}   Overrides the settings platform", tg_core::settings::ENV_PLATFORM);
    eprintln!("    {}  Overrides the poll interval", tg_core::settings::ENV_POLL_SECS);
}

/// `None` means the process should exit successfully (help or version)
fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args {
        config: Path::new(paths::CONFIG_DIR).join(paths::SETTINGS_FILE),
        socket: None,
        platform: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("thermguardd {}", VERSION);
                return Ok(None);
            }
            "-f" | "--foreground" => {}
            "-c" | "--config" => {
                args.config = iter.next().context("--config requires a path")?.into();
            }
            "-s" | "--socket" => {
                args.socket = Some(iter.next().context("--socket requires a path")?.into());
            }
            "-p" | "--platform" => {
                args.platform = Some(iter.next().context("--platform requires a name")?);
            }
            other => {
                print_help();
                bail!("Unknown argument: {}", other);
            }
        }
    }
    Ok(Some(args))
}

/// journald when the journal socket exists, stdout otherwise
fn init_logging() -> bool {
    use tracing_subscriber::prelude::*;

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(layer) => {
                tracing_subscriber::registry().with(layer).with(filter()).init();
                return true;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stdout", e),
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter())
        .init();
    false
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("PANIC at {}: {}", location, message);
    }));

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    set_secure_umask();
    secure_working_directory();
    let journald = init_logging();

    let mut settings = DaemonSettings::load(&args.config)
        .with_context(|| format!("Loading settings from {}", args.config.display()))?;
    if let Some(platform) = args.platform {
        settings.platform = platform;
    }
    if let Some(socket) = args.socket {
        settings.socket_path = socket;
    }
    settings.validate()?;

    info!(
        version = VERSION,
        platform = %settings.platform,
        interval_secs = settings.poll_interval_secs,
        desired = %settings.desired_config_path.display(),
        state = %settings.state_path.display(),
        socket = %settings.socket_path.display(),
        logging = if journald { "journald" } else { "stdout" },
        "STARTUP: thermguardd starting"
    );

    verify_privileges()?;
    validate_socket_path(&settings.socket_path)?;
    let pid_path = PathBuf::from(paths::PID_FILE);
    write_pid_file(&pid_path)?;

    // Signals only request a stop; the poll loop finishes its tick first
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM, stopping after the current tick");
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "Failed to set signal handler");
    }

    let backends = BackendRegistry::with_builtin(&settings.hwmon_root, &settings.i2c_dev_dir);
    let reconciler = Reconciler::new(&settings.platform, Box::new(JsonDescriptionLoader));
    let power = CommandPowerOff::new(&settings.poweroff_command);
    let monitor = Monitor::new(reconciler, backends, Box::new(power));
    let store = JsonFileStore::open(&settings.desired_config_path, &settings.state_path);

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let socket_path = settings.socket_path.clone();
    let server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = server::run_server(&socket_path, command_tx, server_shutdown).await {
            error!(error = %e, "Control socket failed, continuing without it");
        }
    });

    let exit = run_poll_loop(
        monitor,
        store,
        settings.poll_interval(),
        command_rx,
        shutdown_rx,
    )
    .await;

    server.abort();
    cleanup(&settings.socket_path, &pid_path);
    match exit {
        LoopExit::Requested => info!("SHUTDOWN: Exit requested, daemon terminated"),
        LoopExit::Signal => info!("SHUTDOWN: Daemon terminated by signal"),
    }
    Ok(())
}
