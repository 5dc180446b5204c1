//! roomd - TCP chat relay daemon
//!
//! Accepts persistent TCP connections from chat clients and fans every
//! `sender>>payload` line out to all other connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay (foreground)
//! roomd start
//!
//! # Start the relay (background/daemonized)
//! roomd start -d
//!
//! # Start on a custom address
//! roomd start --addr 0.0.0.0:4000
//! ROOMD_ADDR=0.0.0.0:4000 roomd start
//!
//! # Stop the running relay
//! roomd stop
//!
//! # Check relay status
//! roomd status
//!
//! # Enable debug logging
//! RUST_LOG=roomd=debug roomd start
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT trigger a graceful shutdown bounded by the configured
//! deadline; overrunning it exits non-zero.

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomd::config::{Config, DEFAULT_LISTEN_ADDR, LISTEN_ADDR_ENV};
use roomd::server::RelayServer;

/// room relay daemon
#[derive(Parser, Debug)]
#[command(name = "roomd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Listen address (overrides ROOMD_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Stop the running relay
    Stop,
    /// Show relay status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("roomd")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("roomd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("roomd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        addr: None,
    });

    match command {
        Command::Start { daemon, addr } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Relay is already running (PID {pid})");
                eprintln!("Use 'roomd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_relay(addr);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping relay (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Relay stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Relay did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Relay is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Relay is running (PID {pid})");

                let addr = env::var(LISTEN_ADDR_ENV)
                    .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
                println!("Address: {addr}");

                Ok(())
            } else {
                println!("Relay is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_relay(addr_override: Option<String>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("roomd=info".parse()?)
                .add_directive("room_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "roomd starting"
    );

    let mut config = Config::from_env();
    if let Some(addr) = addr_override {
        config.listen_addr = addr;
    }

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Binding failure is fatal and exits non-zero, as does a shutdown
    // overrunning its deadline.
    let server = RelayServer::bind(&config, cancel_token).await?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Relay error");
        return Err(e.into());
    }

    info!("roomd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
