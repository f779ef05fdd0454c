//! btsd - Bluetooth profile service daemon
//!
//! Hosts the HFP audio gateway and hands-free runtimes on one event loop
//! and serves them to applications over a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the service (foreground)
//! btsd start
//!
//! # Start in the background with a config file
//! btsd start -d --config /etc/btsd.toml
//!
//! # Ask the running service which profiles it serves
//! btsd status
//!
//! # Print the effective configuration
//! btsd config
//!
//! # Stop the service
//! btsd stop
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bt_client::{ClientConfig, RpcClient};
use bt_core::{BtAddress, BtError, ProfileId};
use bt_protocol::{AgRequest, HfRequest, Request};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use btsd::profiles::ag::NullAgStack;
use btsd::profiles::hf::NullHfStack;
use btsd::{EventLoop, ProfileManager, ServiceConfig, ServiceServer};

/// Bluetooth profile service
#[derive(Parser, Debug)]
#[command(name = "btsd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the service
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        #[command(flatten)]
        source: ConfigSource,
    },
    /// Stop the running service
    Stop,
    /// Show service status and which profiles answer requests
    Status {
        #[command(flatten)]
        source: ConfigSource,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        source: ConfigSource,
    },
}

/// Where the configuration comes from. Later sources win: the file, then
/// `BTSD_SOCKET`, then `--socket`.
#[derive(Args, Debug, Default)]
struct ConfigSource {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Socket path, overriding config and BTSD_SOCKET
    #[arg(long)]
    socket: Option<PathBuf>,
}

impl ConfigSource {
    fn load(&self) -> Result<ServiceConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(default_config_path);
        let mut config = ServiceConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_overrides();
        if let Some(socket) = &self.socket {
            config.socket_path.clone_from(socket);
        }
        Ok(config)
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("btsd")
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("btsd")
        .join("btsd.toml")
}

// ============================================================================
// PID file
// ============================================================================

/// The service's PID file. A guard returned by [`PidFile::acquire`]
/// removes the file when dropped.
#[derive(Debug)]
struct PidFile {
    path: PathBuf,
    owned: bool,
}

impl PidFile {
    fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
        }
    }

    fn default_location() -> Self {
        Self::at(state_dir().join("btsd.pid"))
    }

    fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    /// PID of a live service. A stale file is removed.
    fn running(&self) -> Option<u32> {
        let pid = self.read()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        let _ = fs::remove_file(&self.path);
        None
    }

    /// Records this process. Fails if another live service holds the file.
    fn acquire(mut self) -> Result<Self> {
        if let Some(pid) = self.running() {
            bail!("Service is already running (PID {pid}); use 'btsd stop' first");
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        fs::write(&self.path, process::id().to_string()).context("Failed to write PID file")?;
        self.owned = true;
        Ok(self)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

// ============================================================================
// Commands
// ============================================================================

fn main() -> Result<()> {
    let args = Cli::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        source: ConfigSource::default(),
    });

    match command {
        Command::Start { daemon, source } => {
            // Before forking, so errors reach the terminal.
            let config = source.load()?;
            if let Some(pid) = PidFile::default_location().running() {
                bail!("Service is already running (PID {pid}); use 'btsd stop' first");
            }

            if daemon {
                daemonize()?;
            }

            let _pid_file = PidFile::default_location().acquire()?;
            run_service(config)
        }
        Command::Stop => stop(),
        Command::Status { source } => {
            let Some(pid) = PidFile::default_location().running() else {
                println!("Service is not running.");
                process::exit(1);
            };
            println!("Service is running (PID {pid})");

            let config = source.load()?;
            println!("Socket: {}", config.socket_path.display());
            report_profiles(config.socket_path)
        }
        Command::Config { source } => {
            let config = source.load()?;
            let text = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{text}");
            Ok(())
        }
    }
}

fn stop() -> Result<()> {
    let Some(pid) = PidFile::default_location().running() else {
        println!("Service is not running.");
        return Ok(());
    };

    println!("Stopping service (PID {pid})...");
    send_sigterm(pid)?;

    for _ in 0..50 {
        if !is_process_running(pid) {
            println!("Service stopped.");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    bail!("Service did not stop within 5 seconds")
}

fn send_sigterm(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Connects over the socket and asks each profile for a connection state.
/// A profile that is not running answers `ServiceNotFound`.
#[tokio::main(flavor = "current_thread")]
async fn report_profiles(socket_path: PathBuf) -> Result<()> {
    let config = ClientConfig {
        socket_path,
        client_name: Some("btsd-status".to_string()),
        connect_retries: 0,
        ..ClientConfig::default()
    };
    let client = RpcClient::connect(&config)
        .await
        .context("Service is not accepting connections")?;
    println!("Connection: #{}", client.connection_id());

    let addr = BtAddress::default();
    let queries = [
        (ProfileId::HfpAg, Request::Ag(AgRequest::GetConnectionState { addr })),
        (ProfileId::HfpHf, Request::Hf(HfRequest::GetConnectionState { addr })),
    ];
    for (profile, request) in queries {
        let reply = client.request(request).await.context("Status request failed")?;
        match reply.into_connection_state() {
            Ok(_) => println!("{profile}: running"),
            Err(BtError::ServiceNotFound) => println!("{profile}: not running"),
            Err(e) => println!("{profile}: error ({e})"),
        }
    }

    client.close();
    Ok(())
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = state_dir().join("btsd.log");
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

// ============================================================================
// Service
// ============================================================================

#[tokio::main]
async fn run_service(config: ServiceConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("btsd=info".parse()?)
                .add_directive("bt_core=info".parse()?)
                .add_directive("bt_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        ag = config.ag.enabled,
        hf = config.hf.enabled,
        "Profile service starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let (loop_handle, loop_task) = EventLoop::spawn();
    let manager = ProfileManager::new(
        loop_handle.clone(),
        &config,
        Arc::new(NullAgStack),
        Arc::new(NullHfStack),
    );

    let started = manager
        .start_all()
        .await
        .context("Event loop stopped during startup")?;
    if started.is_empty() {
        warn!("No profile is running; requests will fail with ServiceNotFound");
    }

    let server = ServiceServer::new(config.socket_path.clone(), manager.clone(), cancel_token);
    info!(socket = %config.socket_path.display(), "Starting server");

    let served = server.run().await;
    if let Err(e) = &served {
        error!(error = %e, "Server error");
    }

    // Profiles stop on the loop before it shuts down.
    if let Err(e) = manager.stop_all().await {
        warn!(error = %e, "Profiles did not stop cleanly");
    }
    loop_handle.shutdown().await;
    let _ = loop_task.await;

    served?;
    info!("Profile service stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btsd.pid");
        fs::write(&path, u32::MAX.to_string()).unwrap();

        let pid_file = PidFile::at(&path);
        assert_eq!(pid_file.read(), Some(u32::MAX));
        assert_eq!(pid_file.running(), None);
        assert!(!path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_acquired_pid_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("btsd.pid");

        let guard = PidFile::at(&path).acquire().unwrap();
        assert_eq!(PidFile::at(&path).running(), Some(process::id()));
        assert!(PidFile::at(&path).acquire().is_err());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_socket_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btsd.toml");
        fs::write(&path, "socket_path = \"/tmp/from-file.sock\"\n[hf]\nenabled = false\n").unwrap();

        let source = ConfigSource {
            config: Some(path),
            socket: Some(PathBuf::from("/tmp/from-flag.sock")),
        };
        let config = source.load().unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/from-flag.sock"));
        assert!(!config.hf.enabled);
    }

    #[test]
    fn test_rendered_config_loads_back() {
        let config = ServiceConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ServiceConfig::from_toml_str(&text).unwrap(), config);
    }
}
