//! `panel`: command-line client for the device web control panel.
//!
//! # Usage
//!
//! ```text
//! panel [OPTIONS] <COMMAND>
//!
//! Commands:
//!   status      Print device status (full, quick or one config group)
//!   control     Set one value through /control
//!   update      POST the current status to /update with an action
//!   log         Print the device log
//!   clear-log   Erase the device log
//!   save        Save settings and reboot the device
//!   config      Print the config table for a group
//!   send        Send a free-text command over the WebSocket
//!   watch       Keep a live session open and log what the device pushes
//!   ota         Upload a firmware image
//!   peers       Manage the saved peer list
//!   init        Write the default config file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable       | Description                   |
//! |----------------|-------------------------------|
//! | `PANEL_CONFIG` | Config file path              |
//! | `PANEL_HOST`   | Device host name or address   |
//! | `PANEL_PORT`   | Device web server port        |
//!
//! CLI flags take precedence over the environment, which takes precedence
//! over the config file.

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use panel_client::application::session::{Session, SessionOptions};
use panel_client::infrastructure::audio::MicBlock;
use panel_client::infrastructure::http::{
    debounce::DEFAULT_DEBOUNCE, DebouncedControl, DeviceApi, LogSource, StatusQuery,
};
use panel_client::infrastructure::storage::config::default_config_path;
use panel_client::infrastructure::storage::{load_config, save_config, PanelConfig, PeerStore};
use panel_client::infrastructure::ws::{ChannelOptions, ConnectionManager, SessionEvent};
use panel_core::domain::log::complete_lines;
use panel_core::domain::status::value_to_text;
use panel_core::router::COMMAND_BOX_ID;
use panel_core::{Action, BuildOutcome, OutboundCommand, UiEvent};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "panel",
    about = "Native client for the web control panel of an ESP32-class device",
    version
)]
struct Cli {
    /// Config file.  Defaults to the platform config directory.
    #[arg(long, env = "PANEL_CONFIG")]
    config: Option<PathBuf>,

    /// Device host name or IP address.
    #[arg(long, env = "PANEL_HOST")]
    host: Option<String>,

    /// Device web server port.
    #[arg(long, env = "PANEL_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print device status.
    Status {
        /// Cheap refresh instead of the full status.
        #[arg(long, conflicts_with = "group")]
        quick: bool,
        /// Config payload for one group.
        #[arg(long)]
        group: Option<String>,
    },
    /// Set one value through /control.
    Control { key: String, value: String },
    /// POST the current status to /update with an action.
    Update { action: String },
    /// Print the device log.
    Log {
        /// Read the log file instead of the buffered log.
        #[arg(long)]
        file: bool,
    },
    /// Erase the device log.
    ClearLog,
    /// Save settings and reboot the device.
    Save,
    /// Print the config table for a group.
    Config { group: String },
    /// Send a free-text command over the WebSocket.
    Send { text: String },
    /// Keep a live session open until Ctrl+C.
    ///
    /// Lines typed on stdin are sent as commands; `key=value` lines go to
    /// /control, debounced.
    Watch {
        /// Poll /status?q at the heartbeat interval as well.
        #[arg(long)]
        poll: bool,
        /// Stream the microphone to the device.
        #[arg(long)]
        mic: bool,
        /// Play audio received from the device.
        #[arg(long)]
        speaker: bool,
    },
    /// Upload a firmware image.
    Ota { file: PathBuf },
    /// Manage the saved peer list.
    Peers {
        #[command(subcommand)]
        action: PeerAction,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum PeerAction {
    Add { address: String },
    Remove { address: String },
    List,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path().context("cannot locate the config directory"),
        }
    }

    /// Loads the config file and applies the host and port overrides.
    fn load_config(&self) -> anyhow::Result<PanelConfig> {
        let path = self.config_path()?;
        let mut config = load_config(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PanelConfig) {
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.web_port = port;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Init { force } => return init_config(&cli.config_path()?, *force),
        Command::Peers { action } => return manage_peers(&cli.config_path()?, action),
        _ => {}
    }

    let config = cli.load_config()?;
    let api = DeviceApi::new(&config.device).context("failed to create HTTP client")?;

    match cli.command {
        Command::Status { quick, group } => {
            let query = match (quick, group) {
                (_, Some(group)) => StatusQuery::Group(group),
                (true, None) => StatusQuery::Quick,
                (false, None) => StatusQuery::Full,
            };
            let status = api.load_status(&query).await?;
            for (key, value) in status.iter() {
                println!("{key} = {}", value_to_text(value));
            }
        }
        Command::Control { key, value } => match api.send_control_resp(&key, &value).await? {
            Some(status) => {
                for (key, value) in status.iter() {
                    println!("{key} = {}", value_to_text(value));
                }
            }
            None => info!("{key} set to {value}"),
        },
        Command::Update { action } => {
            let status = api.load_status(&StatusQuery::Full).await?;
            api.send_updates(&status, &action).await?;
            info!("posted {} value(s) with action {action}", status.len());
        }
        Command::Log { file } => {
            let source = if file { LogSource::File } else { LogSource::Stored };
            let text = api.get_log(source).await?;
            for line in complete_lines(&text) {
                println!("{line}");
            }
        }
        Command::ClearLog => {
            api.send_control("resetLog", "1").await?;
            info!("device log cleared");
        }
        Command::Save => {
            let (mut session, _events) = new_session(&config, &api);
            session.execute(Action::SaveAndReboot).await?;
        }
        Command::Config { group } => {
            let (mut session, _events) = new_session(&config, &api);
            match session.load_config_group(&group).await? {
                BuildOutcome::Built { table, errors } => {
                    for row in &table.rows {
                        println!("{}\t{}\t{:?}\t{}", row.key, row.label, row.kind, row.value);
                    }
                    for error in errors {
                        warn!("{error}");
                    }
                }
                BuildOutcome::Skipped => {}
            }
        }
        Command::Send { text } => send_text(&config, text).await?,
        Command::Watch { poll, mic, speaker } => {
            watch(&config, &api, WatchOptions { poll, mic, speaker }).await?;
        }
        Command::Ota { file } => {
            let reply = api
                .ota_upload(&file)
                .await
                .with_context(|| format!("OTA upload of {} failed", file.display()))?;
            println!("{reply}");
        }
        Command::Init { .. } | Command::Peers { .. } => {}
    }

    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config(path, &PanelConfig::default())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn manage_peers(config_path: &Path, action: &PeerAction) -> anyhow::Result<()> {
    let path = config_path.with_file_name("peers.toml");
    let mut store = PeerStore::open(&path)
        .with_context(|| format!("failed to open peer list {}", path.display()))?;
    match action {
        PeerAction::Add { address } => {
            if !store.add(address)? {
                info!("{address} already saved");
            }
        }
        PeerAction::Remove { address } => {
            if !store.remove(address)? {
                warn!("{address} was not saved");
            }
        }
        PeerAction::List => {
            for peer in store.peers() {
                println!("{peer}");
            }
        }
    }
    Ok(())
}

fn new_session(
    config: &PanelConfig,
    api: &DeviceApi,
) -> (Session, mpsc::Receiver<SessionEvent>) {
    let (manager, events) = ConnectionManager::new(
        config.device.ws_url(),
        config.connection.channels.clone(),
        ChannelOptions::from(&config.connection),
    );
    let session = Session::new(manager, Arc::new(api.clone()), SessionOptions::from(config));
    (session, events)
}

async fn send_text(config: &PanelConfig, text: String) -> anyhow::Result<()> {
    let (manager, _events) = ConnectionManager::new(
        config.device.ws_url(),
        config.connection.channels.clone(),
        ChannelOptions::from(&config.connection),
    );
    let index = manager
        .specs()
        .iter()
        .position(|spec| !spec.audio)
        .context("no control channel configured")?;
    manager.connect(index).await?;
    let sent = manager.send(index, OutboundCommand::Text(text)).await;
    manager.close(index).await?;
    sent.context("device did not accept the command")
}

struct WatchOptions {
    poll: bool,
    mic: bool,
    speaker: bool,
}

async fn watch(config: &PanelConfig, api: &DeviceApi, options: WatchOptions) -> anyhow::Result<()> {
    let (mut session, mut events) = new_session(config, api);
    let debounced = DebouncedControl::new(api.clone(), DEFAULT_DEBOUNCE);

    // Audio streams must outlive the loop; dropping them stops the device.
    #[cfg(feature = "audio-device")]
    let (_audio, mut mic_blocks) = open_audio(&mut session, config, &options)?;
    #[cfg(not(feature = "audio-device"))]
    let mut mic_blocks: Option<mpsc::Receiver<MicBlock>> = {
        if options.mic || options.speaker {
            warn!("built without the audio-device feature; audio disabled");
        }
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; closing session");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    session.start().await;
    if let Err(e) = session.refresh(&StatusQuery::Full).await {
        warn!("initial status load failed: {e}");
    }

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut poll = tokio::time::interval(config.connection.heartbeat_interval());

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => session.handle_event(event).await,
                None => break,
            },
            Some(block) = next_block(&mut mic_blocks) => {
                session.push_mic(&block).await;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_input(&mut session, &debounced, &line).await,
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = poll.tick(), if options.poll => {
                if let Err(e) = session.refresh(&StatusQuery::Quick).await {
                    warn!("status poll failed: {e}");
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }

    if session.mic_active() {
        session.stop_mic().await;
    }
    session.shutdown().await;
    info!("session closed");
    Ok(())
}

async fn handle_input(session: &mut Session, debounced: &DebouncedControl, line: &str) {
    if let Some((key, value)) = line.split_once('=') {
        debounced.send(key.trim(), value.trim()).await;
        return;
    }
    let event = UiEvent::Enter {
        id: COMMAND_BOX_ID.to_string(),
        text: line.to_string(),
    };
    if let Err(e) = session.route(event).await {
        warn!("command not sent: {e}");
    }
}

async fn next_block(blocks: &mut Option<mpsc::Receiver<MicBlock>>) -> Option<MicBlock> {
    match blocks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(feature = "audio-device")]
type AudioStreams = (
    Option<panel_client::infrastructure::audio::device::MicStream>,
    Option<panel_client::infrastructure::audio::device::SpeakerStream>,
);

#[cfg(feature = "audio-device")]
fn open_audio(
    session: &mut Session,
    config: &PanelConfig,
    options: &WatchOptions,
) -> anyhow::Result<(AudioStreams, Option<mpsc::Receiver<MicBlock>>)> {
    use panel_client::infrastructure::audio::{device, mic_channel, speaker_channel};

    let speaker = if options.speaker {
        let (feed, rx) = speaker_channel();
        let stream = device::open_speaker(
            rx,
            config.audio.target_rate,
            config.audio.playback_capacity(),
        )
        .context("failed to open speaker")?;
        session.attach_speaker(feed);
        Some(stream)
    } else {
        None
    };

    let (mic, blocks) = if options.mic {
        let (tx, rx) = mic_channel();
        let stream = device::open_mic(tx).context("failed to open microphone")?;
        session
            .start_mic(stream.sample_rate())
            .context("unsupported microphone rate")?;
        (Some(stream), Some(rx))
    } else {
        (None, None)
    };

    Ok(((mic, speaker), blocks))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults_to_full() {
        let cli = Cli::parse_from(["panel", "status"]);
        assert!(matches!(
            cli.command,
            Command::Status {
                quick: false,
                group: None
            }
        ));
    }

    #[test]
    fn test_status_group_flag() {
        let cli = Cli::parse_from(["panel", "status", "--group", "3"]);
        match cli.command {
            Command::Status { group, .. } => assert_eq!(group.as_deref(), Some("3")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quick_and_group_conflict() {
        assert!(Cli::try_parse_from(["panel", "status", "--quick", "--group", "3"]).is_err());
    }

    #[test]
    fn test_control_takes_key_and_value() {
        let cli = Cli::parse_from(["panel", "control", "fps", "12"]);
        match cli.command {
            Command::Control { key, value } => {
                assert_eq!(key, "fps");
                assert_eq!(value, "12");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_host_and_port_override_config() {
        // Arrange
        let cli = Cli::parse_from(["panel", "--host", "10.0.0.9", "--port", "8080", "save"]);
        let mut config = PanelConfig::default();

        // Act
        cli.apply_overrides(&mut config);

        // Assert
        assert_eq!(config.device.host, "10.0.0.9");
        assert_eq!(config.device.web_port, 8080);
    }

    #[test]
    fn test_no_overrides_keep_file_values() {
        let cli = Cli::parse_from(["panel", "clear-log"]);
        let mut config = PanelConfig::default();
        config.device.host = "cam.local".into();

        cli.apply_overrides(&mut config);

        assert_eq!(config.device.host, "cam.local");
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::parse_from(["panel", "watch", "--poll", "--speaker"]);
        assert!(matches!(
            cli.command,
            Command::Watch {
                poll: true,
                mic: false,
                speaker: true
            }
        ));
    }

    #[test]
    fn test_peers_subcommands() {
        let cli = Cli::parse_from(["panel", "peers", "add", "192.168.1.31"]);
        assert!(matches!(
            cli.command,
            Command::Peers {
                action: PeerAction::Add { .. }
            }
        ));
        let cli = Cli::parse_from(["panel", "peers", "list"]);
        assert!(matches!(
            cli.command,
            Command::Peers {
                action: PeerAction::List
            }
        ));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let cli = Cli::parse_from(["panel", "--config", "/tmp/panel.toml", "log"]);
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("/tmp/panel.toml"));
    }
}
