use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vitalwatch::{App, Settings};
use vitalwatch_adapters::mqtt::MqttConnector;
use vitalwatch_core::MonitoringSession;

#[derive(Parser, Debug)]
#[command(name = "vitalwatch")]
#[command(about = "Live vital-sign telemetry monitor for MQTT brokers")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker URL, e.g. wss://host:8884/mqtt
    #[arg(short, long)]
    url: Option<String>,

    /// Broker username
    #[arg(long)]
    username: Option<String>,

    /// Broker password
    #[arg(long)]
    password: Option<String>,

    /// Telemetry topic
    #[arg(short, long)]
    topic: Option<String>,

    /// Status refresh interval in milliseconds
    #[arg(short, long)]
    refresh: Option<u64>,

    /// Start with live monitoring off
    #[arg(long)]
    paused: bool,

    /// Log filter, e.g. "info" or "vitalwatch_core=debug" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command-line flags take precedence over file and environment.
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.broker.url = url.clone();
        }
        if let Some(username) = &self.username {
            settings.broker.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            settings.broker.password = Some(password.clone());
        }
        if let Some(topic) = &self.topic {
            settings.monitor.topic = topic.clone();
        }
        if let Some(refresh) = self.refresh {
            settings.monitor.refresh_ms = refresh;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;
    info!("Loaded settings: {:?}", settings);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(settings, !args.paused))
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(settings: Settings, live: bool) -> Result<()> {
    let session = MonitoringSession::new(MqttConnector::new(), settings.session_config()?);
    let mut app = App::new(session);

    println!(
        "vitalwatch - {} on {} ({})",
        settings.monitor.topic,
        settings.broker.url,
        vitalwatch::app::HELP
    );
    if live {
        app.toggle();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(settings.refresh());

    while app.running {
        tokio::select! {
            _ = ticker.tick() => {}
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => app.handle_command(&line),
                // Without stdin, keep monitoring until Ctrl-C
                None => stdin_open = false,
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                app.quit();
            }
        }

        if let Some(message) = app.take_status_message() {
            println!("{}", message);
        }
        if let Some(line) = app.poll_status_line() {
            println!("{}", line);
        }
    }

    Ok(())
}
