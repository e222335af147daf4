//! Handflux CLI
//!
//! Commands:
//! - replay: Drive the pipeline from a recorded NDJSON session, optionally streaming to VTube Studio
//! - params: List the parameter catalog as configured by a settings file
//! - doctor: Diagnose settings and VTube Studio reachability

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use handflux::adapters::{ReplaySource, TrackingSource};
use handflux::protocol::{
    ConnectionState, MemoryTokenStore, MemoryTransport, TokenStore, Transport, TransportEvent,
    VtsClient, WsTransport,
};
use handflux::{
    BridgeError, HandBridge, ParameterRegistry, Settings, SettingsTokenStore, TickReport,
    TrackingLossPolicy, HANDFLUX_VERSION, PLUGIN_NAME,
};

/// Handflux - stream hand tracking into VTube Studio parameters
#[derive(Parser)]
#[command(name = "handflux")]
#[command(author = "Handflux Contributors")]
#[command(version = HANDFLUX_VERSION)]
#[command(about = "Hand tracking to VTube Studio parameter bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session through the pipeline
    Replay {
        /// Recorded frames as NDJSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Settings file; created on first token grant
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Write one tick report per line (use - for stdout; default when not connecting)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stream values to VTube Studio
        #[arg(long)]
        connect: bool,

        /// Tick interval when streaming, in milliseconds
        #[arg(long, default_value = "16")]
        tick_ms: u64,

        /// Pace ticks by the recorded capture timestamps
        #[arg(long)]
        realtime: bool,

        /// How long to wait for authentication (the token prompt needs user approval)
        #[arg(long, default_value = "30000")]
        auth_timeout_ms: u64,

        /// Override the mirror setting
        #[arg(long)]
        mirror: Option<bool>,

        /// Override the tracking-loss policy
        #[arg(long)]
        loss_policy: Option<LossPolicyArg>,
    },

    /// List parameters as configured by a settings file
    Params {
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose settings and connectivity
    Doctor {
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Try to open a connection to VTube Studio
        #[arg(long)]
        connect: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LossPolicyArg {
    /// Keep the last pose
    StayAtPose,
    /// Reset to defaults once
    Default,
    /// Reset to defaults once (same as default)
    WaitDefault,
}

impl From<LossPolicyArg> for TrackingLossPolicy {
    fn from(arg: LossPolicyArg) -> Self {
        match arg {
            LossPolicyArg::StayAtPose => TrackingLossPolicy::StayAtPose,
            LossPolicyArg::Default => TrackingLossPolicy::Default,
            LossPolicyArg::WaitDefault => TrackingLossPolicy::WaitDefault,
        }
    }
}

type CliBridge = HandBridge<Box<dyn Transport>, Box<dyn TokenStore>>;

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays clean for reports
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

fn run(cli: Cli) -> Result<(), HandfluxCliError> {
    match cli.command {
        Commands::Replay {
            input,
            settings,
            output,
            connect,
            tick_ms,
            realtime,
            auth_timeout_ms,
            mirror,
            loss_policy,
        } => {
            let mut loaded = load_settings(settings.as_deref())?;
            if let Some(mirror) = mirror {
                loaded.mirror = mirror;
            }
            if let Some(policy) = loss_policy {
                loaded.loss_policy = policy.into();
            }
            cmd_replay(
                &input,
                &loaded,
                settings.as_deref(),
                output.as_deref(),
                ReplayOptions {
                    connect,
                    tick: Duration::from_millis(tick_ms),
                    realtime,
                    auth_timeout: Duration::from_millis(auth_timeout_ms),
                },
            )
        }

        Commands::Params { settings, json } => {
            let loaded = load_settings(settings.as_deref())?;
            cmd_params(&loaded, json)
        }

        Commands::Doctor {
            settings,
            connect,
            json,
        } => cmd_doctor(settings.as_deref(), connect, json),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, HandfluxCliError> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

struct ReplayOptions {
    connect: bool,
    tick: Duration,
    realtime: bool,
    auth_timeout: Duration,
}

fn cmd_replay(
    input: &Path,
    settings: &Settings,
    settings_path: Option<&Path>,
    output: Option<&Path>,
    options: ReplayOptions,
) -> Result<(), HandfluxCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut source = ReplaySource::parse_ndjson(&input_data)?;
    if source.is_empty() {
        return Err(HandfluxCliError::NoFrames);
    }

    let tokens: Box<dyn TokenStore> = match settings_path {
        Some(path) => Box::new(SettingsTokenStore::open(path)?),
        None => Box::new(MemoryTokenStore::new(settings.auth_token.clone())),
    };
    let transport: Box<dyn Transport> = if options.connect {
        Box::new(WsTransport::new(settings.url()))
    } else {
        Box::new(MemoryTransport::new())
    };
    let client = VtsClient::new(transport, tokens, settings.plugin.clone());
    let mut bridge: CliBridge = HandBridge::new(settings, client)?;

    if options.connect {
        bridge.connect()?;
        wait_for_authentication(&mut bridge, options.auth_timeout)?;
    }

    // offline replays report to stdout unless told otherwise
    let mut sink: Option<Box<dyn Write>> = match output {
        Some(path) if path.to_string_lossy() == "-" => Some(Box::new(io::stdout().lock())),
        Some(path) => Some(Box::new(io::BufWriter::new(fs::File::create(path)?))),
        None if !options.connect => Some(Box::new(io::stdout().lock())),
        None => None,
    };

    info!(frames = source.len(), connected = options.connect, "replay started");
    let mut previous_capture: Option<chrono::DateTime<chrono::Utc>> = None;
    let mut batches = 0usize;
    while let Some(frame) = source.current_frame() {
        if options.realtime {
            if let (Some(prev), Some(now)) = (previous_capture, frame.captured_at) {
                if let Ok(gap) = (now - prev).to_std() {
                    thread::sleep(gap);
                }
            }
            previous_capture = frame.captured_at.or(previous_capture);
        } else if options.connect {
            thread::sleep(options.tick);
        }

        let report = bridge.tick(&frame);
        if report.sent {
            batches += 1;
        }
        if let Some(sink) = sink.as_mut() {
            write_report(sink.as_mut(), &report)?;
        }

        if options.connect && bridge.client().state() == ConnectionState::Disconnected {
            warn!(tick = report.tick, "connection lost; stopping replay");
            break;
        }
    }

    if let Some(sink) = sink.as_mut() {
        sink.flush()?;
    }
    info!(ticks = bridge.ticks(), batches, "replay finished");
    bridge.disconnect();
    Ok(())
}

fn wait_for_authentication(bridge: &mut CliBridge, timeout: Duration) -> Result<(), HandfluxCliError> {
    let deadline = Instant::now() + timeout;
    info!("waiting for VTube Studio authentication; approve the plugin prompt if shown");
    loop {
        bridge.poll_connection();
        match bridge.client().state() {
            ConnectionState::Authenticated => return Ok(()),
            ConnectionState::Disconnected => return Err(HandfluxCliError::ConnectionFailed),
            _ => {}
        }
        if Instant::now() >= deadline {
            bridge.disconnect();
            return Err(HandfluxCliError::AuthTimeout);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn write_report(out: &mut dyn Write, report: &TickReport) -> Result<(), HandfluxCliError> {
    serde_json::to_writer(&mut *out, report)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn cmd_params(settings: &Settings, json: bool) -> Result<(), HandfluxCliError> {
    let registry = ParameterRegistry::new(&settings.registry_config())?;
    let rows: Vec<ParamRow> = registry
        .parameters()
        .iter()
        .map(|p| ParamRow {
            name: p.name(),
            key: p.settings_key(),
            title: p.title.clone(),
            builtin: p.is_default,
            enabled: p.enabled,
            min: p.bounds.min,
            max: p.bounds.max,
            default: p.bounds.default,
            offset: p.offset,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{:<36} {:<8} {:<8} {:>6} {:>6} {:>6}", "NAME", "KIND", "ENABLED", "MIN", "MAX", "OFFSET");
        for row in &rows {
            println!(
                "{:<36} {:<8} {:<8} {:>6} {:>6} {:>6}",
                row.name,
                if row.builtin { "builtin" } else { "custom" },
                if row.enabled { "yes" } else { "no" },
                row.min,
                row.max,
                row.offset
            );
        }
        println!(
            "\n{} parameters, mirror {}",
            rows.len(),
            if registry.is_mirrored() { "on" } else { "off" }
        );
    }
    Ok(())
}

fn cmd_doctor(settings_path: Option<&Path>, connect: bool, json: bool) -> Result<(), HandfluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PLUGIN_NAME, HANDFLUX_VERSION),
    });

    let settings = match settings_path {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Warning,
                message: "Settings file does not exist; defaults will be used".to_string(),
            });
            Some(Settings::default())
        }
        Some(path) => match Settings::load(path) {
            Ok(settings) => {
                checks.push(DoctorCheck {
                    name: "settings".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Settings valid ({} parameter overrides)", settings.parameters.len()),
                });
                Some(settings)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "settings".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid settings: {}", e),
                });
                None
            }
        },
        None => Some(Settings::default()),
    };

    if let Some(settings) = &settings {
        match ParameterRegistry::new(&settings.registry_config()) {
            Ok(registry) => {
                let enabled = registry.parameters().iter().filter(|p| p.enabled).count();
                checks.push(DoctorCheck {
                    name: "parameters".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} of {} parameters enabled, {} custom to declare",
                        enabled,
                        registry.parameters().len(),
                        registry.declarations().len()
                    ),
                });
            }
            Err(e) => checks.push(DoctorCheck {
                name: "parameters".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }

        checks.push(if settings.auth_token.is_some() {
            DoctorCheck {
                name: "token".to_string(),
                status: CheckStatus::Ok,
                message: "Authentication token stored".to_string(),
            }
        } else {
            DoctorCheck {
                name: "token".to_string(),
                status: CheckStatus::Warning,
                message: "No token stored; VTube Studio will prompt on first connect".to_string(),
            }
        });

        if connect {
            checks.push(check_endpoint(&settings.url()));
        }
    }

    // Replay reads stdin when input is -
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from stdin ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        plugin: PLUGIN_NAME.to_string(),
        version: HANDFLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Handflux Doctor Report");
        println!("======================");
        println!("Plugin:  {}", report.plugin);
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HandfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_endpoint(url: &str) -> DoctorCheck {
    let mut transport = WsTransport::new(url);
    if let Err(e) = transport.open() {
        return DoctorCheck {
            name: "endpoint".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot start connection to {}: {}", url, e),
        };
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    let check = loop {
        let events = transport.poll_events();
        match events.first() {
            Some(TransportEvent::Opened) => {
                break DoctorCheck {
                    name: "endpoint".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("VTube Studio reachable at {}", url),
                }
            }
            Some(TransportEvent::Error(e)) => {
                break DoctorCheck {
                    name: "endpoint".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot connect to {}: {}", url, e),
                }
            }
            Some(_) | None if Instant::now() >= deadline => {
                break DoctorCheck {
                    name: "endpoint".to_string(),
                    status: CheckStatus::Warning,
                    message: format!("No response from {} within 3s", url),
                }
            }
            _ => thread::sleep(Duration::from_millis(20)),
        }
    };
    transport.close();
    check
}

// Error types

#[derive(Debug)]
enum HandfluxCliError {
    Io(io::Error),
    Bridge(BridgeError),
    Json(serde_json::Error),
    NoFrames,
    ConnectionFailed,
    AuthTimeout,
    DoctorFailed,
}

impl From<io::Error> for HandfluxCliError {
    fn from(e: io::Error) -> Self {
        HandfluxCliError::Io(e)
    }
}

impl From<BridgeError> for HandfluxCliError {
    fn from(e: BridgeError) -> Self {
        HandfluxCliError::Bridge(e)
    }
}

impl From<serde_json::Error> for HandfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        HandfluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HandfluxCliError> for CliError {
    fn from(e: HandfluxCliError) -> Self {
        match e {
            HandfluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HandfluxCliError::Bridge(e @ BridgeError::ParseError(_)) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Each line must be a tracking frame with a hands array".to_string()),
            },
            HandfluxCliError::Bridge(e @ BridgeError::InvalidSettings(_)) => CliError {
                code: "INVALID_SETTINGS".to_string(),
                message: e.to_string(),
                hint: Some("Run 'handflux doctor --settings <file>' for details".to_string()),
            },
            HandfluxCliError::Bridge(e) => CliError {
                code: "BRIDGE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            HandfluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HandfluxCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HandfluxCliError::ConnectionFailed => CliError {
                code: "CONNECTION_FAILED".to_string(),
                message: "Could not establish a VTube Studio session".to_string(),
                hint: Some("Enable the plugin API in VTube Studio and check host/port".to_string()),
            },
            HandfluxCliError::AuthTimeout => CliError {
                code: "AUTH_TIMEOUT".to_string(),
                message: "Timed out waiting for authentication".to_string(),
                hint: Some("Approve the plugin in VTube Studio or raise --auth-timeout-ms".to_string()),
            },
            HandfluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ParamRow {
    name: String,
    key: String,
    title: String,
    builtin: bool,
    enabled: bool,
    min: i32,
    max: i32,
    default: i32,
    offset: f32,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    plugin: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
