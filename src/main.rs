//! duet-call - Main entry point
//!
//! Runs the relay server, or joins a call as a headless participant.

mod args;

use args::{Args, Command};
use clap::Parser;
use duet_call::call::{
    CallCommand, CallController, CallObserver, CallOutcome, LocalMedia, Route, Session, TurnView,
};
use duet_call::config::Config;
use duet_call::rtc::{LocalTracks, RtcPeerFactory};
use duet_call::transport::SignalingTransport;
use duet_call::web::{self, SharedState};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use url::Url;

const COMMAND_HELP: &str = "q: questions, n: next question, m: mute, c: camera, e: end call";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    let loaded = args.load_config();
    let log_level = match (&loaded, args.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(cfg), false) => cfg.logging.level.clone(),
        (Err(_), false) => "info".to_string(),
    };

    // Initialize logging with noise filtering for third-party WebRTC crates
    env_logger::Builder::new()
        .parse_filters(&env::var("DUET_LOG").unwrap_or(log_level))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .filter_module("webrtc_srtp", log::LevelFilter::Error)
        .init();

    info!("duet-call v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    match args.command {
        Command::Serve { host, port, web_root } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                info!("Overriding HTTP port to {}", port);
                config.server.port = port;
            }
            if let Some(web_root) = web_root {
                config.server.web_root = web_root;
            }
            config.validate()?;
            run_server(config).await
        }
        Command::Create { signaling_url } => {
            if let Some(url) = signaling_url {
                config.signaling.url = url;
            }
            config.validate()?;

            let session = Session::create();
            let mut link = config.signaling_url()?;
            link.set_path(&session.meeting_path());
            println!("Meeting created. Share this link: {}", link);

            report(start_call(config, session).await?);
            Ok(())
        }
        Command::Join { link, signaling_url } => {
            let Some(session) = Route::from_link(&link).session() else {
                return Err(format!("Not a meeting link: {}", link).into());
            };

            match signaling_url {
                Some(url) => config.signaling.url = url,
                None => {
                    if let Some(origin) = link_origin(&link) {
                        config.signaling.url = origin;
                    }
                }
            }
            config.validate()?;

            report(start_call(config, session).await?);
            Ok(())
        }
    }
}

async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(SharedState::new(config));

    let mut http_handle = tokio::spawn(async move {
        if let Err(e) = web::run_http_server(state).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = &mut http_handle => {
            if let Err(e) = result {
                error!("HTTP server task failed: {}", e);
            }
        }
    }

    http_handle.abort();
    Ok(())
}

/// acquire media, open the channel, announce, then run until the call ends
async fn start_call(config: Config, session: Session) -> Result<CallOutcome, Box<dyn std::error::Error>> {
    let base = config.signaling_url()?;
    let endpoint = session.signaling_endpoint(&base)?;
    info!("Joining meeting {} as {:?}", session.id, session.role);

    let media = LocalTracks::acquire(&config.webrtc)?;

    let (transport, inbound) = match SignalingTransport::connect(&endpoint).await {
        Ok(connected) => connected,
        Err(e) => {
            media.stop();
            return Err(e.into());
        }
    };
    let transport = Arc::new(transport);

    let mut controller = match CallController::new(
        session,
        Arc::new(RtcPeerFactory::new(config.webrtc.clone())),
        transport.clone(),
        Arc::new(ConsoleObserver),
        config.call.settings(),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            media.stop();
            transport.close().await;
            return Err(e.into());
        }
    };

    controller.media_ready(media).await;
    controller.announce();
    println!("Waiting for the other participant... ({})", COMMAND_HELP);

    let outcome = controller.run(inbound, spawn_command_reader()).await;
    // Flushes a queued end_call before the socket goes away
    transport.close().await;
    Ok(outcome)
}

/// stdin lines and Ctrl-C become call commands
fn spawn_command_reader() -> mpsc::UnboundedReceiver<CallCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    let interrupt = tx.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = interrupt.send(CallCommand::EndCall);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "q" => CallCommand::ToggleQuestions,
                "n" => CallCommand::NextQuestion,
                "m" => CallCommand::ToggleMic,
                "c" => CallCommand::ToggleCamera,
                "e" => CallCommand::EndCall,
                "" => continue,
                other => {
                    println!("Unknown command {:?} ({})", other, COMMAND_HELP);
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });

    rx
}

/// `scheme://host[:port]` of a full meeting link
fn link_origin(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    Some(url.origin().ascii_serialization())
}

fn report(outcome: CallOutcome) {
    match outcome {
        CallOutcome::LocalHangup => println!("Call ended."),
        CallOutcome::RemoteHangup => println!("Returning home."),
        CallOutcome::TransportLost => println!("Lost connection to the meeting."),
    }
}

/// Prints call activity for a terminal user
struct ConsoleObserver;

impl CallObserver for ConsoleObserver {
    fn remote_media_live(&self) {
        println!("Connected. The other participant is live.");
    }

    fn turn_changed(&self, view: &TurnView) {
        match (&view.question, view.my_turn) {
            (None, _) => println!("Questions closed."),
            (Some(question), true) => println!("Your turn to ask: {}\n  (n: next question)", question),
            (Some(question), false) => println!("Your partner is asking: {}", question),
        }
    }

    fn remote_ended(&self) {
        println!("The other participant has ended the call.");
    }

    fn notice(&self, message: &str) {
        println!("{}", message);
    }
}
