mod call;
mod codec;
mod config;
mod control;
mod error;
mod manager;
mod media_session;
mod stt;
mod telephony;
mod tts;
mod webhook_auth;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use control::AppState;
use manager::CallManager;
use stt::SttClient;
use telephony::TelephonyClient;
use tts::TtsClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--version") => println!("callbridge {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("callbridge {VERSION}");
    println!("Voice-call bridge between an autonomous agent and a live PSTN conversation");
    println!();
    println!("Usage: callbridge [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the bridge server.");
    println!("Config is read from $CALLBRIDGE_CONFIG, defaulting to ./callbridge.toml.");
}

async fn server() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callbridge=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("CALLBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("callbridge.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting callbridge"
    );

    let telephony = TelephonyClient::new(&config.telephony);
    let tts = TtsClient::new(
        config.tts.api_key.clone(),
        config.tts.voice.clone(),
        config.tts.speed,
    );
    let stt = SttClient::new(config.stt.api_key.clone(), config.stt.model.clone());

    let manager = Arc::new(CallManager::new(config.clone(), telephony, tts, stt));
    let app = control::router(AppState {
        manager: manager.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .expect("Server error");
}

async fn shutdown_signal(manager: Arc<CallManager>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, closing active calls");
    manager.shutdown().await;
}
