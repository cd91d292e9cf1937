//! # HeartWatch Receiver
//!
//! Escuta os POSTs enviados pelo relógio e mostra a frequência cardíaca
//! mais recente no console (e no título da janela).
//!
//! ## Atalhos
//! - `Enter` / `Ctrl+C`: Parar e sair

mod display;
mod listener;

use display::ConsoleDisplay;
use heartwatch_core::config::AppConfig;
use listener::ListenerService;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Listener ──
    let display = Arc::new(ConsoleDisplay::new(config.receiver.title_prefix.clone()));
    let mut service = ListenerService::new(&config.receiver, display.clone());

    info!("Criando listener");
    if let Err(e) = service.start().await {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    info!(
        enderecos = ?service.local_addrs(),
        "Listener iniciado – Enter ou Ctrl+C para sair"
    );

    // Sem stdin (EOF imediato) só o Ctrl+C encerra
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let enter = async {
        match stdin.next_line().await {
            Ok(Some(_)) => {}
            _ => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = enter => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Falha ao escutar Ctrl+C: {e}");
            }
        }
    }

    service.stop();
    service.join().await;
    debug!(state = ?service.state(), running = service.is_running(), "Listener encerrado");

    if let Some(last) = display.latest() {
        info!("Último valor: {last}");
    }
    ExitCode::SUCCESS
}
