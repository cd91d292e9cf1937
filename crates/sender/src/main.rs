//! # HeartWatch Sender
//!
//! Lado do relógio: lê o sensor cardíaco, mostra o valor e envia cada
//! leitura via HTTP POST para o Receiver.
//!
//! ## Uso
//! ```bash
//! heartwatch_sender      # Enter alterna START/STOP, `q` sai
//! ```

mod privilege;
mod sensor;
mod transmitter;

use heartwatch_core::config::AppConfig;
use heartwatch_core::Reading;
use heartwatch_core::permission::PermissionGate;
use privilege::{ConsolePrivilegeManager, Policy};
use sensor::{SensorSource, SimulatedHeartRate};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use transmitter::Transmitter;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
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

    let sender_cfg = &config.sender;

    let transmitter = match Transmitter::from_config(sender_cfg) {
        Ok(t) => t,
        Err(e) => {
            error!("Falha ao criar cliente HTTP: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Privilégio ──
    let policy = sender_cfg.permission.parse().unwrap_or_else(|e| {
        warn!("{e}. Usando \"ask\"");
        Policy::Ask
    });
    let gate = PermissionGate::new(
        Arc::new(ConsolePrivilegeManager::new(policy)),
        sender_cfg.privilege.clone(),
    );
    match gate.check().await {
        Ok(true) => {}
        Ok(false) => {
            warn!(privilege = gate.privilege(), "Privilégio negado");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    // ── Sensor ──
    let mut sensor = SimulatedHeartRate::from_config(sender_cfg);
    if let Err(e) = sensor.init() {
        warn!("{e}. Saindo..");
        return ExitCode::FAILURE;
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ♥ HEARTWATCH SENDER");
    println!("══════════════════════════════════════════════");
    println!("  Destino:   {}", transmitter.endpoint());
    println!("  Timeout:   {} ms", sender_cfg.timeout_ms);
    println!("  Enter:     START / STOP      q: sair");
    println!("══════════════════════════════════════════════");
    println!();

    let (tx, mut rx) = mpsc::channel(16);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Loop principal ──
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(cmd)) if cmd.trim().eq_ignore_ascii_case("q") => break,
                Ok(Some(_)) => toggle(&mut sensor, &tx, &mut rx),
                Ok(None) => break,
                Err(e) => {
                    error!("Erro ao ler stdin: {e}");
                    break;
                }
            },
            Some(reading) = rx.recv() => {
                println!("♥ {reading}");
                transmitter.send(reading);
            }
        }
    }

    sensor.stop();
    info!("Sender encerrado");
    ExitCode::SUCCESS
}

/// Botão de ação: alterna entre medir e parar.
///
/// Ao parar, leituras já enfileiradas são descartadas.
fn toggle(
    sensor: &mut impl SensorSource,
    tx: &mpsc::Sender<Reading>,
    rx: &mut mpsc::Receiver<Reading>,
) {
    if !sensor.is_initialized() {
        warn!("Sensor não inicializado");
        return;
    }
    if sensor.is_measuring() {
        sensor.stop();
        while rx.try_recv().is_ok() {}
        println!("[ START ]");
    } else {
        match sensor.start(tx.clone()) {
            Ok(()) => println!("[ STOP ]"),
            Err(e) => error!("Falha ao iniciar sensor: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stopping_discards_queued_readings() {
        let mut sensor = SimulatedHeartRate::new(72, Duration::from_millis(10), true);
        sensor.init().unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        toggle(&mut sensor, &tx, &mut rx);
        assert!(sensor.is_measuring());
        tokio::time::sleep(Duration::from_millis(80)).await;

        toggle(&mut sensor, &tx, &mut rx);
        assert!(!sensor.is_measuring());
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn toggle_without_init_does_nothing() {
        let mut sensor = SimulatedHeartRate::new(72, Duration::from_millis(10), true);
        let (tx, mut rx) = mpsc::channel(16);

        toggle(&mut sensor, &tx, &mut rx);
        assert!(!sensor.is_measuring());
    }
}
