//! Sensor de frequência cardíaca.
//!
//! O driver real fica fora deste crate; aqui existe só a interface
//! ([`SensorSource`]) e um sensor simulado que gera uma oscilação
//! determinística em torno da linha de base configurada.
//!
//! As leituras chegam ao orquestrador por um `mpsc`, sem registro de
//! callbacks globais.

use heartwatch_core::config::SenderConfig;
use heartwatch_core::types::Reading;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Oscilação aplicada à linha de base, em BPM.
const WANDER: [i16; 8] = [0, 2, 3, 1, -1, -3, -2, 0];

/// Erros do sensor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor cardíaco não suportado")]
    Unsupported,

    #[error("Sensor não inicializado")]
    NotInitialized,
}

/// Fonte de leituras periódicas.
pub trait SensorSource {
    /// Prepara o hardware. Falha com [`SensorError::Unsupported`] se não existir.
    fn init(&mut self) -> Result<(), SensorError>;

    /// Começa a publicar leituras no canal.
    fn start(&mut self, tx: mpsc::Sender<Reading>) -> Result<(), SensorError>;

    /// Para de publicar leituras.
    fn stop(&mut self);

    fn is_initialized(&self) -> bool;

    fn is_measuring(&self) -> bool;
}

/// Sensor simulado.
pub struct SimulatedHeartRate {
    baseline: u16,
    interval: Duration,
    supported: bool,
    initialized: bool,
    task: Option<JoinHandle<()>>,
}

impl SimulatedHeartRate {
    pub fn new(baseline: u16, interval: Duration, supported: bool) -> Self {
        Self {
            baseline,
            interval,
            supported,
            initialized: false,
            task: None,
        }
    }

    pub fn from_config(config: &SenderConfig) -> Self {
        Self::new(
            config.simulated_bpm,
            Duration::from_millis(config.sample_interval_ms),
            config.sensor_supported,
        )
    }
}

impl SensorSource for SimulatedHeartRate {
    fn init(&mut self) -> Result<(), SensorError> {
        if !self.supported {
            return Err(SensorError::Unsupported);
        }
        self.initialized = true;
        info!(interval_ms = self.interval.as_millis() as u64, "Sensor cardíaco inicializado");
        Ok(())
    }

    fn start(&mut self, tx: mpsc::Sender<Reading>) -> Result<(), SensorError> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        if self.is_measuring() {
            return Ok(());
        }

        let baseline = self.baseline;
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for step in WANDER.iter().cycle() {
                ticker.tick().await;
                let reading = Reading::new(baseline.saturating_add_signed(*step));
                debug!("Rate:{reading}");
                if tx.send(reading).await.is_err() {
                    break; // Orquestrador saiu
                }
            }
        }));
        info!("Iniciando monitoramento");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Monitoramento parado");
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_measuring(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SimulatedHeartRate {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(supported: bool) -> SimulatedHeartRate {
        SimulatedHeartRate::new(72, Duration::from_millis(10), supported)
    }

    #[test]
    fn unsupported_hardware_fails_init() {
        let mut s = sensor(false);
        assert_eq!(s.init(), Err(SensorError::Unsupported));
        assert!(!s.is_initialized());
    }

    #[tokio::test]
    async fn start_requires_init() {
        let mut s = sensor(true);
        let (tx, _rx) = mpsc::channel(4);
        assert_eq!(s.start(tx), Err(SensorError::NotInitialized));
        assert!(!s.is_measuring());
    }

    #[tokio::test]
    async fn produces_readings_around_baseline() {
        let mut s = sensor(true);
        s.init().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        s.start(tx).unwrap();
        assert!(s.is_measuring());

        for _ in 0..10 {
            let reading = rx.recv().await.unwrap();
            assert!((69..=75).contains(&reading.bpm), "{reading}");
        }
        s.stop();
        assert!(!s.is_measuring());
    }

    #[tokio::test]
    async fn stop_closes_the_stream() {
        let mut s = sensor(true);
        s.init().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        s.start(tx).unwrap();
        rx.recv().await.unwrap();

        s.stop();
        // A task abortada solta o Sender; o canal esvazia e fecha
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[test]
    fn from_config_uses_sender_section() {
        let config = SenderConfig {
            sensor_supported: false,
            ..SenderConfig::default()
        };
        let mut s = SimulatedHeartRate::from_config(&config);
        assert_eq!(s.init(), Err(SensorError::Unsupported));
    }
}
