//! Envio das leituras para o Receiver.
//!
//! Cada [`Transmitter::send`] vira uma task independente com um POST de
//! tempo limitado. Falhas são apenas logadas: sem retry, sem fila e sem
//! ordem garantida entre envios, já que só o valor mais recente importa.

use heartwatch_core::config::SenderConfig;
use heartwatch_core::protocol::{CONTENT_TYPE, encode_reading};
use heartwatch_core::types::Reading;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Erros de envio.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Endpoint inválido {0:?}: {1}")]
    InvalidEndpoint(String, String),

    #[error("Timeout após {0:?}")]
    Timeout(Duration),

    #[error("Falha de conexão: {0}")]
    Connect(String),

    #[error("Receiver respondeu HTTP {0}")]
    Status(u16),

    #[error("Erro na requisição: {0}")]
    Request(String),
}

/// Cliente HTTP de envio, barato de clonar.
#[derive(Debug, Clone)]
pub struct Transmitter {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl Transmitter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SendError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SendError::InvalidEndpoint(endpoint.to_string(), e.to_string()))?;
        // Envio direto na rede local, sem proxy do sistema
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn from_config(config: &SenderConfig) -> Result<Self, SendError> {
        Self::new(&config.endpoint, Duration::from_millis(config.timeout_ms))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Dispara o envio em segundo plano e retorna imediatamente.
    ///
    /// O handle pode ser ignorado; ele existe para quem precisar aguardar.
    pub fn send(&self, reading: Reading) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.post(reading).await {
                Ok(()) => debug!(bpm = reading.bpm, "→ leitura enviada para {}", this.endpoint),
                Err(e) => warn!(bpm = reading.bpm, "Erro ao enviar leitura: {e}"),
            }
        })
    }

    /// Um único POST, sem retry.
    pub async fn post(&self, reading: Reading) -> Result<(), SendError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .body(encode_reading(&reading))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn classify(&self, e: reqwest::Error) -> SendError {
        if e.is_timeout() {
            SendError::Timeout(self.timeout)
        } else if e.is_connect() {
            SendError::Connect(e.to_string())
        } else {
            SendError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{body_string, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(matches!(
            Transmitter::new("not a url", TIMEOUT),
            Err(SendError::InvalidEndpoint(..))
        ));
    }

    #[test]
    fn from_config_uses_short_timeout() {
        let t = Transmitter::from_config(&SenderConfig::default()).unwrap();
        assert_eq!(t.timeout, TIMEOUT);
        assert_eq!(t.endpoint().as_str(), "http://127.0.0.1:8880/");
    }

    #[tokio::test]
    async fn posts_decimal_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("82"))
            .and(header("content-type", CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let t = Transmitter::new(&server.uri(), TIMEOUT).unwrap();
        t.post(Reading::new(82)).await.unwrap();
    }

    #[tokio::test]
    async fn send_runs_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("73"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let t = Transmitter::new(&server.uri(), TIMEOUT).unwrap();
        t.send(Reading::new(73)).await.unwrap();
    }

    #[tokio::test]
    async fn slow_receiver_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let t = Transmitter::new(&server.uri(), TIMEOUT).unwrap();
        let started = Instant::now();
        let err = t.post(Reading::new(90)).await.unwrap_err();
        assert!(matches!(err, SendError::Timeout(d) if d == TIMEOUT), "{err}");
        assert!(started.elapsed() < TIMEOUT * 2, "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        // Porta livre: reserva e solta em seguida
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let t = Transmitter::new(&format!("http://127.0.0.1:{port}/"), TIMEOUT).unwrap();

        let err = t.post(Reading::new(60)).await.unwrap_err();
        assert!(matches!(err, SendError::Connect(_) | SendError::Timeout(_)), "{err}");

        // O envio em segundo plano termina sem pânico e sem passar do timeout
        let joined = tokio::time::timeout(Duration::from_secs(2), t.send(Reading::new(60))).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let t = Transmitter::new(&server.uri(), TIMEOUT).unwrap();
        assert!(matches!(
            t.post(Reading::new(70)).await,
            Err(SendError::Status(500))
        ));
    }
}
