//! Listener HTTP que recebe as leituras e publica no display.
//!
//! Um único loop de accept atende uma conexão por vez, em ordem de
//! chegada: lê o corpo do `POST`, publica o valor e fecha a resposta antes
//! do próximo accept. Erros de uma requisição são logados e o loop segue.
//! O loop só termina pelo [`CancellationToken`], verificado antes de cada
//! accept e também durante a espera.

use crate::display::DisplaySink;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::select_all;
use heartwatch_core::config::ReceiverConfig;
use heartwatch_core::protocol::classify_body;
use heartwatch_core::types::DisplayValue;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pausa após falha de accept (ex.: limite de descritores).
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Erros que saem do listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Falha ao bind em {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener já iniciado")]
    AlreadyStarted,

    #[error("Listener parado; é preciso uma nova instância")]
    Stopped,

    #[error("Nenhum endereço de escuta configurado")]
    NoAddresses,
}

/// Falhas de uma requisição; logadas e descartadas.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("Erro ao ler corpo: {0}")]
    Body(String),

    #[error("Corpo maior que {0} bytes")]
    TooLarge(usize),

    #[error("Corpo não é UTF-8 válido")]
    InvalidUtf8,

    #[error("Sessão excedeu {0:?}")]
    Timeout(Duration),

    #[error("Erro na conexão: {0}")]
    Connection(#[from] hyper::Error),
}

/// Ciclo de vida: `Created → Listening → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Listening,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct SessionLimits {
    max_body_bytes: usize,
    timeout: Duration,
}

/// Serviço que escuta POSTs com a leitura atual.
pub struct ListenerService {
    addresses: Vec<String>,
    sink: Arc<dyn DisplaySink>,
    limits: SessionLimits,
    state: ListenerState,
    cancel: CancellationToken,
    local_addrs: Vec<SocketAddr>,
    task: Option<JoinHandle<()>>,
}

impl ListenerService {
    pub fn new(config: &ReceiverConfig, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            addresses: config.bind_addresses.clone(),
            sink,
            limits: SessionLimits {
                max_body_bytes: config.max_body_bytes,
                timeout: Duration::from_millis(config.request_timeout_ms),
            },
            state: ListenerState::Created,
            cancel: CancellationToken::new(),
            local_addrs: Vec::new(),
            task: None,
        }
    }

    /// Faz bind em todos os endereços e inicia o loop em segundo plano.
    ///
    /// Tudo ou nada: se um endereço falhar, os sockets já abertos são
    /// fechados e o serviço continua em `Created`.
    pub async fn start(&mut self) -> Result<(), ListenerError> {
        match self.state {
            ListenerState::Created => {}
            ListenerState::Listening => return Err(ListenerError::AlreadyStarted),
            ListenerState::Stopped => return Err(ListenerError::Stopped),
        }
        if self.addresses.is_empty() {
            return Err(ListenerError::NoAddresses);
        }

        let mut listeners = Vec::with_capacity(self.addresses.len());
        let mut local_addrs = Vec::with_capacity(self.addresses.len());
        for addr in &self.addresses {
            let bind_error = |source| ListenerError::Bind {
                addr: addr.clone(),
                source,
            };
            let listener = TcpListener::bind(addr.as_str()).await.map_err(bind_error)?;
            let local = listener.local_addr().map_err(bind_error)?;
            info!("Escutando em http://{local}/ ({addr})");
            local_addrs.push(local);
            listeners.push(listener);
        }

        self.local_addrs = local_addrs;
        self.task = Some(tokio::spawn(accept_loop(
            listeners,
            Arc::clone(&self.sink),
            self.limits,
            self.cancel.clone(),
        )));
        self.state = ListenerState::Listening;
        Ok(())
    }

    /// Sinaliza o cancelamento. Uma requisição em andamento termina; nenhum
    /// novo accept começa depois disto.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if self.state != ListenerState::Stopped {
            info!("Parando listener");
            self.state = ListenerState::Stopped;
        }
    }

    /// Aguarda o loop terminar; depois disto os sockets estão fechados.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Loop de accept terminou com erro: {e}");
            }
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ListenerState::Listening
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Endereços efetivos após o bind (resolve portas 0).
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }
}

impl Drop for ListenerService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listeners: Vec<TcpListener>,
    sink: Arc<dyn DisplaySink>,
    limits: SessionLimits,
    cancel: CancellationToken,
) {
    let mut incoming = select_all(listeners.into_iter().map(TcpListenerStream::new));

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = incoming.next() => next,
        };

        match accepted {
            Some(Ok(stream)) => serve_session(stream, Arc::clone(&sink), limits).await,
            Some(Err(e)) => {
                warn!("Erro ao aceitar conexão: {e}");
                tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
            }
            None => break,
        }
    }

    info!("Listener parado");
}

/// Atende uma conexão até a resposta ser fechada.
async fn serve_session(stream: TcpStream, sink: Arc<dyn DisplaySink>, limits: SessionLimits) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".into());
    debug!(%peer, "Conexão aceita");

    let service = service_fn(move |req: Request<Incoming>| {
        let sink = Arc::clone(&sink);
        async move {
            Ok::<_, Infallible>(handle_request(req, sink.as_ref(), limits.max_body_bytes).await)
        }
    });
    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service);

    let result = match tokio::time::timeout(limits.timeout, connection).await {
        Ok(served) => served.map_err(RequestError::from),
        Err(_) => Err(RequestError::Timeout(limits.timeout)),
    };
    if let Err(e) = result {
        warn!(%peer, "Sessão descartada: {e}");
    }
}

async fn handle_request(
    req: Request<Incoming>,
    sink: &dyn DisplaySink,
    max_body_bytes: usize,
) -> Response<Full<Bytes>> {
    if req.method() != Method::POST {
        debug!(method = %req.method(), "Requisição ignorada");
        return reply(StatusCode::METHOD_NOT_ALLOWED);
    }

    let text = match read_body(req.into_body(), max_body_bytes).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Erro ao tratar requisição: {e}");
            return reply(match e {
                RequestError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            });
        }
    };

    let Some(value) = classify_body(&text) else {
        warn!("Requisição sem corpo; nada a publicar");
        return reply(StatusCode::BAD_REQUEST);
    };
    if let DisplayValue::Raw(raw) = &value {
        warn!("Corpo não numérico repassado como texto: {raw:?}");
    }

    info!("HeartRate:{value}");
    sink.show(&value);
    reply(StatusCode::OK)
}

async fn read_body(body: Incoming, max_body_bytes: usize) -> Result<String, RequestError> {
    let collected = Limited::new(body, max_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                RequestError::TooLarge(max_body_bytes)
            } else {
                RequestError::Body(e.to_string())
            }
        })?;

    String::from_utf8(collected.to_bytes().to_vec()).map_err(|_| RequestError::InvalidUtf8)
}

fn reply(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
