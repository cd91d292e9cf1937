//! Portão de permissão – verificação assíncrona de privilégio com
//! resultado único.
//!
//! A API da plataforma responde em três vias (`Allow` / `Deny` / `Ask`).
//! Nos dois primeiros casos o resultado sai sem suspender; em `Ask` a
//! verificação aguarda uma única resposta entregue por callback. O callback
//! é convertido em `await` através de um `oneshot`, e uma segunda resposta
//! para a mesma verificação é registrada como defeito.
//!
//! Uma instância aceita apenas uma verificação em andamento por vez.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

// ──────────────────────────────────────────────
// Interface da plataforma
// ──────────────────────────────────────────────

/// Resultado da consulta síncrona de privilégio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Allow,
    Deny,
    /// O usuário precisa ser perguntado
    Ask,
}

/// Resposta do usuário a um pedido de privilégio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResult {
    AllowForever,
    AllowOnce,
    DenyForever,
    DenyOnce,
}

/// Motivo pelo qual o callback de resposta foi chamado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCause {
    Answer,
    Error,
}

/// Evento entregue ao callback de resposta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionResponse {
    pub cause: CallCause,
    pub result: RequestResult,
}

impl PermissionResponse {
    pub const fn answer(result: RequestResult) -> Self {
        Self {
            cause: CallCause::Answer,
            result,
        }
    }
}

/// Identificador de uma inscrição de callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback registrado no contexto de resposta.
pub type ResponseHandler = Box<dyn Fn(PermissionResponse) + Send + Sync>;

/// Falha reportada pela plataforma.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/// Gerenciador de privilégios da plataforma.
pub trait PrivilegeManager: Send + Sync {
    /// Estado atual do privilégio.
    fn check(&self, privilege: &str) -> Result<CheckResult, PlatformError>;

    /// Registra um callback no contexto de resposta do privilégio.
    ///
    /// `None` quando a plataforma não fornece contexto.
    fn subscribe(&self, privilege: &str, handler: ResponseHandler) -> Option<SubscriptionId>;

    /// Remove um callback registrado.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Dispara o pedido ao usuário; a resposta chega pelo callback.
    fn request(&self, privilege: &str) -> Result<(), PlatformError>;
}

// ──────────────────────────────────────────────
// Portão
// ──────────────────────────────────────────────

/// Último estado resolvido pelo portão.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionState {
    #[default]
    Unknown,
    Allowed,
    Denied,
}

/// Erros do portão.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Verificação de permissão já em andamento")]
    CheckInProgress,
}

/// Converte a API de privilégios em um único `bool` assíncrono.
///
/// O portão resolve uma única vez: depois de `Allowed` ou `Denied`, novas
/// chamadas a [`check`](Self::check) devolvem o mesmo resultado sem consultar
/// a plataforma. Para verificar de novo, crie outro portão.
pub struct PermissionGate<M: PrivilegeManager + ?Sized> {
    manager: Arc<M>,
    privilege: String,
    in_flight: AtomicBool,
    state: Mutex<PermissionState>,
}

impl<M: PrivilegeManager + ?Sized> PermissionGate<M> {
    pub fn new(manager: Arc<M>, privilege: impl Into<String>) -> Self {
        Self {
            manager,
            privilege: privilege.into(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(PermissionState::Unknown),
        }
    }

    pub fn privilege(&self) -> &str {
        &self.privilege
    }

    /// Estado resolvido; não muda depois de sair de `Unknown`.
    pub fn state(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Verifica o privilégio.
    ///
    /// Retorna `Ok(true)` apenas para `Allow` ou para uma resposta
    /// `AllowForever`. Qualquer falha da plataforma vira `Ok(false)`;
    /// o único erro é [`PermissionError::CheckInProgress`].
    pub async fn check(&self) -> Result<bool, PermissionError> {
        match self.state() {
            PermissionState::Allowed => return Ok(true),
            PermissionState::Denied => return Ok(false),
            PermissionState::Unknown => {}
        }
        let _in_flight = InFlight::acquire(&self.in_flight)?;

        let granted = match self.manager.check(&self.privilege) {
            Ok(CheckResult::Allow) => true,
            Ok(CheckResult::Deny) => false,
            Ok(CheckResult::Ask) => self.ask().await,
            Err(e) => {
                error!(privilege = %self.privilege, "Falha ao consultar privilégio: {e}");
                false
            }
        };

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = if granted {
            PermissionState::Allowed
        } else {
            PermissionState::Denied
        };
        info!(privilege = %self.privilege, granted, "Verificação de privilégio concluída");
        Ok(granted)
    }

    async fn ask(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::new(tx);
        let handler: ResponseHandler =
            Box::new(move |response| completion.complete(resolve(response)));

        let Some(id) = self.manager.subscribe(&self.privilege, handler) else {
            error!(privilege = %self.privilege, "Não foi possível obter o contexto de resposta do privilégio");
            return false;
        };
        let _subscription = Subscription {
            manager: &*self.manager,
            id,
        };

        debug!(privilege = %self.privilege, "Pedindo privilégio ao usuário");
        if let Err(e) = self.manager.request(&self.privilege) {
            error!(privilege = %self.privilege, "Falha ao pedir privilégio: {e}");
            return false;
        }

        match rx.await {
            Ok(granted) => granted,
            Err(_) => {
                error!(privilege = %self.privilege, "Contexto de resposta descartado sem resposta");
                false
            }
        }
    }
}

/// Só `AllowForever` concede; `AllowOnce` não sobrevive ao app.
fn resolve(response: PermissionResponse) -> bool {
    match response.cause {
        CallCause::Answer => response.result == RequestResult::AllowForever,
        CallCause::Error => {
            error!("Erro ao pedir permissão");
            false
        }
    }
}

/// Sinal de conclusão de uso único.
struct Completion {
    tx: Mutex<Option<oneshot::Sender<bool>>>,
}

impl Completion {
    fn new(tx: oneshot::Sender<bool>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn complete(&self, granted: bool) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                if tx.send(granted).is_err() {
                    warn!("Verificação de permissão abandonada antes da resposta");
                }
            }
            None => error!(granted, "Permissão já resolvida; resposta duplicada ignorada"),
        }
    }
}

/// Remove o callback quando a verificação termina (ou é abandonada).
struct Subscription<'a, M: PrivilegeManager + ?Sized> {
    manager: &'a M,
    id: SubscriptionId,
}

impl<M: PrivilegeManager + ?Sized> Drop for Subscription<'_, M> {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.id);
    }
}

/// Marca de verificação em andamento, liberada no drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PermissionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| PermissionError::CheckInProgress)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
