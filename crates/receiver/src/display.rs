//! Display do valor recebido: console + título da janela.

use heartwatch_core::types::DisplayValue;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Destino dos valores publicados pelo listener.
pub trait DisplaySink: Send + Sync {
    fn show(&self, value: &DisplayValue);
}

/// Imprime cada valor e atualiza o título do terminal.
pub struct ConsoleDisplay {
    title_prefix: String,
    latest: Mutex<Option<DisplayValue>>,
}

impl ConsoleDisplay {
    pub fn new(title_prefix: impl Into<String>) -> Self {
        Self {
            title_prefix: title_prefix.into(),
            latest: Mutex::new(None),
        }
    }

    /// Último valor exibido.
    pub fn latest(&self) -> Option<DisplayValue> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn title_for(&self, value: &DisplayValue) -> String {
        format!("{}:{value}", self.title_prefix)
    }
}

impl DisplaySink for ConsoleDisplay {
    fn show(&self, value: &DisplayValue) {
        let title = self.title_for(value);
        let mut out = std::io::stdout().lock();
        // OSC 0: título da janela
        if let Err(e) = write!(out, "\x1b]0;{title}\x07{value}\n").and_then(|()| out.flush()) {
            debug!("Falha ao escrever no console: {e}");
        }
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
    }
}
