//! Protocolo de comunicação em texto.
//!
//! Cada leitura viaja como um `POST` HTTP/1.1 cujo corpo é o valor
//! decimal em UTF-8:
//!
//! ```text
//! POST / HTTP/1.1
//! Content-Type: text/plain; charset=utf-8
//! Content-Length: 2
//!
//! 73
//! ```
//!
//! - Caminho ignorado, sem autenticação
//! - Resposta ignorada pelos dois lados; conexão fechada após cada troca

use crate::types::{DisplayValue, Reading};

/// Content-Type usado pelo Transmitter.
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Erros do protocolo.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Corpo vazio")]
    Empty,

    #[error("Valor não numérico: {0:?}")]
    NotNumeric(String),

    #[error("Valor fora do intervalo (0–{max}): {0}", max = u16::MAX)]
    OutOfRange(String),
}

/// Codifica uma [`Reading`] para o corpo do POST.
pub fn encode_reading(reading: &Reading) -> String {
    reading.bpm.to_string()
}

/// Decodifica o corpo recebido em [`Reading`].
///
/// Espaços em volta são ignorados (`"73\n"` é válido).
pub fn decode_reading(body: &str) -> Result<Reading, ProtocolError> {
    let text = body.trim();
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::NotNumeric(text.to_string()));
    }

    text.parse::<u16>()
        .map(Reading::new)
        .map_err(|_| ProtocolError::OutOfRange(text.to_string()))
}

/// Classifica um corpo recebido no valor a publicar.
///
/// `None` significa "nada a publicar" (corpo vazio). Texto não numérico é
/// repassado literalmente para o display.
pub fn classify_body(body: &str) -> Option<DisplayValue> {
    match decode_reading(body) {
        Ok(reading) => Some(DisplayValue::Reading(reading)),
        Err(ProtocolError::Empty) => None,
        Err(_) => Some(DisplayValue::Raw(body.trim().to_string())),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
