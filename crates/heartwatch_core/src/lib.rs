//! # HeartWatch Core
//!
//! Crate compartilhada entre o relógio (Sender) e o computador (Receiver):
//! tipos da leitura, protocolo em texto sobre HTTP, configuração TOML e o
//! portão de permissão assíncrono.
//!
//! ## Módulos
//! - [`types`] – Leitura de frequência cardíaca e valor exibido
//! - [`protocol`] – Corpo do POST: decimal em UTF-8
//! - [`config`] – Configuração unificada via TOML
//! - [`permission`] – Verificação de privilégio com resultado único

pub mod config;
pub mod permission;
pub mod protocol;
pub mod types;

// Re-exports convenientes
pub use config::{AppConfig, ReceiverConfig, SenderConfig};
pub use permission::{PermissionGate, PermissionState, PrivilegeManager};
pub use protocol::{classify_body, decode_reading, encode_reading};
pub use types::{DisplayValue, Reading};
