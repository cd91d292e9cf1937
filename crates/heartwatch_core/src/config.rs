//! Configuração unificada via TOML.
//!
//! Endereços e URL ficam no `config.toml` em vez de fixos no código.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Privilégio de dados de saúde exigido pelo sensor cardíaco.
pub const HEALTHINFO_PRIVILEGE: &str = "http://tizen.org/privilege/healthinfo";

/// Erros ao persistir a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro de serialização: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração do Sender (relógio).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// URL base do Receiver; toda leitura é enviada via POST para ela
    pub endpoint: String,
    /// Timeout do POST em milissegundos
    pub timeout_ms: u64,
    /// Intervalo de amostragem do sensor em milissegundos
    pub sample_interval_ms: u64,
    /// Privilégio verificado antes de ligar o sensor
    pub privilege: String,
    /// Resposta do gerenciador de privilégios: "allow", "deny" ou "ask"
    pub permission: String,
    /// Linha de base do sensor simulado (BPM)
    pub simulated_bpm: u16,
    /// `false` simula um relógio sem sensor cardíaco
    pub sensor_supported: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8880/".into(),
            timeout_ms: 500,
            sample_interval_ms: 1000,
            privilege: HEALTHINFO_PRIVILEGE.into(),
            permission: "ask".into(),
            simulated_bpm: 72,
            sensor_supported: true,
        }
    }
}

/// Configuração do Receiver (computador).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Endereços "host:porta" onde escutar
    pub bind_addresses: Vec<String>,
    /// Prefixo do título do console
    pub title_prefix: String,
    /// Tamanho máximo do corpo aceito (bytes)
    pub max_body_bytes: usize,
    /// Tempo máximo de uma sessão (ms) antes de ser abandonada
    pub request_timeout_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec!["0.0.0.0:8880".into()],
            title_prefix: "HeartRate".into(),
            max_body_bytes: 64,
            request_timeout_ms: 5000,
        }
    }
}

/// Configuração raiz do aplicativo (unifica sender e receiver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.sender.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "Esquema do endpoint não suportado: {}",
                url.scheme()
            )),
            Err(e) => errors.push(format!(
                "Endpoint inválido {:?}: {e}",
                self.sender.endpoint
            )),
        }
        if self.sender.timeout_ms == 0 {
            errors.push("Timeout do sender não pode ser 0".into());
        }
        if !(100..=60_000).contains(&self.sender.sample_interval_ms) {
            errors.push(format!(
                "Intervalo de amostragem inválido: {} ms (100–60000)",
                self.sender.sample_interval_ms
            ));
        }
        if !matches!(self.sender.permission.as_str(), "allow" | "deny" | "ask") {
            errors.push(format!(
                "Permissão inválida: {:?} (allow, deny, ask)",
                self.sender.permission
            ));
        }

        if self.receiver.bind_addresses.is_empty() {
            errors.push("Nenhum endereço de escuta configurado".into());
        }
        for addr in &self.receiver.bind_addresses {
            if let Err(e) = validate_bind_address(addr) {
                errors.push(e);
            }
        }
        if self.receiver.max_body_bytes == 0 {
            errors.push("max_body_bytes não pode ser 0".into());
        }

        errors
    }
}

/// Confere o formato "host:porta" de um endereço de escuta.
fn validate_bind_address(addr: &str) -> Result<(), String> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(format!("Endereço sem porta: {addr:?}"));
    };
    if host.is_empty() {
        return Err(format!("Endereço sem host: {addr:?}"));
    }
    match port.parse::<u16>() {
        Ok(0) => Err(format!("Porta 0 não permitida: {addr:?}")),
        Ok(_) => Ok(()),
        Err(_) => Err(format!("Porta inválida em {addr:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn defaults_match_wire_protocol() {
        let config = AppConfig::default();
        assert_eq!(config.sender.timeout_ms, 500);
        assert_eq!(config.receiver.bind_addresses, vec!["0.0.0.0:8880"]);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.sender.endpoint, parsed.sender.endpoint);
        assert_eq!(config.receiver.bind_addresses, parsed.receiver.bind_addresses);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[receiver]
bind_addresses = ["localhost:8880", "127.0.0.1:8880"]
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.receiver.bind_addresses.len(), 2);
        // Outros campos devem ter valor padrão
        assert_eq!(config.receiver.max_body_bytes, 64);
        assert_eq!(config.sender.sample_interval_ms, 1000);
    }

    #[test]
    fn rejects_bad_bind_addresses() {
        let mut config = AppConfig::default();
        config.receiver.bind_addresses = vec![
            "localhost".into(),
            ":8880".into(),
            "0.0.0.0:0".into(),
            "0.0.0.0:http".into(),
        ];
        assert_eq!(config.validate().len(), 4);
    }

    #[test]
    fn rejects_empty_bind_list_and_bad_endpoint() {
        let mut config = AppConfig::default();
        config.receiver.bind_addresses.clear();
        config.sender.endpoint = "ftp://watch:8880".into();
        config.sender.timeout_ms = 0;
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "heartwatch-config-{}.toml",
            std::process::id()
        ));
        let mut config = AppConfig::default();
        config.sender.simulated_bpm = 64;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.sender.simulated_bpm, 64);
    }

    #[test]
    fn save_into_missing_dir_reports_path() {
        let path = Path::new("/nonexistent/heartwatch/config.toml");
        let err = AppConfig::default().save(path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { path: ref p, .. } if p == path), "{err}");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = AppConfig::load(Path::new("/nonexistent/heartwatch/config.toml"));
        assert_eq!(loaded.sender.timeout_ms, 500);
    }
}
