//! Definição dos tipos trocados entre relógio e computador.
//!
//! O protocolo carrega apenas o valor inteiro da frequência cardíaca;
//! não há timestamp nem identidade, só o "último valor conhecido".

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Leitura
// ──────────────────────────────────────────────

/// Uma leitura de frequência cardíaca.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Batimentos por minuto
    pub bpm: u16,
}

impl Reading {
    pub const fn new(bpm: u16) -> Self {
        Self { bpm }
    }
}

impl From<u16> for Reading {
    fn from(bpm: u16) -> Self {
        Self { bpm }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bpm)
    }
}

// ──────────────────────────────────────────────
// Valor exibido
// ──────────────────────────────────────────────

/// Valor publicado pelo listener para o display.
///
/// Corpos numéricos viram [`DisplayValue::Reading`]; qualquer outro texto
/// não vazio é repassado literalmente como [`DisplayValue::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    Reading(Reading),
    Raw(String),
}

impl DisplayValue {
    /// Retorna a leitura numérica, se houver.
    pub fn reading(&self) -> Option<Reading> {
        match self {
            DisplayValue::Reading(r) => Some(*r),
            DisplayValue::Raw(_) => None,
        }
    }
}

impl From<Reading> for DisplayValue {
    fn from(reading: Reading) -> Self {
        DisplayValue::Reading(reading)
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayValue::Reading(r) => r.fmt(f),
            DisplayValue::Raw(text) => f.write_str(text),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reading_is_zero() {
        assert_eq!(Reading::default().bpm, 0);
    }

    #[test]
    fn display_prints_plain_decimal() {
        assert_eq!(Reading::new(73).to_string(), "73");
        assert_eq!(DisplayValue::from(Reading::new(82)).to_string(), "82");
        assert_eq!(DisplayValue::Raw("abc".into()).to_string(), "abc");
    }

    #[test]
    fn raw_value_has_no_reading() {
        assert_eq!(DisplayValue::Raw("x".into()).reading(), None);
        assert_eq!(
            DisplayValue::Reading(Reading::new(60)).reading(),
            Some(Reading::new(60))
        );
    }
}
