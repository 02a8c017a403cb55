use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Farm name recorded when the sheet carries no recognizable farm label.
pub const DEFAULT_FARM_NAME: &str = "Extraído via OCR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate {0} is outside 0..=100")]
pub struct RateOutOfRange(pub u32);

/// A whole-number percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Rate(u8);

impl Rate {
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> Result<Self, RateOutOfRange> {
        if value > Self::MAX {
            return Err(RateOutOfRange(value));
        }
        Ok(Rate(value as u8))
    }

    pub fn value(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for Rate {
    type Error = RateOutOfRange;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}

impl From<Rate> for u32 {
    fn from(rate: Rate) -> Self {
        rate.value()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Farm name that is never blank. Blank input collapses to [`DEFAULT_FARM_NAME`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FarmName(String);

impl FarmName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            Self::unknown()
        } else if trimmed.len() == name.len() {
            FarmName(name)
        } else {
            FarmName(trimmed.to_string())
        }
    }

    pub fn unknown() -> Self {
        FarmName(DEFAULT_FARM_NAME.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == DEFAULT_FARM_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FarmName {
    fn default() -> Self {
        Self::unknown()
    }
}

impl From<String> for FarmName {
    fn from(name: String) -> Self {
        FarmName::new(name)
    }
}

impl From<FarmName> for String {
    fn from(name: FarmName) -> Self {
        name.0
    }
}

impl fmt::Display for FarmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reproduction indicators read off a single report sheet.
///
/// Every metric is optional: a field the recognizer could not find stays `None`
/// rather than failing the whole sheet. The Portuguese aliases accept records
/// written by the legacy upload service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(default, alias = "nome_da_fazenda")]
    pub farm_name: FarmName,
    #[serde(default, alias = "taxa_prenhez")]
    pub pregnancy_rate: Option<Rate>,
    #[serde(default, alias = "taxa_concepcao")]
    pub conception_rate: Option<Rate>,
    #[serde(default, alias = "taxa_servico")]
    pub service_rate: Option<Rate>,
    #[serde(default, alias = "partos_estimados")]
    pub estimated_calvings: Option<u32>,
    /// Normalized recognizer output the fields were read from, kept for audit.
    #[serde(default)]
    pub provenance_text: String,
}

impl MetricsRecord {
    /// A record with the sentinel farm name and no metrics.
    pub fn empty(provenance_text: impl Into<String>) -> Self {
        Self {
            provenance_text: provenance_text.into(),
            ..Self::default()
        }
    }

    /// Number of metric fields (farm name excluded) that were recovered.
    pub fn recovered_fields(&self) -> usize {
        [
            self.pregnancy_rate.is_some(),
            self.conception_rate.is_some(),
            self.service_rate.is_some(),
            self.estimated_calvings.is_some(),
        ]
        .into_iter()
        .filter(|found| *found)
        .count()
    }
}
