use std::sync::OnceLock;

use regex::Regex;
use zooscan_core::{FarmName, MetricsRecord, Rate};

// ── Label vocabularies ────────────────────────────────────────────────────────

const FARM_LABEL: &str = r"fazenda|farm";
const PREGNANCY_LABEL: &str = r"prenhe[zs]?|gesta[cç][aã]o|pregnan(?:cy|t)";
const CONCEPTION_LABEL: &str = r"concep[cç][aã]o|conception";
const SERVICE_LABEL: &str = r"servi[cç]o|service";
const CALVING_LABEL: &str = r"partos?|pari[cç][aã]o|nascimentos|calvings?|births?";

/// Whole words that end a farm name: any metric label, optionally run into its
/// value (`prenhez82`). Names such as "Nascimento" or "Gestal" are not labels.
const NAME_STOP: &str = r"(?i)^(?:prenhe[zs]?|gesta[cç][aã]o|pregnan(?:cy|t)|concep[cç][aã]o|conception|servi[cç]os?|services?|partos?|pari[cç][aã]o|nascimentos|calvings?|births?|taxas?|rates?|[ií]ndices?)\d*$";

/// Compiled pattern set. Each field is searched independently, so fields may
/// appear in any order and any of them may be missing.
struct Patterns {
    farm: Regex,
    name_stop: Regex,
    pregnancy: Regex,
    conception: Regex,
    service: Regex,
    calvings: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            farm: Regex::new(&format!(r"(?i)\b({FARM_LABEL})\b[\s:\-]*([\p{{L}}\p{{N}} \t]*)"))?,
            name_stop: Regex::new(NAME_STOP)?,
            pregnancy: rate_pattern(PREGNANCY_LABEL)?,
            conception: rate_pattern(CONCEPTION_LABEL)?,
            service: rate_pattern(SERVICE_LABEL)?,
            // The value is the first whole number after the label that is not a
            // percentage.
            calvings: Regex::new(&format!(
                r"(?is)\b(?:{CALVING_LABEL})\b(?:.*?\D)??(\d{{1,6}})\s*(?:[^\d\s%]|$)"
            ))?,
        })
    }
}

/// Label, then the first 1–3 digit number directly followed by `%`. The lazy
/// optional gap keeps `prenhez82%` on 82 instead of skipping to a later value.
fn rate_pattern(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?is)\b(?:{label})(?:.*?\D)??(\d{{1,3}})\s*%"))
}

fn patterns() -> Result<&'static Patterns, &'static regex::Error> {
    static P: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();
    P.get_or_init(Patterns::compile).as_ref()
}

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract the reproduction metrics from recognized text.
    ///
    /// Never fails: missing fields are `None`, and if the pattern set itself is
    /// unusable the result is an empty record carrying the text for audit.
    pub fn extract(text: &str) -> MetricsRecord {
        match patterns() {
            Ok(p) => Self::extract_with(p, text),
            Err(e) => {
                tracing::error!(error = %e, "metric patterns failed to compile");
                MetricsRecord::empty(text)
            }
        }
    }

    fn extract_with(p: &Patterns, text: &str) -> MetricsRecord {
        MetricsRecord {
            farm_name: Self::extract_farm_name(p, text).unwrap_or_default(),
            pregnancy_rate: extract_rate(&p.pregnancy, text, "pregnancy_rate"),
            conception_rate: extract_rate(&p.conception, text, "conception_rate"),
            service_rate: extract_rate(&p.service, text, "service_rate"),
            estimated_calvings: extract_count(&p.calvings, text),
            provenance_text: text.to_string(),
        }
    }

    // ── Farm name ─────────────────────────────────────────────────────────────

    fn extract_farm_name(p: &Patterns, text: &str) -> Option<FarmName> {
        let c = p.farm.captures(text)?;
        let label = c.get(1)?.as_str();
        let words: Vec<&str> = c
            .get(2)?
            .as_str()
            .split_whitespace()
            .take_while(|w| !p.name_stop.is_match(w))
            .collect();
        if words.is_empty() {
            return None;
        }
        Some(FarmName::new(format!("{label} {}", words.join(" "))))
    }
}

// ── Numeric fields ────────────────────────────────────────────────────────────

/// Out-of-range percentages are rejected rather than clamped.
fn extract_rate(re: &Regex, text: &str, field: &'static str) -> Option<Rate> {
    let value: u32 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    match Rate::new(value) {
        Ok(rate) => Some(rate),
        Err(e) => {
            tracing::warn!(field, %e, "discarding out-of-range capture");
            None
        }
    }
}

fn extract_count(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
