//! Float node body and display formatting.

use crate::model::{DisplayNotation, Ref, Representation};
use super::sources::FloatSource;

/// Typed payload of a float feature.
#[derive(Debug)]
pub struct FloatNode {
    pub source: FloatSource,
    pub min: Ref<f64>,
    pub max: Ref<f64>,
    /// Optional increment; most float features have none.
    pub inc: Option<Ref<f64>>,
    pub imposed_min: Option<f64>,
    pub imposed_max: Option<f64>,
    pub representation: Representation,
    pub unit: Option<String>,
    pub notation: DisplayNotation,
    /// Display digits after the decimal point; `None` lets the formatter
    /// choose the shortest round-tripping form.
    pub precision: Option<usize>,
}

impl FloatNode {
    pub fn new(source: FloatSource) -> Self {
        Self {
            source,
            min: Ref::Literal(f64::MIN),
            max: Ref::Literal(f64::MAX),
            inc: None,
            imposed_min: None,
            imposed_max: None,
            representation: Representation::Linear,
            unit: None,
            notation: DisplayNotation::Automatic,
            precision: None,
        }
    }

    pub(crate) fn effective_min(&self, natural: f64) -> f64 {
        match self.imposed_min {
            Some(imposed) => natural.max(imposed),
            None => natural,
        }
    }

    pub(crate) fn effective_max(&self, natural: f64) -> f64 {
        match self.imposed_max {
            Some(imposed) => natural.min(imposed),
            None => natural,
        }
    }
}

// ============================================================================
// Round-trip-safe formatting
// ============================================================================

/// Format `v` for display, guaranteeing that parsing the result yields a
/// value inside `[min, max]`.
///
/// Fixed-precision formatting can round the printed value past a bound
/// (`0.15` printed with one decimal becomes `"0.2"`). When that happens
/// the formatter retries once with `v` nudged by an epsilon matched to
/// the magnitude of the last printed digit, and as a last resort falls
/// back to shortest round-trip formatting, which reparses to exactly `v`.
pub(crate) fn format_float(
    v: f64,
    notation: DisplayNotation,
    precision: Option<usize>,
    min: f64,
    max: f64,
) -> String {
    let naive = render(v, notation, precision);
    if let Ok(parsed) = naive.parse::<f64>() {
        if parsed >= min && parsed <= max {
            return naive;
        }
        let eps = last_digit_magnitude(&naive);
        let candidate = if parsed > max { v - eps } else { v + eps };
        let corrected = render(candidate, notation, precision);
        if let Ok(reparsed) = corrected.parse::<f64>() {
            if reparsed >= min && reparsed <= max {
                return corrected;
            }
        }
    }
    format!("{v}")
}

fn render(v: f64, notation: DisplayNotation, precision: Option<usize>) -> String {
    match (notation, precision) {
        (DisplayNotation::Scientific, Some(p)) => format!("{:.*e}", p, v),
        (DisplayNotation::Scientific, None) => format!("{v:e}"),
        (DisplayNotation::Fixed, Some(p)) | (DisplayNotation::Automatic, Some(p)) => {
            format!("{:.*}", p, v)
        }
        (DisplayNotation::Fixed, None) | (DisplayNotation::Automatic, None) => format!("{v}"),
    }
}

/// Magnitude of the last printed digit, derived from the decimal and
/// exponent shape of the formatted string.
fn last_digit_magnitude(s: &str) -> f64 {
    let (mantissa, exp) = match s.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (s, 0),
    };
    let decimals = mantissa
        .split_once('.')
        .map_or(0, |(_, frac)| frac.len() as i32);
    10f64.powi(exp - decimals)
}
