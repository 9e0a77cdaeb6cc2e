//! Integer node body and representation-aware text conversion.

use crate::model::{IncMode, Ref, Representation};
use crate::{Error, Result};
use super::sources::IntSource;

/// Typed payload of an integer feature.
#[derive(Debug)]
pub struct IntegerNode {
    pub source: IntSource,
    /// Natural bounds; each may delegate to another node.
    pub min: Ref<i64>,
    pub max: Ref<i64>,
    pub inc: Ref<i64>,
    pub inc_mode: IncMode,
    /// Legal values when `inc_mode` is `List`.
    pub value_list: Vec<i64>,
    /// Client-applied clamps on top of the natural bounds.
    pub imposed_min: Option<i64>,
    pub imposed_max: Option<i64>,
    pub representation: Representation,
    pub unit: Option<String>,
    /// Cached list of valid values, dropped on invalidation.
    pub(crate) valid_values_cache: Option<Vec<i64>>,
}

impl IntegerNode {
    pub fn new(source: IntSource) -> Self {
        Self {
            source,
            min: Ref::Literal(i64::MIN),
            max: Ref::Literal(i64::MAX),
            inc: Ref::Literal(1),
            inc_mode: IncMode::Fixed,
            value_list: Vec::new(),
            imposed_min: None,
            imposed_max: None,
            representation: Representation::Linear,
            unit: None,
            valid_values_cache: None,
        }
    }

    /// Clamp a natural minimum with the imposed one.
    pub(crate) fn effective_min(&self, natural: i64) -> i64 {
        match self.imposed_min {
            Some(imposed) => natural.max(imposed),
            None => natural,
        }
    }

    /// Clamp a natural maximum with the imposed one.
    pub(crate) fn effective_max(&self, natural: i64) -> i64 {
        match self.imposed_max {
            Some(imposed) => natural.min(imposed),
            None => natural,
        }
    }
}

// ============================================================================
// Representation-aware text conversion
// ============================================================================

/// Render an integer the way its representation hint asks for.
pub(crate) fn format_int(v: i64, repr: Representation) -> String {
    match repr {
        Representation::HexNumber => format!("0x{v:X}"),
        Representation::Ipv4Address => {
            let v = v as u32;
            format!("{}.{}.{}.{}", v >> 24 & 0xFF, v >> 16 & 0xFF, v >> 8 & 0xFF, v & 0xFF)
        }
        Representation::MacAddress => {
            let v = v as u64;
            format!(
                "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                v >> 40 & 0xFF,
                v >> 32 & 0xFF,
                v >> 24 & 0xFF,
                v >> 16 & 0xFF,
                v >> 8 & 0xFF,
                v & 0xFF
            )
        }
        _ => v.to_string(),
    }
}

/// Parse client text into an integer, honoring the representation hint.
/// A `0x` prefix is accepted for every representation.
pub(crate) fn parse_int(s: &str, repr: Representation) -> Result<i64> {
    let bad = || Error::InvalidArgument(format!("'{s}' is not a valid integer"));
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_err(|_| bad());
    }
    match repr {
        Representation::Ipv4Address => {
            let mut v: u32 = 0;
            let mut count = 0;
            for octet in s.split('.') {
                let byte = octet.parse::<u8>().map_err(|_| bad())?;
                v = (v << 8) | byte as u32;
                count += 1;
            }
            if count != 4 {
                return Err(bad());
            }
            Ok(v as i64)
        }
        Representation::MacAddress => {
            let mut v: u64 = 0;
            let mut count = 0;
            for group in s.split(':') {
                let byte = u8::from_str_radix(group, 16).map_err(|_| bad())?;
                v = (v << 8) | byte as u64;
                count += 1;
            }
            if count != 6 {
                return Err(bad());
            }
            Ok(v as i64)
        }
        _ => s.parse::<i64>().map_err(|_| bad()),
    }
}
