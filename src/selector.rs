//! Selector digit enumeration.
//!
//! When a feature's effective value depends on a combination of selector
//! features (each an enumeration or integer acting as an index), a
//! `SelectorSet` walks all reachable combinations like an odometer: the
//! least significant digit advances first, wrapping carries into the
//! next digit. Enum digits iterate the enumeration's *currently
//! available* entries in declaration order; int digits iterate their
//! legal values ascending, honoring the increment. `restore` writes the
//! original selector values back, so a full sweep leaves the device
//! state unchanged.

use crate::graph::NodeId;
use crate::map::NodeMap;
use crate::node::InterfaceType;
use crate::{Error, Result};

// ============================================================================
// SelectorDigit
// ============================================================================

#[derive(Debug)]
enum Kind {
    Enum,
    Int { min: i64, max: i64, inc: i64 },
}

/// One digit of the odometer: a single selector feature and its cursor.
#[derive(Debug)]
pub struct SelectorDigit {
    selector: NodeId,
    kind: Kind,
    original: i64,
    current: Option<i64>,
    changed_last: bool,
}

impl SelectorDigit {
    /// Digit over an enumeration selector. Captures the current value for
    /// `restore`.
    pub fn enum_digit(map: &NodeMap, selector: NodeId) -> Result<Self> {
        if map.interface_type(selector)? != InterfaceType::Enumeration {
            return Err(Error::InterfaceCast(format!(
                "selector digit over {} node; expected IEnumeration",
                map.interface_type(selector)?
            )));
        }
        let original = map.enum_int_value(selector)?;
        Ok(Self {
            selector,
            kind: Kind::Enum,
            original,
            current: None,
            changed_last: false,
        })
    }

    /// Digit over an integer selector. Range and increment are captured
    /// at construction.
    pub fn int_digit(map: &NodeMap, selector: NodeId) -> Result<Self> {
        if map.interface_type(selector)? != InterfaceType::Integer {
            return Err(Error::InterfaceCast(format!(
                "selector digit over {} node; expected IInteger",
                map.interface_type(selector)?
            )));
        }
        let original = map.int_value(selector)?;
        let min = map.int_min(selector)?;
        let max = map.int_max(selector)?;
        let inc = map.int_inc(selector)?.max(1);
        Ok(Self {
            selector,
            kind: Kind::Int { min, max, inc },
            original,
            current: None,
            changed_last: false,
        })
    }

    /// The selector feature this digit drives.
    pub fn selector(&self) -> NodeId {
        self.selector
    }

    /// Values this digit can take right now, in sweep order.
    fn candidates(&self, map: &NodeMap) -> Result<Vec<i64>> {
        match &self.kind {
            Kind::Enum => map.available_enum_values(self.selector),
            Kind::Int { min, max, inc } => {
                let mut out = Vec::new();
                let mut v = *min;
                while v <= *max {
                    out.push(v);
                    v = match v.checked_add(*inc) {
                        Some(next) => next,
                        None => break,
                    };
                }
                Ok(out)
            }
        }
    }

    fn apply(&self, map: &NodeMap, value: i64) -> Result<()> {
        match self.kind {
            Kind::Enum => map.set_enum_int(self.selector, value, true),
            Kind::Int { .. } => map.set_int(self.selector, value, true),
        }
    }

    /// Reset to the first available value of this digit. Returns false
    /// when the digit has no value at all.
    pub fn set_first(&mut self, map: &NodeMap) -> Result<bool> {
        let candidates = self.candidates(map)?;
        match candidates.first() {
            Some(v) => {
                self.apply(map, *v)?;
                self.current = Some(*v);
                self.changed_last = true;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    /// Advance to the next available value. With `tick` false the cursor
    /// moves but the device is left untouched (peek). Returns false when
    /// the digit wraps — the caller carries into the next digit.
    pub fn set_next(&mut self, map: &NodeMap, tick: bool) -> Result<bool> {
        let candidates = self.candidates(map)?;
        let cursor = self.current.unwrap_or(self.original);
        let next = candidates
            .iter()
            .position(|v| *v == cursor)
            .and_then(|p| candidates.get(p + 1))
            .copied();
        match next {
            Some(v) => {
                if tick {
                    self.apply(map, v)?;
                }
                self.current = Some(v);
                self.changed_last = true;
                Ok(true)
            }
            None => {
                self.changed_last = false;
                Ok(false)
            }
        }
    }

    /// Write back the selector value captured at construction.
    pub fn restore(&mut self, map: &NodeMap) -> Result<()> {
        self.apply(map, self.original)?;
        self.current = None;
        self.changed_last = false;
        Ok(())
    }

    /// Selectors covered by this digit — all of them, or only those whose
    /// value changed in the last `set_next` (`incremental`).
    pub fn selector_list(&self, incremental: bool) -> Vec<NodeId> {
        if !incremental || self.changed_last {
            vec![self.selector]
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// SelectorSet
// ============================================================================

/// Odometer over an ordered set of digits. Digit 0 is the least
/// significant — it advances first.
#[derive(Debug)]
pub struct SelectorSet {
    digits: Vec<SelectorDigit>,
}

impl SelectorSet {
    pub fn new(digits: Vec<SelectorDigit>) -> Self {
        Self { digits }
    }

    pub fn digits(&self) -> &[SelectorDigit] {
        &self.digits
    }

    /// Reset every digit to its first value. Returns false if any digit
    /// is empty — the sweep covers zero combinations.
    pub fn set_first(&mut self, map: &NodeMap) -> Result<bool> {
        for digit in &mut self.digits {
            if !digit.set_first(map)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Advance to the next combination, carrying odometer-style. Returns
    /// false once every combination has been visited.
    pub fn set_next(&mut self, map: &NodeMap) -> Result<bool> {
        for digit in &mut self.digits {
            digit.changed_last = false;
        }
        let mut i = 0;
        loop {
            let Some(digit) = self.digits.get_mut(i) else {
                return Ok(false); // carried past the most significant digit
            };
            if digit.set_next(map, true)? {
                return Ok(true);
            }
            if !digit.set_first(map)? {
                return Ok(false);
            }
            i += 1;
        }
    }

    /// Write back every digit's original value.
    pub fn restore(&mut self, map: &NodeMap) -> Result<()> {
        for digit in &mut self.digits {
            digit.restore(map)?;
        }
        Ok(())
    }

    /// Selectors covered by the digits — all, or only those that changed
    /// in the last `set_next`.
    pub fn selector_list(&self, incremental: bool) -> Vec<NodeId> {
        self.digits
            .iter()
            .flat_map(|d| d.selector_list(incremental))
            .collect()
    }
}
