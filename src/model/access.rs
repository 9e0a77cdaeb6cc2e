//! Access mode, visibility, caching mode — and their combination algebra.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// AccessMode
// ============================================================================

/// Whether a feature is implemented / available / readable / writable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Not implemented.
    NI,
    /// Not available (implemented, but currently inaccessible).
    NA,
    /// Write-only.
    WO,
    /// Read-only.
    RO,
    /// Read-write.
    RW,
}

impl AccessMode {
    pub fn is_readable(self) -> bool {
        matches!(self, AccessMode::RO | AccessMode::RW)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::WO | AccessMode::RW)
    }

    pub fn is_implemented(self) -> bool {
        self != AccessMode::NI
    }

    pub fn is_available(self) -> bool {
        !matches!(self, AccessMode::NI | AccessMode::NA)
    }

    /// Combine two access modes into the most restrictive one.
    ///
    /// NI dominates, then NA; RO and WO from different sides cancel to NA;
    /// then WO, then RO; two RWs stay RW.
    pub fn combine(self, other: AccessMode) -> AccessMode {
        use AccessMode::*;
        if self == NI || other == NI {
            NI
        } else if self == NA || other == NA {
            NA
        } else if (self == RO && other == WO) || (self == WO && other == RO) {
            NA
        } else if self == WO || other == WO {
            WO
        } else if self == RO || other == RO {
            RO
        } else {
            RW
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::NI => "NI",
            AccessMode::NA => "NA",
            AccessMode::WO => "WO",
            AccessMode::RO => "RO",
            AccessMode::RW => "RW",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Guru-level gating for presentation clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Beginner,
    Expert,
    Guru,
    Invisible,
}

impl Visibility {
    /// Combine two visibilities into the more restrictive one.
    ///
    /// Invisible dominates, then Guru, then Expert, else Beginner.
    pub fn combine(self, other: Visibility) -> Visibility {
        self.max(other)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Beginner => "Beginner",
            Visibility::Expert => "Expert",
            Visibility::Guru => "Guru",
            Visibility::Invisible => "Invisible",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// CachingMode
// ============================================================================

/// When the value cache is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachingMode {
    /// Never cache.
    NoCache,
    /// Cache is updated on write and refreshed on read.
    WriteThrough,
    /// Writes bypass the cache (entry is dropped); reads refresh it.
    WriteAround,
}

impl CachingMode {
    pub fn caches_on_read(self) -> bool {
        matches!(self, CachingMode::WriteThrough | CachingMode::WriteAround)
    }

    pub fn caches_on_write(self) -> bool {
        self == CachingMode::WriteThrough
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// Feature name namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Namespace {
    Custom,
    Standard,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use AccessMode::*;

    #[test]
    fn test_combine_ni_dominates() {
        for m in [NI, NA, WO, RO, RW] {
            assert_eq!(NI.combine(m), NI);
            assert_eq!(m.combine(NI), NI);
        }
    }

    #[test]
    fn test_combine_na_dominates_non_ni() {
        for m in [NA, WO, RO, RW] {
            assert_eq!(NA.combine(m), NA);
            assert_eq!(m.combine(NA), NA);
        }
    }

    #[test]
    fn test_combine_ro_wo_cancel() {
        assert_eq!(RO.combine(WO), NA);
        assert_eq!(WO.combine(RO), NA);
    }

    #[test]
    fn test_combine_restriction() {
        assert_eq!(RW.combine(RO), RO);
        assert_eq!(RW.combine(WO), WO);
        assert_eq!(RW.combine(RW), RW);
        assert_eq!(RO.combine(RO), RO);
        assert_eq!(WO.combine(WO), WO);
    }

    #[test]
    fn test_combine_is_commutative() {
        let all = [NI, NA, WO, RO, RW];
        for a in all {
            for b in all {
                assert_eq!(a.combine(b), b.combine(a), "combine({a}, {b})");
            }
        }
    }

    #[test]
    fn test_readability() {
        assert!(RO.is_readable());
        assert!(RW.is_readable());
        assert!(!WO.is_readable());
        assert!(!NA.is_readable());
        assert!(WO.is_writable());
        assert!(RW.is_writable());
        assert!(!RO.is_writable());
    }

    #[test]
    fn test_visibility_combine() {
        assert_eq!(Visibility::Beginner.combine(Visibility::Guru), Visibility::Guru);
        assert_eq!(Visibility::Expert.combine(Visibility::Beginner), Visibility::Expert);
        assert_eq!(Visibility::Invisible.combine(Visibility::Beginner), Visibility::Invisible);
    }

    #[test]
    fn test_caching_mode() {
        assert!(CachingMode::WriteThrough.caches_on_write());
        assert!(!CachingMode::WriteAround.caches_on_write());
        assert!(CachingMode::WriteAround.caches_on_read());
        assert!(!CachingMode::NoCache.caches_on_read());
    }
}
