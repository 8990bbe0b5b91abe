//! Runtime resolution of native libraries and protocol extensions.
//!
//! A capability is either required (its absence fails initialisation) or
//! optional (its absence is logged and the dependent feature falls back).

use libloading::Library;
use tracing::{debug, warn};

use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// A typed bundle of entry points resolved from one shared library.
pub trait Capability: Sized {
    const NAME: &'static str;
    /// File names tried in order.
    const CANDIDATES: &'static [&'static str];

    /// Resolves every symbol the bundle needs. The library must be moved
    /// into the bundle so the resolved pointers stay valid.
    ///
    /// # Safety
    /// Each symbol must be resolved with its exact C signature.
    unsafe fn resolve(library: Library) -> std::result::Result<Self, libloading::Error>;
}

fn open(candidates: &[&str]) -> std::result::Result<Library, String> {
    let mut reasons = Vec::with_capacity(candidates.len());
    for name in candidates {
        // SAFETY: the candidates are system libraries without load-time side effects.
        match unsafe { Library::new(name) } {
            Ok(library) => return Ok(library),
            Err(err) => reasons.push(err.to_string()),
        }
    }
    Err(reasons.join("; "))
}

/// Loads `C`. A missing optional library yields `Ok(None)`.
pub fn load<C: Capability>(requirement: Requirement) -> Result<Option<C>> {
    let loaded = open(C::CANDIDATES)
        .and_then(|library| unsafe { C::resolve(library) }.map_err(|err| err.to_string()));
    match loaded {
        Ok(bundle) => {
            debug!(library = C::NAME, "capability loaded");
            Ok(Some(bundle))
        }
        Err(reason) => negotiate_failure(C::NAME, requirement, reason).map(|_| None),
    }
}

/// Checks a capability discovered at runtime (an X11 extension, a Wayland
/// global). Returns whether the feature may be used.
pub fn negotiate(name: &'static str, available: bool, requirement: Requirement) -> Result<bool> {
    if available {
        debug!(capability = name, "capability available");
        return Ok(true);
    }
    negotiate_failure(name, requirement, "not offered".to_owned())
}

fn negotiate_failure(name: &'static str, requirement: Requirement, reason: String) -> Result<bool> {
    match requirement {
        Requirement::Required => Err(PlatformError::MissingLibrary {
            library: name.to_owned(),
            reason,
        }),
        Requirement::Optional => {
            warn!(capability = name, %reason, "optional capability unavailable, falling back");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Missing;

    impl Capability for Missing {
        const NAME: &'static str = "libawin-missing";
        const CANDIDATES: &'static [&'static str] = &["libawin-missing.so.0", "libawin-missing.so"];

        unsafe fn resolve(_library: Library) -> std::result::Result<Self, libloading::Error> {
            Ok(Missing)
        }
    }

    #[test]
    fn test_missing_optional_library_degrades() {
        assert!(matches!(load::<Missing>(Requirement::Optional), Ok(None)));
    }

    #[test]
    fn test_missing_required_library_is_fatal() {
        let err = load::<Missing>(Requirement::Required).err();
        assert!(matches!(err, Some(PlatformError::MissingLibrary { .. })));
    }

    #[test]
    fn test_negotiate() {
        assert!(negotiate("RANDR", true, Requirement::Required).unwrap());
        assert!(!negotiate("RANDR", false, Requirement::Optional).unwrap());
        assert!(negotiate("xdg_wm_base", false, Requirement::Required).is_err());
    }
}
