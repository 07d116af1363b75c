//! Semantic version parsing and the upgrade gate
//!
//! Recorded versions come from humans and from older releases, so parsing is
//! lenient: a leading `v` is accepted and missing minor/patch components are
//! filled with zero (`v1.2` parses as `1.2.0`). Comparison uses semver
//! precedence, so build metadata never affects ordering.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::error::{CoreError, Result};

/// Oldest recorded version that can be upgraded in place.
///
/// Installations older than this carry no migration guarantee and must be
/// uninstalled and installed again.
pub const MINIMUM_UPGRADABLE_VERSION: Version = Version::new(1, 0, 0);

/// Parse a version string leniently
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if stripped.is_empty() {
        return Err(CoreError::UnparsableVersion {
            input: input.to_string(),
            reason: "empty version string".to_string(),
        });
    }

    // Split "1.2-rc.1+build" into the numeric core and its suffix
    let split_at = stripped.find(['-', '+']).unwrap_or(stripped.len());
    let (core, suffix) = stripped.split_at(split_at);

    let components = core.split('.').count();
    let padded = match components {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => stripped.to_string(),
    };

    Version::parse(&padded).map_err(|e| CoreError::UnparsableVersion {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Compare two versions by semver precedence (build metadata ignored)
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Direction of a permitted version change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateDecision {
    /// Target is newer than or equal to the current version
    Upgrade,
    /// Target is older than the current version; callers must warn
    Downgrade,
}

impl GateDecision {
    pub fn is_downgrade(&self) -> bool {
        matches!(self, Self::Downgrade)
    }

    /// Verb used in operator-facing messages
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Downgrade => "DOWNGRADE",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgrade => write!(f, "upgrade"),
            Self::Downgrade => write!(f, "downgrade"),
        }
    }
}

/// Pre-flight check deciding whether a version change is permitted
#[derive(Debug, Clone)]
pub struct VersionGate {
    minimum: Version,
}

impl VersionGate {
    /// Gate with the default minimum upgradable version
    pub fn new() -> Self {
        Self {
            minimum: MINIMUM_UPGRADABLE_VERSION,
        }
    }

    /// Gate with a custom minimum upgradable version
    pub fn with_minimum(minimum: Version) -> Self {
        Self { minimum }
    }

    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    /// Decide the direction of a change from `current` to `target`
    ///
    /// Equal versions are classified as an upgrade: resources can drift
    /// without a version change, so the run still proceeds.
    pub fn check(&self, current: &Version, target: &Version) -> Result<GateDecision> {
        if cmp_precedence(current, &self.minimum) == Ordering::Less {
            return Err(CoreError::IncompatibleSourceVersion {
                current: current.to_string(),
                minimum: self.minimum.to_string(),
            });
        }

        match cmp_precedence(current, target) {
            Ordering::Greater => Ok(GateDecision::Downgrade),
            Ordering::Less | Ordering::Equal => Ok(GateDecision::Upgrade),
        }
    }

    /// Parse both versions, then [`check`](Self::check) them
    pub fn check_str(&self, current: &str, target: &str) -> Result<GateDecision> {
        let current = parse_version(current)?;
        let target = parse_version(target)?;
        self.check(&current, &target)
    }
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    const PRE_STABLE: &[&str] = &["0.0.1", "0.1.0", "0.9.0", "0.99.99", "1.0.0-rc.1", "1.0.0-alpha"];
    const STABLE: &[&str] = &["1.0.0", "1.0.1", "1.2.0", "1.3.0", "1.3.0-beta.2", "2.0.0", "10.4.7"];

    #[test]
    fn test_parse_lenient_forms() {
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("V2"), Version::new(2, 0, 0));
        assert_eq!(v("  1.3.0 "), Version::new(1, 3, 0));
        assert_eq!(v("v1.2-rc.1").to_string(), "1.2.0-rc.1");
        assert_eq!(v("1.2.3+abc").to_string(), "1.2.3+abc");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "v", "latest", "1.x.0", "1.2.3.4", "-1.0.0"] {
            let err = parse_version(input).unwrap_err();
            assert!(
                matches!(err, CoreError::UnparsableVersion { .. }),
                "expected UnparsableVersion for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_pre_stable_sources_are_incompatible() {
        let gate = VersionGate::new();
        for a in PRE_STABLE {
            for b in STABLE {
                let err = gate.check(&v(a), &v(b)).unwrap_err();
                assert!(
                    matches!(err, CoreError::IncompatibleSourceVersion { .. }),
                    "{} -> {} should be incompatible",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_forward_or_equal_is_upgrade() {
        let gate = VersionGate::new();
        for a in STABLE {
            for b in STABLE {
                let (a, b) = (v(a), v(b));
                if cmp_precedence(&a, &b) != Ordering::Greater && a >= MINIMUM_UPGRADABLE_VERSION {
                    assert_eq!(gate.check(&a, &b).unwrap(), GateDecision::Upgrade, "{} -> {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_backward_is_downgrade() {
        let gate = VersionGate::new();
        assert_eq!(gate.check(&v("1.3.0"), &v("1.2.0")).unwrap(), GateDecision::Downgrade);
        assert_eq!(gate.check(&v("2.0.0"), &v("1.0.0")).unwrap(), GateDecision::Downgrade);
        assert_eq!(gate.check(&v("1.3.0"), &v("1.3.0-beta.2")).unwrap(), GateDecision::Downgrade);
    }

    #[test]
    fn test_equal_versions_proceed_as_upgrade() {
        let gate = VersionGate::new();
        assert_eq!(gate.check(&v("1.2.0"), &v("1.2.0")).unwrap(), GateDecision::Upgrade);
        // Build metadata does not take part in precedence
        assert_eq!(gate.check(&v("1.2.0+a"), &v("1.2.0+b")).unwrap(), GateDecision::Upgrade);
    }

    #[test]
    fn test_check_str_reports_which_input_failed() {
        let gate = VersionGate::new();
        match gate.check_str("1.2.0", "nightly").unwrap_err() {
            CoreError::UnparsableVersion { input, .. } => assert_eq!(input, "nightly"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gate.check_str("v1.2", "1.3.0").unwrap(), GateDecision::Upgrade);
    }

    #[test]
    fn test_custom_minimum() {
        let gate = VersionGate::with_minimum(Version::new(1, 2, 0));
        assert!(gate.check(&v("1.1.9"), &v("1.3.0")).is_err());
        assert!(gate.check(&v("1.2.0"), &v("1.3.0")).is_ok());
    }

    #[test]
    fn test_decision_verb() {
        assert_eq!(GateDecision::Upgrade.verb(), "upgrade");
        assert_eq!(GateDecision::Downgrade.verb(), "DOWNGRADE");
        assert!(GateDecision::Downgrade.is_downgrade());
    }
}
