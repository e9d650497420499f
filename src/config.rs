//! Process mode switches
//!
//! Both switches use presence semantics: any value, including an empty
//! string, turns the switch on.

use quay_bridge_common::{DISABLE_WEBHOOK_ENV, WEBHOOK_ONLY_MODE_ENV};

/// Which halves of the operator this process runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Serve the admission webhook only; start no reconcilers
    pub webhook_only: bool,
    /// Do not serve the admission webhook
    pub webhook_disabled: bool,
}

impl OperatorConfig {
    /// Read the switches from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key).is_some())
    }

    /// Read the switches through an arbitrary presence check
    pub fn from_lookup(is_set: impl Fn(&str) -> bool) -> Self {
        Self {
            webhook_only: is_set(WEBHOOK_ONLY_MODE_ENV),
            webhook_disabled: is_set(DISABLE_WEBHOOK_ENV),
        }
    }

    /// Whether the namespace, build, and integration controllers run
    pub fn runs_controllers(&self) -> bool {
        !self.webhook_only
    }

    /// Whether the admission webhook server runs
    pub fn runs_webhook(&self) -> bool {
        !self.webhook_disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(set: &[&str]) -> OperatorConfig {
        let set: Vec<String> = set.iter().map(|s| s.to_string()).collect();
        OperatorConfig::from_lookup(|key| set.iter().any(|s| s == key))
    }

    #[test]
    fn defaults_run_everything() {
        let cfg = config(&[]);
        assert_eq!(cfg, OperatorConfig::default());
        assert!(cfg.runs_controllers());
        assert!(cfg.runs_webhook());
    }

    #[test]
    fn webhook_only_skips_controllers() {
        let cfg = config(&[WEBHOOK_ONLY_MODE_ENV]);
        assert!(!cfg.runs_controllers());
        assert!(cfg.runs_webhook());
    }

    #[test]
    fn disabled_webhook_keeps_controllers() {
        let cfg = config(&[DISABLE_WEBHOOK_ENV]);
        assert!(cfg.runs_controllers());
        assert!(!cfg.runs_webhook());
    }

    #[test]
    fn both_switches_run_nothing() {
        let cfg = config(&[WEBHOOK_ONLY_MODE_ENV, DISABLE_WEBHOOK_ENV]);
        assert!(!cfg.runs_controllers());
        assert!(!cfg.runs_webhook());
    }
}
