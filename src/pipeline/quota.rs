//! Quota Ledger — static per-agent-kind resource ceilings plus usage
//! validation, and the process-wide dry-run switch.
//!
//! Ceilings are typed per kind instead of a name-matched string map, so a
//! silent key mismatch cannot hide a violation. Validation runs after a
//! stage completes (never gates before) and is pure, so workers call it
//! concurrently without synchronization. Violations are advisory: the
//! orchestrator decides whether they stop the chain.

use serde::{Deserialize, Serialize};

use super::types::AgentKind;

// ═══════════════════════════════════════════
// Limits
// ═══════════════════════════════════════════

/// Ceilings for the extract stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractLimits {
    /// Maximum document pages a single extraction may process.
    pub max_textract_pages: u64,
    pub max_download_bytes: u64,
    pub max_runtime_ms: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_textract_pages: 50,
            max_download_bytes: 10 * 1024 * 1024,
            max_runtime_ms: 120_000,
        }
    }
}

/// Ceilings for a generation stage (curriculum or assessment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationLimits {
    pub max_tokens: u64,
    pub max_runtime_ms: u64,
}

/// The full static limit table, read-only after configuration load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTable {
    pub extract: ExtractLimits,
    pub curriculum: GenerationLimits,
    pub assessment: GenerationLimits,
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self {
            extract: ExtractLimits::default(),
            curriculum: GenerationLimits {
                max_tokens: 8_000,
                max_runtime_ms: 300_000,
            },
            assessment: GenerationLimits {
                max_tokens: 4_000,
                max_runtime_ms: 180_000,
            },
        }
    }
}

// ═══════════════════════════════════════════
// Usage & Validation
// ═══════════════════════════════════════════

/// Resources actually consumed during one job's execution. Dry runs
/// never touch this; their usage stays all-zero by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub pages: u64,
    pub tokens: u64,
    pub download_bytes: u64,
    pub runtime_ms: u64,
}

impl UsageSample {
    pub fn is_zero(&self) -> bool {
        self.pages == 0 && self.tokens == 0 && self.download_bytes == 0 && self.runtime_ms == 0
    }
}

/// Result of comparing observed usage against a kind's ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub within_limits: bool,
    pub violations: Vec<String>,
}

fn check_ceiling(key: &str, observed: u64, limit: u64, violations: &mut Vec<String>) {
    if observed > limit {
        violations.push(format!("{key}: {observed} exceeds limit {limit}"));
    }
}

// ═══════════════════════════════════════════
// Ledger
// ═══════════════════════════════════════════

/// Static limit table plus the process-wide dry-run flag. Constructed
/// once at startup and shared across workers; immutable afterward.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    limits: QuotaTable,
    dry_run: bool,
}

impl QuotaLedger {
    pub fn new(limits: QuotaTable, dry_run: bool) -> Self {
        Self { limits, dry_run }
    }

    /// Whether every stage must route through the dry-run simulator.
    /// Fixed for the lifetime of the process.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn limits(&self) -> &QuotaTable {
        &self.limits
    }

    /// The named ceilings checked for a given kind, for observability.
    pub fn ceilings_for(&self, kind: AgentKind) -> Vec<(&'static str, u64)> {
        match kind {
            AgentKind::Extract => vec![
                ("max_textract_pages", self.limits.extract.max_textract_pages),
                ("max_download_bytes", self.limits.extract.max_download_bytes),
                ("max_runtime_ms", self.limits.extract.max_runtime_ms),
            ],
            AgentKind::Curriculum => vec![
                ("max_tokens", self.limits.curriculum.max_tokens),
                ("max_runtime_ms", self.limits.curriculum.max_runtime_ms),
            ],
            AgentKind::Assessment => vec![
                ("max_tokens", self.limits.assessment.max_tokens),
                ("max_runtime_ms", self.limits.assessment.max_runtime_ms),
            ],
        }
    }

    /// Compare observed usage against the kind's ceilings. Pure and
    /// side-effect-free. Usage fields with no ceiling for the kind are
    /// ignored; a ceiling with zero observed usage never violates.
    pub fn validate(&self, kind: AgentKind, usage: &UsageSample) -> ValidationReport {
        let mut violations = Vec::new();

        match kind {
            AgentKind::Extract => {
                let l = &self.limits.extract;
                check_ceiling("pages", usage.pages, l.max_textract_pages, &mut violations);
                check_ceiling(
                    "download_bytes",
                    usage.download_bytes,
                    l.max_download_bytes,
                    &mut violations,
                );
                check_ceiling("runtime_ms", usage.runtime_ms, l.max_runtime_ms, &mut violations);
            }
            AgentKind::Curriculum => {
                let l = &self.limits.curriculum;
                check_ceiling("tokens", usage.tokens, l.max_tokens, &mut violations);
                check_ceiling("runtime_ms", usage.runtime_ms, l.max_runtime_ms, &mut violations);
            }
            AgentKind::Assessment => {
                let l = &self.limits.assessment;
                check_ceiling("tokens", usage.tokens, l.max_tokens, &mut violations);
                check_ceiling("runtime_ms", usage.runtime_ms, l.max_runtime_ms, &mut violations);
            }
        }

        ValidationReport {
            within_limits: violations.is_empty(),
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> QuotaLedger {
        QuotaLedger::new(QuotaTable::default(), false)
    }

    #[test]
    fn zero_usage_is_within_limits() {
        let report = ledger().validate(AgentKind::Extract, &UsageSample::default());
        assert!(report.within_limits);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn pages_over_limit_reports_violation() {
        let usage = UsageSample { pages: 60, ..Default::default() };
        let report = ledger().validate(AgentKind::Extract, &usage);
        assert!(!report.within_limits);
        assert_eq!(report.violations, vec!["pages: 60 exceeds limit 50".to_string()]);
    }

    #[test]
    fn usage_at_limit_is_not_a_violation() {
        let usage = UsageSample { pages: 50, ..Default::default() };
        let report = ledger().validate(AgentKind::Extract, &usage);
        assert!(report.within_limits);
    }

    #[test]
    fn unrelated_usage_key_never_triggers_violation() {
        // Tokens have no ceiling on the extract kind.
        let usage = UsageSample { tokens: 1_000_000, ..Default::default() };
        let report = ledger().validate(AgentKind::Extract, &usage);
        assert!(report.within_limits, "no cross-key coupling allowed");
    }

    #[test]
    fn multiple_violations_all_reported() {
        let usage = UsageSample {
            pages: 51,
            download_bytes: 11 * 1024 * 1024,
            runtime_ms: 130_000,
            ..Default::default()
        };
        let report = ledger().validate(AgentKind::Extract, &usage);
        assert_eq!(report.violations.len(), 3);
    }

    #[test]
    fn generation_kinds_check_tokens() {
        let usage = UsageSample { tokens: 9_000, ..Default::default() };
        let report = ledger().validate(AgentKind::Curriculum, &usage);
        assert_eq!(report.violations, vec!["tokens: 9000 exceeds limit 8000".to_string()]);

        let report = ledger().validate(AgentKind::Assessment, &usage);
        assert_eq!(report.violations, vec!["tokens: 9000 exceeds limit 4000".to_string()]);
    }

    #[test]
    fn validate_is_deterministic() {
        let usage = UsageSample { pages: 60, runtime_ms: 150_000, ..Default::default() };
        let first = ledger().validate(AgentKind::Extract, &usage);
        let second = ledger().validate(AgentKind::Extract, &usage);
        assert_eq!(first, second);
    }

    #[test]
    fn dry_run_flag_is_fixed_at_construction() {
        assert!(!QuotaLedger::new(QuotaTable::default(), false).is_dry_run());
        assert!(QuotaLedger::new(QuotaTable::default(), true).is_dry_run());
    }

    #[test]
    fn ceilings_for_names_every_checked_key() {
        let ledger = ledger();
        assert_eq!(ledger.ceilings_for(AgentKind::Extract).len(), 3);
        assert_eq!(ledger.ceilings_for(AgentKind::Curriculum).len(), 2);
        assert_eq!(ledger.ceilings_for(AgentKind::Assessment).len(), 2);
    }

    #[test]
    fn usage_sample_is_zero() {
        assert!(UsageSample::default().is_zero());
        assert!(!UsageSample { pages: 1, ..Default::default() }.is_zero());
    }
}
