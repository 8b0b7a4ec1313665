//! Threat rule evaluation over an agent's self-reported operational metrics
//! (spec §4.6). Rules are fixed thresholds, not learned — `ymera-knowledge`
//! is where pattern-over-time learning happens, fed from the outcome here.

use serde::{Deserialize, Serialize};
use ymera_types::agent::AgentReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub rule: String,
    pub severity: ThreatSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub action: String,
    pub reason: String,
}

/// Auth failures and large outbound transfers are graded CRITICAL — both
/// are classic breach/exfiltration signals with little legitimate-traffic
/// explanation. Load- and resource-shaped anomalies are graded WARNING,
/// since a burst of legitimate demand looks the same on these counters.
pub fn evaluate(report: &AgentReport) -> Vec<Threat> {
    let mut threats = Vec::new();

    if report.operations_per_minute > 1000.0 {
        threats.push(Threat {
            rule: "operations_per_minute".into(),
            severity: ThreatSeverity::Warning,
            description: format!("operations_per_minute {:.1} exceeds 1000", report.operations_per_minute),
        });
    }
    if report.failed_auth_attempts > 5 {
        threats.push(Threat {
            rule: "failed_auth_attempts".into(),
            severity: ThreatSeverity::Critical,
            description: format!("failed_auth_attempts {} exceeds 5", report.failed_auth_attempts),
        });
    }
    if report.outbound_data_mb > 100.0 {
        threats.push(Threat {
            rule: "outbound_data_mb".into(),
            severity: ThreatSeverity::Critical,
            description: format!("outbound_data_mb {:.1} exceeds 100", report.outbound_data_mb),
        });
    }
    if report.cpu_usage > 90.0 && report.memory_usage > 90.0 {
        threats.push(Threat {
            rule: "resource_exhaustion".into(),
            severity: ThreatSeverity::Warning,
            description: format!(
                "cpu_usage {:.1} and memory_usage {:.1} both exceed 90",
                report.cpu_usage, report.memory_usage
            ),
        });
    }
    if report.api_requests_per_minute > 500.0 {
        threats.push(Threat {
            rule: "api_requests_per_minute".into(),
            severity: ThreatSeverity::Warning,
            description: format!("api_requests_per_minute {:.1} exceeds 500", report.api_requests_per_minute),
        });
    }

    threats
}

pub fn directives_for(threats: &[Threat]) -> Vec<Directive> {
    threats
        .iter()
        .map(|t| match t.severity {
            ThreatSeverity::Critical => Directive {
                action: "isolate".into(),
                reason: t.description.clone(),
            },
            ThreatSeverity::Warning => Directive {
                action: "throttle".into(),
                reason: t.description.clone(),
            },
        })
        .collect()
}

pub fn has_critical(threats: &[Threat]) -> bool {
    threats.iter().any(|t| t.severity == ThreatSeverity::Critical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_report() -> AgentReport {
        AgentReport::default()
    }

    #[test]
    fn a_clean_report_raises_no_threats() {
        assert!(evaluate(&clean_report()).is_empty());
    }

    #[test]
    fn excess_failed_auth_attempts_is_critical_and_directs_isolation() {
        let report = AgentReport {
            failed_auth_attempts: 6,
            ..clean_report()
        };
        let threats = evaluate(&report);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, ThreatSeverity::Critical);
        assert!(has_critical(&threats));
        assert_eq!(directives_for(&threats)[0].action, "isolate");
    }

    #[test]
    fn resource_exhaustion_requires_both_cpu_and_memory_over_the_threshold() {
        let partial = AgentReport {
            cpu_usage: 95.0,
            memory_usage: 50.0,
            ..clean_report()
        };
        assert!(evaluate(&partial).is_empty());

        let both = AgentReport {
            cpu_usage: 95.0,
            memory_usage: 95.0,
            ..clean_report()
        };
        let threats = evaluate(&both);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, ThreatSeverity::Warning);
        assert!(!has_critical(&threats));
    }

    #[test]
    fn multiple_rules_can_fire_at_once() {
        let report = AgentReport {
            operations_per_minute: 2000.0,
            api_requests_per_minute: 600.0,
            outbound_data_mb: 200.0,
            ..clean_report()
        };
        let threats = evaluate(&report);
        assert_eq!(threats.len(), 3);
        assert!(has_critical(&threats));
    }
}
