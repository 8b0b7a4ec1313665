//! Health-score EWMA (Open Question 3, resolved in `SPEC_FULL.md`):
//! `health_score' = clamp01(α·signal + (1−α)·health_score)`, `α = 0.3`.
//!
//! `signal` starts from `1 − error_rate` and is further penalized once CPU
//! or memory usage crosses 80%, so a saturated-but-error-free agent still
//! drifts toward a lower score instead of only reacting to failures.

use ymera_types::agent::HeartbeatMetrics;

const ALPHA: f64 = 0.3;
const SATURATION_THRESHOLD: f64 = 0.8;

pub fn signal(metrics: &HeartbeatMetrics) -> f64 {
    let error_component = 1.0 - metrics.error_rate.clamp(0.0, 1.0);
    let cpu_penalty = (metrics.cpu_usage - SATURATION_THRESHOLD).max(0.0) * 0.5;
    let memory_penalty = (metrics.memory_usage - SATURATION_THRESHOLD).max(0.0) * 0.5;
    (error_component - cpu_penalty - memory_penalty).clamp(0.0, 1.0)
}

pub fn ewma_update(previous: f64, metrics: &HeartbeatMetrics) -> f64 {
    let next = ALPHA * signal(metrics) + (1.0 - ALPHA) * previous;
    next.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_metrics_pull_score_toward_one() {
        let metrics = HeartbeatMetrics {
            cpu_usage: 0.1,
            memory_usage: 0.1,
            error_rate: 0.0,
            response_time_ms: 10.0,
        };
        let mut score = 0.5;
        for _ in 0..20 {
            score = ewma_update(score, &metrics);
        }
        assert!(score > 0.95, "score should converge near 1.0, got {score}");
    }

    #[test]
    fn high_error_rate_pulls_score_toward_zero() {
        let metrics = HeartbeatMetrics {
            cpu_usage: 0.1,
            memory_usage: 0.1,
            error_rate: 1.0,
            response_time_ms: 10.0,
        };
        let mut score = 1.0;
        for _ in 0..20 {
            score = ewma_update(score, &metrics);
        }
        assert!(score < 0.05, "score should converge near 0.0, got {score}");
    }

    #[test]
    fn saturated_cpu_penalizes_even_without_errors() {
        let calm = HeartbeatMetrics {
            cpu_usage: 0.3,
            memory_usage: 0.3,
            error_rate: 0.0,
            response_time_ms: 10.0,
        };
        let hot = HeartbeatMetrics {
            cpu_usage: 0.99,
            memory_usage: 0.99,
            error_rate: 0.0,
            response_time_ms: 10.0,
        };
        assert!(signal(&hot) < signal(&calm));
    }

    #[test]
    fn single_update_is_a_weighted_blend() {
        let metrics = HeartbeatMetrics {
            cpu_usage: 0.0,
            memory_usage: 0.0,
            error_rate: 0.0,
            response_time_ms: 0.0,
        };
        let updated = ewma_update(0.5, &metrics);
        assert!((updated - (0.3 * 1.0 + 0.7 * 0.5)).abs() < 1e-9);
    }
}
