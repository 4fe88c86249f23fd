use serde::Serialize;

/// Where the final concurrency value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencySource {
    /// Passed explicitly by the user.
    Explicit,
    /// Derived from the free capacity of a partition.
    Probed,
    /// Configured default, used when no capacity information was available.
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcurrencyPlan {
    pub free_units: u64,
    pub units_per_task: u64,
    pub raw_recommendation: u64,
    pub safety_factor: f64,
    pub final_concurrency: u32,
    pub source: ConcurrencySource,
}

impl ConcurrencyPlan {
    pub fn explicit(concurrency: u32) -> Self {
        Self {
            free_units: 0,
            units_per_task: 0,
            raw_recommendation: 0,
            safety_factor: 1.0,
            final_concurrency: concurrency.max(1),
            source: ConcurrencySource::Explicit,
        }
    }
}

/// Safety factors accepted by [`plan_concurrency`]: finite and larger than zero.
pub fn is_valid_safety_factor(safety_factor: f64) -> bool {
    safety_factor.is_finite() && safety_factor > 0.0
}

/// Converts free capacity into a concurrency cap.
///
/// With no free capacity, `default_concurrency` is returned unchanged (the safety factor is not
/// applied to it). Otherwise the number of tasks that fit into the free units is scaled by
/// `safety_factor` and floored, never going below one.
pub fn plan_concurrency(
    free_units: u64,
    units_per_task: u64,
    safety_factor: f64,
    default_concurrency: u32,
) -> ConcurrencyPlan {
    if free_units == 0 {
        return ConcurrencyPlan {
            free_units,
            units_per_task,
            raw_recommendation: 0,
            safety_factor,
            final_concurrency: default_concurrency.max(1),
            source: ConcurrencySource::Default,
        };
    }

    let raw = (free_units / units_per_task.max(1)).max(1);
    let scaled = ((raw as f64) * safety_factor).floor();
    let scaled = if scaled < 1.0 {
        1
    } else {
        scaled.min(u32::MAX as f64) as u32
    };

    ConcurrencyPlan {
        free_units,
        units_per_task,
        raw_recommendation: raw,
        safety_factor,
        final_concurrency: scaled,
        source: ConcurrencySource::Probed,
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_concurrency, ConcurrencySource};

    #[test]
    fn test_plan_from_free_units() {
        let plan = plan_concurrency(100, 4, 0.8, 100);
        assert_eq!(plan.raw_recommendation, 25);
        assert_eq!(plan.final_concurrency, 20);
        assert_eq!(plan.source, ConcurrencySource::Probed);
    }

    #[test]
    fn test_plan_without_free_units_keeps_default() {
        let plan = plan_concurrency(0, 4, 0.8, 100);
        assert_eq!(plan.final_concurrency, 100);
        assert_eq!(plan.source, ConcurrencySource::Default);
    }

    #[test]
    fn test_plan_is_at_least_one() {
        assert_eq!(plan_concurrency(1, 64, 0.8, 100).final_concurrency, 1);
        assert_eq!(plan_concurrency(3, 4, 0.1, 100).final_concurrency, 1);
        assert_eq!(plan_concurrency(8, 4, 0.01, 100).final_concurrency, 1);
        assert_eq!(plan_concurrency(0, 4, 0.5, 0).final_concurrency, 1);
    }

    #[test]
    fn test_plan_factor_above_one_is_not_clamped() {
        assert_eq!(plan_concurrency(40, 4, 1.5, 1).final_concurrency, 15);
    }

    #[test]
    fn test_plan_monotonic() {
        for factor in [0.1, 0.5, 0.8, 1.0] {
            for per_task in 1..10 {
                let mut last = 0;
                for free in 1..300 {
                    let value = plan_concurrency(free, per_task, factor, 1).final_concurrency;
                    assert!(value >= 1);
                    assert!(value >= last);
                    last = value;
                }
            }
            for free in [1, 17, 128, 1000] {
                let mut last = u32::MAX;
                for per_task in 1..50 {
                    let value = plan_concurrency(free, per_task, factor, 1).final_concurrency;
                    assert!(value <= last);
                    last = value;
                }
            }
        }
    }
}
