use bureau_protocol::{CliUsage, StressLevel};

pub const SWEAT_AT: f64 = 0.60;
pub const STRESSED_AT: f64 = 0.80;
pub const COLLAPSED_AT: f64 = 1.00;

/// Pure mapping from a utilization ratio to a visual state.
pub fn stress_level(utilization: f64) -> StressLevel {
    if !utilization.is_finite() || utilization < SWEAT_AT {
        StressLevel::Normal
    } else if utilization < STRESSED_AT {
        StressLevel::Sweat
    } else if utilization < COLLAPSED_AT {
        StressLevel::Stressed
    } else {
        StressLevel::Collapsed
    }
}

pub fn stress_for_provider(usage: &CliUsage, provider: Option<&str>) -> StressLevel {
    provider
        .and_then(|p| usage.peak(p))
        .map(stress_level)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bureau_protocol::UsageWindow;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn thresholds() {
        assert_eq!(stress_level(0.55), StressLevel::Normal);
        assert_eq!(stress_level(0.65), StressLevel::Sweat);
        assert_eq!(stress_level(0.85), StressLevel::Stressed);
        assert_eq!(stress_level(1.0), StressLevel::Collapsed);
        assert_eq!(stress_level(0.6), StressLevel::Sweat);
        assert_eq!(stress_level(0.8), StressLevel::Stressed);
        assert_eq!(stress_level(f64::NAN), StressLevel::Normal);
    }

    #[test]
    fn provider_without_metric_is_normal() {
        let usage = CliUsage(BTreeMap::from([(
            "claude".to_string(),
            vec![UsageWindow {
                label: "5h".into(),
                utilization: 1.2,
            }],
        )]));
        assert_eq!(
            stress_for_provider(&usage, Some("claude")),
            StressLevel::Collapsed
        );
        assert_eq!(stress_for_provider(&usage, Some("gemini")), StressLevel::Normal);
        assert_eq!(stress_for_provider(&usage, None), StressLevel::Normal);
    }

    proptest! {
        #[test]
        fn mapping_is_pure_and_monotonic(a in 0.0f64..2.0, b in 0.0f64..2.0) {
            prop_assert_eq!(stress_level(a), stress_level(a));
            let rank = |s: StressLevel| match s {
                StressLevel::Normal => 0,
                StressLevel::Sweat => 1,
                StressLevel::Stressed => 2,
                StressLevel::Collapsed => 3,
            };
            if a <= b {
                prop_assert!(rank(stress_level(a)) <= rank(stress_level(b)));
            }
        }
    }
}
