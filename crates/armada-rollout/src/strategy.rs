//! Deployment strategies and wave partitioning.

use armada_types::InstanceId;

/// How a configuration version is rolled out across its targets.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployStrategy {
    /// Every target in a single wave.
    AllAtOnce,
    /// Fixed-size waves with a pause between them. Default.
    Rolling(RollingConfig),
    /// A small first wave, then growing increments.
    Canary(CanaryConfig),
}

impl Default for DeployStrategy {
    fn default() -> Self {
        Self::Rolling(RollingConfig::default())
    }
}

/// Configuration for rolling deployments.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RollingConfig {
    /// Number of instances per wave.
    pub wave_size: u32,
    /// Seconds to pause between waves.
    pub pause_secs: u64,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            wave_size: 1,
            pause_secs: 10,
        }
    }
}

/// Configuration for canary deployments.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CanaryConfig {
    /// Percentage of targets in the first wave (1-100).
    pub initial_percent: u32,
    /// Percentage of targets added per subsequent wave.
    pub increment_percent: u32,
    /// Seconds to observe between waves.
    pub interval_secs: u64,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            initial_percent: 10,
            increment_percent: 30,
            interval_secs: 60,
        }
    }
}

impl DeployStrategy {
    /// Seconds to pause between consecutive waves.
    pub fn pause_secs(&self) -> u64 {
        match self {
            DeployStrategy::AllAtOnce => 0,
            DeployStrategy::Rolling(cfg) => cfg.pause_secs,
            DeployStrategy::Canary(cfg) => cfg.interval_secs,
        }
    }
}

/// Partition targets into ordered waves.
///
/// Targets keep their listed order; every target appears in exactly one
/// wave. A zero wave size or percentage is treated as 1 to guarantee
/// progress.
pub fn partition(strategy: &DeployStrategy, targets: &[InstanceId]) -> Vec<Vec<InstanceId>> {
    if targets.is_empty() {
        return Vec::new();
    }

    match strategy {
        DeployStrategy::AllAtOnce => vec![targets.to_vec()],

        DeployStrategy::Rolling(cfg) => {
            let size = cfg.wave_size.max(1) as usize;
            targets.chunks(size).map(|c| c.to_vec()).collect()
        }

        DeployStrategy::Canary(cfg) => {
            let total = targets.len();
            let first = percent_of(total, cfg.initial_percent);
            let step = percent_of(total, cfg.increment_percent);

            let mut waves = Vec::new();
            let mut taken = 0;
            while taken < total {
                let size = if taken == 0 { first } else { step };
                let end = (taken + size).min(total);
                waves.push(targets[taken..end].to_vec());
                taken = end;
            }
            waves
        }
    }
}

/// Ceiling percentage of a count, at least 1.
fn percent_of(total: usize, percent: u32) -> usize {
    let raw = (total * percent as usize).div_ceil(100);
    raw.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(n: usize) -> Vec<InstanceId> {
        (1..=n).map(|i| format!("i{i}")).collect()
    }

    #[test]
    fn all_at_once_single_wave() {
        let waves = partition(&DeployStrategy::AllAtOnce, &targets(5));
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 5);
    }

    #[test]
    fn rolling_one_by_one_keeps_order() {
        let strategy = DeployStrategy::Rolling(RollingConfig {
            wave_size: 1,
            pause_secs: 0,
        });
        let waves = partition(&strategy, &targets(3));
        assert_eq!(
            waves,
            vec![
                vec!["i1".to_string()],
                vec!["i2".to_string()],
                vec!["i3".to_string()],
            ]
        );
    }

    #[test]
    fn rolling_uneven_last_wave() {
        let strategy = DeployStrategy::Rolling(RollingConfig {
            wave_size: 2,
            pause_secs: 0,
        });
        let waves = partition(&strategy, &targets(5));
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[2].len(), 1);
    }

    #[test]
    fn rolling_zero_wave_size_still_progresses() {
        let strategy = DeployStrategy::Rolling(RollingConfig {
            wave_size: 0,
            pause_secs: 0,
        });
        let waves = partition(&strategy, &targets(2));
        assert_eq!(waves.len(), 2);
    }

    #[test]
    fn canary_grows_and_covers_all_exactly_once() {
        let strategy = DeployStrategy::Canary(CanaryConfig {
            initial_percent: 10,
            increment_percent: 30,
            interval_secs: 0,
        });
        let waves = partition(&strategy, &targets(10));

        // 1, then 3 per wave: 1 + 3 + 3 + 3 = 10.
        let sizes: Vec<usize> = waves.iter().map(|w| w.len()).collect();
        assert_eq!(sizes, vec![1, 3, 3, 3]);

        let mut all: Vec<&String> = waves.iter().flatten().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn canary_small_fleet_gets_minimum_one() {
        let strategy = DeployStrategy::Canary(CanaryConfig {
            initial_percent: 10,
            increment_percent: 30,
            interval_secs: 0,
        });
        let waves = partition(&strategy, &targets(2));
        assert_eq!(waves[0].len(), 1);
        assert_eq!(waves.iter().flatten().count(), 2);
    }

    #[test]
    fn empty_targets_no_waves() {
        assert!(partition(&DeployStrategy::AllAtOnce, &[]).is_empty());
    }

    #[test]
    fn serializes_roundtrip() {
        let strategy = DeployStrategy::Canary(CanaryConfig {
            initial_percent: 20,
            ..Default::default()
        });
        let json = serde_json::to_string(&strategy).unwrap();
        let back: DeployStrategy = serde_json::from_str(&json).unwrap();
        match back {
            DeployStrategy::Canary(cfg) => assert_eq!(cfg.initial_percent, 20),
            _ => panic!("expected Canary"),
        }
    }
}
