//! Engagement stats seeding
//!
//! Networks do not report engagement figures at publish time, so the
//! pipeline seeds each history entry with a placeholder sample. The
//! provider is a trait so a real analytics fetcher can slot in later
//! without touching the sweeper.

use rand::Rng;

use crate::types::EngagementStats;

/// Produces the initial engagement sample attached to a freshly
/// published post.
pub trait StatsProvider: Send + Sync {
    fn seed(&self, now_ms: i64) -> EngagementStats;
}

/// Placeholder figures: random impressions, with comments and likes
/// derived as fixed fractions of them.
pub struct RandomStats;

impl StatsProvider for RandomStats {
    fn seed(&self, now_ms: i64) -> EngagementStats {
        let impressions = rand::thread_rng().gen_range(0..1000);
        EngagementStats {
            date: now_ms,
            impressions,
            comments: impressions / 10,
            likes: impressions / 5,
        }
    }
}

/// Deterministic provider for tests.
pub struct FixedStats {
    pub impressions: i64,
}

impl StatsProvider for FixedStats {
    fn seed(&self, now_ms: i64) -> EngagementStats {
        EngagementStats {
            date: now_ms,
            impressions: self.impressions,
            comments: self.impressions / 10,
            likes: self.impressions / 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_stats_in_range() {
        let provider = RandomStats;
        for _ in 0..50 {
            let stats = provider.seed(1_000);
            assert!(stats.impressions < 1000);
            assert_eq!(stats.comments, stats.impressions / 10);
            assert_eq!(stats.likes, stats.impressions / 5);
            assert_eq!(stats.date, 1_000);
        }
    }

    #[test]
    fn test_fixed_stats() {
        let provider = FixedStats { impressions: 200 };
        let stats = provider.seed(42);
        assert_eq!(stats.impressions, 200);
        assert_eq!(stats.comments, 20);
        assert_eq!(stats.likes, 40);
        assert_eq!(stats.date, 42);
    }
}
