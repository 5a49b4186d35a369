// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Ingest pre-filters (mockmesh C4): host/path glob rejection and
//! per-endpoint sampling, applied in order before an event reaches the
//! processor (§4.4).

use mm_glob::DenyList;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a captured event was dropped before reaching the processor.
///
/// Every variant is counted by the ingest server; dropping never happens
/// silently (§4.4 "Dropped events are counted by reason; no other side
/// effect.").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Host matched an entry in `ignored_hosts`.
    IgnoredHost,
    /// Path matched an entry in `ignored_paths`.
    IgnoredPath,
    /// The per-endpoint sample draw rejected the event.
    Sampled,
}

/// Outcome of running the C4 pre-filter chain against one captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// The event should be enqueued to the processor.
    Admit,
    /// The event should be dropped, for the given reason.
    Drop(DropReason),
}

/// One `{path_regex, sample_rate, method?}` sampling rule (spec §6
/// `sampling_rules`). Rules are evaluated in configured order; the first
/// whose `path_regex` matches (and whose `method`, if set, matches
/// case-insensitively) wins.
#[derive(Debug, Clone)]
pub struct SamplingRule {
    path_regex: Regex,
    sample_rate: f64,
    method: Option<String>,
}

impl SamplingRule {
    /// Builds a sampling rule. `sample_rate` is clamped into `[0, 1]` rather
    /// than rejected, matching §8's boundary requirement that `0` and `1`
    /// are valid, well-defined endpoints.
    pub fn new(path_regex: &str, sample_rate: f64, method: Option<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            path_regex: Regex::new(path_regex)?,
            sample_rate: sample_rate.clamp(0.0, 1.0),
            method: method.map(|m| m.to_ascii_uppercase()),
        })
    }

    fn matches(&self, path: &str, method: &str) -> bool {
        self.path_regex.is_match(path) && self.method.as_deref().is_none_or(|m| m == method.to_ascii_uppercase())
    }
}

/// Ordered set of [`SamplingRule`]s plus the fallback `default_sample_rate`.
#[derive(Debug, Clone)]
pub struct SamplingRules {
    rules: Vec<SamplingRule>,
    default_sample_rate: f64,
}

impl SamplingRules {
    /// Builds a rule set from an ordered rule list and the configured default rate.
    pub fn new(rules: Vec<SamplingRule>, default_sample_rate: f64) -> Self {
        Self {
            rules,
            default_sample_rate: default_sample_rate.clamp(0.0, 1.0),
        }
    }

    /// Returns the sample rate that applies to `(path, method)`: the first
    /// matching rule's rate, or the configured default.
    pub fn sample_rate(&self, path: &str, method: &str) -> f64 {
        self.rules
            .iter()
            .find(|r| r.matches(path, method))
            .map_or(self.default_sample_rate, |r| r.sample_rate)
    }
}

/// Running counts of dropped events, keyed by reason, updated without ever
/// holding a lock across an I/O call (§5 resource rule).
#[derive(Debug, Default)]
pub struct DropCounters {
    ignored_host: AtomicU64,
    ignored_path: AtomicU64,
    sampled: AtomicU64,
}

impl DropCounters {
    /// Increments the counter for `reason`.
    pub fn record(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::IgnoredHost => &self.ignored_host,
            DropReason::IgnoredPath => &self.ignored_path,
            DropReason::Sampled => &self.sampled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the current counts.
    pub fn snapshot(&self) -> DropCountersSnapshot {
        DropCountersSnapshot {
            ignored_host: self.ignored_host.load(Ordering::Relaxed),
            ignored_path: self.ignored_path.load(Ordering::Relaxed),
            sampled: self.sampled.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`DropCounters`], safe to serialize for `GET /stats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DropCountersSnapshot {
    /// Events dropped for matching `ignored_hosts`.
    pub ignored_host: u64,
    /// Events dropped for matching `ignored_paths`.
    pub ignored_path: u64,
    /// Events dropped by the sampling draw.
    pub sampled: u64,
}

/// The full C4 pre-filter chain: host glob, path glob, then sampling,
/// evaluated in that order (§4.4).
pub struct PreFilters {
    ignored_hosts: DenyList,
    ignored_paths: DenyList,
    sampling: SamplingRules,
    counters: DropCounters,
}

impl PreFilters {
    /// Builds the pre-filter chain from compiled glob deny-lists and a
    /// sampling rule set.
    pub fn new(ignored_hosts: DenyList, ignored_paths: DenyList, sampling: SamplingRules) -> Self {
        Self {
            ignored_hosts,
            ignored_paths,
            sampling,
            counters: DropCounters::default(),
        }
    }

    /// Evaluates the chain against one captured event, drawing a uniform
    /// random sample via `rng` only if neither glob filter already rejected it.
    ///
    /// Every drop is recorded in [`Self::counters`] before returning.
    pub fn decide(&self, host: &str, path: &str, method: &str, rng: &mut impl Rng) -> FilterDecision {
        if self.ignored_hosts.matches(host) {
            self.counters.record(DropReason::IgnoredHost);
            return FilterDecision::Drop(DropReason::IgnoredHost);
        }
        if self.ignored_paths.matches(path) {
            self.counters.record(DropReason::IgnoredPath);
            return FilterDecision::Drop(DropReason::IgnoredPath);
        }
        let rate = self.sampling.sample_rate(path, method);
        // Boundary cases (§8): rate 0 drops everything, rate 1 drops nothing,
        // without relying on the RNG to land exactly on an edge value.
        if rate <= 0.0 || (rate < 1.0 && rng.gen::<f64>() > rate) {
            self.counters.record(DropReason::Sampled);
            return FilterDecision::Drop(DropReason::Sampled);
        }
        FilterDecision::Admit
    }

    /// Snapshot of drop counts so far.
    pub fn stats(&self) -> DropCountersSnapshot {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_glob::DenyList;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;

    fn filters(sampling: SamplingRules) -> PreFilters {
        PreFilters::new(
            DenyList::new(&["prometheus.*".to_string()]).unwrap(),
            DenyList::new(&["/health".to_string(), "/.well-known/*".to_string()]).unwrap(),
            sampling,
        )
    }

    #[test]
    fn ignored_host_is_dropped_before_sampling_runs() {
        let f = filters(SamplingRules::new(vec![], 1.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(
            f.decide("prometheus.internal", "/anything", "GET", &mut rng),
            FilterDecision::Drop(DropReason::IgnoredHost)
        );
        assert_eq!(f.stats().ignored_host, 1);
    }

    #[test]
    fn ignored_path_is_dropped() {
        let f = filters(SamplingRules::new(vec![], 1.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(
            f.decide("api.example.com", "/health", "GET", &mut rng),
            FilterDecision::Drop(DropReason::IgnoredPath)
        );
    }

    #[test]
    fn sample_rate_zero_drops_everything() {
        let f = filters(SamplingRules::new(vec![], 0.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(
                f.decide("api.example.com", "/x", "GET", &mut rng),
                FilterDecision::Drop(DropReason::Sampled)
            );
        }
    }

    #[test]
    fn sample_rate_one_drops_nothing() {
        let f = filters(SamplingRules::new(vec![], 1.0));
        // StepRng always returns the same value; with rate 1.0 the draw must
        // never even be consulted.
        let mut rng = StepRng::new(u64::MAX, 0);
        assert_eq!(f.decide("api.example.com", "/x", "GET", &mut rng), FilterDecision::Admit);
    }

    #[test]
    fn first_matching_rule_wins_over_default() {
        let rule = SamplingRule::new(r"^/api/v1/users", 0.0, Some("GET".to_string())).unwrap();
        let sampling = SamplingRules::new(vec![rule], 1.0);
        assert_eq!(sampling.sample_rate("/api/v1/users", "GET"), 0.0);
        assert_eq!(sampling.sample_rate("/api/v1/users", "POST"), 1.0);
        assert_eq!(sampling.sample_rate("/other", "GET"), 1.0);
    }
}
