// SPDX-License-Identifier: MIT OR Apache-2.0
//! mm-glob
#![deny(unsafe_code)]
//!
//! Focused glob compilation and include/exclude matching utilities, reused
//! by the ingest server's host/path pre-filters (§4.4) and by `mm-config`'s
//! `ignored_hosts`/`ignored_paths` validation.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Result of evaluating a candidate against include/exclude glob rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Candidate passes both include and exclude filters.
    Allowed,
    /// Candidate matched an exclude pattern.
    DeniedByExclude,
    /// Candidate did not match any include pattern (when includes are specified).
    DeniedByMissingInclude,
}

impl MatchDecision {
    /// Returns `true` only for [`MatchDecision::Allowed`].
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Compiled include/exclude glob pair for string/path filtering.
///
/// Exclude patterns take precedence: a candidate matching an exclude glob is
/// denied even if it also matches an include glob. Empty pattern lists are
/// treated as "no constraint" (all candidates pass).
#[derive(Debug, Clone)]
pub struct IncludeExcludeGlobs {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl IncludeExcludeGlobs {
    /// Compiles include and exclude pattern lists into a reusable matcher.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// Evaluates a [`Path`] against the compiled glob rules.
    pub fn decide_path(&self, candidate: &Path) -> MatchDecision {
        if self
            .exclude
            .as_ref()
            .is_some_and(|set| set.is_match(candidate))
        {
            return MatchDecision::DeniedByExclude;
        }
        if self
            .include
            .as_ref()
            .is_some_and(|set| !set.is_match(candidate))
        {
            return MatchDecision::DeniedByMissingInclude;
        }
        MatchDecision::Allowed
    }

    /// Convenience wrapper around [`decide_path`](Self::decide_path) for string slices.
    pub fn decide_str(&self, candidate: &str) -> MatchDecision {
        self.decide_path(Path::new(candidate))
    }
}

/// Compiles a list of glob patterns into a [`GlobSet`], returning `None` for empty input.
pub fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut b = GlobSetBuilder::new();
    for p in patterns {
        b.add(Glob::new(p).with_context(|| format!("invalid glob: {p}"))?);
    }
    Ok(Some(b.build()?))
}

/// A compiled deny-list: a candidate matches if it matches *any* pattern.
///
/// Used directly by `mm-rules` for the §4.4 pre-filter checks
/// (`ignored_hosts`, `ignored_paths`), which have no include side — a
/// simpler shape than [`IncludeExcludeGlobs`].
#[derive(Debug, Clone)]
pub struct DenyList {
    set: Option<GlobSet>,
}

impl DenyList {
    /// Compiles a deny-list from glob patterns (fnmatch-style, e.g. `prometheus.*`).
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            set: build_globset(patterns)?,
        })
    }

    /// True if `candidate` matches any pattern in the deny-list.
    pub fn matches(&self, candidate: &str) -> bool {
        self.set
            .as_ref()
            .is_some_and(|set| set.is_match(candidate))
    }
}
