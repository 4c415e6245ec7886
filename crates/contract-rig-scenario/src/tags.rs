// crates/contract-rig-scenario/src/tags.rs
// ============================================================================
// Module: Tag Vocabulary
// Description: Scenario selection and per-scenario markers.
// Purpose: Interpret the tags scenario authors use to steer a run.
// Dependencies: contract-rig-config
// ============================================================================

//! ## Overview
//! - `@wip` scenarios are skipped unless work-in-progress is included.
//! - `@backend-<target>` selects the target a scenario runs against.
//! - `@clean` requests a data reset before the scenario.
//! - `@creates-user` marks scenarios that create users, for bookkeeping.

use contract_rig_config::ScenarioConfig;

/// Work-in-progress marker.
pub const WIP_TAG: &str = "wip";
/// Reset-before-scenario marker.
pub const CLEAN_TAG: &str = "clean";
/// User-creating marker.
pub const CREATES_USER_TAG: &str = "creates-user";
/// Prefix of target-selecting tags.
pub const BACKEND_TAG_PREFIX: &str = "backend-";

/// Decides which scenarios run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    /// When non-empty, a scenario needs at least one of these.
    pub include: Vec<String>,
    /// A scenario carrying any of these is skipped.
    pub exclude: Vec<String>,
    /// Run `@wip` scenarios too.
    pub include_wip: bool,
}

impl TagFilter {
    /// Builds the filter from scenario configuration.
    #[must_use]
    pub fn from_config(config: &ScenarioConfig) -> Self {
        Self {
            include: config.include_tags.iter().map(|tag| normalize(tag)).collect(),
            exclude: config.exclude_tags.iter().map(|tag| normalize(tag)).collect(),
            include_wip: config.include_wip,
        }
    }

    /// Adds a comma-separated expression such as `smoke,~slow`; `~` or `!`
    /// marks an exclusion.
    pub fn extend_from_expression(&mut self, expression: &str) {
        for term in expression.split(',').map(str::trim).filter(|term| !term.is_empty()) {
            if let Some(excluded) = term.strip_prefix('~').or_else(|| term.strip_prefix('!')) {
                self.exclude.push(normalize(excluded));
            } else {
                self.include.push(normalize(term));
            }
        }
    }

    /// Returns true when a scenario carrying `tags` should run.
    #[must_use]
    pub fn selects(&self, tags: &[String]) -> bool {
        let has = |wanted: &String| tags.iter().any(|tag| tag == wanted);
        if !self.include_wip && tags.iter().any(|tag| tag == WIP_TAG) {
            return false;
        }
        if self.exclude.iter().any(has) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(has)
    }
}

/// Lowercases and ensures a leading `@`.
fn normalize(tag: &str) -> String {
    tag.trim().trim_start_matches('@').to_string()
}

/// Target named by the last `@backend-<target>` tag, if any.
#[must_use]
pub fn backend_target(tags: &[String]) -> Option<&str> {
    tags.iter().rev().find_map(|tag| tag.strip_prefix(BACKEND_TAG_PREFIX))
}

/// Returns true when the scenario asks for a data reset first.
#[must_use]
pub fn requires_reset(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag == CLEAN_TAG)
}

/// Returns true when the scenario creates users.
#[must_use]
pub fn creates_user(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag == CREATES_USER_TAG)
}
