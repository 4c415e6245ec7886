// crates/contract-rig-scenario/src/lib.rs
// ============================================================================
// Module: Contract Rig Scenario
// Description: Given/When/Then execution against the service under test.
// Purpose: Parse feature files, resolve steps to typed handlers, and evaluate
//          response and store assertions with a small matcher language.
// Dependencies: futures, rand, regex, reqwest, serde_json, time, tracing, uuid
// ============================================================================

//! ## Overview
//! [`load_features`] turns feature files into flat [`Scenario`] values,
//! [`TagFilter`] selects which of them run, and [`ScenarioRunner`] executes
//! each one in a fresh [`ScenarioWorld`] using the handlers registered in a
//! [`StepRegistry`] (see [`default_registry`] for the built-in vocabulary).
//! A failing step ends its scenario only; the runner always returns a
//! [`ScenarioReport`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod feature;
pub mod http;
pub mod matcher;
pub mod placeholder;
pub mod registry;
pub mod runner;
pub mod steps;
pub mod tags;
pub mod world;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use error::StepError;
pub use feature::Feature;
pub use feature::FeatureError;
pub use feature::Scenario;
pub use feature::Step;
pub use feature::StepKeyword;
pub use feature::load_features;
pub use feature::parse_feature;
pub use http::HttpDriver;
pub use http::RequestSpec;
pub use http::ResponseSnapshot;
pub use matcher::Matcher;
pub use matcher::MatcherError;
pub use matcher::WildcardKind;
pub use placeholder::Rendering;
pub use placeholder::Variables;
pub use registry::RegistryError;
pub use registry::StepCall;
pub use registry::StepFuture;
pub use registry::StepHandler;
pub use registry::StepRegistry;
pub use runner::FailureDetail;
pub use runner::ScenarioReport;
pub use runner::ScenarioRunner;
pub use runner::ScenarioStatus;
pub use runner::StepReport;
pub use runner::StepStatus;
pub use steps::default_registry;
pub use tags::TagFilter;
pub use tags::requires_reset;
pub use world::ScenarioWorld;
pub use world::WorldSettings;
