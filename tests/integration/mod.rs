//! Integration Tests Module
//!
//! End-to-end tests for the reasoning pipeline with scripted LLM and
//! collector doubles, plus the rule engine and configuration surfaces.

// Shared test doubles
mod support;

// Orchestrator sessions: fallbacks, partial collection, phase failures
mod reasoning_pipeline_test;

// Session runner with history and answer persistence
mod session_test;

// Threshold rules and override files
mod rule_engine_test;

// Config file and environment overrides
mod config_test;
