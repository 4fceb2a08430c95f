//! Shared DTOs (schemas-as-code) for the certora-setup workspace.
//!
//! # Design constraints
//! - These types are intended to be serialized to disk (`plan.json`).
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod apply;
pub mod plan;

/// Schema identifiers.
pub mod schema {
    pub const CERTORA_SETUP_PLAN_V1: &str = "certora-setup.plan.v1";
    pub const CERTORA_SETUP_APPLY_V1: &str = "certora-setup.apply.v1";
}
