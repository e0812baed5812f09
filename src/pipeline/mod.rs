pub mod import;
pub mod extraction; // Document Normalizer
pub mod attribution; // Attribution Contract Builder
pub mod analysis; // Orchestrator + Compliance Enforcer
