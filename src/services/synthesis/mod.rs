//! Synthesis Module
//!
//! Per-instance test synthesis: oracle session, prompt catalogue, candidate
//! generation, the fix loop, the validation gate, and the phase orchestrator
//! that ties them together.

pub mod fix_loop;
pub mod generation;
pub mod instance;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod validation;

pub use fix_loop::{
    run_fix_loop, FixLoopSettings, FixOutcome, FixState, FixStateMachine, FixTransition,
    IllegalTransition,
};
pub use generation::{extract_python, generate};
pub use instance::InstanceRun;
pub use orchestrator::{OrchestratorSettings, PhaseOrchestrator, SynthesisReport};
pub use prompts::{DefaultPrompter, Prompter};
pub use session::{Conversation, OracleClient, OracleSession};
pub use validation::{validate, ValidationResult};
