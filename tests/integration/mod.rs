//! Integration Tests Module
//!
//! End-to-end synthesis runs against a scripted oracle and a scripted
//! execution environment. No network or subprocess is involved.

// Scripted doubles and harness
mod support;

// Phase orchestrator scenarios
mod synthesis_test;

// Batch runner resume and cancellation
mod batch_test;

// Output store persistence
mod storage_test;
