/// Bundle construction
pub mod bundle;

/// Trigger monitoring task
pub mod monitor;

/// Bundle submission and inclusion confirmation
pub mod submit;

/// Monitoring timeout and execution path selection
pub mod supervisor;
