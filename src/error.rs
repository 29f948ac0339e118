//! Failures that abort a solve.
//!
//! Unreachable routes, unknown travel times and ownerless activities are not
//! errors; they are reported through statuses and flags on the results.

/// Error type for planner operations.
#[derive(Debug)]
pub enum PlannerError {
    /// No solver base URL is configured.
    SolverNotConfigured,
    /// The solver did not answer within the configured timeout.
    SolverTimeout { timeout_secs: u64 },
    /// The solver answered with a non-success status.
    SolverStatus { status: u16, body: String },
    /// The request could not be sent or the connection failed.
    SolverTransport(String),
    /// The solver's answer could not be decoded.
    SolverResponse(String),
}

impl std::fmt::Display for PlannerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannerError::SolverNotConfigured => write!(f, "Solver base URL is not configured"),
            PlannerError::SolverTimeout { timeout_secs } => {
                write!(f, "Solver did not respond within {}s", timeout_secs)
            }
            PlannerError::SolverStatus { status, body } => {
                write!(f, "Solver returned status {}: {}", status, body)
            }
            PlannerError::SolverTransport(msg) => write!(f, "Solver request failed: {}", msg),
            PlannerError::SolverResponse(msg) => write!(f, "Invalid solver response: {}", msg),
        }
    }
}

impl std::error::Error for PlannerError {}
