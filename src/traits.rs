//! Seams to the external collaborators of the planning core.
//!
//! Master data, the optimization engine and the realtime notification channel
//! live outside this crate. Applications implement these traits for their own
//! stores and transports.

use crate::error::PlannerError;
use crate::graph::GraphSignature;
use crate::reconcile::PlanMutation;
use crate::solver::{SolverRequest, SolverResponse};
use crate::topology::{OperationalPoint, SectionOfLine};

/// Provides the rail topology master data.
pub trait TopologySource {
    /// Cheap change signature; a different value forces a graph rebuild.
    fn signature(&self) -> GraphSignature;

    fn operational_points(&self) -> Vec<OperationalPoint>;

    fn sections_of_line(&self) -> Vec<SectionOfLine>;
}

/// Runs an optimization request against the duty solver.
pub trait SolverBackend {
    fn solve(&self, request: &SolverRequest) -> Result<SolverResponse, PlannerError>;
}

/// Receives every mutation set the planner produces, e.g. to push it to
/// connected dashboards.
pub trait MutationPublisher: Send + Sync {
    fn publish(&self, stage_id: &str, mutation: &PlanMutation);
}

/// In-memory topology, useful for tests and one-off imports.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    pub points: Vec<OperationalPoint>,
    pub sections: Vec<SectionOfLine>,
}

impl StaticTopology {
    pub fn new(points: Vec<OperationalPoint>, sections: Vec<SectionOfLine>) -> Self {
        Self { points, sections }
    }
}

impl TopologySource for StaticTopology {
    fn signature(&self) -> GraphSignature {
        GraphSignature {
            point_count: self.points.len(),
            section_count: self.sections.len(),
        }
    }

    fn operational_points(&self) -> Vec<OperationalPoint> {
        self.points.clone()
    }

    fn sections_of_line(&self) -> Vec<SectionOfLine> {
        self.sections.clone()
    }
}
