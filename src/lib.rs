//! rail-duty-planner core
//!
//! Shortest-path routing over a rail topology and duty assembly for
//! personnel and vehicle services: activities are grouped per owner and day,
//! an external solver partitions them into duties, and the result is
//! reconciled back into an activity mutation set.

pub mod activity;
pub mod config;
pub mod error;
pub mod graph;
pub mod grouping;
pub mod haversine;
pub mod pipeline;
pub mod polyline;
pub mod reconcile;
pub mod router;
pub mod solver;
pub mod topology;
pub mod traits;
pub mod travel;

pub use config::SolverConfig;
pub use error::PlannerError;
pub use pipeline::{DutyPlanner, SolveInput};
pub use reconcile::PlanMutation;
pub use router::{RouteRequest, RouteResult, RouteStatus, RoutingService};
