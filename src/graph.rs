//! Topology graph built from operational points and sections of line.
//!
//! Nodes are operational-point ids interned to dense indices. Every section
//! contributes one edge in each direction, weighted in kilometers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::haversine::haversine_between;
use crate::polyline::GeoPoint;
use crate::topology::{OperationalPoint, SectionOfLine};
use crate::traits::TopologySource;

/// Weight used when a section has neither a length nor any geometry.
pub const FALLBACK_EDGE_KM: f64 = 1.0;

/// Master-data cardinality; the graph is rebuilt when it changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GraphSignature {
    pub point_count: usize,
    pub section_count: usize,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub position: Option<GeoPoint>,
}

/// Directed half of a section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge {
    pub to: usize,
    /// Index into [`RouteGraph::section`].
    pub section: usize,
    pub distance_km: f64,
    /// True when travelling from the section's end point to its start point.
    pub reversed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteGraph {
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    adjacency: Vec<Vec<GraphEdge>>,
    sections: Vec<SectionOfLine>,
    heuristic_scale: f64,
}

impl RouteGraph {
    /// Builds the graph. Sections without both endpoint ids are skipped.
    pub fn build(points: &[OperationalPoint], sections: &[SectionOfLine]) -> Self {
        let mut graph = Self {
            heuristic_scale: 1.0,
            ..Self::default()
        };

        for point in points {
            let id = point.unique_op_id.trim();
            if id.is_empty() {
                continue;
            }
            let index = graph.node_for(id);
            if point.position.is_some() {
                graph.nodes[index].position = point.position;
            }
        }

        let mut skipped = 0usize;
        for section in sections {
            if !section.has_endpoints() {
                debug!("Skipping section {} without endpoints", section.id);
                skipped += 1;
                continue;
            }

            let from = graph.node_for(section.start_unique_op_id.trim());
            let to = graph.node_for(section.end_unique_op_id.trim());
            let distance_km = edge_weight_km(
                section,
                graph.nodes[from].position,
                graph.nodes[to].position,
            );

            match haversine_between(graph.nodes[from].position, graph.nodes[to].position) {
                Some(straight_km) if straight_km > 0.0 => {
                    graph.heuristic_scale = graph.heuristic_scale.min(distance_km / straight_km);
                }
                Some(_) => {}
                // An unplaced endpoint has no estimate, so the search falls back to Dijkstra.
                None => graph.heuristic_scale = 0.0,
            }

            let section_index = graph.sections.len();
            graph.sections.push(section.clone());
            graph.adjacency[from].push(GraphEdge {
                to,
                section: section_index,
                distance_km,
                reversed: false,
            });
            graph.adjacency[to].push(GraphEdge {
                to: from,
                section: section_index,
                distance_km,
                reversed: true,
            });
        }

        info!(
            "Built route graph with {} nodes and {} sections ({} skipped, heuristic scale {:.3})",
            graph.nodes.len(),
            graph.sections.len(),
            skipped,
            graph.heuristic_scale
        );

        graph
    }

    fn node_for(&mut self, id: &str) -> usize {
        if let Some(&index) = self.node_index.get(id) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(GraphNode {
            id: id.to_string(),
            position: None,
        });
        self.adjacency.push(Vec::new());
        self.node_index.insert(id.to_string(), index);
        index
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.node_index.get(id.trim()).copied()
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn edges(&self, index: usize) -> &[GraphEdge] {
        &self.adjacency[index]
    }

    pub fn section(&self, index: usize) -> &SectionOfLine {
        &self.sections[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Factor applied to straight-line distance so it never exceeds the
    /// remaining path weight: the smallest ratio of edge weight to endpoint
    /// distance, capped at 1. Zero when a section touches an unplaced point.
    pub fn heuristic_scale(&self) -> f64 {
        self.heuristic_scale
    }
}

/// Explicit length, then polyline length, then endpoint distance, then 1 km.
pub fn edge_weight_km(
    section: &SectionOfLine,
    from: Option<GeoPoint>,
    to: Option<GeoPoint>,
) -> f64 {
    if let Some(length) = section.length_km.filter(|km| km.is_finite() && *km > 0.0) {
        return length;
    }
    if let Some(length) = section.polyline.as_ref().and_then(|line| line.length_km()) {
        return length;
    }
    haversine_between(from, to).unwrap_or(FALLBACK_EDGE_KM)
}

/// Last built graph together with the signature it was built for.
///
/// Readers clone the `Arc` and search without holding the lock; a rebuild
/// replaces the whole graph.
#[derive(Debug, Default)]
pub struct GraphCache {
    current: RwLock<Option<(GraphSignature, Arc<RouteGraph>)>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<T: TopologySource + ?Sized>(&self, source: &T) -> Arc<RouteGraph> {
        let signature = source.signature();

        if let Some((cached, graph)) = self.current.read().as_ref() {
            if *cached == signature {
                debug!("Using cached route graph for {:?}", signature);
                return Arc::clone(graph);
            }
        }

        let points = source.operational_points();
        let sections = source.sections_of_line();
        let graph = Arc::new(RouteGraph::build(&points, &sections));

        *self.current.write() = Some((signature, Arc::clone(&graph)));
        graph
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    pub fn signature(&self) -> Option<GraphSignature> {
        self.current.read().as_ref().map(|(signature, _)| *signature)
    }
}
