//! Shortest paths over the topology graph.
//!
//! A* search weighted by section length with a haversine-to-target heuristic,
//! scaled down by the graph so sections shorter than their chord stay exact.
//! Alternatives are found by blocking one section of the primary path at a
//! time and searching again.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{GraphCache, RouteGraph};
use crate::haversine::haversine_between;
use crate::polyline::{GeoPoint, Polyline};
use crate::topology::{AttributeFilter, SectionFilter, SectionNature};
use crate::traits::TopologySource;

/// Upper bound on alternatives regardless of what the caller asks for.
pub const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub start_id: String,
    pub end_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_natures: Option<Vec<SectionNature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_link_sections: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_filters: Vec<AttributeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alternatives: Option<usize>,
}

impl RouteRequest {
    pub fn new(start_id: impl Into<String>, end_id: impl Into<String>) -> Self {
        Self {
            start_id: start_id.into(),
            end_id: end_id.into(),
            ..Self::default()
        }
    }

    pub fn natures(mut self, natures: &[SectionNature]) -> Self {
        self.allowed_natures = Some(natures.to_vec());
        self
    }

    pub fn alternatives(mut self, count: usize) -> Self {
        self.max_alternatives = Some(count);
        self
    }

    pub fn filter(mut self, filter: AttributeFilter) -> Self {
        self.attribute_filters.push(filter);
        self
    }

    /// Explicit natures win; otherwise links are included unless disabled.
    pub fn section_filter(&self) -> SectionFilter {
        let natures = match &self.allowed_natures {
            Some(natures) if !natures.is_empty() => natures.clone(),
            _ if self.include_link_sections == Some(false) => vec![SectionNature::Regular],
            _ => vec![SectionNature::Regular, SectionNature::Link],
        };
        SectionFilter {
            natures,
            attributes: self.attribute_filters.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Invalid,
    Ok,
    NoRoute,
}

/// One traversed section, with geometry in travel direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    pub section_id: String,
    pub from_id: String,
    pub to_id: String,
    pub distance_km: f64,
    pub geometry: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAlternative {
    pub total_distance_km: f64,
    pub segments: Vec<RouteSegment>,
    pub geometry: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub status: RouteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_km: Option<f64>,
    #[serde(default)]
    pub segments: Vec<RouteSegment>,
    #[serde(default)]
    pub geometry: Vec<GeoPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<RouteAlternative>,
}

impl RouteResult {
    fn status(status: RouteStatus) -> Self {
        Self {
            status,
            total_distance_km: None,
            segments: Vec::new(),
            geometry: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RouteStatus::Ok
    }

    /// Ordered section ids; two routes with equal signatures are the same route.
    pub fn signature(&self) -> Vec<&str> {
        signature(&self.segments)
    }
}

fn signature(segments: &[RouteSegment]) -> Vec<&str> {
    segments.iter().map(|segment| segment.section_id.as_str()).collect()
}

/// A path found by the search: total cost and `(node, edge index)` steps.
struct Path {
    distance_km: f64,
    /// Each step is the adjacency index used to leave the preceding node.
    steps: Vec<(usize, usize)>,
}

impl Path {
    fn sections(&self, graph: &RouteGraph) -> Vec<usize> {
        self.steps
            .iter()
            .map(|&(node, edge)| graph.edges(node)[edge].section)
            .collect()
    }
}

/// Computes the route for `request` on an already built graph.
pub fn route(graph: &RouteGraph, request: &RouteRequest) -> RouteResult {
    let start_id = request.start_id.trim();
    let end_id = request.end_id.trim();
    if start_id.is_empty() || end_id.is_empty() {
        return RouteResult::status(RouteStatus::Invalid);
    }

    if start_id == end_id {
        let position = graph
            .index_of(start_id)
            .and_then(|index| graph.node(index).position);
        return RouteResult {
            status: RouteStatus::Ok,
            total_distance_km: Some(0.0),
            segments: Vec::new(),
            geometry: position.into_iter().collect(),
            alternatives: Vec::new(),
        };
    }

    let (Some(start), Some(end)) = (graph.index_of(start_id), graph.index_of(end_id)) else {
        debug!("Unknown route endpoint {} -> {}", start_id, end_id);
        return RouteResult::status(RouteStatus::NoRoute);
    };

    let filter = request.section_filter();
    let no_blocked = HashSet::new();
    let Some(primary) = shortest_path(graph, start, end, &filter, &no_blocked) else {
        return RouteResult::status(RouteStatus::NoRoute);
    };

    let wanted = request.max_alternatives.unwrap_or(0).min(MAX_ALTERNATIVES);
    let alternatives = if wanted > 0 {
        find_alternatives(graph, start, end, &filter, &primary, wanted)
    } else {
        Vec::new()
    };

    let (segments, geometry) = assemble(graph, start, &primary);
    RouteResult {
        status: RouteStatus::Ok,
        total_distance_km: Some(primary.distance_km),
        segments,
        geometry,
        alternatives,
    }
}

fn find_alternatives(
    graph: &RouteGraph,
    start: usize,
    end: usize,
    filter: &SectionFilter,
    primary: &Path,
    wanted: usize,
) -> Vec<RouteAlternative> {
    let primary_sections = primary.sections(graph);

    let mut found: Vec<RouteAlternative> = primary_sections
        .par_iter()
        .filter_map(|&section| {
            let blocked = HashSet::from([section]);
            let path = shortest_path(graph, start, end, filter, &blocked)?;
            let (segments, geometry) = assemble(graph, start, &path);
            Some(RouteAlternative {
                total_distance_km: path.distance_km,
                segments,
                geometry,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        a.total_distance_km
            .total_cmp(&b.total_distance_km)
            .then_with(|| signature(&a.segments).cmp(&signature(&b.segments)))
    });

    let primary_signature: Vec<&str> = primary_sections
        .iter()
        .map(|&section| graph.section(section).id.as_str())
        .collect();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    found.retain(|alternative| {
        let key = signature(&alternative.segments);
        key != primary_signature && seen.insert(key.iter().map(|id| id.to_string()).collect())
    });
    found.truncate(wanted);
    found
}

fn shortest_path(
    graph: &RouteGraph,
    start: usize,
    end: usize,
    filter: &SectionFilter,
    blocked: &HashSet<usize>,
) -> Option<Path> {
    let n = graph.node_count();
    let target = graph.node(end).position;
    let scale = graph.heuristic_scale();
    let heuristic = |node: usize| scale * haversine_between(graph.node(node).position, target).unwrap_or(0.0);

    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
    let mut closed = vec![false; n];

    // Min-heap on (estimate, node) with the node as deterministic tie-break.
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = BinaryHeap::new();
    dist[start] = 0.0;
    heap.push(Reverse((OrderedFloat(heuristic(start)), start)));

    while let Some(Reverse((_, node))) = heap.pop() {
        if closed[node] {
            continue;
        }
        closed[node] = true;
        if node == end {
            break;
        }

        for (edge_index, edge) in graph.edges(node).iter().enumerate() {
            if closed[edge.to] || blocked.contains(&edge.section) {
                continue;
            }
            if !filter.allows(graph.section(edge.section)) {
                continue;
            }
            let candidate = dist[node] + edge.distance_km;
            if candidate < dist[edge.to] {
                dist[edge.to] = candidate;
                prev[edge.to] = Some((node, edge_index));
                heap.push(Reverse((OrderedFloat(candidate + heuristic(edge.to)), edge.to)));
            }
        }
    }

    if !dist[end].is_finite() {
        return None;
    }

    let mut steps = Vec::new();
    let mut cursor = end;
    while let Some(step) = prev[cursor] {
        steps.push(step);
        cursor = step.0;
    }
    steps.reverse();

    Some(Path {
        distance_km: dist[end],
        steps,
    })
}

fn assemble(graph: &RouteGraph, start: usize, path: &Path) -> (Vec<RouteSegment>, Vec<GeoPoint>) {
    let mut segments = Vec::with_capacity(path.steps.len());
    let mut merged = Polyline::default();
    let mut from = start;

    for &(node, edge_index) in &path.steps {
        debug_assert_eq!(node, from);
        let edge = graph.edges(node)[edge_index];
        let section = graph.section(edge.section);

        let geometry = match section.polyline.as_ref().filter(|line| !line.is_empty()) {
            Some(line) if edge.reversed => line.reversed().into_points(),
            Some(line) => line.points().to_vec(),
            None => [graph.node(from).position, graph.node(edge.to).position]
                .into_iter()
                .flatten()
                .collect(),
        };
        merged.extend_merged(&geometry);

        segments.push(RouteSegment {
            section_id: section.id.clone(),
            from_id: graph.node(from).id.clone(),
            to_id: graph.node(edge.to).id.clone(),
            distance_km: edge.distance_km,
            geometry,
        });
        from = edge.to;
    }

    (segments, merged.into_points())
}

/// Routing entry point that owns the topology graph cache.
pub struct RoutingService<T: TopologySource> {
    source: T,
    cache: GraphCache,
}

impl<T: TopologySource> RoutingService<T> {
    pub fn new(source: T) -> Self {
        Self {
            source,
            cache: GraphCache::new(),
        }
    }

    pub fn route(&self, request: &RouteRequest) -> RouteResult {
        let graph = self.cache.get_or_build(&self.source);
        let result = route(&graph, request);
        debug!(
            "Route {} -> {}: {:?}, {:?} km, {} alternatives",
            request.start_id,
            request.end_id,
            result.status,
            result.total_distance_km,
            result.alternatives.len()
        );
        result
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut T {
        &mut self.source
    }

    /// Drops the cached graph so the next request rebuilds it.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}
