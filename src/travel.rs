//! Walking times between planning locations.
//!
//! Activities reference places loosely: an operational-point id, a personnel
//! site id, or just a human readable name. The resolver maps each reference
//! to a canonical operational point and looks travel up in a table built
//! from the precomputed transfer edges.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::topology::OperationalPoint;

/// A depot, crew room or similar place where personnel start work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelSite {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_op_id: Option<String>,
}

/// A stop served by replacement buses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementStop {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_op_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferEndpointKind {
    Op,
    PersonnelSite,
    ReplacementStop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEndpoint {
    pub kind: TransferEndpointKind,
    pub id: String,
}

impl TransferEndpoint {
    pub fn op(id: impl Into<String>) -> Self {
        Self {
            kind: TransferEndpointKind::Op,
            id: id.into(),
        }
    }

    pub fn site(id: impl Into<String>) -> Self {
        Self {
            kind: TransferEndpointKind::PersonnelSite,
            id: id.into(),
        }
    }

    pub fn stop(id: impl Into<String>) -> Self {
        Self {
            kind: TransferEndpointKind::ReplacementStop,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferMode {
    Walk,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEdge {
    pub from: TransferEndpoint,
    pub to: TransferEndpoint,
    pub mode: TransferMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_duration_sec: Option<u64>,
    #[serde(default)]
    pub bidirectional: bool,
}

impl TransferEdge {
    pub fn walk(from: TransferEndpoint, to: TransferEndpoint, seconds: u64) -> Self {
        Self {
            from,
            to,
            mode: TransferMode::Walk,
            avg_duration_sec: Some(seconds),
            bidirectional: false,
        }
    }

    pub fn both_ways(mut self) -> Self {
        self.bidirectional = true;
        self
    }
}

/// Outcome of a travel lookup. The missing cases are soft failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelLookup {
    Resolved { millis: u64 },
    /// One of the references is absent or does not resolve to a point.
    MissingLocation,
    /// Both points are known but no transfer connects them.
    MissingTravel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WalkEntry {
    millis: u64,
    bidirectional: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TravelTimeResolver {
    point_ids: HashSet<String>,
    points_by_name: HashMap<String, Vec<String>>,
    sites_by_id: HashMap<String, Option<String>>,
    sites_by_name: HashMap<String, Vec<Option<String>>>,
    stops_by_id: HashMap<String, Option<String>>,
    walk_times: HashMap<(String, String), WalkEntry>,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl TravelTimeResolver {
    pub fn new(
        points: &[OperationalPoint],
        sites: &[PersonnelSite],
        stops: &[ReplacementStop],
        transfers: &[TransferEdge],
    ) -> Self {
        let mut resolver = Self::default();

        for point in points {
            let id = point.unique_op_id.trim();
            if id.is_empty() {
                continue;
            }
            resolver.point_ids.insert(id.to_string());
            if let Some(name) = point.name.as_deref().filter(|name| !name.trim().is_empty()) {
                resolver
                    .points_by_name
                    .entry(name_key(name))
                    .or_default()
                    .push(id.to_string());
            }
        }

        for site in sites {
            let op = non_blank(&site.unique_op_id);
            resolver.sites_by_id.insert(site.id.trim().to_string(), op.clone());
            if let Some(name) = site.name.as_deref().filter(|name| !name.trim().is_empty()) {
                resolver.sites_by_name.entry(name_key(name)).or_default().push(op);
            }
        }

        for stop in stops {
            resolver
                .stops_by_id
                .insert(stop.id.trim().to_string(), non_blank(&stop.unique_op_id));
        }

        for transfer in transfers {
            resolver.index_transfer(transfer);
        }

        debug!(
            "Travel resolver: {} points, {} sites, {} walk links",
            resolver.point_ids.len(),
            resolver.sites_by_id.len(),
            resolver.walk_times.len()
        );

        resolver
    }

    fn index_transfer(&mut self, transfer: &TransferEdge) {
        if transfer.mode != TransferMode::Walk {
            return;
        }
        let Some(seconds) = transfer.avg_duration_sec else {
            return;
        };
        let (Some(from), Some(to)) = (
            self.endpoint_point(&transfer.from),
            self.endpoint_point(&transfer.to),
        ) else {
            debug!("Skipping transfer {:?} -> {:?}", transfer.from, transfer.to);
            return;
        };

        let entry = WalkEntry {
            millis: seconds.saturating_mul(1000),
            bidirectional: transfer.bidirectional,
        };
        self.walk_times
            .entry((from, to))
            .and_modify(|existing| {
                if entry.millis < existing.millis {
                    *existing = entry;
                }
            })
            .or_insert(entry);
    }

    fn endpoint_point(&self, endpoint: &TransferEndpoint) -> Option<String> {
        let id = endpoint.id.trim();
        match endpoint.kind {
            TransferEndpointKind::Op => Some(id.to_string()).filter(|id| !id.is_empty()),
            TransferEndpointKind::PersonnelSite => self.sites_by_id.get(id).cloned().flatten(),
            TransferEndpointKind::ReplacementStop => self.stops_by_id.get(id).cloned().flatten(),
        }
    }

    /// Maps a free-form location reference to an operational-point id.
    pub fn resolve_point(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if self.point_ids.contains(reference) {
            return Some(reference.to_string());
        }

        if let Some(Some(op)) = self.sites_by_id.get(reference) {
            return Some(op.clone());
        }

        let key = name_key(reference);
        if let Some([Some(op)]) = self.sites_by_name.get(&key).map(Vec::as_slice) {
            return Some(op.clone());
        }

        if let Some([id]) = self.points_by_name.get(&key).map(Vec::as_slice) {
            return Some(id.clone());
        }

        None
    }

    /// Walking time from `from` to `to`.
    pub fn travel_time(&self, from: Option<&str>, to: Option<&str>) -> TravelLookup {
        let (Some(from), Some(to)) = (
            from.and_then(|reference| self.resolve_point(reference)),
            to.and_then(|reference| self.resolve_point(reference)),
        ) else {
            return TravelLookup::MissingLocation;
        };

        if from == to {
            return TravelLookup::Resolved { millis: 0 };
        }

        if let Some(entry) = self.walk_times.get(&(from.clone(), to.clone())) {
            return TravelLookup::Resolved {
                millis: entry.millis,
            };
        }

        match self.walk_times.get(&(to, from)) {
            Some(entry) if entry.bidirectional => TravelLookup::Resolved {
                millis: entry.millis,
            },
            _ => TravelLookup::MissingTravel,
        }
    }
}
