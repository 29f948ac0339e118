//! Per-owner, per-day duty groups handed to the solver.
//!
//! Every group lists its activities in time order together with the
//! transitions the solver may chain: an edge from an earlier to a later
//! activity exists when the owner can get from one to the other in time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activity::{Activity, ResourceKind, ServiceId, StageSnapshot};
use crate::travel::{TravelLookup, TravelTimeResolver};

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverGroupActivity {
    pub id: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// A feasible transition between two activities of the same group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverGroupEdge {
    #[serde(rename = "fromId", alias = "fromActivityId")]
    pub from_activity_id: String,
    #[serde(rename = "toId", alias = "toActivityId")]
    pub to_activity_id: String,
    pub gap_minutes: i64,
    pub travel_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_travel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_location: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverGroup {
    pub id: String,
    pub owner_id: String,
    pub owner_kind: ResourceKind,
    pub day_key: String,
    pub activities: Vec<SolverGroupActivity>,
    pub edges: Vec<SolverGroupEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Owner {
    pub id: String,
    pub kind: ResourceKind,
}

pub fn group_id(owner_id: &str, day_key: &str) -> String {
    format!("group:{}:{}", owner_id, day_key)
}

/// Owners of an activity, most specific source first.
///
/// Service participants win over plain resources; without participants the
/// per-owner service table and finally the structured service id are used.
pub fn resolve_owners(activity: &Activity, snapshot: &StageSnapshot) -> Vec<Owner> {
    let from_participants = |service: bool| -> Vec<Owner> {
        activity
            .participants
            .iter()
            .filter(|participant| participant.kind.is_service() == service)
            .filter(|participant| !participant.resource_id.trim().is_empty())
            .map(|participant| Owner {
                id: participant.resource_id.trim().to_string(),
                kind: participant.kind,
            })
            .collect()
    };
    let known = |id: &str| Owner {
        id: id.to_string(),
        kind: snapshot
            .resource_kind(id)
            .unwrap_or(ResourceKind::PersonnelService),
    };

    let mut owners = from_participants(true);
    if owners.is_empty() {
        owners = from_participants(false);
    }
    if owners.is_empty() {
        owners = activity
            .service_by_owner
            .keys()
            .filter(|id| !id.trim().is_empty())
            .map(|id| known(id.trim()))
            .collect();
    }
    if owners.is_empty() {
        owners = activity
            .service_id
            .as_deref()
            .and_then(ServiceId::parse)
            .map(|service| known(&service.owner_id))
            .into_iter()
            .collect();
    }

    owners.sort();
    owners.dedup_by(|a, b| a.id == b.id);
    owners
}

/// Builds one group per owner and UTC day from the snapshot's unmanaged activities.
pub fn build_groups(snapshot: &StageSnapshot, resolver: &TravelTimeResolver) -> Vec<SolverGroup> {
    let mut buckets: BTreeMap<(String, String), (ResourceKind, Vec<&Activity>)> = BTreeMap::new();

    for activity in &snapshot.activities {
        if activity.managed.is_some() {
            continue;
        }
        let owners = resolve_owners(activity, snapshot);
        if owners.is_empty() {
            debug!("Activity {} has no resolvable owner, not grouped", activity.id);
            continue;
        }
        for owner in owners {
            buckets
                .entry((owner.id, activity.day_key()))
                .or_insert_with(|| (owner.kind, Vec::new()))
                .1
                .push(activity);
        }
    }

    buckets
        .into_iter()
        .map(|((owner_id, day_key), (owner_kind, mut activities))| {
            activities.sort_by(|a, b| {
                a.start
                    .cmp(&b.start)
                    .then_with(|| a.effective_end().cmp(&b.effective_end()))
                    .then_with(|| a.id.cmp(&b.id))
            });
            let edges = transition_edges(&activities, resolver);
            SolverGroup {
                id: group_id(&owner_id, &day_key),
                owner_id,
                owner_kind,
                day_key,
                activities: activities
                    .iter()
                    .map(|activity| SolverGroupActivity {
                        id: activity.id.clone(),
                        start_ms: activity.start.timestamp_millis(),
                        end_ms: activity.effective_end().timestamp_millis(),
                    })
                    .collect(),
                edges,
            }
        })
        .collect()
}

/// Edges for every time-ordered pair whose gap covers the travel time.
///
/// `activities` must already be sorted by start.
pub fn transition_edges(activities: &[&Activity], resolver: &TravelTimeResolver) -> Vec<SolverGroupEdge> {
    let mut edges = Vec::new();

    for (i, earlier) in activities.iter().enumerate() {
        for later in &activities[i + 1..] {
            let gap_ms = (later.start - earlier.effective_end()).num_milliseconds();
            if gap_ms < 0 {
                continue;
            }
            let gap_minutes = gap_ms / MS_PER_MINUTE;

            let lookup = resolver.travel_time(earlier.end_location(), later.start_location());
            let (travel_ms, missing_travel, missing_location) = match lookup {
                TravelLookup::Resolved { millis } => (i64::try_from(millis).unwrap_or(i64::MAX), None, None),
                TravelLookup::MissingTravel => (0, Some(true), None),
                TravelLookup::MissingLocation => (0, None, Some(true)),
            };
            if gap_ms < travel_ms {
                continue;
            }
            // Rounded up, but never past the whole minutes of the gap it fits in.
            let travel_minutes = (travel_ms / MS_PER_MINUTE + i64::from(travel_ms % MS_PER_MINUTE != 0)).min(gap_minutes);

            edges.push(SolverGroupEdge {
                from_activity_id: earlier.id.clone(),
                to_activity_id: later.id.clone(),
                gap_minutes,
                travel_minutes,
                missing_travel,
                missing_location,
            });
        }
    }

    edges
}
