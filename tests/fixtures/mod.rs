//! Test fixtures for rail-duty-planner.
//!
//! Provides realistic test data including:
//! - A slice of the Berlin S-Bahn network (stations, sections, transfers)
//! - Builders for activities and stage snapshots

#![allow(dead_code)]

pub mod berlin_network;

pub use berlin_network::*;

use chrono::{DateTime, TimeZone, Utc};

use rail_duty_planner::activity::{Activity, Resource, ResourceKind, StageSnapshot};
use rail_duty_planner::solver::{Candidate, CandidateKind};
use rail_duty_planner::traits::StaticTopology;
use rail_duty_planner::travel::TravelTimeResolver;

pub const STAGE: &str = "stage-2025-w11";
pub const DAY: &str = "2025-03-14";

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
}

pub fn berlin_topology() -> StaticTopology {
    StaticTopology::new(operational_points(), sections_of_line())
}

pub fn berlin_resolver() -> TravelTimeResolver {
    TravelTimeResolver::new(&operational_points(), &personnel_sites(), &[], &transfers())
}

/// A train ride worked by `owner`, between two stations.
pub fn ride(id: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>, from: &Station, to: &Station) -> Activity {
    Activity::new(id, "ride", start)
        .ending(end)
        .between(from.id, to.id)
        .with_participant(owner, ResourceKind::PersonnelService)
}

pub fn snapshot(activities: Vec<Activity>) -> StageSnapshot {
    let mut snapshot = StageSnapshot::new(STAGE, "base");
    snapshot.timetable_year_label = Some("2025".into());
    snapshot.resources = vec![
        Resource {
            id: "crew-17".into(),
            kind: ResourceKind::PersonnelService,
            name: Some("Dienst 17".into()),
        },
        Resource {
            id: "et-481-042".into(),
            kind: ResourceKind::VehicleService,
            name: Some("481 042".into()),
        },
    ];
    snapshot.activities = activities;
    snapshot
}

pub fn service_id(owner: &str) -> String {
    format!("service:{}:{}:{}", STAGE, owner, DAY)
}

pub fn break_candidate(id: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>, gap_minutes: i64) -> Candidate {
    Candidate::new(id, "break-window", CandidateKind::Break)
        .with_param("serviceId", service_id(owner))
        .with_param("ownerId", owner)
        .with_param("startMs", start.timestamp_millis())
        .with_param("endMs", end.timestamp_millis())
        .with_param("gapMinutes", gap_minutes)
}

/// Applies a mutation to a snapshot the way a stage store would.
pub fn apply(snapshot: &StageSnapshot, upserts: &[Activity], deleted_ids: &[String]) -> StageSnapshot {
    let mut next = snapshot.clone();
    next.activities.retain(|activity| !deleted_ids.contains(&activity.id));
    for upsert in upserts {
        match next.activities.iter_mut().find(|activity| activity.id == upsert.id) {
            Some(existing) => *existing = upsert.clone(),
            None => next.activities.push(upsert.clone()),
        }
    }
    next
}
