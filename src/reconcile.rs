//! Turns the solver's duties into an activity mutation set.
//!
//! Boundary and window ids are derived from service ids, and only activities
//! that differ from the snapshot are emitted, so reconciling the applied
//! result again yields an empty mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::activity::{Activity, ActivityCatalog, ManagedRole, ResourceKind, ServiceId, StageSnapshot};
use crate::grouping::SolverGroup;
use crate::solver::{Candidate, CandidateKind, DutyGroup};

const DUTY_TEMPLATE_ID: &str = "duty";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMutation {
    pub summary: String,
    pub upserts: Vec<Activity>,
    pub deleted_ids: Vec<String>,
    pub candidates_used: Vec<Candidate>,
}

impl PlanMutation {
    /// True when applying the mutation would not change the stage.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deleted_ids.is_empty()
    }
}

/// One owner's duties for one day, with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyAssignment {
    pub owner_id: String,
    pub owner_kind: ResourceKind,
    pub day_key: String,
    pub duties: Vec<Vec<String>>,
}

impl DutyAssignment {
    /// Completes a solver duty group with the owner and day of the group it
    /// answers. Returns `None` when the owner or day stay unknown.
    pub fn from_group(group: &DutyGroup, sent: Option<&SolverGroup>) -> Option<Self> {
        let owner_id = group
            .owner_id
            .clone()
            .or_else(|| sent.map(|sent| sent.owner_id.clone()))?;
        let day_key = group
            .day_key
            .clone()
            .or_else(|| sent.map(|sent| sent.day_key.clone()))?;
        let owner_kind = group
            .owner_kind
            .or_else(|| sent.map(|sent| sent.owner_kind))
            .unwrap_or(ResourceKind::PersonnelService);
        Some(Self {
            owner_id,
            owner_kind,
            day_key,
            duties: group.duties.clone(),
        })
    }
}

/// Time window and service a break/travel candidate applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateWindow {
    pub service_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub owner_id: Option<String>,
    pub activity_type: Option<String>,
}

impl CandidateWindow {
    /// Reads `serviceId`, `startMs` and `endMs`; millisecond values may be
    /// numbers or numeric strings.
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        let millis = |key: &str| {
            candidate
                .param_number(key)
                .and_then(|ms| DateTime::from_timestamp_millis(ms.round() as i64))
        };
        let start = millis("startMs")?;
        let end = millis("endMs")?;
        if end < start {
            return None;
        }
        Some(Self {
            service_id: candidate.service_id()?.to_string(),
            start,
            end,
            owner_id: candidate.owner_id().map(str::to_string),
            activity_type: candidate.param_str("activityType").map(str::to_string),
        })
    }
}

struct PlannedDuty<'a> {
    service: ServiceId,
    assignment: &'a DutyAssignment,
    activity_ids: Vec<String>,
}

/// Computes the upserts and deletes that bring `snapshot` in line with the
/// given duties and break/travel candidates.
pub fn reconcile(
    snapshot: &StageSnapshot,
    assignments: &[DutyAssignment],
    extras: &[Candidate],
    catalog: &ActivityCatalog,
) -> PlanMutation {
    let stage_id = snapshot.stage_id.as_str();
    let original: HashMap<&str, &Activity> = snapshot
        .activities
        .iter()
        .map(|activity| (activity.id.as_str(), activity))
        .collect();
    let mut working: BTreeMap<String, Activity> = snapshot
        .activities
        .iter()
        .map(|activity| (activity.id.clone(), activity.clone()))
        .collect();
    let mut removed: BTreeSet<String> = BTreeSet::new();
    let mut used: Vec<Candidate> = Vec::new();

    let planned = plan_duties(stage_id, assignments, &working);
    let scopes: BTreeSet<(&str, &str)> = assignments
        .iter()
        .map(|assignment| (assignment.owner_id.as_str(), assignment.day_key.as_str()))
        .collect();
    let new_services: BTreeSet<String> = planned.iter().map(|duty| duty.service.to_string()).collect();
    let mut boundary_ids: BTreeSet<String> = BTreeSet::new();

    for duty in &planned {
        let service_id = duty.service.to_string();
        let owner = duty.assignment;
        for id in &duty.activity_ids {
            if let Some(activity) = working.get_mut(id) {
                activity.assign_service(&owner.owner_id, &service_id);
            }
        }

        let members: Vec<&Activity> = duty
            .activity_ids
            .iter()
            .filter_map(|id| working.get(id))
            .collect();
        let Some(first) = members.iter().min_by_key(|activity| (activity.start, activity.id.clone())) else {
            continue;
        };
        let Some(last) = members
            .iter()
            .max_by_key(|activity| (activity.effective_end(), activity.id.clone()))
        else {
            continue;
        };

        let (start_type, end_type) = catalog.boundary_types(owner.owner_kind);
        let start_boundary = boundary(
            duty.service.start_boundary_id(),
            start_type,
            first.start,
            first.start_location(),
            ManagedRole::DutyStart,
            owner,
            &service_id,
        );
        let end_boundary = boundary(
            duty.service.end_boundary_id(),
            end_type,
            last.effective_end(),
            last.end_location(),
            ManagedRole::DutyEnd,
            owner,
            &service_id,
        );
        used.push(duty_audit(duty, &service_id));

        for fresh in [start_boundary, end_boundary] {
            boundary_ids.insert(fresh.id.clone());
            let merged = match working.get(&fresh.id) {
                Some(existing) => Activity {
                    label: existing.label.clone(),
                    attributes: existing.attributes.clone(),
                    ..fresh
                },
                None => fresh,
            };
            working.insert(merged.id.clone(), merged);
        }
    }

    // Activities dropped from a duty that keeps its service id leave it.
    let members: HashMap<String, BTreeSet<&str>> = planned
        .iter()
        .map(|duty| {
            (
                duty.service.to_string(),
                duty.activity_ids.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    for activity in working.values_mut().filter(|activity| activity.managed.is_none()) {
        let departed: Vec<String> = activity
            .service_ids()
            .into_iter()
            .filter(|service| {
                members
                    .get(*service)
                    .is_some_and(|ids| !ids.contains(activity.id.as_str()))
            })
            .map(str::to_string)
            .collect();
        for service in departed {
            debug!("Activity {} left service {}", activity.id, service);
            activity.unassign_service(&service);
        }
    }

    let stale: BTreeSet<String> = snapshot
        .activities
        .iter()
        .flat_map(|activity| activity.service_ids())
        .filter(|service| !new_services.contains(*service))
        .filter(|service| {
            ServiceId::parse(service).is_some_and(|parsed| {
                parsed.stage_id == stage_id
                    && scopes.contains(&(parsed.owner_id.as_str(), parsed.day_key.as_str()))
            })
        })
        .map(str::to_string)
        .collect();
    if !stale.is_empty() {
        debug!("Retiring {} superseded services", stale.len());
    }

    let stale_managed: Vec<String> = working
        .values()
        .filter(|activity| activity.managed.is_some() && !boundary_ids.contains(&activity.id))
        .filter(|activity| activity.service_ids().iter().any(|service| stale.contains(*service)))
        .map(|activity| activity.id.clone())
        .collect();
    for id in stale_managed {
        working.remove(&id);
        removed.insert(id);
    }
    for activity in working.values_mut() {
        for service in &stale {
            activity.unassign_service(service);
        }
    }

    let mut windows_applied = 0usize;
    for candidate in extras {
        let role = match candidate.kind {
            CandidateKind::Break => ManagedRole::Break,
            CandidateKind::Travel => ManagedRole::Travel,
            CandidateKind::Duty => continue,
        };
        let Some(window) = CandidateWindow::from_candidate(candidate) else {
            warn!("Candidate {} lacks a usable service window, skipped", candidate.id);
            continue;
        };
        if stale.contains(&window.service_id) {
            debug!("Candidate {} targets retired service {}", candidate.id, window.service_id);
            continue;
        }
        apply_window(&mut working, &mut removed, snapshot, assignments, catalog, role, candidate, &window);
        used.push(candidate.clone());
        windows_applied += 1;
    }

    let upserts: Vec<Activity> = working
        .into_values()
        .filter(|activity| original.get(activity.id.as_str()).copied() != Some(activity))
        .collect();
    let deleted_ids: Vec<String> = removed
        .into_iter()
        .filter(|id| original.contains_key(id.as_str()))
        .collect();

    PlanMutation {
        summary: format!(
            "{} duties, {} break/travel windows: {} upserts, {} deletes",
            planned.len(),
            windows_applied,
            upserts.len(),
            deleted_ids.len()
        ),
        upserts,
        deleted_ids,
        candidates_used: used,
    }
}

fn plan_duties<'a>(
    stage_id: &str,
    assignments: &'a [DutyAssignment],
    working: &BTreeMap<String, Activity>,
) -> Vec<PlannedDuty<'a>> {
    let mut planned = Vec::new();
    for assignment in assignments {
        let duties: Vec<Vec<String>> = assignment
            .duties
            .iter()
            .map(|duty| {
                duty.iter()
                    .filter(|id| match working.get(id.as_str()) {
                        Some(activity) => activity.managed.is_none(),
                        None => {
                            warn!("Solver referenced unknown activity {}", id);
                            false
                        }
                    })
                    .cloned()
                    .collect::<Vec<String>>()
            })
            .filter(|duty| !duty.is_empty())
            .collect();
        // Number split duties by their earliest activity, not solver order.
        let mut duties = duties;
        duties.sort_by_cached_key(|duty| {
            duty.iter()
                .filter_map(|id| working.get(id.as_str()))
                .map(|activity| (activity.start, activity.id.clone()))
                .min()
        });

        let numbered = duties.len() > 1;
        for (index, activity_ids) in duties.into_iter().enumerate() {
            let mut service = ServiceId::new(stage_id, &assignment.owner_id, &assignment.day_key);
            if numbered {
                service = service.numbered(index + 1);
            }
            planned.push(PlannedDuty {
                service,
                assignment,
                activity_ids,
            });
        }
    }
    planned
}

fn boundary(
    id: String,
    activity_type: String,
    at: DateTime<Utc>,
    location: Option<&str>,
    role: ManagedRole,
    owner: &DutyAssignment,
    service_id: &str,
) -> Activity {
    let mut activity = Activity::new(id, activity_type, at)
        .with_participant(&owner.owner_id, owner.owner_kind)
        .managed_as(role);
    activity.location_id = location.map(str::to_string);
    activity.assign_service(&owner.owner_id, service_id);
    activity
}

fn duty_audit(duty: &PlannedDuty<'_>, service_id: &str) -> Candidate {
    let owner = duty.assignment;
    Candidate::new(service_id, DUTY_TEMPLATE_ID, CandidateKind::Duty)
        .with_param("ownerId", owner.owner_id.as_str())
        .with_param(
            "ownerKind",
            serde_json::to_value(owner.owner_kind).unwrap_or(Value::Null),
        )
        .with_param("dayKey", owner.day_key.as_str())
        .with_param("activityIds", duty.activity_ids.clone())
        .with_param("serviceId", service_id)
}

#[allow(clippy::too_many_arguments)]
fn apply_window(
    working: &mut BTreeMap<String, Activity>,
    removed: &mut BTreeSet<String>,
    snapshot: &StageSnapshot,
    assignments: &[DutyAssignment],
    catalog: &ActivityCatalog,
    role: ManagedRole,
    candidate: &Candidate,
    window: &CandidateWindow,
) {
    let activity_type = window.activity_type.clone().unwrap_or_else(|| match role {
        ManagedRole::Travel => catalog.travel_type(),
        _ => catalog.break_type(),
    });

    let overlapping: Vec<String> = working
        .values()
        .filter(|activity| activity.managed == Some(role))
        .filter(|activity| activity.service_ids().contains(&window.service_id.as_str()))
        .filter(|activity| activity.overlaps(window.start, window.end))
        .map(|activity| activity.id.clone())
        .collect();

    if let Some((keep, duplicates)) = overlapping.split_first() {
        for duplicate in duplicates {
            working.remove(duplicate);
            removed.insert(duplicate.clone());
        }
        if let Some(existing) = working.get_mut(keep) {
            existing.start = window.start;
            existing.end = Some(window.end);
            existing.activity_type = activity_type;
        }
        debug!("Candidate {} updates {}", candidate.id, keep);
        return;
    }

    let owner_id = window
        .owner_id
        .clone()
        .or_else(|| ServiceId::parse(&window.service_id).map(|service| service.owner_id));
    let kind_label = match role {
        ManagedRole::Travel => "travel",
        _ => "break",
    };
    let id = format!(
        "{}:{}:{}",
        kind_label,
        window.service_id,
        window.start.timestamp_millis()
    );
    let mut activity = Activity::new(id, activity_type, window.start)
        .ending(window.end)
        .managed_as(role);
    match owner_id {
        Some(owner_id) => {
            let kind = snapshot
                .resource_kind(&owner_id)
                .or_else(|| {
                    assignments
                        .iter()
                        .find(|assignment| assignment.owner_id == owner_id)
                        .map(|assignment| assignment.owner_kind)
                })
                .unwrap_or(ResourceKind::PersonnelService);
            activity = activity.with_participant(&owner_id, kind);
            activity.assign_service(&owner_id, &window.service_id);
        }
        None => activity.service_id = Some(window.service_id.clone()),
    }
    removed.remove(&activity.id);
    working.insert(activity.id.clone(), activity);
}
