//! Duty planning pipeline: grouping, solver call, reconciliation, publish.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use crate::activity::{ActivityCatalog, ServiceId, StageSnapshot};
use crate::config::SolverConfig;
use crate::error::PlannerError;
use crate::grouping::{SolverGroup, build_groups};
use crate::reconcile::{DutyAssignment, PlanMutation, reconcile};
use crate::solver::{
    Candidate, CandidateKind, FallbackPolicy, Ruleset, SolveOptions, SolverClient, SolverRequest,
    SolverResponse, select_fallback,
};
use crate::traits::{MutationPublisher, SolverBackend};
use crate::travel::TravelTimeResolver;

/// Everything one solve works on.
#[derive(Debug, Clone)]
pub struct SolveInput {
    pub snapshot: StageSnapshot,
    pub ruleset: Ruleset,
    /// Pre-built break/travel (and legacy duty) candidates.
    pub candidates: Vec<Candidate>,
}

pub struct DutyPlanner<S: SolverBackend> {
    solver: S,
    resolver: TravelTimeResolver,
    catalog: ActivityCatalog,
    options: SolveOptions,
    default_time_limit: Option<f64>,
    publishers: Vec<Arc<dyn MutationPublisher>>,
}

impl DutyPlanner<SolverClient> {
    /// Planner backed by the HTTP solver; fails when no solver URL is configured.
    pub fn from_config(config: SolverConfig, resolver: TravelTimeResolver) -> Result<Self, PlannerError> {
        let time_limit = config.time_limit_seconds;
        let client = SolverClient::new(config)?;
        Ok(Self::new(client, resolver).with_time_limit(time_limit))
    }
}

impl<S: SolverBackend> DutyPlanner<S> {
    pub fn new(solver: S, resolver: TravelTimeResolver) -> Self {
        Self {
            solver,
            resolver,
            catalog: ActivityCatalog::default(),
            options: SolveOptions::default(),
            default_time_limit: None,
            publishers: Vec::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: ActivityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Time limit sent when the options carry none.
    pub fn with_time_limit(mut self, seconds: Option<f64>) -> Self {
        self.default_time_limit = seconds;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn MutationPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Plans the duties of one stage and returns the resulting mutation set.
    ///
    /// Solver failures abort the solve; nothing is published in that case.
    pub fn solve(&self, input: &SolveInput) -> Result<PlanMutation, PlannerError> {
        let mut options = self.options.clone();
        if options.time_limit_seconds.is_none() {
            options.time_limit_seconds = self.default_time_limit;
        }

        let groups = build_groups(&input.snapshot, &self.resolver);
        info!(
            "Solving stage {} with {} groups and {} candidates",
            input.snapshot.stage_id,
            groups.len(),
            input.candidates.len()
        );
        let request = SolverRequest::new(
            &input.ruleset,
            &input.snapshot,
            input.candidates.clone(),
            groups,
            &options,
        );
        let response = self.solver.solve(&request)?;
        if let Some(status) = response.status.as_deref() {
            info!("Solver finished with status {}", status);
        }

        let (assignments, extras) = interpret(&request, &response, &input.candidates, &options);
        let mutation = reconcile(&input.snapshot, &assignments, &extras, &self.catalog);
        info!(
            "Stage {}: {} upserts, {} deletes",
            input.snapshot.stage_id,
            mutation.upserts.len(),
            mutation.deleted_ids.len()
        );

        for publisher in &self.publishers {
            publisher.publish(&input.snapshot.stage_id, &mutation);
        }
        Ok(mutation)
    }
}

fn interpret(
    request: &SolverRequest,
    response: &SolverResponse,
    candidates: &[Candidate],
    options: &SolveOptions,
) -> (Vec<DutyAssignment>, Vec<Candidate>) {
    let sent: HashMap<&str, &SolverGroup> = request
        .groups()
        .iter()
        .map(|group| (group.id.as_str(), group))
        .collect();
    let selected = selected_candidates(response, candidates);

    let assignments = if response.duty_groups().is_empty() {
        legacy_assignments(&selected, &sent)
    } else {
        response
            .duty_groups()
            .iter()
            .filter_map(|group| {
                let assignment = DutyAssignment::from_group(group, sent.get(group.group_id.as_str()).copied());
                if assignment.is_none() {
                    warn!("Duty group {} has no resolvable owner or day", group.group_id);
                }
                assignment
            })
            .collect()
    };

    let mut extras: Vec<Candidate> = selected
        .into_iter()
        .filter(|candidate| candidate.kind != CandidateKind::Duty)
        .collect();

    let no_answer = response.duty_groups().is_empty() && extras.is_empty();
    match options.fallback {
        FallbackPolicy::Never => {}
        FallbackPolicy::NoGroupsOnly | FallbackPolicy::MissingGroups if no_answer => {
            extras = select_fallback(candidates, options);
            warn!("Solver returned no groups, selected {} candidates locally", extras.len());
        }
        FallbackPolicy::MissingGroups => {
            let answered: BTreeSet<&str> = response
                .duty_groups()
                .iter()
                .map(|group| group.group_id.as_str())
                .collect();
            let missing_owners: BTreeSet<&str> = request
                .groups()
                .iter()
                .filter(|group| !answered.contains(group.id.as_str()))
                .map(|group| group.owner_id.as_str())
                .collect();
            if !missing_owners.is_empty() {
                let orphaned: Vec<Candidate> = candidates
                    .iter()
                    .filter(|candidate| {
                        candidate_owner(candidate).is_some_and(|owner| missing_owners.contains(owner.as_str()))
                    })
                    .cloned()
                    .collect();
                let local = select_fallback(&orphaned, options);
                warn!(
                    "Solver skipped {} owners, selected {} candidates locally",
                    missing_owners.len(),
                    local.len()
                );
                for candidate in local {
                    if !extras.iter().any(|chosen| chosen.id == candidate.id) {
                        extras.push(candidate);
                    }
                }
            }
        }
        FallbackPolicy::NoGroupsOnly => {}
    }

    (assignments, extras)
}

/// `selectedCandidates` followed by any `selectedIds` not already listed.
fn selected_candidates(response: &SolverResponse, candidates: &[Candidate]) -> Vec<Candidate> {
    let known: HashMap<&str, &Candidate> = candidates
        .iter()
        .map(|candidate| (candidate.id.as_str(), candidate))
        .collect();
    let mut selected: Vec<Candidate> = response.selected_candidates().to_vec();
    for id in response.selected_ids() {
        if selected.iter().any(|candidate| &candidate.id == id) {
            continue;
        }
        match known.get(id.as_str()) {
            Some(candidate) => selected.push((*candidate).clone()),
            None => warn!("Solver selected unknown candidate {}", id),
        }
    }
    selected
}

/// Selected duty candidates, merged per owner and day.
fn legacy_assignments(selected: &[Candidate], sent: &HashMap<&str, &SolverGroup>) -> Vec<DutyAssignment> {
    let mut merged: BTreeMap<(String, String), DutyAssignment> = BTreeMap::new();
    for candidate in selected {
        let Some(group) = candidate.as_duty_group() else {
            continue;
        };
        let Some(assignment) = DutyAssignment::from_group(&group, sent.get(group.group_id.as_str()).copied())
        else {
            warn!("Duty candidate {} has no resolvable day", candidate.id);
            continue;
        };
        merged
            .entry((assignment.owner_id.clone(), assignment.day_key.clone()))
            .and_modify(|existing| existing.duties.extend(assignment.duties.iter().cloned()))
            .or_insert(assignment);
    }
    merged.into_values().collect()
}

fn candidate_owner(candidate: &Candidate) -> Option<String> {
    candidate
        .owner_id()
        .map(str::to_string)
        .or_else(|| {
            candidate
                .service_id()
                .and_then(ServiceId::parse)
                .map(|service| service.owner_id)
        })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::activity::{Activity, ResourceKind};
    use crate::solver::DutyGroup;

    struct Canned(SolverResponse);

    impl SolverBackend for Canned {
        fn solve(&self, _request: &SolverRequest) -> Result<SolverResponse, PlannerError> {
            Ok(self.0.clone())
        }
    }

    fn input(candidates: Vec<Candidate>) -> SolveInput {
        let ride = |id: &str, hour: u32| {
            Activity::new(id, "ride", Utc.with_ymd_and_hms(2025, 3, 14, hour, 0, 0).unwrap())
                .ending(Utc.with_ymd_and_hms(2025, 3, 14, hour + 1, 0, 0).unwrap())
                .with_participant("p1", ResourceKind::PersonnelService)
        };
        let mut snapshot = StageSnapshot::new("stage", "base");
        snapshot.activities = vec![ride("a1", 8), ride("a2", 12)];
        SolveInput {
            snapshot,
            ruleset: Ruleset::new("default", "1"),
            candidates,
        }
    }

    fn break_for(owner: &str, id: &str) -> Candidate {
        Candidate::new(id, "break", CandidateKind::Break)
            .with_param("ownerId", owner)
            .with_param("serviceId", format!("service:stage:{}:2025-03-14", owner))
            .with_param("startMs", Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap().timestamp_millis())
            .with_param("endMs", Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap().timestamp_millis())
    }

    #[test]
    fn test_legacy_duty_candidates_are_merged_per_owner_day() {
        let duty = |id: &str, activity: &str| {
            Candidate::new(id, "duty", CandidateKind::Duty)
                .with_param("ownerId", "p1")
                .with_param("dayKey", "2025-03-14")
                .with_param("activityIds", json!([activity]))
        };
        let candidates = vec![duty("d1", "a1"), duty("d2", "a2")];
        let planner = DutyPlanner::new(
            Canned(SolverResponse {
                selected_ids: Some(vec!["d1".into(), "d2".into()]),
                ..SolverResponse::default()
            }),
            TravelTimeResolver::default(),
        )
        .with_options(SolveOptions {
            fallback: FallbackPolicy::Never,
            ..SolveOptions::default()
        });

        let mutation = planner.solve(&input(candidates)).unwrap();
        let services: BTreeSet<&str> = mutation
            .upserts
            .iter()
            .filter_map(|activity| activity.service_id.as_deref())
            .collect();
        assert!(services.contains("service:stage:p1:2025-03-14:1"));
        assert!(services.contains("service:stage:p1:2025-03-14:2"));
    }

    #[test]
    fn test_missing_groups_policy_covers_skipped_owners() {
        let response = SolverResponse {
            duty_groups: Some(vec![DutyGroup {
                group_id: "group:other:2025-03-14".into(),
                owner_id: Some("other".into()),
                day_key: Some("2025-03-14".into()),
                duties: Vec::new(),
                ..DutyGroup::default()
            }]),
            ..SolverResponse::default()
        };
        let solve = |policy: FallbackPolicy| {
            DutyPlanner::new(Canned(response.clone()), TravelTimeResolver::default())
                .with_options(SolveOptions {
                    fallback: policy,
                    ..SolveOptions::default()
                })
                .solve(&input(vec![break_for("p1", "brk")]))
                .unwrap()
        };

        assert!(solve(FallbackPolicy::NoGroupsOnly).candidates_used.is_empty());
        let covered = solve(FallbackPolicy::MissingGroups);
        assert_eq!(covered.candidates_used.len(), 1);
        assert_eq!(covered.candidates_used[0].id, "brk");
    }
}
