//! Solver request/response contract and the HTTP adapter.
//!
//! The optimization engine runs as a separate service. This module builds its
//! request from the grouped snapshot, sends it, and decodes the answer. A
//! small greedy selector covers break/travel candidates when the service
//! returns no duty groups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::activity::{ResourceKind, StageSnapshot};
use crate::config::SolverConfig;
use crate::error::PlannerError;
use crate::grouping::{SolverGroup, group_id};
use crate::traits::SolverBackend;

pub const DEFAULT_WEIGHT_KEY: &str = "gapMinutes";
const DURATION_KEY: &str = "durationMinutes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Duty,
    Break,
    Travel,
}

/// A unit the optimizer may select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub template_id: String,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, template_id: impl Into<String>, kind: CandidateKind) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            kind,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn param_number(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(coerce_number)
    }

    pub fn service_id(&self) -> Option<&str> {
        self.param_str("serviceId")
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.param_str("ownerId")
    }

    /// Objective weight: the configured key, then `gapMinutes`, then
    /// `durationMinutes`; never below 1.
    pub fn weight(&self, options: &SolveOptions) -> i64 {
        let value = self
            .param_number(&options.weight_key)
            .or_else(|| {
                (options.weight_key != DEFAULT_WEIGHT_KEY)
                    .then(|| self.param_number(DEFAULT_WEIGHT_KEY))
                    .flatten()
            })
            .or_else(|| self.param_number(DURATION_KEY));
        match value {
            Some(number) => (number.round() as i64).max(1),
            None => options.default_weight.max(1),
        }
    }

    /// Reads a legacy duty candidate (`ownerId`, `activityIds`, ...) as a
    /// single-duty group.
    pub fn as_duty_group(&self) -> Option<DutyGroup> {
        if self.kind != CandidateKind::Duty {
            return None;
        }
        let owner_id = self.owner_id()?.to_string();
        let activity_ids: Vec<String> = self
            .params
            .get("activityIds")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if activity_ids.is_empty() {
            return None;
        }
        let owner_kind = self
            .params
            .get("ownerKind")
            .and_then(|kind| serde_json::from_value::<ResourceKind>(kind.clone()).ok());
        let day_key = self.param_str("dayKey").map(str::to_string);
        let group_id = match (self.param_str("groupId"), day_key.as_deref()) {
            (Some(group), _) => group.to_string(),
            (None, Some(day)) => group_id(&owner_id, day),
            (None, None) => self.id.clone(),
        };
        Some(DutyGroup {
            group_id,
            owner_id: Some(owner_id),
            owner_kind,
            day_key,
            duties: vec![activity_ids],
        })
    }
}

/// Numbers and numeric strings; anything else is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: String,
    pub version: String,
}

impl Ruleset {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

/// When the in-process break/travel selector may stand in for the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Only when the solver returned no duty groups and selected nothing.
    #[default]
    NoGroupsOnly,
    /// Also for owners whose groups are missing from the solver's answer.
    MissingGroups,
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOptions {
    /// Selected candidates per service and candidate type.
    pub max_per_service_type: u32,
    /// Selected candidates per service across types.
    pub max_per_service: Option<u32>,
    pub weight_key: String,
    pub default_weight: i64,
    pub time_limit_seconds: Option<f64>,
    pub random_seed: Option<u64>,
    pub fallback: FallbackPolicy,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_per_service_type: 1,
            max_per_service: None,
            weight_key: DEFAULT_WEIGHT_KEY.to_string(),
            default_weight: 1,
            time_limit_seconds: None,
            random_seed: None,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Options as the solver service reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub max_per_service_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_service: Option<u32>,
    pub weight_key: String,
    pub default_weight: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl From<&SolveOptions> for SolverOptions {
    fn from(options: &SolveOptions) -> Self {
        Self {
            max_per_service_type: options.max_per_service_type.max(1),
            max_per_service: options.max_per_service,
            weight_key: options.weight_key.clone(),
            default_weight: options.default_weight,
            time_limit_seconds: options.time_limit_seconds,
            random_seed: options.random_seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRef {
    pub stage_id: String,
    pub variant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timetable_year_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolverProblem {
    pub groups: Vec<SolverGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverRequest {
    pub ruleset_id: String,
    pub ruleset_version: String,
    pub candidates: Vec<Candidate>,
    pub snapshot: SnapshotRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<SolverProblem>,
    pub options: SolverOptions,
}

impl SolverRequest {
    pub fn new(
        ruleset: &Ruleset,
        snapshot: &StageSnapshot,
        candidates: Vec<Candidate>,
        groups: Vec<SolverGroup>,
        options: &SolveOptions,
    ) -> Self {
        Self {
            ruleset_id: ruleset.id.clone(),
            ruleset_version: ruleset.version.clone(),
            candidates,
            snapshot: SnapshotRef {
                stage_id: snapshot.stage_id.clone(),
                variant_id: snapshot.variant_id.clone(),
                timetable_year_label: snapshot.timetable_year_label.clone(),
            },
            problem: (!groups.is_empty()).then_some(SolverProblem { groups }),
            options: SolverOptions::from(options),
        }
    }

    pub fn groups(&self) -> &[SolverGroup] {
        self.problem
            .as_ref()
            .map(|problem| problem.groups.as_slice())
            .unwrap_or(&[])
    }
}

/// The solver's partition of one group into duties.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyGroup {
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_kind: Option<ResourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_key: Option<String>,
    #[serde(default)]
    pub duties: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverStats {
    pub total_candidates: usize,
    pub selected_candidates: usize,
    pub group_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_candidates: Option<Vec<Candidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_groups: Option<Vec<DutyGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SolverStats>,
}

impl SolverResponse {
    pub fn duty_groups(&self) -> &[DutyGroup] {
        self.duty_groups.as_deref().unwrap_or(&[])
    }

    pub fn selected_ids(&self) -> &[String] {
        self.selected_ids.as_deref().unwrap_or(&[])
    }

    pub fn selected_candidates(&self) -> &[Candidate] {
        self.selected_candidates.as_deref().unwrap_or(&[])
    }
}

/// HTTP client for the solver service.
#[derive(Debug, Clone)]
pub struct SolverClient {
    config: SolverConfig,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl SolverClient {
    /// Fails with [`PlannerError::SolverNotConfigured`] when no base URL is set.
    pub fn new(config: SolverConfig) -> Result<Self, PlannerError> {
        let endpoint = config
            .endpoint()
            .ok_or(PlannerError::SolverNotConfigured)?
            .to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlannerError::SolverTransport(e.to_string()))?;

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// True when the service answers its health probe with a success status.
    pub fn health(&self) -> Result<bool, PlannerError> {
        let response = self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .map_err(|e| self.request_error(e))?;
        Ok(response.status().is_success())
    }

    fn request_error(&self, err: reqwest::Error) -> PlannerError {
        if err.is_timeout() {
            PlannerError::SolverTimeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else {
            PlannerError::SolverTransport(err.to_string())
        }
    }
}

impl SolverBackend for SolverClient {
    fn solve(&self, request: &SolverRequest) -> Result<SolverResponse, PlannerError> {
        let url = format!("{}/solve", self.endpoint);
        info!(
            "Sending {} candidates and {} groups to solver at {}",
            request.candidates.len(),
            request.groups().len(),
            url
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PlannerError::SolverStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().map_err(|e| self.request_error(e))?;
        debug!("Solver responded with {} bytes", body.len());
        serde_json::from_str(&body).map_err(|e| PlannerError::SolverResponse(e.to_string()))
    }
}

/// Greedy in-process selection of break/travel candidates.
///
/// Heaviest first, respecting the per-service-and-type and per-service limits.
pub fn select_fallback(candidates: &[Candidate], options: &SolveOptions) -> Vec<Candidate> {
    let mut ranked: Vec<(i64, &Candidate)> = candidates
        .iter()
        .filter(|candidate| matches!(candidate.kind, CandidateKind::Break | CandidateKind::Travel))
        .map(|candidate| (candidate.weight(options), candidate))
        .collect();
    ranked.sort_by(|(weight_a, a), (weight_b, b)| weight_b.cmp(weight_a).then_with(|| a.id.cmp(&b.id)));

    let per_type_limit = options.max_per_service_type.max(1);
    let per_service_limit = options.max_per_service.map(|limit| limit.max(1));
    let mut per_type: HashMap<(&str, CandidateKind), u32> = HashMap::new();
    let mut per_service: HashMap<&str, u32> = HashMap::new();

    let mut selected = Vec::new();
    for (_, candidate) in ranked {
        let service = candidate.service_id().unwrap_or("_");
        let type_count = per_type.entry((service, candidate.kind)).or_default();
        if *type_count >= per_type_limit {
            continue;
        }
        let service_count = per_service.entry(service).or_default();
        if per_service_limit.is_some_and(|limit| *service_count >= limit) {
            continue;
        }
        *type_count += 1;
        *service_count += 1;
        selected.push(candidate.clone());
    }
    selected
}
