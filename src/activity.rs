//! Activities, resources and the stage snapshot the planner works on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SERVICE_PREFIX: &str = "service";
const DAY_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_SERVICE_START_TYPE: &str = "service-start";
pub const DEFAULT_SERVICE_END_TYPE: &str = "service-end";
pub const DEFAULT_BREAK_TYPE: &str = "break";
pub const DEFAULT_TRAVEL_TYPE: &str = "travel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Personnel,
    Vehicle,
    PersonnelService,
    VehicleService,
}

impl ResourceKind {
    pub fn is_service(self) -> bool {
        matches!(self, ResourceKind::PersonnelService | ResourceKind::VehicleService)
    }

    pub fn is_vehicle(self) -> bool {
        matches!(self, ResourceKind::Vehicle | ResourceKind::VehicleService)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub resource_id: String,
    pub kind: ResourceKind,
}

impl Participant {
    pub fn new(resource_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Marks activities the planner synthesizes and may delete again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManagedRole {
    Break,
    Travel,
    DutyStart,
    DutyEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Service per owner for activities shared by several owners.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_by_owner: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<ManagedRole>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

impl Activity {
    pub fn new(id: impl Into<String>, activity_type: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end: None,
            activity_type: activity_type.into(),
            service_id: None,
            participants: Vec::new(),
            location_id: None,
            start_location_id: None,
            end_location_id: None,
            from: None,
            to: None,
            label: None,
            service_by_owner: BTreeMap::new(),
            managed: None,
            attributes: Map::new(),
        }
    }

    pub fn ending(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_participant(mut self, resource_id: &str, kind: ResourceKind) -> Self {
        self.participants.push(Participant::new(resource_id, kind));
        self
    }

    pub fn at(mut self, location_id: &str) -> Self {
        self.location_id = Some(location_id.to_string());
        self
    }

    pub fn between(mut self, from: &str, to: &str) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }

    pub fn with_service(mut self, service_id: &str) -> Self {
        self.service_id = Some(service_id.to_string());
        self
    }

    pub fn managed_as(mut self, role: ManagedRole) -> Self {
        self.managed = Some(role);
        self
    }

    /// End time, or the start for point-in-time activities.
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start).max(self.start)
    }

    /// UTC calendar day of the start, `YYYY-MM-DD`.
    pub fn day_key(&self) -> String {
        day_key(self.start)
    }

    /// Where the activity begins: start location, location, `from`, then label.
    pub fn start_location(&self) -> Option<&str> {
        present(&self.start_location_id)
            .or_else(|| present(&self.location_id))
            .or_else(|| present(&self.from))
            .or_else(|| present(&self.label))
    }

    /// Where the activity ends: end location, location, `to`, then label.
    pub fn end_location(&self) -> Option<&str> {
        present(&self.end_location_id)
            .or_else(|| present(&self.location_id))
            .or_else(|| present(&self.to))
            .or_else(|| present(&self.label))
    }

    /// Service ids this activity currently belongs to.
    pub fn service_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.service_by_owner.values().map(String::as_str).collect();
        if let Some(service_id) = present(&self.service_id) {
            if !ids.contains(&service_id) {
                ids.push(service_id);
            }
        }
        ids
    }

    /// Records `service_id` for `owner_id`, leaving other owners untouched.
    pub fn assign_service(&mut self, owner_id: &str, service_id: &str) {
        self.service_by_owner
            .insert(owner_id.to_string(), service_id.to_string());
        self.refresh_primary_service();
    }

    /// Removes every reference to `service_id`. Returns true if anything changed.
    pub fn unassign_service(&mut self, service_id: &str) -> bool {
        let before = self.service_by_owner.len();
        self.service_by_owner.retain(|_, service| service != service_id);
        let removed = self.service_by_owner.len() != before;
        if removed || self.service_id.as_deref() == Some(service_id) {
            if self.service_id.as_deref() == Some(service_id) {
                self.service_id = None;
            }
            self.refresh_primary_service();
            return true;
        }
        false
    }

    fn refresh_primary_service(&mut self) {
        let mut values = self.service_by_owner.values();
        match (values.next(), values.next()) {
            (None, _) => {}
            (Some(only), None) => self.service_id = Some(only.clone()),
            (Some(first), Some(_)) => {
                let current_listed = self
                    .service_id
                    .as_ref()
                    .is_some_and(|current| self.service_by_owner.values().any(|value| value == current));
                if !current_listed {
                    self.service_id = Some(first.clone());
                }
            }
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.effective_end()
    }
}

pub fn day_key(instant: DateTime<Utc>) -> String {
    instant.date_naive().format(DAY_FORMAT).to_string()
}

/// Deterministic key of one owner's duty on one day of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId {
    pub stage_id: String,
    pub owner_id: String,
    pub day_key: String,
    /// 1-based duty number when an owner has several duties that day.
    pub index: Option<usize>,
}

impl ServiceId {
    pub fn new(stage_id: &str, owner_id: &str, day_key: &str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            owner_id: owner_id.to_string(),
            day_key: day_key.to_string(),
            index: None,
        }
    }

    pub fn numbered(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Parses `service:<stage>:<owner>:<day>[:<n>]`. Owner ids may contain colons.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split(':').collect();
        if parts.len() < 4 || parts[0] != SERVICE_PREFIX {
            return None;
        }

        let is_day = |part: &str| NaiveDate::parse_from_str(part, DAY_FORMAT).is_ok();
        let (day_position, index) = match parts.last().and_then(|last| last.parse::<usize>().ok()) {
            Some(index) if parts.len() >= 5 && is_day(parts[parts.len() - 2]) => {
                (parts.len() - 2, Some(index))
            }
            _ if is_day(parts[parts.len() - 1]) => (parts.len() - 1, None),
            _ => return None,
        };
        if day_position < 3 {
            return None;
        }

        Some(Self {
            stage_id: parts[1].to_string(),
            owner_id: parts[2..day_position].join(":"),
            day_key: parts[day_position].to_string(),
            index,
        })
    }

    pub fn start_boundary_id(&self) -> String {
        format!("start:{}", self)
    }

    pub fn end_boundary_id(&self) -> String {
        format!("end:{}", self)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            SERVICE_PREFIX, self.stage_id, self.owner_id, self.day_key
        )?;
        if let Some(index) = self.index {
            write!(f, ":{}", index)?;
        }
        Ok(())
    }
}

/// Activities and resources of one planning stage at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub stage_id: String,
    pub variant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timetable_year_label: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl StageSnapshot {
    pub fn new(stage_id: &str, variant_id: &str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            variant_id: variant_id.to_string(),
            ..Self::default()
        }
    }

    pub fn resource_kind(&self, id: &str) -> Option<ResourceKind> {
        self.resources
            .iter()
            .find(|resource| resource.id == id)
            .map(|resource| resource.kind)
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.id == id)
    }
}

/// Catalog entry for an activity type; only the planner-relevant flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub id: String,
    #[serde(default)]
    pub is_service_start: bool,
    #[serde(default)]
    pub is_service_end: bool,
    #[serde(default)]
    pub is_vehicle_on: bool,
    #[serde(default)]
    pub is_vehicle_off: bool,
    #[serde(default)]
    pub is_break: bool,
    #[serde(default)]
    pub is_travel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCatalog {
    #[serde(default)]
    pub definitions: Vec<ActivityDefinition>,
}

impl ActivityCatalog {
    pub fn new(definitions: Vec<ActivityDefinition>) -> Self {
        Self { definitions }
    }

    fn first_flagged(&self, flagged: impl Fn(&ActivityDefinition) -> bool) -> Option<&str> {
        self.definitions
            .iter()
            .find(|definition| flagged(definition))
            .map(|definition| definition.id.as_str())
    }

    /// Activity types for the start and end boundary of a duty.
    pub fn boundary_types(&self, owner_kind: ResourceKind) -> (String, String) {
        let vehicle = owner_kind.is_vehicle();
        let start = vehicle
            .then(|| self.first_flagged(|definition| definition.is_vehicle_on))
            .flatten()
            .or_else(|| self.first_flagged(|definition| definition.is_service_start))
            .unwrap_or(DEFAULT_SERVICE_START_TYPE);
        let end = vehicle
            .then(|| self.first_flagged(|definition| definition.is_vehicle_off))
            .flatten()
            .or_else(|| self.first_flagged(|definition| definition.is_service_end))
            .unwrap_or(DEFAULT_SERVICE_END_TYPE);
        (start.to_string(), end.to_string())
    }

    pub fn break_type(&self) -> String {
        self.first_flagged(|definition| definition.is_break)
            .unwrap_or(DEFAULT_BREAK_TYPE)
            .to_string()
    }

    pub fn travel_type(&self) -> String {
        self.first_flagged(|definition| definition.is_travel)
            .unwrap_or(DEFAULT_TRAVEL_TYPE)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_location_fallbacks() {
        let mut activity = Activity::new("a", "ride", at(8)).between("X", "Y");
        assert_eq!(activity.start_location(), Some("X"));
        assert_eq!(activity.end_location(), Some("Y"));

        activity.location_id = Some("L".into());
        assert_eq!(activity.start_location(), Some("L"));
        activity.end_location_id = Some("E".into());
        assert_eq!(activity.end_location(), Some("E"));

        let labelled = Activity {
            label: Some("Spandau".into()),
            from: Some("  ".into()),
            ..Activity::new("b", "ride", at(8))
        };
        assert_eq!(labelled.start_location(), Some("Spandau"));
        assert_eq!(labelled.end_location(), Some("Spandau"));
    }

    #[test]
    fn test_assign_keeps_other_owners() {
        let mut activity = Activity::new("a", "ride", at(8));
        activity.assign_service("p1", "service:s:p1:2025-03-14");
        assert_eq!(activity.service_id.as_deref(), Some("service:s:p1:2025-03-14"));

        activity.assign_service("v1", "service:s:v1:2025-03-14");
        assert_eq!(activity.service_by_owner.len(), 2);
        assert_eq!(activity.service_id.as_deref(), Some("service:s:p1:2025-03-14"));

        assert!(activity.unassign_service("service:s:p1:2025-03-14"));
        assert_eq!(activity.service_id.as_deref(), Some("service:s:v1:2025-03-14"));
        assert!(!activity.unassign_service("service:s:p1:2025-03-14"));
    }

    #[test]
    fn test_service_id_round_trip_with_index() {
        let id = ServiceId::new("stage-7", "crew:42", "2025-03-14").numbered(2);
        assert_eq!(id.to_string(), "service:stage-7:crew:42:2025-03-14:2");
        assert_eq!(ServiceId::parse(&id.to_string()), Some(id.clone()));
        assert_eq!(id.start_boundary_id(), "start:service:stage-7:crew:42:2025-03-14:2");
    }

    #[test]
    fn test_service_id_rejects_unstructured_values() {
        assert!(ServiceId::parse("svc-123").is_none());
        assert!(ServiceId::parse("service:stage:owner").is_none());
        assert!(ServiceId::parse("service:stage:owner:tomorrow").is_none());
        let plain = ServiceId::parse("service:s:p1:2025-03-14").unwrap();
        assert_eq!(plain.owner_id, "p1");
        assert_eq!(plain.index, None);
    }

    #[test]
    fn test_day_key_uses_utc() {
        let late = Utc.with_ymd_and_hms(2025, 3, 14, 23, 30, 0).unwrap();
        assert_eq!(day_key(late), "2025-03-14");
    }

    #[test]
    fn test_catalog_prefers_vehicle_flags_for_vehicles() {
        let catalog = ActivityCatalog::new(vec![
            ActivityDefinition {
                id: "duty-begin".into(),
                is_service_start: true,
                ..ActivityDefinition::default()
            },
            ActivityDefinition {
                id: "duty-finish".into(),
                is_service_end: true,
                ..ActivityDefinition::default()
            },
            ActivityDefinition {
                id: "vehicle-on".into(),
                is_vehicle_on: true,
                ..ActivityDefinition::default()
            },
        ]);
        assert_eq!(
            catalog.boundary_types(ResourceKind::VehicleService),
            ("vehicle-on".to_string(), "duty-finish".to_string())
        );
        assert_eq!(
            catalog.boundary_types(ResourceKind::PersonnelService),
            ("duty-begin".to_string(), "duty-finish".to_string())
        );
        assert_eq!(
            ActivityCatalog::default().boundary_types(ResourceKind::Personnel),
            (DEFAULT_SERVICE_START_TYPE.to_string(), DEFAULT_SERVICE_END_TYPE.to_string())
        );
    }

    #[test]
    fn test_activity_wire_format() {
        let activity: Activity = serde_json::from_str(
            r#"{"id":"a1","start":"2025-03-14T08:00:00Z","type":"ride","participants":[{"resourceId":"p1","kind":"personnel-service"}],"serviceByOwner":{"p1":"service:s:p1:2025-03-14"},"managed":"duty-start","attributes":{"note":"x"}}"#,
        )
        .unwrap();
        assert_eq!(activity.participants[0].kind, ResourceKind::PersonnelService);
        assert_eq!(activity.managed, Some(ManagedRole::DutyStart));
        assert_eq!(activity.attributes["note"], "x");
    }
}
