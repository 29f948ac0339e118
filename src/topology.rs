//! Rail topology reference data: operational points and sections of line.

use serde::{Deserialize, Serialize};

use crate::polyline::{GeoPoint, Polyline};

/// A named location in the rail network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalPoint {
    pub unique_op_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OperationalPoint {
    pub fn new(unique_op_id: impl Into<String>) -> Self {
        Self {
            unique_op_id: unique_op_id.into(),
            position: None,
            name: None,
        }
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.position = Some(GeoPoint::new(lat, lng));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionNature {
    Regular,
    Link,
}

/// A free-form tag attached to a section, e.g. `electrified = yes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAttribute {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// An edge between two operational points, traversable in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionOfLine {
    pub id: String,
    pub start_unique_op_id: String,
    pub end_unique_op_id: String,
    pub nature: SectionNature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
    /// Geometry oriented from the start point to the end point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Polyline>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SectionAttribute>,
}

impl SectionOfLine {
    pub fn new(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        nature: SectionNature,
    ) -> Self {
        Self {
            id: id.into(),
            start_unique_op_id: start.into(),
            end_unique_op_id: end.into(),
            nature,
            length_km: None,
            polyline: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_length(mut self, km: f64) -> Self {
        self.length_km = Some(km);
        self
    }

    pub fn with_polyline(mut self, points: Vec<GeoPoint>) -> Self {
        self.polyline = Some(Polyline::new(points));
        self
    }

    pub fn with_attribute(mut self, key: &str, value: Option<&str>) -> Self {
        self.attributes.push(SectionAttribute {
            key: key.to_string(),
            value: value.map(str::to_string),
        });
        self
    }

    /// Both endpoint ids are present.
    pub fn has_endpoints(&self) -> bool {
        !self.start_unique_op_id.trim().is_empty() && !self.end_unique_op_id.trim().is_empty()
    }
}

/// Restricts traversal to sections tagged with `key` (and one of `values`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl AttributeFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(key: impl Into<String>, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    /// Key compared case-insensitively; with values, at least one tag value must match one.
    pub fn matches(&self, attributes: &[SectionAttribute]) -> bool {
        attributes
            .iter()
            .filter(|attribute| attribute.key.eq_ignore_ascii_case(self.key.trim()))
            .any(|attribute| {
                if self.values.is_empty() {
                    return true;
                }
                let Some(value) = attribute.value.as_deref() else {
                    return false;
                };
                self.values
                    .iter()
                    .any(|wanted| wanted.trim().eq_ignore_ascii_case(value.trim()))
            })
    }
}

/// Traversal restrictions applied while searching the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionFilter {
    pub natures: Vec<SectionNature>,
    pub attributes: Vec<AttributeFilter>,
}

impl SectionFilter {
    pub fn regular_only() -> Self {
        Self {
            natures: vec![SectionNature::Regular],
            attributes: Vec::new(),
        }
    }

    pub fn allows(&self, section: &SectionOfLine) -> bool {
        self.natures.contains(&section.nature)
            && self
                .attributes
                .iter()
                .all(|filter| filter.matches(&section.attributes))
    }
}

impl Default for SectionFilter {
    fn default() -> Self {
        Self {
            natures: vec![SectionNature::Regular, SectionNature::Link],
            attributes: Vec::new(),
        }
    }
}
