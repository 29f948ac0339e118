//! A small slice of the Berlin S-Bahn network for realistic fixtures.
//!
//! Station coordinates are approximate platform centres taken from
//! OpenStreetMap. Sections carry no explicit length, so weights come from
//! the endpoint positions.

use rail_duty_planner::topology::{OperationalPoint, SectionNature, SectionOfLine};
use rail_duty_planner::travel::{PersonnelSite, TransferEdge, TransferEndpoint};

/// A named station with coordinates.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Station {
    pub const fn new(id: &'static str, name: &'static str, lat: f64, lng: f64) -> Self {
        Self { id, name, lat, lng }
    }

    pub fn point(&self) -> OperationalPoint {
        OperationalPoint::new(self.id).at(self.lat, self.lng).named(self.name)
    }
}

// ============================================================================
// Stations
// ============================================================================

pub const SPANDAU: Station = Station::new("DE-BSPD", "Berlin-Spandau", 52.5347, 13.1975);
pub const WESTKREUZ: Station = Station::new("DE-BWKR", "Berlin Westkreuz", 52.5011, 13.2831);
pub const HAUPTBAHNHOF: Station = Station::new("DE-BHBF", "Berlin Hauptbahnhof", 52.5251, 13.3694);
pub const FRIEDRICHSTRASSE: Station = Station::new("DE-BFRS", "Berlin Friedrichstraße", 52.5203, 13.3869);
pub const ALEXANDERPLATZ: Station = Station::new("DE-BALX", "Berlin Alexanderplatz", 52.5219, 13.4114);
pub const OSTBAHNHOF: Station = Station::new("DE-BOST", "Berlin Ostbahnhof", 52.5105, 13.4349);
pub const OSTKREUZ: Station = Station::new("DE-BOKR", "Berlin Ostkreuz", 52.5031, 13.4694);
pub const SUEDKREUZ: Station = Station::new("DE-BPAP", "Berlin Südkreuz", 52.4753, 13.3656);
pub const GESUNDBRUNNEN: Station = Station::new("DE-BGSB", "Berlin Gesundbrunnen", 52.5488, 13.3883);

/// A point that no section touches.
pub const TEMPELHOF_FIELD: Station = Station::new("DE-XTHF", "Tempelhofer Feld", 52.4731, 13.4039);

pub const STATIONS: &[Station] = &[
    SPANDAU,
    WESTKREUZ,
    HAUPTBAHNHOF,
    FRIEDRICHSTRASSE,
    ALEXANDERPLATZ,
    OSTBAHNHOF,
    OSTKREUZ,
    SUEDKREUZ,
    GESUNDBRUNNEN,
    TEMPELHOF_FIELD,
];

pub fn operational_points() -> Vec<OperationalPoint> {
    STATIONS.iter().map(Station::point).collect()
}

fn regular(id: &str, from: &Station, to: &Station) -> SectionOfLine {
    SectionOfLine::new(id, from.id, to.id, SectionNature::Regular)
}

// ============================================================================
// Sections
// ============================================================================

/// Stadtbahn, both ring halves, the north-south main line and one link
/// chord that short-cuts the Stadtbahn.
pub fn sections_of_line() -> Vec<SectionOfLine> {
    vec![
        regular("SOL-STB-1", &SPANDAU, &WESTKREUZ).with_attribute("electrified", Some("yes")),
        regular("SOL-STB-2", &WESTKREUZ, &HAUPTBAHNHOF).with_attribute("electrified", Some("yes")),
        regular("SOL-STB-3", &HAUPTBAHNHOF, &FRIEDRICHSTRASSE).with_attribute("electrified", Some("yes")),
        regular("SOL-STB-4", &FRIEDRICHSTRASSE, &ALEXANDERPLATZ).with_attribute("electrified", Some("yes")),
        regular("SOL-STB-5", &ALEXANDERPLATZ, &OSTBAHNHOF).with_attribute("electrified", Some("yes")),
        regular("SOL-STB-6", &OSTBAHNHOF, &OSTKREUZ).with_attribute("electrified", Some("yes")),
        regular("SOL-RING-S1", &WESTKREUZ, &SUEDKREUZ).with_attribute("electrified", Some("yes")),
        regular("SOL-RING-S2", &SUEDKREUZ, &OSTKREUZ).with_attribute("electrified", Some("yes")),
        regular("SOL-RING-N1", &GESUNDBRUNNEN, &OSTKREUZ).with_attribute("electrified", Some("no")),
        regular("SOL-NS-1", &GESUNDBRUNNEN, &HAUPTBAHNHOF)
            .with_attribute("electrified", Some("yes"))
            .with_attribute("tunnel", None),
        regular("SOL-NS-2", &HAUPTBAHNHOF, &SUEDKREUZ)
            .with_attribute("electrified", Some("yes"))
            .with_attribute("tunnel", None),
        SectionOfLine::new("SOL-LINK-1", HAUPTBAHNHOF.id, OSTBAHNHOF.id, SectionNature::Link),
        SectionOfLine::new("SOL-BROKEN", "", OSTKREUZ.id, SectionNature::Regular),
    ]
}

// ============================================================================
// Personnel sites and walking transfers
// ============================================================================

pub fn personnel_sites() -> Vec<PersonnelSite> {
    vec![
        PersonnelSite {
            id: "SITE-RUM".into(),
            name: Some("Betriebswerk Rummelsburg".into()),
            unique_op_id: Some(OSTKREUZ.id.into()),
        },
        PersonnelSite {
            id: "SITE-GSB".into(),
            name: Some("Meldestelle Gesundbrunnen".into()),
            unique_op_id: Some(GESUNDBRUNNEN.id.into()),
        },
    ]
}

/// Walking times in seconds between neighbouring stations.
pub fn transfers() -> Vec<TransferEdge> {
    vec![
        TransferEdge::walk(TransferEndpoint::op(HAUPTBAHNHOF.id), TransferEndpoint::op(FRIEDRICHSTRASSE.id), 15 * 60)
            .both_ways(),
        TransferEdge::walk(TransferEndpoint::op(FRIEDRICHSTRASSE.id), TransferEndpoint::op(ALEXANDERPLATZ.id), 22 * 60)
            .both_ways(),
        TransferEdge::walk(TransferEndpoint::site("SITE-RUM"), TransferEndpoint::op(OSTBAHNHOF.id), 25 * 60),
    ]
}
