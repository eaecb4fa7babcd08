//! Tool input types.
//!
//! Each input derives a JSON Schema for `tools/list`, validates itself with
//! [`Validate`], builds the engine request and produces the cache
//! fingerprint. Fingerprints list every field that changes the engine's
//! answer in a fixed order, with coordinates rounded to six decimals.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use valhalla_lib::engine::{
    Contour, DirectionsOptions, IsochroneRequest, Location, RouteRequest, TravelMode, Units,
};
use valhalla_lib::validation::{Issues, Rule, Validate, ValidationError};

/// Colour of the single requested contour.
pub const CONTOUR_COLOR: &str = "ff0000";

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    /// Latitude, -90 to 90
    pub lat: f64,
    /// Longitude, -180 to 180
    pub lon: f64,
}

impl Point {
    fn fingerprint(self) -> String {
        format!("{:.6},{:.6}", normalize(self.lat), normalize(self.lon))
    }
}

/// Round to the fingerprint precision and fold `-0.0` into `0.0`.
fn normalize(value: f64) -> f64 {
    (value * 1e6).round() / 1e6 + 0.0
}

fn optional_key(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Input for the `route` tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RouteInput {
    /// Starting point
    pub origin: Point,

    /// End point
    pub destination: Point,

    /// Travel mode (default: auto)
    #[serde(default)]
    pub mode: TravelMode,

    /// Number of alternative routes to request, 0 to 5
    #[serde(default)]
    pub alternatives: Option<f64>,

    /// Distance units (default: kilometers)
    #[serde(default)]
    pub units: Units,
}

impl RouteInput {
    /// Requested alternates, 0 when absent. Only meaningful after validation.
    pub fn alternatives(&self) -> u8 {
        self.alternatives.map_or(0, |n| n as u8)
    }

    pub fn fingerprint(&self) -> String {
        format!(
            "route|{}|{}|{}|{}|{}",
            self.origin.fingerprint(),
            self.destination.fingerprint(),
            self.mode,
            self.units,
            self.alternatives()
        )
    }

    pub fn to_request(&self) -> RouteRequest {
        let alternates = self.alternatives();
        RouteRequest {
            locations: vec![
                Location::stop(self.origin.lat, self.origin.lon),
                Location::stop(self.destination.lat, self.destination.lon),
            ],
            costing: self.mode,
            directions_options: Some(DirectionsOptions {
                units: self.units,
                narrative: true,
            }),
            alternates: (alternates > 0).then_some(alternates),
        }
    }
}

impl Validate for RouteInput {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", self.origin.lat, self.origin.lon);
        issues.check_coordinate("destination", self.destination.lat, self.destination.lon);
        if let Some(n) = self.alternatives {
            issues.check_range(
                "alternatives",
                n,
                0.0,
                5.0,
                "Alternatives must be between 0 and 5",
            );
            if n.is_finite() && n.fract() != 0.0 {
                issues.push("alternatives", "Alternatives must be an integer", Rule::Integer);
            }
        }
        issues.finish()
    }
}

fn default_polygons() -> bool {
    true
}

/// Input for the `isochrone` tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IsochroneInput {
    /// Centre point
    pub origin: Point,

    /// Travel time budget in minutes, 1 to 120 (exclusive with distance_km)
    #[serde(default)]
    pub minutes: Option<f64>,

    /// Travel distance budget in kilometers, 0.1 to 100 (exclusive with minutes)
    #[serde(default)]
    pub distance_km: Option<f64>,

    /// Travel mode (default: auto)
    #[serde(default)]
    pub mode: TravelMode,

    /// Return polygons instead of lines (default: true)
    #[serde(default = "default_polygons")]
    pub polygons: bool,

    /// Denoise factor, 0 to 1
    #[serde(default)]
    pub denoise: Option<f64>,

    /// Generalization tolerance in meters, 0 to 1000
    #[serde(default)]
    pub generalize: Option<f64>,
}

impl IsochroneInput {
    pub fn fingerprint(&self) -> String {
        let budget = match (self.minutes, self.distance_km) {
            (Some(minutes), _) => format!("time={minutes}"),
            (None, Some(km)) => format!("distance={km}"),
            (None, None) => "-".to_string(),
        };
        format!(
            "isochrone|{}|{}|{}|polygons={}|denoise={}|generalize={}",
            self.origin.fingerprint(),
            self.mode,
            budget,
            self.polygons,
            optional_key(self.denoise),
            optional_key(self.generalize)
        )
    }

    pub fn to_request(&self) -> IsochroneRequest {
        IsochroneRequest {
            locations: vec![Location::new(self.origin.lat, self.origin.lon)],
            costing: self.mode,
            contours: vec![Contour {
                time: self.minutes,
                distance: if self.minutes.is_some() {
                    None
                } else {
                    self.distance_km
                },
                color: Some(CONTOUR_COLOR.to_string()),
            }],
            polygons: self.polygons,
            denoise: self.denoise,
            generalize: self.generalize,
        }
    }
}

impl Validate for IsochroneInput {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", self.origin.lat, self.origin.lon);

        match (self.minutes, self.distance_km) {
            (Some(minutes), None) => issues.check_range(
                "minutes",
                minutes,
                1.0,
                120.0,
                "Minutes must be between 1 and 120",
            ),
            (None, Some(km)) => issues.check_range(
                "distance_km",
                km,
                0.1,
                100.0,
                "Distance must be between 0.1 and 100 km",
            ),
            (Some(_), Some(_)) => issues.push(
                "minutes",
                "Specify either minutes or distance_km, not both",
                Rule::Exclusive,
            ),
            (None, None) => issues.push(
                "minutes",
                "One of minutes or distance_km is required",
                Rule::Exclusive,
            ),
        }

        if let Some(denoise) = self.denoise {
            issues.check_range(
                "denoise",
                denoise,
                0.0,
                1.0,
                "Denoise must be between 0 and 1",
            );
        }
        if let Some(generalize) = self.generalize {
            issues.check_range(
                "generalize",
                generalize,
                0.0,
                1000.0,
                "Generalize must be between 0 and 1000",
            );
        }
        issues.finish()
    }
}
