use geo::Point;

/// One row of the violations dataset after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub facility_id: String,
    pub facility_name: String,
    pub state: String,
    pub city_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `None` when the source text was empty or not a number.
    pub population: Option<u64>,
    pub compliance_begin_date: Option<chrono::NaiveDate>,
    pub year: Option<i32>,
}

impl ViolationRecord {
    /// Location as an x/y point (longitude, latitude), if both coordinates are known.
    pub fn location(&self) -> Option<Point<f64>> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
            _ => None,
        }
    }
}

/// A facility at one coordinate within one year, duplicate rows collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilitySummary {
    pub latitude: f64,
    pub longitude: f64,
    pub facility_id: String,
    pub facility_name: String,
    pub state: String,
    pub city_name: String,
    pub population: Option<u64>,
}

/// All facilities sharing a coordinate within one year.
///
/// `state` and `city_name` come from the first facility at the point. Facilities at
/// one coordinate are assumed to share them; differing values are not reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub total_population: u64,
    pub facility_ids: Vec<String>,
    pub facility_names: Vec<String>,
    pub violation_count: usize,
    pub state: String,
    pub city_name: String,
}

impl LocationMarker {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Everything the map needs for one year.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    pub year: i32,
    pub markers: Vec<LocationMarker>,
    pub center_latitude: f64,
    pub center_longitude: f64,
    /// Sum over the year's raw rows, duplicates included. Not the sum of marker totals.
    pub total_population: u64,
}

impl SceneDescriptor {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
