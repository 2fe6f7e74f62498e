use crate::types::{FacilitySummary, LocationMarker, SceneDescriptor, ViolationRecord};
use geo::{Centroid, MultiPoint, Point};
use std::collections::HashMap;
use tracing::{debug, info};

/// Hashable identity of a coordinate. Exact float equality, with `-0.0` folded into `0.0`.
type CoordKey = (u64, u64);

fn coord_key(latitude: f64, longitude: f64) -> CoordKey {
    ((latitude + 0.0).to_bits(), (longitude + 0.0).to_bits())
}

/// A record from the requested year with both coordinates present.
struct LocatedRecord<'a> {
    record: &'a ViolationRecord,
    latitude: f64,
    longitude: f64,
}

/// Builds the map scene for `year`.
///
/// Rows are filtered to the year and to known coordinates, then reduced in two
/// passes: duplicate rows of a facility at a coordinate collapse into one
/// [`FacilitySummary`], and facilities sharing a coordinate merge into one
/// [`LocationMarker`]. Both passes keep first-seen order, so the same input always
/// yields the same marker order.
///
/// The scene's `total_population` is summed over the filtered raw rows and so
/// counts a facility once per row, while marker totals count it once per coordinate.
/// A year without data yields an empty scene centered on `default_center`.
pub fn build_scene(records: &[ViolationRecord], year: i32, default_center: Point<f64>) -> SceneDescriptor {
    let filtered = filter_year(records, year);

    if filtered.is_empty() {
        info!("No data for {}. Returning an empty scene.", year);
        return SceneDescriptor {
            year,
            markers: Vec::new(),
            center_latitude: default_center.y(),
            center_longitude: default_center.x(),
            total_population: 0,
        };
    }

    let center = mean_center(&filtered).unwrap_or(default_center);
    let total_population = label_population(&filtered);
    let facilities = summarize_facilities(&filtered);
    let markers = merge_locations(facilities);

    debug!(
        year,
        rows = filtered.len(),
        markers = markers.len(),
        total_population,
        "Built scene"
    );

    SceneDescriptor {
        year,
        markers,
        center_latitude: center.y(),
        center_longitude: center.x(),
        total_population,
    }
}

fn filter_year(records: &[ViolationRecord], year: i32) -> Vec<LocatedRecord<'_>> {
    records
        .iter()
        .filter(|r| r.year == Some(year))
        .filter_map(|record| match (record.latitude, record.longitude) {
            (Some(latitude), Some(longitude)) => Some(LocatedRecord { record, latitude, longitude }),
            _ => None,
        })
        .collect()
}

/// Mean of the raw rows' coordinates, taken before any grouping.
fn mean_center(rows: &[LocatedRecord<'_>]) -> Option<Point<f64>> {
    let points: MultiPoint<f64> = rows
        .iter()
        .map(|r| Point::new(r.longitude, r.latitude))
        .collect();
    points.centroid()
}

fn label_population(rows: &[LocatedRecord<'_>]) -> u64 {
    rows.iter().filter_map(|r| r.record.population).sum()
}

/// First pass: one summary per (latitude, longitude, facility id), keeping the
/// largest population seen and the first name, state and city.
fn summarize_facilities(rows: &[LocatedRecord<'_>]) -> Vec<FacilitySummary> {
    let mut index: HashMap<(CoordKey, &str), usize> = HashMap::new();
    let mut summaries: Vec<FacilitySummary> = Vec::new();

    for row in rows {
        let key = (coord_key(row.latitude, row.longitude), row.record.facility_id.as_str());
        match index.get(&key) {
            Some(&i) => {
                let summary = &mut summaries[i];
                // None orders below Some, so unknown populations never win.
                summary.population = summary.population.max(row.record.population);
            }
            None => {
                index.insert(key, summaries.len());
                summaries.push(FacilitySummary {
                    latitude: row.latitude,
                    longitude: row.longitude,
                    facility_id: row.record.facility_id.clone(),
                    facility_name: row.record.facility_name.clone(),
                    state: row.record.state.clone(),
                    city_name: row.record.city_name.clone(),
                    population: row.record.population,
                });
            }
        }
    }

    summaries
}

/// Second pass: one marker per coordinate. Unknown populations add nothing to the total.
fn merge_locations(facilities: Vec<FacilitySummary>) -> Vec<LocationMarker> {
    let mut index: HashMap<CoordKey, usize> = HashMap::new();
    let mut markers: Vec<LocationMarker> = Vec::new();

    for facility in facilities {
        let key = coord_key(facility.latitude, facility.longitude);
        let i = *index.entry(key).or_insert_with(|| {
            markers.push(LocationMarker {
                latitude: facility.latitude,
                longitude: facility.longitude,
                total_population: 0,
                facility_ids: Vec::new(),
                facility_names: Vec::new(),
                violation_count: 0,
                state: facility.state.clone(),
                city_name: facility.city_name.clone(),
            });
            markers.len() - 1
        });

        let marker = &mut markers[i];
        marker.total_population += facility.population.unwrap_or(0);
        marker.facility_ids.push(facility.facility_id);
        marker.facility_names.push(facility.facility_name);
        marker.violation_count += 1;
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const FALLBACK: [f64; 2] = [37.0902, -95.7129];

    fn fallback() -> Point<f64> {
        Point::new(FALLBACK[1], FALLBACK[0])
    }

    fn record(id: &str, lat: f64, lng: f64, population: Option<u64>, year: i32) -> ViolationRecord {
        ViolationRecord {
            facility_id: id.to_string(),
            facility_name: format!("{id} Water District"),
            state: "CA".to_string(),
            city_name: "Los Angeles".to_string(),
            latitude: Some(lat),
            longitude: Some(lng),
            population,
            compliance_begin_date: chrono::NaiveDate::from_ymd_opt(year, 1, 1),
            year: Some(year),
        }
    }

    #[test]
    fn facilities_sharing_a_point_merge_into_one_marker() {
        let records = vec![
            record("CA001", 34.05, -118.25, Some(2000), 2010),
            record("CA002", 34.05, -118.25, Some(3000), 2010),
        ];

        let scene = build_scene(&records, 2010, fallback());

        assert_eq!(scene.markers.len(), 1);
        let marker = &scene.markers[0];
        assert_eq!((marker.latitude, marker.longitude), (34.05, -118.25));
        assert_eq!(marker.total_population, 5000);
        assert_eq!(marker.violation_count, 2);
        assert_eq!(marker.facility_ids, vec!["CA001", "CA002"]);
        assert_eq!(marker.facility_names, vec!["CA001 Water District", "CA002 Water District"]);
        assert_eq!(scene.total_population, 5000);
    }

    #[test]
    fn duplicate_facility_rows_take_the_max_population() {
        let records = vec![
            record("CA001", 34.05, -118.25, Some(2000), 2010),
            record("CA001", 34.05, -118.25, Some(2500), 2010),
            record("CA001", 34.05, -118.25, None, 2010),
        ];

        let scene = build_scene(&records, 2010, fallback());

        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.markers[0].violation_count, 1);
        assert_eq!(scene.markers[0].total_population, 2500);
        // Label total keeps every row.
        assert_eq!(scene.total_population, 4500);
    }

    #[test]
    fn label_total_equals_marker_sum_without_duplicates() {
        let records = vec![
            record("A", 40.0, -100.0, Some(100), 2015),
            record("B", 40.0, -100.0, None, 2015),
            record("C", 41.0, -101.0, Some(7000), 2015),
        ];

        let scene = build_scene(&records, 2015, fallback());
        let marker_sum: u64 = scene.markers.iter().map(|m| m.total_population).sum();

        assert_eq!(marker_sum, scene.total_population);
        assert_eq!(scene.total_population, 7100);
    }

    #[test]
    fn label_total_never_below_marker_sum() {
        let records = vec![
            record("A", 40.0, -100.0, Some(100), 2015),
            record("A", 40.0, -100.0, Some(100), 2015),
            record("B", 41.0, -101.0, Some(50), 2015),
            record("B", 41.0, -101.0, Some(80), 2015),
        ];

        let scene = build_scene(&records, 2015, fallback());
        let marker_sum: u64 = scene.markers.iter().map(|m| m.total_population).sum();

        assert_eq!(marker_sum, 180);
        assert_eq!(scene.total_population, 330);
        assert!(marker_sum <= scene.total_population);
    }

    #[test]
    fn all_unknown_population_at_a_point_totals_zero() {
        let records = vec![
            record("A", 40.0, -100.0, None, 2015),
            record("B", 40.0, -100.0, None, 2015),
        ];

        let scene = build_scene(&records, 2015, fallback());

        assert_eq!(scene.markers[0].total_population, 0);
        assert_eq!(scene.markers[0].violation_count, 2);
        assert_eq!(scene.total_population, 0);
    }

    #[test]
    fn empty_year_is_an_empty_scene_at_the_fallback_center() {
        let records = vec![record("A", 40.0, -100.0, Some(10), 2015)];

        let scene = build_scene(&records, 1999, fallback());

        assert!(scene.is_empty());
        assert_eq!(scene.total_population, 0);
        assert_eq!(scene.center_latitude, FALLBACK[0]);
        assert_eq!(scene.center_longitude, FALLBACK[1]);
    }

    #[test]
    fn rows_without_coordinates_or_year_are_ignored() {
        let mut no_lat = record("A", 0.0, -100.0, Some(10), 2015);
        no_lat.latitude = None;
        let mut no_lng = record("B", 40.0, 0.0, Some(20), 2015);
        no_lng.longitude = None;
        let mut undated = record("C", 40.0, -100.0, Some(30), 2015);
        undated.year = None;
        let records = vec![no_lat, no_lng, undated];

        let scene = build_scene(&records, 2015, fallback());

        assert!(scene.is_empty());
        assert_eq!(scene.total_population, 0);
        assert_eq!(scene.center_latitude, FALLBACK[0]);
    }

    #[test]
    fn center_is_mean_of_raw_rows_not_markers() {
        let records = vec![
            record("A", 10.0, -100.0, Some(1), 2020),
            record("A", 10.0, -100.0, Some(1), 2020),
            record("B", 40.0, -70.0, Some(1), 2020),
        ];

        let scene = build_scene(&records, 2020, fallback());

        assert_eq!(scene.markers.len(), 2);
        assert!((scene.center_latitude - 20.0).abs() < 1e-9);
        assert!((scene.center_longitude - (-90.0)).abs() < 1e-9);
    }

    #[test]
    fn markers_follow_first_seen_order_with_unique_points() {
        let records = vec![
            record("Z", 45.0, -120.0, Some(1), 2008),
            record("A", 30.0, -90.0, Some(1), 2008),
            record("Y", 45.0, -120.0, Some(1), 2008),
            record("B", 35.0, -95.0, Some(1), 2008),
            record("Q", 30.0, -90.0, Some(1), 2009),
        ];

        let scene = build_scene(&records, 2008, fallback());

        let points: Vec<(f64, f64)> = scene.markers.iter().map(|m| (m.latitude, m.longitude)).collect();
        assert_eq!(points, vec![(45.0, -120.0), (30.0, -90.0), (35.0, -95.0)]);
        assert_eq!(scene.markers[0].facility_ids, vec!["Z", "Y"]);

        let distinct: HashSet<_> = scene.markers.iter().map(|m| coord_key(m.latitude, m.longitude)).collect();
        assert_eq!(distinct.len(), scene.markers.len());

        for marker in &scene.markers {
            assert_eq!(marker.violation_count, marker.facility_ids.len());
            assert_eq!(marker.violation_count, marker.facility_names.len());
        }
    }

    #[test]
    fn same_facility_at_two_points_counts_at_each() {
        let records = vec![
            record("A", 30.0, -90.0, Some(100), 2011),
            record("A", 31.0, -91.0, Some(200), 2011),
        ];

        let scene = build_scene(&records, 2011, fallback());

        assert_eq!(scene.markers.len(), 2);
        assert!(scene.markers.iter().all(|m| m.violation_count == 1));
    }

    #[test]
    fn first_seen_state_and_city_win() {
        let mut first = record("A", 30.0, -90.0, Some(1), 2011);
        first.city_name = "Metairie".to_string();
        let mut second = record("B", 30.0, -90.0, Some(1), 2011);
        second.city_name = "Kenner".to_string();
        second.state = "MS".to_string();

        let scene = build_scene(&[first, second], 2011, fallback());

        assert_eq!(scene.markers[0].city_name, "Metairie");
        assert_eq!(scene.markers[0].state, "CA");
    }

    #[test]
    fn negative_zero_shares_a_point_with_zero() {
        let records = vec![
            record("A", 0.0, 10.0, Some(1), 2011),
            record("B", -0.0, 10.0, Some(1), 2011),
        ];

        let scene = build_scene(&records, 2011, fallback());

        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.markers[0].violation_count, 2);
    }

    #[test]
    fn repeated_builds_are_identical() {
        let records = vec![
            record("A", 30.0, -90.0, Some(100), 2012),
            record("B", 31.0, -91.0, Some(1200), 2012),
            record("C", 30.0, -90.0, None, 2012),
            record("B", 31.0, -91.0, Some(1300), 2012),
        ];

        let first = build_scene(&records, 2012, fallback());
        let second = build_scene(&records, 2012, fallback());

        assert_eq!(first, second);
    }
}
