use crate::config::{AppConfig, ColumnConfig};
use crate::processing;
use crate::types::{SceneDescriptor, ViolationRecord};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use geo::Point;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::info;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d-%b-%y",
    "%d-%b-%Y",
];

/// `%Y` also accepts one- and two-digit years, so anything below this is a misread short year.
const MIN_FOUR_DIGIT_YEAR: i32 = 1000;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// The normalized dataset, loaded once and shared read-only by every scene build.
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    records: Vec<ViolationRecord>,
    default_center: Point<f64>,
}

impl DatasetHandle {
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let records = load_records(&config.input.data_csv, &config.input.columns)?;
        Ok(Self::from_records(records, config.scene.default_center))
    }

    /// `default_center` is `[latitude, longitude]`.
    pub fn from_records(records: Vec<ViolationRecord>, default_center: [f64; 2]) -> Self {
        Self {
            records,
            default_center: Point::new(default_center[1], default_center[0]),
        }
    }

    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }

    pub fn build_scene(&self, year: i32) -> SceneDescriptor {
        processing::build_scene(&self.records, year, self.default_center)
    }

    /// Builds every year in `years` in parallel, returned in year order.
    pub fn build_scenes(&self, years: RangeInclusive<i32>) -> Vec<SceneDescriptor> {
        years
            .into_par_iter()
            .map(|year| self.build_scene(year))
            .collect()
    }

    /// Distinct years present in the data, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.records
            .iter()
            .filter_map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Column positions resolved from the CSV header.
struct ColumnIndices {
    facility_id: usize,
    facility_name: Option<usize>,
    state: Option<usize>,
    city_name: Option<usize>,
    latitude: usize,
    longitude: usize,
    population: usize,
    compliance_begin_date: usize,
}

impl ColumnIndices {
    fn resolve(headers: &StringRecord, columns: &ColumnConfig) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| anyhow!("Required column '{}' not found in CSV", name))
        };

        Ok(Self {
            facility_id: require(&columns.facility_id)?,
            facility_name: find(&columns.facility_name),
            state: find(&columns.state),
            city_name: find(&columns.city_name),
            latitude: require(&columns.latitude)?,
            longitude: require(&columns.longitude)?,
            population: require(&columns.population)?,
            compliance_begin_date: require(&columns.compliance_begin_date)?,
        })
    }
}

pub fn load_records(path: &Path, columns: &ColumnConfig) -> Result<Vec<ViolationRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = rdr.headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .clone();
    let idx = ColumnIndices::resolve(&headers, columns)?;

    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let raw = result.with_context(|| format!("Malformed CSV row {} in {:?}", row + 1, path))?;
        records.push(normalize_row(&raw, &idx));
    }

    let unknown_population = records.iter().filter(|r| r.population.is_none()).count();
    let undated = records.iter().filter(|r| r.year.is_none()).count();
    let unlocated = records.iter().filter(|r| r.location().is_none()).count();
    info!(
        rows = records.len(),
        unknown_population,
        undated,
        unlocated,
        "Loaded violation records from {:?}", path
    );

    Ok(records)
}

fn normalize_row(raw: &StringRecord, idx: &ColumnIndices) -> ViolationRecord {
    let field = |i: usize| raw.get(i).unwrap_or("");
    let text = |i: Option<usize>| i.map(|i| field(i).to_string()).unwrap_or_default();

    let compliance_begin_date = parse_date(field(idx.compliance_begin_date));

    ViolationRecord {
        facility_id: field(idx.facility_id).to_string(),
        facility_name: text(idx.facility_name),
        state: text(idx.state),
        city_name: text(idx.city_name),
        latitude: parse_coordinate(field(idx.latitude)),
        longitude: parse_coordinate(field(idx.longitude)),
        population: parse_population(field(idx.population)),
        compliance_begin_date,
        year: compliance_begin_date.map(|d| d.year()),
    }
}

/// Parses population text such as `"12,345"`. Empty, negative or non-numeric text is `None`.
pub fn parse_population(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v.round() as u64),
        _ => None,
    }
}

pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let plausible = |d: NaiveDate| d.year() >= MIN_FOUR_DIGIT_YEAR;

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive()).filter(|d| plausible(*d));
    }
    let datetime = DATETIME_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .find(|d| plausible(*d));
    if datetime.is_some() {
        return datetime;
    }
    // Date-times with a trailing time or AM/PM marker fall back to their date part.
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .find(|d| plausible(*d))
}
