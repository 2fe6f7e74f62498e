use crate::types::{LocationMarker, SceneDescriptor};
use anyhow::{Context, Result, anyhow};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;

const MIN_RADIUS: f64 = 5.0;
/// Markers below this population keep the minimum radius.
const RADIUS_POPULATION_THRESHOLD: u64 = 1000;

/// Visual encoding of one marker, derived from the marker and its scene's peak count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub intensity: u8,
    pub color: String,
    pub radius: f64,
}

impl MarkerStyle {
    pub fn for_marker(marker: &LocationMarker, max_violation_count: usize) -> Self {
        let intensity = intensity(marker.violation_count, max_violation_count);
        Self {
            intensity,
            color: hex_color(heat_color(intensity)),
            radius: marker_radius(marker.total_population),
        }
    }
}

/// Largest violation count among the markers, or 1 for an empty scene.
pub fn max_violation_count(markers: &[LocationMarker]) -> usize {
    markers
        .iter()
        .map(|m| m.violation_count)
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Violation count relative to the scene's peak, scaled to 0..=255.
pub fn intensity(violation_count: usize, max_violation_count: usize) -> u8 {
    let ratio = violation_count as f64 / max_violation_count.max(1) as f64;
    (ratio * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Heat ramp: low intensity is orange-yellow, high intensity darkens toward red-black.
pub fn heat_color(intensity: u8) -> [u8; 3] {
    let i = intensity as i32;
    let red = (255 - i).clamp(0, 255) as u8;
    let green = (100 - i / 2).clamp(0, 255) as u8;
    [red, green, 0]
}

fn hex_color(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

pub fn marker_radius(total_population: u64) -> f64 {
    if total_population >= RADIUS_POPULATION_THRESHOLD {
        MIN_RADIUS.max((total_population as f64).ln_1p() * 2.0)
    } else {
        MIN_RADIUS
    }
}

/// Formats a population with comma thousands separators, e.g. `12,345`.
pub fn format_population(population: u64) -> String {
    let digits = population.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn popup_html(marker: &LocationMarker) -> String {
    let join = |items: &[String]| {
        items.iter().map(|s| escape_html(s)).collect::<Vec<_>>().join(", ")
    };
    format!(
        "<b>State:</b> {}<br>\
         <b>City:</b> {}<br>\
         <b>PWS IDs:</b> {}<br>\
         <b>PWS Names:</b> {}<br>\
         <b>Violations:</b> {}<br>\
         <b>Total Population Affected:</b> {}",
        escape_html(&marker.state),
        escape_html(&marker.city_name),
        join(&marker.facility_ids),
        join(&marker.facility_names),
        marker.violation_count,
        format_population(marker.total_population),
    )
}

/// Per-feature properties consumed by the map page.
#[derive(Debug, Serialize)]
struct FeatureProperties<'a> {
    facility_ids: &'a [String],
    facility_names: &'a [String],
    violation_count: usize,
    total_population: u64,
    state: &'a str,
    city_name: &'a str,
    #[serde(flatten)]
    style: MarkerStyle,
    popup: String,
}

fn marker_feature(marker: &LocationMarker, max_violation_count: usize) -> Result<Feature> {
    let properties = FeatureProperties {
        facility_ids: &marker.facility_ids,
        facility_names: &marker.facility_names,
        violation_count: marker.violation_count,
        total_population: marker.total_population,
        state: &marker.state,
        city_name: &marker.city_name,
        style: MarkerStyle::for_marker(marker, max_violation_count),
        popup: popup_html(marker),
    };
    let value = serde_json::to_value(&properties).context("Failed to serialize marker properties")?;
    let properties = match value {
        JsonValue::Object(map) => map,
        other => return Err(anyhow!("Marker properties serialized to a non-object: {}", other)),
    };

    Ok(Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&marker.point()))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Renders a scene as a GeoJSON FeatureCollection, one Point feature per marker.
/// Scene-level values travel as foreign members.
pub fn scene_to_geojson(scene: &SceneDescriptor) -> Result<FeatureCollection> {
    let max_count = max_violation_count(&scene.markers);
    let features = scene
        .markers
        .iter()
        .map(|m| marker_feature(m, max_count))
        .collect::<Result<Vec<_>>>()?;

    let mut members = JsonObject::new();
    members.insert("year".to_string(), json!(scene.year));
    members.insert("center".to_string(), json!([scene.center_latitude, scene.center_longitude]));
    members.insert("total_population".to_string(), json!(scene.total_population));
    members.insert(
        "total_population_label".to_string(),
        json!(format_population(scene.total_population)),
    );
    members.insert("max_violation_count".to_string(), json!(max_count));

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(members),
    })
}

/// Summary line for one year in the generated index.
#[derive(Debug, Clone, Serialize)]
pub struct SceneIndexEntry {
    pub year: i32,
    pub file: String,
    pub markers: usize,
    pub total_population: u64,
}

pub fn write_scene(dir: &Path, scene: &SceneDescriptor) -> Result<SceneIndexEntry> {
    let file = format!("{}.geojson", scene.year);
    let path = dir.join(&file);
    let body = serde_json::to_string(&scene_to_geojson(scene)?)
        .context("Failed to serialize scene")?;
    fs::write(&path, body).with_context(|| format!("Failed to write scene file: {:?}", path))?;

    Ok(SceneIndexEntry {
        year: scene.year,
        file,
        markers: scene.markers.len(),
        total_population: scene.total_population,
    })
}

pub fn write_index(dir: &Path, entries: &[SceneIndexEntry]) -> Result<()> {
    let path = dir.join("index.json");
    let body = serde_json::to_string_pretty(entries).context("Failed to serialize scene index")?;
    fs::write(&path, body).with_context(|| format!("Failed to write scene index: {:?}", path))?;
    Ok(())
}
