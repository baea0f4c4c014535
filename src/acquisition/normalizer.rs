//! Sensor type normalization
//!
//! Vendors label the same physical quantity in many ways ("Motor Temp",
//! "THERMAL_1", "rh_sensor"). Labels are mapped onto the four canonical
//! types by case-insensitive substring match. Keyword sets are checked in a
//! fixed priority order so ambiguous labels ("thermal stress") always resolve
//! the same way.

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const TENSION: &str = "tension";
pub const VIBRATION: &str = "vibration";

/// Keyword sets in priority order. The first matching set wins.
const KEYWORDS: [(&str, &[&str]); 4] = [
    (TEMPERATURE, &["temp", "temperature", "thermal"]),
    (HUMIDITY, &["humidity", "moisture", "rh"]),
    (TENSION, &["tension", "pressure", "force", "stress"]),
    (VIBRATION, &["vibration", "vibr", "oscillation", "shake"]),
];

/// Normalize a raw vendor label.
///
/// Returns one of the canonical names, or the lowercased, trimmed input when
/// no keyword matches.
pub fn normalize_sensor_type(raw: &str) -> String {
    let label = raw.trim().to_lowercase();

    KEYWORDS
        .iter()
        .find(|(_, terms)| terms.iter().any(|term| label.contains(term)))
        .map_or(label, |(canonical, _)| (*canonical).to_string())
}
