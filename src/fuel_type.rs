//! Maps the oil type labels reported by the tank gauge to fuel type codes.

/// Gauge oil type labels and the fuel type code each one is recorded as.
const OIL_TYPE_TO_FUEL_TYPE: [(&str, &str); 4] = [
    ("Petrol 92", "001-Octane Ron(92)"),
    ("95 Octane", "002-Octane Ron(95)"),
    ("HSD", "004-Diesel"),
    ("PHSD", "005-Premium Diesel"),
];

/// Get the fuel type code for a gauge `oil_type` label.
///
/// Labels are matched exactly. Returns `None` for labels not in the table.
pub fn fuel_type_for_oil_type(oil_type: &str) -> Option<&'static str> {
    OIL_TYPE_TO_FUEL_TYPE
        .iter()
        .find(|(label, _)| *label == oil_type)
        .map(|(_, fuel_type)| *fuel_type)
}
