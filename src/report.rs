//! Summary statistics and CSV export of detection results

use crate::types::PredictionResult;
use serde::Serialize;
use std::io::Write;

/// Column headers of the exported CSV
pub const CSV_HEADERS: [&str; 4] = ["Index_Original", "Prediction", "Probabilite_Attaque", "Statut"];

/// Aggregate view over one upload's results
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionSummary {
    /// Total records classified
    pub total: usize,
    /// Records classified as attacks
    pub attacks: usize,
    /// Share of attacks (0.0 - 100.0)
    pub attack_percentage: f64,
}

impl DetectionSummary {
    pub fn from_results(results: &[PredictionResult]) -> Self {
        let total = results.len();
        let attacks = results.iter().filter(|r| r.is_attack()).count();
        let attack_percentage = if total > 0 {
            attacks as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            attacks,
            attack_percentage,
        }
    }
}

/// Results classified as attacks, in original order.
pub fn attacks_only(results: &[PredictionResult]) -> Vec<PredictionResult> {
    results.iter().filter(|r| r.is_attack()).cloned().collect()
}

/// Probability rendered as a percentage with two decimals, e.g. `93.41%`.
pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

/// Write results as UTF-8, comma-delimited CSV with a header row.
pub fn write_csv<W: Write>(results: &[PredictionResult], writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(CSV_HEADERS)?;
    for result in results {
        writer.write_record([
            result.index.to_string(),
            result.prediction.to_string(),
            format_probability(result.attack_probability),
            result.status.label().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
