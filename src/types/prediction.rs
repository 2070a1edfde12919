//! Per-row detection results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable status of a classified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Attaque")]
    Attack,
}

impl Status {
    /// Map a prediction code to a status. Only 0 and 1 are valid.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Status::Normal),
            1 => Some(Status::Attack),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Status::Normal => 0,
            Status::Attack => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Normal => "Normal",
            Status::Attack => "Attaque",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of one uploaded row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Row position in the uploaded table
    #[serde(rename = "Index_Original")]
    pub index: usize,
    /// 0 = normal, 1 = attack
    #[serde(rename = "Prediction")]
    pub prediction: u8,
    /// Probability of the attack class (0.0 - 1.0)
    #[serde(rename = "Probabilite_Attaque")]
    pub attack_probability: f64,
    #[serde(rename = "Statut")]
    pub status: Status,
}

impl PredictionResult {
    pub fn new(index: usize, status: Status, attack_probability: f64) -> Self {
        Self {
            index,
            prediction: status.code(),
            attack_probability,
            status,
        }
    }

    pub fn is_attack(&self) -> bool {
        self.status == Status::Attack
    }
}
