use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemosOut {
    #[serde(default)]
    pub demos: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartParseIn {
    pub name: String,
    pub every_n: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartParseOut {
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw `/api/progress` payload. Every field is optional on the wire:
/// `total_rounds` is null until the server has counted rounds, and
/// `percent` may be omitted entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressOut {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_rounds: Option<u32>,
    #[serde(default)]
    pub processed_rounds: Option<u32>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapOut {
    #[serde(default)]
    pub url: Option<String>,
}
