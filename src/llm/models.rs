use serde::{Deserialize, Serialize};

// Input for NL -> SQL translation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub natural_language: String,
    pub schema: Option<String>,
    pub context: Option<String>,
}

// Output of NL -> SQL translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub sql_query: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
    pub confidence: f64,
}

// What the model is asked to return for a translation; every field is optional
// because nothing guarantees the model follows instructions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTranslation {
    pub sql_query: Option<String>,
    pub explanation: Option<String>,
    pub estimated_rows: Option<serde_json::Value>,
    pub confidence: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub optimized_query: String,
    pub improvements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptimization {
    pub optimized_query: Option<String>,
    pub improvements: Option<Vec<String>>,
}
