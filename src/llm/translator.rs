use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fallback::fallback_translation;
use super::models::{ModelTranslation, TranslateRequest, TranslationResult};
use super::{extract_json, ChatPrompt, LlmError, LlmManager};

const DEFAULT_SCHEMA: &str = r#"
CREATE TABLE sales_data (
  id INTEGER PRIMARY KEY,
  region TEXT,
  customer_name TEXT,
  product_name TEXT,
  sales_amount DECIMAL(10,2),
  date_created DATE,
  transaction_count INTEGER
);
"#;

const DEFAULT_CONTEXT: &str = "Standard sales data analysis";
const DEFAULT_EXPLANATION: &str = "Query generated successfully";
const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

/// Natural language to SQL, with a pattern-matching fallback whenever the
/// language model cannot produce a usable answer.
pub struct Translator {
    llm: Arc<LlmManager>,
}

impl Translator {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    /// Never fails: model errors fall through to the fallback templates.
    pub async fn translate(&self, request: &TranslateRequest) -> TranslationResult {
        match self.translate_with_model(request).await {
            Ok(result) => {
                info!(
                    "Model translation succeeded (confidence {:.2})",
                    result.confidence
                );
                result
            }
            Err(e) => {
                warn!("Language model failed, using fallback pattern matching: {}", e);
                fallback_translation(&request.natural_language)
            }
        }
    }

    async fn translate_with_model(
        &self,
        request: &TranslateRequest,
    ) -> Result<TranslationResult, LlmError> {
        let prompt = ChatPrompt::json(
            "You are a SQL expert that converts natural language to SQL queries. Always respond with valid JSON.",
            prepare_prompt(request),
        );

        let content = self.llm.complete(&prompt).await?;
        debug!("Raw translation reply: {}", content);

        let parsed: ModelTranslation = serde_json::from_str(extract_json(&content))
            .map_err(|e| LlmError::ResponseError(format!("Invalid translation JSON: {}", e)))?;

        normalize(parsed)
    }
}

fn prepare_prompt(request: &TranslateRequest) -> String {
    let schema = request
        .schema
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SCHEMA);
    let context = request
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(DEFAULT_CONTEXT);

    format!(
        r#"
You are an expert SQL query generator. Convert the natural language question to a valid SQL query.

Database Schema:
{}

Natural Language Query: "{}"

Additional Context: {}

Please respond with a JSON object containing:
- sqlQuery: The SQL query as a string
- explanation: A brief explanation of what the query does
- estimatedRows: An estimated number of rows that might be returned (optional)
- confidence: A confidence score between 0 and 1

Make sure the SQL is syntactically correct and follows best practices.
"#,
        schema, request.natural_language, context
    )
}

/// Applies defaults and clamps confidence into [0, 1].
pub fn normalize(parsed: ModelTranslation) -> Result<TranslationResult, LlmError> {
    let sql_query = parsed
        .sql_query
        .map(|sql| sql.trim().to_string())
        .filter(|sql| !sql.is_empty())
        .ok_or_else(|| LlmError::ResponseError("Response did not contain sqlQuery".to_string()))?;

    let explanation = parsed
        .explanation
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());

    let confidence = parsed
        .confidence
        .as_ref()
        .and_then(as_number)
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
        .clamp(0.0, 1.0);

    let estimated_rows = parsed
        .estimated_rows
        .as_ref()
        .and_then(as_number)
        .filter(|rows| *rows >= 0.0)
        .map(|rows| rows.round() as u64);

    Ok(TranslationResult {
        sql_query,
        explanation,
        estimated_rows,
        confidence,
    })
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fallback::{DEFAULT_QUERY, FALLBACK_CONFIDENCE};
    use crate::llm::test_support::ScriptedModel;
    use serde_json::json;

    fn translator(model: Arc<ScriptedModel>) -> Translator {
        Translator::new(Arc::new(LlmManager::with_model(Box::new(model))))
    }

    fn request(question: &str) -> TranslateRequest {
        TranslateRequest {
            natural_language: question.to_string(),
            ..Default::default()
        }
    }

    fn parsed(value: serde_json::Value) -> ModelTranslation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn confidence_is_clamped_into_unit_range() {
        for (raw, expected) in [(json!(1.7), 1.0), (json!(-3), 0.0), (json!(0.42), 0.42), (json!("0.9"), 0.9)] {
            let result = normalize(parsed(json!({"sqlQuery": "SELECT 1", "confidence": raw}))).unwrap();
            assert_eq!(result.confidence, expected);
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn missing_fields_get_defaults() {
        let result = normalize(parsed(json!({"sqlQuery": "SELECT 1"}))).unwrap();
        assert_eq!(result.explanation, DEFAULT_EXPLANATION);
        assert_eq!(result.confidence, DEFAULT_MODEL_CONFIDENCE);
        assert_eq!(result.estimated_rows, None);

        let result =
            normalize(parsed(json!({"sqlQuery": "SELECT 1", "estimatedRows": 12.0}))).unwrap();
        assert_eq!(result.estimated_rows, Some(12));
    }

    #[test]
    fn blank_sql_is_a_malformed_reply() {
        assert!(normalize(parsed(json!({"explanation": "nothing"}))).is_err());
        assert!(normalize(parsed(json!({"sqlQuery": "   "}))).is_err());
    }

    #[tokio::test]
    async fn uses_model_answer_when_available() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"sqlQuery": "SELECT region FROM sales_data", "explanation": "Lists regions", "estimatedRows": 4, "confidence": 0.95}"#,
        ));
        let result = translator(model.clone())
            .translate(&TranslateRequest {
                natural_language: "which regions exist".to_string(),
                schema: Some("CREATE TABLE sales_data (region VARCHAR);".to_string()),
                context: Some("regional reporting".to_string()),
            })
            .await;

        assert_eq!(result.sql_query, "SELECT region FROM sales_data");
        assert_eq!(result.explanation, "Lists regions");
        assert_eq!(result.estimated_rows, Some(4));
        assert_eq!(result.confidence, 0.95);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].json);
        assert!(prompts[0].user.contains("\"which regions exist\""));
        assert!(prompts[0].user.contains("CREATE TABLE sales_data (region VARCHAR);"));
        assert!(prompts[0].user.contains("Additional Context: regional reporting"));
    }

    #[tokio::test]
    async fn prompt_falls_back_to_builtin_schema_and_context() {
        let model = Arc::new(ScriptedModel::replying(r#"{"sqlQuery": "SELECT 1"}"#));
        translator(model.clone()).translate(&request("anything")).await;

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].user.contains("customer_name TEXT"));
        assert!(prompts[0].user.contains(DEFAULT_CONTEXT));
    }

    #[tokio::test]
    async fn upstream_failure_uses_matching_template() {
        let model = Arc::new(ScriptedModel::failing("insufficient_quota"));
        let result = translator(model).translate(&request("top customers")).await;

        assert_eq!(
            result.sql_query,
            "SELECT customer_name, SUM(sales_amount) as total_sales FROM sales_data GROUP BY customer_name ORDER BY total_sales DESC LIMIT 10"
        );
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn malformed_reply_uses_default_query_when_nothing_matches() {
        let model = Arc::new(ScriptedModel::replying("I think you want SELECT stuff"));
        let result = translator(model).translate(&request("tell me a joke")).await;

        assert_eq!(result.sql_query, DEFAULT_QUERY);
        assert_eq!(result.confidence, 0.5);
    }
}
