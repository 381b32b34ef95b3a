use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use super::models::TranslationResult;

pub const FALLBACK_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_QUERY: &str = "SELECT * FROM sales_data LIMIT 10";

pub struct FallbackPattern {
    pub matcher: Regex,
    pub sql: &'static str,
    pub explanation: &'static str,
}

// Evaluated top-down and the first match wins, so a question such as
// "average sales by region" resolves to the regional totals template.
const TEMPLATES: [(&str, &str, &str); 5] = [
    (
        r"sales.*by.*region",
        "SELECT region, SUM(sales_amount) as total_sales FROM sales_data GROUP BY region ORDER BY total_sales DESC",
        "Shows total sales amount grouped by region in descending order",
    ),
    (
        r"top.*customers?",
        "SELECT customer_name, SUM(sales_amount) as total_sales FROM sales_data GROUP BY customer_name ORDER BY total_sales DESC LIMIT 10",
        "Shows top 10 customers by total sales amount",
    ),
    (
        r"sales.*q4.*2024",
        "SELECT * FROM sales_data WHERE date_created >= '2024-10-01' AND date_created <= '2024-12-31' ORDER BY date_created DESC",
        "Shows all sales data for Q4 2024 (October to December)",
    ),
    (
        r"products?.*sales",
        "SELECT product_name, SUM(sales_amount) as total_sales, COUNT(*) as transaction_count FROM sales_data GROUP BY product_name ORDER BY total_sales DESC",
        "Shows products with their total sales and transaction count",
    ),
    (
        r"average.*sales",
        "SELECT region, AVG(sales_amount) as avg_sales FROM sales_data GROUP BY region ORDER BY avg_sales DESC",
        "Shows average sales amount by region",
    ),
];

pub static FALLBACK_PATTERNS: LazyLock<Vec<FallbackPattern>> = LazyLock::new(|| {
    TEMPLATES
        .iter()
        .map(|&(pattern, sql, explanation)| FallbackPattern {
            matcher: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("fallback patterns are valid regexes"),
            sql,
            explanation,
        })
        .collect()
});

/// Resolves a question without a language model.
pub fn fallback_translation(natural_language: &str) -> TranslationResult {
    FALLBACK_PATTERNS
        .iter()
        .find(|p| p.matcher.is_match(natural_language))
        .map(|p| TranslationResult {
            sql_query: p.sql.to_string(),
            explanation: format!("{} (using smart pattern matching)", p.explanation),
            estimated_rows: None,
            confidence: FALLBACK_CONFIDENCE,
        })
        .unwrap_or_else(|| TranslationResult {
            sql_query: DEFAULT_QUERY.to_string(),
            explanation: "Showing sample data (please try a more specific query like 'sales by region' or 'top customers')".to_string(),
            estimated_rows: None,
            confidence: DEFAULT_CONFIDENCE,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_template_matches_its_own_phrase() {
        let cases = [
            ("Show me total sales by region", 0),
            ("Who are our top customers?", 1),
            ("sales in Q4 2024", 2),
            ("Show me each product's sales", 3),
            ("average sales amount", 4),
        ];

        for (question, index) in cases {
            let result = fallback_translation(question);
            assert_eq!(result.sql_query, TEMPLATES[index].1, "{}", question);
            assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
            assert!(result.explanation.ends_with("(using smart pattern matching)"));
        }
    }

    #[test]
    fn earlier_patterns_shadow_later_ones() {
        // Matches both "sales.*by.*region" and "average.*sales"; order decides.
        let result = fallback_translation("average sales by region");
        assert_eq!(result.sql_query, TEMPLATES[0].1);

        // Matches "sales.*q4.*2024" and "sales.*by.*region"; region comes first.
        let result = fallback_translation("Show me sales performance by region for Q4 2024");
        assert_eq!(result.sql_query, TEMPLATES[0].1);
    }

    #[test]
    fn matching_ignores_case() {
        let result = fallback_translation("TOP CUSTOMER");
        assert_eq!(result.sql_query, TEMPLATES[1].1);
    }

    #[test]
    fn unmatched_question_gets_default_query() {
        let result = fallback_translation("how is the weather");
        assert_eq!(result.sql_query, DEFAULT_QUERY);
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
        assert!(result.estimated_rows.is_none());
    }
}
