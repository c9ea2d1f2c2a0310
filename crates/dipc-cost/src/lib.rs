//! # Cost Estimator (C3)
//!
//! Given `(file-url or file-info, model, provider, limit)`, predicts tokens
//! and cost, and renders a hard gate decision.

pub mod pricing;

use serde::{Deserialize, Serialize};

use pricing::{ModelPricing, pricing_for};

const BASE_SYSTEM_TOKENS: f64 = 500.0;
const OUTPUT_TOKENS_ESTIMATE: u64 = 1000;
const SIZE_BASED_SAFETY_FACTOR: f64 = 2.0;
const CONTENT_BASED_SAFETY_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pdf,
    Image,
    Text,
    Word,
    Unknown,
}

impl DocumentType {
    fn text_ratio(self) -> f64 {
        match self {
            DocumentType::Text => 0.25,
            DocumentType::Pdf => 0.3,
            DocumentType::Word => 0.3,
            DocumentType::Unknown => 0.35,
            DocumentType::Image => unreachable!("images use the fixed-token formula, not a ratio"),
        }
    }
}

/// Detect `document_type` from `content_type` first, filename extension
/// second.
pub fn detect_document_type(filename: &str, content_type: Option<&str>) -> DocumentType {
    if let Some(ct) = content_type {
        if ct.starts_with("image/") {
            return DocumentType::Image;
        }
        if ct == "application/pdf" {
            return DocumentType::Pdf;
        }
        if ct == "text/plain" || ct == "text/csv" {
            return DocumentType::Text;
        }
        if ct.contains("word") || ct.contains("document") {
            return DocumentType::Word;
        }
    }

    let lower = filename.to_lowercase();
    if lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".png")
        || lower.ends_with(".gif")
        || lower.ends_with(".webp")
        || lower.ends_with(".bmp")
    {
        DocumentType::Image
    } else if lower.ends_with(".pdf") {
        DocumentType::Pdf
    } else if lower.ends_with(".txt") || lower.ends_with(".csv") || lower.ends_with(".md") {
        DocumentType::Text
    } else if lower.ends_with(".doc") || lower.ends_with(".docx") {
        DocumentType::Word
    } else {
        DocumentType::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub estimated_tokens: u64,
    pub document_type: DocumentType,
    pub confidence: f64,
}

/// Estimate input tokens from file size.
pub fn estimate_tokens_from_file_size(file_size_bytes: u64, document_type: DocumentType) -> TokenEstimate {
    let (base_tokens, confidence) = if document_type == DocumentType::Image {
        let size_factor = (file_size_bytes as f64 / (1024.0 * 1024.0)).min(10.0);
        let tokens = 1000.0 + size_factor * 200.0;
        (tokens, 0.7)
    } else {
        let ratio = document_type.text_ratio();
        let tokens = file_size_bytes as f64 * ratio;
        let confidence = if document_type == DocumentType::Unknown { 0.6 } else { 0.8 };
        (tokens, confidence)
    };

    TokenEstimate {
        estimated_tokens: (base_tokens + BASE_SYSTEM_TOKENS).round() as u64,
        document_type,
        confidence,
    }
}

/// Estimate input tokens from actual content (higher confidence; used when
/// the preprocessor has already produced text, e.g. a resubmission).
pub fn estimate_tokens_from_content(content: &str, document_type: DocumentType) -> TokenEstimate {
    let words = content.split_whitespace().count();
    let chars = content.chars().count();
    let word_based = (words as f64) * 1.3;
    let char_based = if document_type == DocumentType::Image {
        chars as f64
    } else {
        chars as f64 * document_type.text_ratio()
    };
    let estimated = ((word_based + char_based) / 2.0) + BASE_SYSTEM_TOKENS;

    TokenEstimate {
        estimated_tokens: estimated.round() as u64,
        document_type,
        confidence: 0.9,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub total_estimated_tokens: u64,
    pub estimated_cost_usd: f64,
    pub max_possible_cost_usd: f64,
    pub model_name: String,
    pub provider: String,
    pub confidence: f64,
}

fn cost_from_tokens(input_tokens: u64, output_tokens: u64, pricing: ModelPricing) -> f64 {
    (input_tokens as f64 / 1000.0) * pricing.input_cost_per_1k_usd
        + (output_tokens as f64 / 1000.0) * pricing.output_cost_per_1k_usd
}

/// Build a `CostEstimate` from size-based token estimation (safety factor 2.0).
pub fn estimate_from_file_info(
    filename: &str,
    file_size_bytes: u64,
    model_name: &str,
    provider: &str,
    content_type: Option<&str>,
) -> CostEstimate {
    let doc_type = detect_document_type(filename, content_type);
    let token_estimate = estimate_tokens_from_file_size(file_size_bytes, doc_type);
    build_estimate(token_estimate, model_name, provider, SIZE_BASED_SAFETY_FACTOR)
}

/// Build a `CostEstimate` from actual document content (safety factor 1.5).
pub fn estimate_from_content(
    content: &str,
    model_name: &str,
    provider: &str,
    document_type: DocumentType,
) -> CostEstimate {
    let token_estimate = estimate_tokens_from_content(content, document_type);
    build_estimate(token_estimate, model_name, provider, CONTENT_BASED_SAFETY_FACTOR)
}

fn build_estimate(
    token_estimate: TokenEstimate,
    model_name: &str,
    provider: &str,
    safety_factor: f64,
) -> CostEstimate {
    let pricing = pricing_for(model_name);
    let input_tokens = token_estimate.estimated_tokens;
    let output_tokens = OUTPUT_TOKENS_ESTIMATE;
    let estimated_cost = cost_from_tokens(input_tokens, output_tokens, pricing);
    let max_possible_cost = estimated_cost * safety_factor;

    CostEstimate {
        estimated_input_tokens: input_tokens,
        estimated_output_tokens: output_tokens,
        total_estimated_tokens: input_tokens + output_tokens,
        estimated_cost_usd: estimated_cost,
        max_possible_cost_usd: max_possible_cost,
        model_name: model_name.to_string(),
        provider: provider.to_string(),
        confidence: token_estimate.confidence,
    }
}

/// The cost gate's verdict.
#[derive(Debug, Clone)]
pub enum GateDecision {
    Accept,
    Reject { reason: String },
}

/// Apply the gate policy. `max_cost_limit_usd = None` means no limit.
pub fn gate(estimate: &CostEstimate, max_cost_limit_usd: Option<f64>) -> GateDecision {
    match max_cost_limit_usd {
        None => GateDecision::Accept,
        Some(limit) if limit <= 0.0 => GateDecision::Reject {
            reason: "invalid limit: max_cost_limit must be greater than 0".to_string(),
        },
        Some(limit) if estimate.max_possible_cost_usd > limit => GateDecision::Reject {
            reason: format!(
                "estimated processing cost (${:.4}) exceeds limit (${:.4}); predicted tokens: {}, model: {}",
                estimate.max_possible_cost_usd, limit, estimate.total_estimated_tokens, estimate.model_name
            ),
        },
        Some(_) => GateDecision::Accept,
    }
}

/// Diagnostic breakdown for `results.cost_estimate` on rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub model_name: String,
    pub provider: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub total_estimated_tokens: u64,
    pub input_cost_per_1k_usd: f64,
    pub output_cost_per_1k_usd: f64,
    pub estimated_cost_usd: f64,
    pub max_possible_cost_usd: f64,
    pub confidence: f64,
    pub supports_vision: bool,
}

pub fn breakdown(estimate: &CostEstimate) -> CostBreakdown {
    let pricing = pricing_for(&estimate.model_name);
    CostBreakdown {
        model_name: estimate.model_name.clone(),
        provider: estimate.provider.clone(),
        estimated_input_tokens: estimate.estimated_input_tokens,
        estimated_output_tokens: estimate.estimated_output_tokens,
        total_estimated_tokens: estimate.total_estimated_tokens,
        input_cost_per_1k_usd: pricing.input_cost_per_1k_usd,
        output_cost_per_1k_usd: pricing.output_cost_per_1k_usd,
        estimated_cost_usd: estimate.estimated_cost_usd,
        max_possible_cost_usd: estimate.max_possible_cost_usd,
        confidence: estimate.confidence,
        supports_vision: pricing.supports_vision,
    }
}

/// Actual cost from realized token usage.
pub fn actual_cost(prompt_tokens: u64, completion_tokens: u64, model_name: &str) -> f64 {
    cost_from_tokens(prompt_tokens, completion_tokens, pricing_for(model_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_document_type_from_content_type_before_extension() {
        assert_eq!(
            detect_document_type("a.pdf", Some("image/png")),
            DocumentType::Image
        );
    }

    #[test]
    fn detects_document_type_from_extension_fallback() {
        assert_eq!(detect_document_type("notes.txt", None), DocumentType::Text);
        assert_eq!(detect_document_type("report.docx", None), DocumentType::Word);
        assert_eq!(detect_document_type("mystery.xyz", None), DocumentType::Unknown);
    }

    #[test]
    fn unknown_model_falls_back_to_default_pricing() {
        let pricing = pricing_for("some-model-nobody-has-heard-of");
        assert_eq!(pricing.input_cost_per_1k_usd, pricing_for("default").input_cost_per_1k_usd);
    }

    #[test]
    fn estimation_is_deterministic() {
        let a = estimate_from_file_info("doc.pdf", 12_345, "gpt-4", "openai", None);
        let b = estimate_from_file_info("doc.pdf", 12_345, "gpt-4", "openai", None);
        assert_eq!(a.estimated_cost_usd, b.estimated_cost_usd);
        assert_eq!(a.max_possible_cost_usd, b.max_possible_cost_usd);
    }

    #[test]
    fn gate_accepts_when_no_limit() {
        let estimate = estimate_from_file_info("doc.pdf", 10_000_000, "gpt-4-vision-preview", "openai", None);
        assert!(matches!(gate(&estimate, None), GateDecision::Accept));
    }

    #[test]
    fn gate_rejects_non_positive_limit() {
        let estimate = estimate_from_file_info("doc.pdf", 100, "gpt-4", "openai", None);
        assert!(matches!(gate(&estimate, Some(0.0)), GateDecision::Reject { .. }));
        assert!(matches!(gate(&estimate, Some(-1.0)), GateDecision::Reject { .. }));
    }

    #[test]
    fn gate_boundary_accepts_at_exact_limit_rejects_just_below() {
        let estimate = estimate_from_file_info("doc.pdf", 10_000_000, "gpt-4-vision-preview", "openai", None);
        let exact = estimate.max_possible_cost_usd;
        assert!(matches!(gate(&estimate, Some(exact)), GateDecision::Accept));
        assert!(matches!(
            gate(&estimate, Some(exact - 0.0001)),
            GateDecision::Reject { .. }
        ));
    }

    #[test]
    fn cost_gate_rejection_matches_scenario_3() {
        // 10MB PDF, gpt-4-vision-preview, limit $0.01 -> rejected.
        let estimate = estimate_from_file_info(
            "scan.pdf",
            10 * 1024 * 1024,
            "gpt-4-vision-preview",
            "openai",
            None,
        );
        match gate(&estimate, Some(0.01)) {
            GateDecision::Reject { .. } => {
                assert!(estimate.max_possible_cost_usd > 0.01);
            }
            GateDecision::Accept => panic!("expected rejection"),
        }
    }
}
