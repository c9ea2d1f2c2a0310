//! Embedded model pricing table.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_cost_per_1k_usd: f64,
    pub output_cost_per_1k_usd: f64,
    pub max_context: u32,
    pub supports_vision: bool,
}

pub static PRICING_TABLE: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        "gpt-4-vision-preview",
        ModelPricing {
            input_cost_per_1k_usd: 0.01,
            output_cost_per_1k_usd: 0.03,
            max_context: 128_000,
            supports_vision: true,
        },
    );
    table.insert(
        "gpt-4-turbo",
        ModelPricing {
            input_cost_per_1k_usd: 0.01,
            output_cost_per_1k_usd: 0.03,
            max_context: 128_000,
            supports_vision: true,
        },
    );
    table.insert(
        "gpt-4",
        ModelPricing {
            input_cost_per_1k_usd: 0.03,
            output_cost_per_1k_usd: 0.06,
            max_context: 8_192,
            supports_vision: false,
        },
    );
    table.insert(
        "gpt-3.5-turbo",
        ModelPricing {
            input_cost_per_1k_usd: 0.0015,
            output_cost_per_1k_usd: 0.002,
            max_context: 16_385,
            supports_vision: false,
        },
    );
    table.insert(
        "openai/gpt-4-vision-preview",
        ModelPricing {
            input_cost_per_1k_usd: 0.01,
            output_cost_per_1k_usd: 0.03,
            max_context: 128_000,
            supports_vision: true,
        },
    );
    table.insert(
        "anthropic/claude-3-opus",
        ModelPricing {
            input_cost_per_1k_usd: 0.015,
            output_cost_per_1k_usd: 0.075,
            max_context: 200_000,
            supports_vision: true,
        },
    );
    table.insert(
        "default",
        ModelPricing {
            input_cost_per_1k_usd: 0.01,
            output_cost_per_1k_usd: 0.03,
            max_context: 128_000,
            supports_vision: true,
        },
    );
    table
});

/// Falls back to the `"default"` row for unknown models.
pub fn pricing_for(model: &str) -> ModelPricing {
    *PRICING_TABLE
        .get(model)
        .unwrap_or_else(|| PRICING_TABLE.get("default").expect("default pricing row always present"))
}
