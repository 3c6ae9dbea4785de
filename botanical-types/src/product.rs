use serde::{Deserialize, Serialize};

/// Canonical listing record produced by normalization.
///
/// `tags` holds at most [`MAX_TAGS`] lowercase entries in first-seen order,
/// `materials` is deduplicated and sorted, `price` is never negative.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ProductDraft {
    pub id: String,
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub tags: Vec<String>,
    pub materials: Vec<String>,
    pub colors: Vec<String>,
    pub style: String,
    pub product_type: String,
    pub category: String,
    pub series: String,

    pub price: f64,
    pub currency: String,
    pub quantity: u32,
    pub who_made: String,
    pub when_made: String,
    pub taxonomy_id: u64,

    pub raw_ai_json: serde_json::Value,
    pub notes: String,
}

/// Etsy accepts no more than 13 tags per listing.
pub const MAX_TAGS: usize = 13;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_QUANTITY: u32 = 1;
pub const DEFAULT_WHO_MADE: &str = "i_did";
pub const DEFAULT_WHEN_MADE: &str = "made_to_order";
