use botanical_types::folder::FolderContext;
use botanical_types::product::{
    ProductDraft, DEFAULT_CURRENCY, DEFAULT_QUANTITY, DEFAULT_WHEN_MADE, DEFAULT_WHO_MADE,
    MAX_TAGS,
};
use lazy_regex::regex;
use serde_json::Value;
use std::collections::HashSet;

/// Source-language material names and their English listing names.
pub const MATERIALS_MAPPING: [(&str, &str); 16] = [
    ("白芷", "white angelica root"),
    ("甘草", "licorice root"),
    ("松果", "pine cone"),
    ("桉树果", "eucalyptus pod"),
    ("五眼果", "five-eye fruit"),
    ("白五眼果", "white five-eye fruit"),
    ("黑五眼果", "black five-eye fruit"),
    ("松针", "pine needle"),
    ("银杏叶", "ginkgo leaf"),
    ("枫叶", "maple leaf"),
    ("树脂", "resin"),
    ("合金", "alloy"),
    ("金属", "metal"),
    ("银", "silver"),
    ("金", "gold"),
    ("铜", "copper"),
];

pub const CARE_INSTRUCTIONS: &str = "Care Instructions:
- Store in a dry place away from direct sunlight
- Avoid contact with water and chemicals
- Clean gently with a soft, dry cloth
- Handle with care as botanical materials are delicate";

/// Exact-match lookup; names without a mapping pass through trimmed.
pub fn translate_material(name: &str) -> String {
    let name = name.trim();
    MATERIALS_MAPPING
        .iter()
        .find(|(source, _)| *source == name)
        .map(|(_, english)| english.to_string())
        .unwrap_or_else(|| name.to_string())
}

pub fn clean_title(title: &str) -> String {
    let title = regex!(r"\s+").replace_all(title, " ");
    let title = title.trim();
    let mut chars = title.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trimmed, lowercased, deduplicated in first-seen order, at most [`MAX_TAGS`].
pub fn clean_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TAGS)
        .collect()
}

/// Union of AI materials and the folder materials token, translated,
/// deduplicated case-insensitively and sorted by code point.
pub fn clean_materials<S: AsRef<str>>(ai_materials: &[S], raw_materials: &str) -> Vec<String> {
    let from_folder = regex!(r"[-,\s]+").split(raw_materials);
    let mut seen = HashSet::new();
    let mut materials: Vec<String> = ai_materials
        .iter()
        .map(|m| m.as_ref())
        .chain(from_folder)
        .map(translate_material)
        .filter(|m| !m.is_empty())
        .filter(|m| seen.insert(m.to_lowercase()))
        .collect();
    materials.sort();
    materials
}

pub fn build_description(ai_description: &str) -> String {
    let description = ai_description.trim();
    if description.is_empty() {
        CARE_INSTRUCTIONS.to_string()
    } else {
        format!("{description}\n\n{CARE_INSTRUCTIONS}")
    }
}

fn str_field<'a>(ai: &'a Value, key: &str) -> &'a str {
    ai.get(key).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn str_list(ai: &Value, key: &str) -> Vec<String> {
    match ai.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(ToString::to_string).collect(),
        _ => vec![],
    }
}

/// Numbers and numeric strings; anything else is absent.
fn number_field(ai: &Value, key: &str) -> Option<f64> {
    let n = match ai.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Merges an AI draft with the folder context into the canonical record.
///
/// AI values win when present; the folder name fills the gaps.
pub fn normalize_product(ai: &Value, ctx: &FolderContext, default_taxonomy_id: u64) -> ProductDraft {
    let product_type = non_empty_or(str_field(ai, "product_type"), &ctx.product_type);
    let series = non_empty_or(str_field(ai, "series"), &ctx.series);
    let price = number_field(ai, "price")
        .filter(|p| *p > 0.)
        .or(ctx.price_from_name)
        .filter(|p| *p >= 0.)
        .unwrap_or(0.);

    let title = clean_title(str_field(ai, "title"));
    let title = non_empty_or(&title, &ctx.folder_name);
    let short_description = non_empty_or(str_field(ai, "short_description"), &title);
    let category = non_empty_or(str_field(ai, "category"), &product_type);
    let id = non_empty_or(
        str_field(ai, "id_from_drive"),
        ctx.sku.as_deref().unwrap_or(&ctx.folder_id),
    );

    let colors = str_list(ai, "colors")
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    let quantity = number_field(ai, "quantity")
        .filter(|q| *q >= 1. && q.fract() == 0. && *q <= u32::MAX as f64)
        .map(|q| q as u32)
        .unwrap_or(DEFAULT_QUANTITY);
    let taxonomy_id = number_field(ai, "taxonomy_id")
        .filter(|t| *t > 0. && t.fract() == 0.)
        .map(|t| t as u64)
        .unwrap_or(default_taxonomy_id);

    ProductDraft {
        id,
        title,
        description: build_description(str_field(ai, "description")),
        short_description,
        tags: clean_tags(str_list(ai, "tags")),
        materials: clean_materials(&str_list(ai, "materials"), &ctx.raw_materials_str),
        colors,
        style: str_field(ai, "style").to_string(),
        product_type,
        category,
        series,
        price,
        currency: non_empty_or(str_field(ai, "currency"), DEFAULT_CURRENCY),
        quantity,
        who_made: non_empty_or(str_field(ai, "who_made"), DEFAULT_WHO_MADE),
        when_made: non_empty_or(str_field(ai, "when_made"), DEFAULT_WHEN_MADE),
        taxonomy_id,
        raw_ai_json: ai.clone(),
        notes: ctx.note_text.clone(),
    }
}
