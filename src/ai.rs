use crate::drive::truncate_body;
use anyhow::{anyhow, Context as AnyhowContext};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use botanical_types::folder::FolderContext;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

pub const BRAND_NAME: &str = "Wù Essence";

/// Produces a listing draft for one folder from its context and main image.
#[async_trait]
pub trait DraftRequester: Send + Sync {
    async fn request_draft(
        &self,
        ctx: &FolderContext,
        main_image: &Path,
    ) -> Result<Value, anyhow::Error>;
}

/// Chat completions client sending the prompt and the image as a data URL.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    response_format: Value,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DraftRequester for OpenAiClient {
    async fn request_draft(
        &self,
        ctx: &FolderContext,
        main_image: &Path,
    ) -> Result<Value, anyhow::Error> {
        let bytes = tokio::fs::read(main_image)
            .await
            .with_context(|| format!("Main image {main_image:?} is not readable"))?;
        let image_url = format!(
            "data:image/{};base64,{}",
            image_format(main_image),
            STANDARD.encode(&bytes)
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": build_prompt(ctx)},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ],
            })],
            response_format: json!({"type": "json_object"}),
        };
        log::info!(
            "Requesting draft for folder {} from model {}",
            ctx.folder_id,
            self.model
        );
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Unable to send chat completion request")?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("OpenAI API {status}: {}", truncate_body(&text)));
        }
        let resp: ChatResponse = serde_json::from_str(&text)
            .with_context(|| format!("Unable to deserialize chat completion: {}", truncate_body(&text)))?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI returned no content"))?;
        parse_draft(&content)
    }
}

/// Image subtype for the data URL, `jpeg` for anything unrecognized.
pub fn image_format(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "png",
        "gif" => "gif",
        "webp" => "webp",
        _ => "jpeg",
    }
}

/// The model reply must be one JSON object, nothing else.
pub fn parse_draft(content: &str) -> Result<Value, anyhow::Error> {
    if content.trim().is_empty() {
        return Err(anyhow!("OpenAI returned empty content"));
    }
    let value: Value = serde_json::from_str(content)
        .with_context(|| format!("Draft is not valid JSON: {}", truncate_body(content)))?;
    if !value.is_object() {
        return Err(anyhow!(
            "Draft must be a JSON object, got: {}",
            truncate_body(content)
        ));
    }
    Ok(value)
}

pub fn build_prompt(ctx: &FolderContext) -> String {
    let price = ctx.price_from_name.unwrap_or(0.);
    let price_hint = ctx
        .price_from_name
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let notes = if ctx.note_text.trim().is_empty() {
        "(none)"
    } else {
        ctx.note_text.trim()
    };
    let template = json!({
        "id_from_drive": ctx.folder_id,
        "title": "Concise English title with a selling point, may mention series and materials",
        "description": "Full Etsy description: materials, approximate size, design inspiration, how to wear or display it, care tips",
        "short_description": "One sentence on what makes this piece special",
        "price": price,
        "currency": "USD",
        "quantity": 1,
        "tags": ["botanical jewelry", "wood and herbal art"],
        "materials": ["natural wood", "botanical elements"],
        "colors": ["brown", "green"],
        "style": "forest-inspired, natural, botanical, poetic",
        "product_type": ctx.product_type,
        "category": ctx.product_type,
        "series": ctx.series,
        "who_made": "i_did",
        "when_made": "made_to_order",
    });
    let template = serde_json::to_string_pretty(&template).unwrap_or_default();
    format!(
        r#"You write Etsy listings for "{BRAND_NAME}", a shop selling nature-inspired handmade jewelry and decorations
(earrings, necklaces, pendants, wall hangings) made from wood, fruits, seeds, dried flowers and herbal plants.

Keep one consistent brand voice: forest-inspired, botanical, poetic, calm, spiritual, natural, one-of-a-kind.

Brand and compliance rules:
- Describe only moods and atmosphere, e.g. calm, grounding, peaceful, connected to nature.
- Never mention or imply healing, medicinal or health effects (heal, cure, treat, pain relief, anxiety relief, improve sleep, detox).
- Never use the words medical, medicine, remedy, therapy or TCM.
- Symbolic or cultural meaning of plants is fine, concrete health benefits are not.
- No exaggerated promises such as guaranteed, miracle or life-changing. Keep the tone gentle and honest.

You will see one product photo and some extra text.

Folder:
- folder_id: {folder_id}
- folder_name: {folder_name}

Fields parsed from the folder name (hints, correct them if they look wrong):
- product_type: {product_type}
- materials_raw: {materials}
- series: {series}
- price_from_name: {price_hint}

Notes:
{notes}

Look at the photo carefully: type of piece, materials (plants, wood, metal, resin), colors and overall style.

Output rules:
1. Return one valid JSON object and nothing else: no comments, no code fences.
2. `price` is a number in USD.
3. `quantity` defaults to 1.
4. `tags` holds at most 13 mostly lowercase English Etsy tags on botanical, forest and handmade themes.
5. `materials` lists the materials as precisely as possible, especially natural ones.
6. Do not mention any medical, health or healing effect anywhere.

Use exactly these keys:

{template}
"#,
        folder_id = ctx.folder_id,
        folder_name = ctx.folder_name,
        product_type = ctx.product_type,
        materials = ctx.raw_materials_str,
        series = ctx.series,
    )
}
