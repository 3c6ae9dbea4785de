use crate::config::EtsyConfig;
use crate::drive::truncate_body;
use anyhow::{anyhow, Context as AnyhowContext};
use async_trait::async_trait;
use botanical_types::product::ProductDraft;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://api.etsy.com/v3/public/oauth/token";
const API_BASE: &str = "https://api.etsy.com/v3/application";
const MAX_TITLE_CHARS: usize = 140;
/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

/// Creates a listing for a finished product somewhere outside the pipeline.
#[async_trait]
pub trait ListingPublisher: Send + Sync {
    /// Returns the platform metadata to record for the folder.
    async fn publish(&self, product: &ProductDraft, images: &[PathBuf]) -> Result<Value, anyhow::Error>;
}

/// Access token obtained through the refresh-token grant.
#[derive(Clone)]
pub struct EtsySession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: OffsetDateTime,
    pub shop_id: String,
}

impl std::fmt::Debug for EtsySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtsySession")
            .field("access_token", &crate::config::key_preview(&self.access_token))
            .field("expires_at", &self.expires_at)
            .field("shop_id", &self.shop_id)
            .finish()
    }
}

impl EtsySession {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now + EXPIRY_MARGIN >= self.expires_at
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Deserialize, Debug)]
struct CreatedListing {
    listing_id: u64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ListingPayload {
    pub quantity: u32,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub who_made: String,
    pub when_made: String,
    pub taxonomy_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_profile_id: Option<u64>,
    pub tags: Vec<String>,
    pub materials: Vec<String>,
    pub sku: String,
    #[serde(rename = "type")]
    pub listing_type: String,
    pub state: String,
}

impl ListingPayload {
    pub fn new(product: &ProductDraft, config: &EtsyConfig) -> Self {
        let taxonomy_id = match product.taxonomy_id {
            0 => config.taxonomy_id.unwrap_or(0),
            id => id,
        };
        Self {
            quantity: product.quantity,
            title: product.title.chars().take(MAX_TITLE_CHARS).collect(),
            description: product.description.clone(),
            price: product.price,
            who_made: product.who_made.clone(),
            when_made: product.when_made.clone(),
            taxonomy_id,
            shipping_profile_id: config.shipping_profile_id,
            tags: product.tags.clone(),
            materials: product.materials.clone(),
            sku: product.id.clone(),
            listing_type: "physical".to_string(),
            state: "draft".to_string(),
        }
    }
}

/// Etsy Open API v3 client creating draft listings.
pub struct EtsyClient {
    client: Client,
    config: EtsyConfig,
    session: Mutex<Option<EtsySession>>,
}

impl EtsyClient {
    pub fn new(client: Client, config: EtsyConfig) -> Self {
        Self {
            client,
            config,
            session: Mutex::new(None),
        }
    }

    /// Valid session, refreshing the access token when missing or about to expire.
    pub async fn session(&self) -> Result<EtsySession, anyhow::Error> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref().filter(|s| !s.is_expired(OffsetDateTime::now_utc())) {
            return Ok(s.clone());
        }
        let refresh_token = session
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .unwrap_or_else(|| self.config.refresh_token.clone());
        log::info!("Refreshing Etsy access token");
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Unable to send Etsy token refresh request")?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Etsy token refresh failed {status}: {}", truncate_body(&text)));
        }
        let token: TokenResponse =
            serde_json::from_str(&text).context("Unable to deserialize Etsy token response")?;
        let new_session = EtsySession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: OffsetDateTime::now_utc() + Duration::seconds(token.expires_in),
            shop_id: self.config.shop_id.clone(),
        };
        log::debug!("New Etsy session: {new_session:?}");
        *session = Some(new_session.clone());
        Ok(new_session)
    }

    fn authorized(&self, builder: RequestBuilder, session: &EtsySession) -> RequestBuilder {
        builder
            .header("x-api-key", &self.config.client_id)
            .bearer_auth(&session.access_token)
    }

    pub async fn create_draft_listing(&self, product: &ProductDraft) -> Result<u64, anyhow::Error> {
        let session = self.session().await?;
        let payload = ListingPayload::new(product, &self.config);
        log::info!("Creating Etsy draft listing {:?}", payload.title);
        let resp = self
            .authorized(
                self.client
                    .post(format!("{API_BASE}/shops/{}/listings", session.shop_id)),
                &session,
            )
            .json(&payload)
            .send()
            .await
            .context("Unable to send Etsy create listing request")?;
        let status = resp.status();
        let text = resp.text().await?;
        if status != StatusCode::CREATED {
            return Err(anyhow!("Etsy create listing failed {status}: {}", truncate_body(&text)));
        }
        let listing: CreatedListing =
            serde_json::from_str(&text).context("Unable to deserialize created Etsy listing")?;
        Ok(listing.listing_id)
    }

    pub async fn upload_image(
        &self,
        listing_id: u64,
        path: &Path,
        rank: usize,
    ) -> Result<(), anyhow::Error> {
        let session = self.session().await?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Unable to read image {path:?}"))?;
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let form = Form::new()
            .part("image", Part::bytes(bytes).file_name(file_name))
            .text("rank", rank.to_string());
        let resp = self
            .authorized(
                self.client.post(format!(
                    "{API_BASE}/shops/{}/listings/{listing_id}/images",
                    session.shop_id
                )),
                &session,
            )
            .multipart(form)
            .send()
            .await
            .context("Unable to send Etsy image upload request")?;
        let status = resp.status();
        if status != StatusCode::CREATED {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Etsy image upload failed {status}: {}", truncate_body(&text)));
        }
        Ok(())
    }
}

#[async_trait]
impl ListingPublisher for EtsyClient {
    async fn publish(&self, product: &ProductDraft, images: &[PathBuf]) -> Result<Value, anyhow::Error> {
        let listing_id = self.create_draft_listing(product).await?;
        log::info!("Etsy draft listing {listing_id} created for {}", product.id);
        let mut uploaded = 0;
        for (i, image) in images.iter().enumerate() {
            let rank = i + 1;
            log::info!("Uploading image {rank}/{} to listing {listing_id}", images.len());
            match self.upload_image(listing_id, image, rank).await {
                Ok(()) => uploaded += 1,
                Err(err) => log::warn!("Image {image:?} not uploaded: {err:#}"),
            }
        }
        Ok(listing_metadata(listing_id, uploaded))
    }
}

pub fn listing_metadata(listing_id: u64, images: usize) -> Value {
    json!({
        "listing_id": listing_id,
        "status": "draft",
        "images": images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EtsyConfig {
        EtsyConfig {
            client_id: "client".to_string(),
            refresh_token: "refresh".to_string(),
            shop_id: "shop".to_string(),
            shipping_profile_id: Some(55),
            taxonomy_id: Some(1208),
        }
    }

    fn product() -> ProductDraft {
        ProductDraft {
            id: "f1".to_string(),
            title: "x".repeat(200),
            description: "Calm.".to_string(),
            price: 25.,
            quantity: 1,
            who_made: "i_did".to_string(),
            when_made: "made_to_order".to_string(),
            tags: vec!["forest".to_string()],
            materials: vec!["resin".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn builds_draft_payload() {
        let payload = ListingPayload::new(&product(), &config());
        assert_eq!(140, payload.title.chars().count());
        assert_eq!(1208, payload.taxonomy_id);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json!("physical"), value["type"]);
        assert_eq!(json!("draft"), value["state"]);
        assert_eq!(json!("f1"), value["sku"]);
        assert_eq!(json!(55), value["shipping_profile_id"]);
        assert_eq!(json!(25.0), value["price"]);
    }

    #[test]
    fn product_taxonomy_wins_and_missing_shipping_is_omitted() {
        let mut product = product();
        product.taxonomy_id = 1210;
        let config = EtsyConfig {
            shipping_profile_id: None,
            ..config()
        };
        let value = serde_json::to_value(ListingPayload::new(&product, &config)).unwrap();
        assert_eq!(json!(1210), value["taxonomy_id"]);
        assert!(value.get("shipping_profile_id").is_none());
    }

    #[test]
    fn session_expires_with_margin() {
        let now = OffsetDateTime::from_unix_timestamp(1_714_557_905).unwrap();
        let session = EtsySession {
            access_token: "secret-access-token".to_string(),
            refresh_token: "r".to_string(),
            expires_at: now + Duration::seconds(3600),
            shop_id: "shop".to_string(),
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::seconds(3550)));
        assert!(!format!("{session:?}").contains("secret-access-token"));
    }

    #[test]
    fn decodes_token_and_listing() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token": "a", "token_type": "Bearer", "expires_in": 3600, "refresh_token": "r2"}"#,
        )
        .unwrap();
        assert_eq!(3600, token.expires_in);
        assert_eq!("r2", token.refresh_token);
        let listing: CreatedListing =
            serde_json::from_str(r#"{"listing_id": 123456, "state": "draft"}"#).unwrap();
        assert_eq!(123456, listing.listing_id);
        assert_eq!(
            json!({"listing_id": 123456, "status": "draft", "images": 2}),
            listing_metadata(listing.listing_id, 2)
        );
    }
}
