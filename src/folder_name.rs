use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Fields recovered from a product folder name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFolderName {
    pub product_type: String,
    pub materials_raw: String,
    pub series: String,
    pub price: Option<f64>,
    pub sku: Option<String>,
}

/// How operators name product folders in the Drive inbox.
///
/// Exactly one convention is active per run; names are never re-tried with the other one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// `{product_type}-{materials}-{series}_{price}`, e.g. `earring-driedflower-forestseries_25`
    #[default]
    #[display("type-materials-series")]
    TypeMaterialsSeries,
    /// `{sku}_{price}USD_{name}`, e.g. `W-014_39.9USD_Forest Whisper`
    #[display("sku-price-name")]
    SkuPriceName,
}

impl NamingConvention {
    pub fn try_from<S: AsRef<str>>(s: S) -> Option<Self> {
        match s.as_ref().trim().to_lowercase().replace('_', "-").as_str() {
            "type-materials-series" | "default" => Some(Self::TypeMaterialsSeries),
            "sku-price-name" | "sku" => Some(Self::SkuPriceName),
            _ => None,
        }
    }

    pub fn parse(&self, name: &str) -> ParsedFolderName {
        match self {
            Self::TypeMaterialsSeries => parse_type_materials_series(name),
            Self::SkuPriceName => parse_sku_price_name(name),
        }
    }
}

fn parse_price(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.)
}

pub fn parse_type_materials_series(name: &str) -> ParsedFolderName {
    // An unparsable suffix stays part of the name instead of being discarded.
    let (left, price) = match name.rsplit_once('_') {
        Some((left, price)) => match parse_price(price) {
            Some(price) => (left, Some(price)),
            None => (name, None),
        },
        None => (name, None),
    };
    let parts: Vec<&str> = left
        .split('-')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let mut parsed = ParsedFolderName {
        price,
        ..Default::default()
    };
    match parts.as_slice() {
        [] => (),
        [series] => parsed.series = series.to_string(),
        [product_type, materials] => {
            parsed.product_type = product_type.to_string();
            parsed.materials_raw = materials.to_string();
        }
        [product_type, materials @ .., series] => {
            parsed.product_type = product_type.to_string();
            parsed.materials_raw = materials.join("-");
            parsed.series = series.to_string();
        }
    }
    parsed
}

pub fn parse_sku_price_name(name: &str) -> ParsedFolderName {
    let parts: Vec<&str> = name.trim().split('_').collect();
    let sku = parts
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);
    let price = parts.get(1).and_then(|p| {
        let p = p.trim();
        let p = match p.len().checked_sub(3) {
            Some(i) if p.is_char_boundary(i) && p[i..].eq_ignore_ascii_case("usd") => &p[..i],
            _ => p,
        };
        parse_price(p)
    });
    let series = parts
        .get(2..)
        .map(|rest| rest.join("_").trim().to_string())
        .unwrap_or_default();
    ParsedFolderName {
        series,
        price,
        sku,
        ..Default::default()
    }
}
