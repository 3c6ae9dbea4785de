use botanical_types::folder::DriveFile;
use botanical_types::product::ProductDraft;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const MAX_IMAGES: usize = 10;

/// Export columns in file order: field name, workbook label, XLSX width.
pub const COLUMNS: [(&str, &str, f64); 25] = [
    ("title", "标题", 40.),
    ("description", "详细描述", 80.),
    ("price", "价格", 12.),
    ("currency", "币种", 10.),
    ("quantity", "库存", 10.),
    ("category", "类别", 20.),
    ("taxonomy_id", "分类编号", 15.),
    ("materials", "材料", 40.),
    ("tags", "标签", 50.),
    ("image_1", "图片1", 30.),
    ("image_2", "图片2", 30.),
    ("image_3", "图片3", 30.),
    ("image_4", "图片4", 30.),
    ("image_5", "图片5", 30.),
    ("image_6", "图片6", 30.),
    ("image_7", "图片7", 30.),
    ("image_8", "图片8", 30.),
    ("image_9", "图片9", 30.),
    ("image_10", "图片10", 30.),
    ("who_made", "谁制作", 15.),
    ("when_made", "何时制作", 20.),
    ("shop_section", "店铺分区", 20.),
    ("shipping_profile", "运费模板", 25.),
    ("SKU", "SKU", 30.),
    ("processing_time", "处理时间", 15.),
];

pub const DESCRIPTION_COLUMN: usize = 1;

/// One finished product with the Drive images of its folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportItem {
    pub product: ProductDraft,
    pub images: Vec<DriveFile>,
}

pub fn header() -> impl Iterator<Item = &'static str> {
    COLUMNS.iter().map(|(name, _, _)| *name)
}

/// Whole prices keep one decimal, `25` is written as `25.0`.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0. {
        format!("{price:.1}")
    } else {
        price.to_string()
    }
}

/// Row cells in [`COLUMNS`] order.
pub fn product_to_row(item: &ExportItem) -> Vec<String> {
    let p = &item.product;
    let category = if p.category.is_empty() {
        p.product_type.clone()
    } else {
        p.category.clone()
    };
    let taxonomy_id = match p.taxonomy_id {
        0 => String::new(),
        id => id.to_string(),
    };
    let mut row = vec![
        p.title.clone(),
        p.description.clone(),
        format_price(p.price),
        p.currency.clone(),
        p.quantity.to_string(),
        category,
        taxonomy_id,
        p.materials.join(", "),
        p.tags.join(", "),
    ];
    row.extend(
        item.images
            .iter()
            .map(|f| f.name.clone())
            .chain(std::iter::repeat(String::new()))
            .take(MAX_IMAGES),
    );
    row.extend([
        p.who_made.clone(),
        p.when_made.clone(),
        String::new(),
        String::new(),
        p.id.clone(),
        String::new(),
    ]);
    row
}

/// `etsy_products_<YYYYMMDD_HHMMSS>`
pub fn export_file_stem(now: OffsetDateTime) -> Result<String, anyhow::Error> {
    let format = time::format_description::parse("[year][month][day]_[hour][minute][second]")?;
    Ok(format!("etsy_products_{}", now.format(&format)?))
}

/// Writes the batch as a CSV and an XLSX file sharing one timestamped name.
pub fn export_batch(items: &[ExportItem], dir: &Path) -> Result<(PathBuf, PathBuf), anyhow::Error> {
    if items.is_empty() {
        return Err(anyhow::anyhow!("No products to export"));
    }
    std::fs::create_dir_all(dir)?;
    let stem = export_file_stem(OffsetDateTime::now_utc())?;
    let csv_path = dir.join(format!("{stem}.csv"));
    let xlsx_path = dir.join(format!("{stem}.xlsx"));
    crate::csv::write_products(&csv_path, items)?;
    log::info!("Exported {} products to {csv_path:?}", items.len());
    crate::xlsx::write_products(&xlsx_path, items)?;
    log::info!("Exported {} products to {xlsx_path:?}", items.len());
    Ok((csv_path, xlsx_path))
}
