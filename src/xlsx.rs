use crate::export::{product_to_row, ExportItem, COLUMNS, DESCRIPTION_COLUMN};
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::path::Path;

/// Excel rejects cells longer than this.
const CELL_LIMIT: usize = 32_767;

/// Workbook header cell: the label above the field name.
pub fn header_cell(name: &str, label: &str) -> String {
    format!("{label}\n({name})")
}

pub fn write_products(path: &Path, items: &[ExportItem]) -> Result<(), anyhow::Error> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Etsy Products")?;

    let header_format = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_text_wrap()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let description_format = Format::new()
        .set_text_wrap()
        .set_align(FormatAlign::Top);

    for (col, (name, label, width)) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(0, col, header_cell(name, label), &header_format)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (i, item) in items.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in product_to_row(item).iter().enumerate() {
            if value.chars().count() > CELL_LIMIT {
                return Err(anyhow::anyhow!(
                    "Row {row} column {} has exceeded excel character limit",
                    COLUMNS[col].0
                ));
            }
            if col == DESCRIPTION_COLUMN {
                sheet.write_string_with_format(row, col as u16, value, &description_format)?;
            } else {
                sheet.write_string(row, col as u16, value)?;
            }
        }
    }
    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::item;

    #[test]
    fn writes_workbook() {
        let path = std::env::temp_dir().join(format!("products-{}.xlsx", uuid::Uuid::new_v4()));
        write_products(&path, &[item("f1", 2)]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn header_shows_label_and_field() {
        assert_eq!("价格\n(price)", header_cell("price", "价格"));
        let (name, label, _) = COLUMNS[23];
        assert_eq!("SKU\n(SKU)", header_cell(name, label));
    }

    #[test]
    fn rejects_oversized_cells() {
        let path = std::env::temp_dir().join(format!("products-{}.xlsx", uuid::Uuid::new_v4()));
        let mut item = item("f1", 0);
        item.product.description = "x".repeat(CELL_LIMIT + 1);
        assert!(write_products(&path, &[item]).is_err());
        assert!(!path.exists());
    }
}
