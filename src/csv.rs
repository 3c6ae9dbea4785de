use crate::export::{header, product_to_row, ExportItem};
use std::io::Write;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// UTF-8 CSV with a byte order mark so spreadsheet apps detect the encoding.
pub fn write_products(path: &Path, items: &[ExportItem]) -> Result<(), anyhow::Error> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(file);
    writer.write_record(header())?;
    for item in items {
        writer.write_record(product_to_row(item))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::item;
    use crate::export::COLUMNS;

    #[test]
    fn writes_bom_header_and_rows() {
        let path = std::env::temp_dir().join(format!("products-{}.csv", uuid::Uuid::new_v4()));
        write_products(&path, &[item("f1", 1), item("f2", 3)]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let headers = reader.headers().unwrap().clone();
        assert_eq!(COLUMNS.len(), headers.len());
        assert_eq!(Some("title"), headers.get(0));
        assert_eq!(Some("SKU"), headers.get(23));

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(2, rows.len());
        assert_eq!(Some("Calm.\n\nCare Instructions:"), rows[0].get(1));
        assert_eq!(Some("moss, resin"), rows[0].get(7));
        assert_eq!(Some("img3.jpg"), rows[1].get(11));
        assert_eq!(Some("f2"), rows[1].get(23));
        std::fs::remove_file(&path).unwrap();
    }
}
