use crate::domain::command::Product;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads the product catalog from a CSV source with an
/// `id, seller_id, name, amount` header.
///
/// Whitespace around fields is trimmed; amounts must be positive.
pub struct ProductReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ProductReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes products, one `Result` per row, so a bad row can
    /// be reported and skipped without losing the rest.
    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "id, seller_id, name, amount\n1, 10, Keyboard, 10000\n2, 20, Mouse Pad, 20000.50";
        let results: Vec<Result<Product>> = ProductReader::new(data.as_bytes()).products().collect();

        assert_eq!(results.len(), 2);
        let pad = results[1].as_ref().unwrap();
        assert_eq!(pad.seller_id, 20);
        assert_eq!(pad.name, "Mouse Pad");
        assert_eq!(pad.amount.value(), dec!(20000.50));
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let data = "id, seller_id, name, amount\nx, 1, Broken, 100\n2, 1, Free, 0\n3, 1, Fine, 5";
        let results: Vec<Result<Product>> = ProductReader::new(data.as_bytes()).products().collect();

        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().id, 3);
    }
}
