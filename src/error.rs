use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Order {0} has already been checked out")]
    DuplicateCheckout(String),
    #[error("Payment for order {0} not found")]
    PaymentNotFound(String),
    #[error("Product {0} not found in the catalog")]
    ProductNotFound(u64),
    #[error("Invalid checkout: {0}")]
    InvalidCheckout(String),
    #[error("Contract violation: {0}")]
    ContractViolation(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
