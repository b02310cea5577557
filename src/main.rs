use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payment_core::application::checkout::CheckoutService;
use payment_core::application::confirm::PaymentConfirmService;
use payment_core::application::recovery::PaymentRecoveryService;
use payment_core::config::{PspConfig, RecoveryConfig};
use payment_core::domain::command::{CheckoutCommand, IdempotencyKey, PaymentConfirmCommand};
use payment_core::domain::ports::{PaymentStoreRef, PaymentValidationRef};
use payment_core::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryProductCatalog};
use payment_core::infrastructure::toss::TossPaymentExecutor;
use payment_core::interfaces::csv::product_reader::ProductReader;
use payment_core::telemetry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Base URL of the Toss Payments API.
    #[arg(long, global = true, env = "PSP_TOSS_URL", default_value = "https://api.tosspayments.com")]
    psp_url: String,

    #[arg(long, global = true, env = "PSP_TOSS_SECRET_KEY", default_value = "", hide_env_values = true)]
    psp_secret_key: String,

    /// Age in seconds after which an executing payment counts as abandoned.
    #[arg(long, global = true, default_value_t = 180)]
    staleness_secs: u64,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates a payment event for the given products.
    Checkout {
        /// Product catalog CSV (`id, seller_id, name, amount`).
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        cart_id: u64,
        #[arg(long)]
        buyer_id: u64,
        #[arg(long, value_delimiter = ',', required = true)]
        product_ids: Vec<u64>,
        /// Client-supplied seed the idempotency key is derived from.
        #[arg(long)]
        seed: String,
    },
    /// Confirms a payment with the PSP.
    Confirm {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_key: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Runs a single recovery sweep.
    Recover(RecoveryArgs),
    /// Runs recovery sweeps periodically until interrupted.
    Serve(RecoveryArgs),
}

#[derive(Args)]
struct RecoveryArgs {
    #[arg(long, default_value_t = 180)]
    interval_secs: u64,
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
    #[arg(long, default_value_t = 2)]
    concurrency: usize,
}

impl Cli {
    fn psp_config(&self) -> PspConfig {
        PspConfig {
            base_url: self.psp_url.trim_end_matches('/').to_string(),
            secret_key: self.psp_secret_key.clone(),
            ..PspConfig::default()
        }
    }

    fn recovery_config(&self, args: &RecoveryArgs) -> RecoveryConfig {
        RecoveryConfig {
            interval: Duration::from_secs(args.interval_secs.max(1)),
            batch_size: args.batch_size,
            concurrency: args.concurrency,
        }
    }

    fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(
    db_path: Option<PathBuf>,
    staleness_window: Duration,
) -> Result<(PaymentStoreRef, PaymentValidationRef)> {
    use payment_core::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path)
            .into_diagnostic()?
            .with_staleness_window(staleness_window);
        return Ok((Arc::new(store.clone()), Arc::new(store)));
    }
    Ok(in_memory_store(staleness_window))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(
    db_path: Option<PathBuf>,
    staleness_window: Duration,
) -> Result<(PaymentStoreRef, PaymentValidationRef)> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory_store(staleness_window))
}

fn in_memory_store(staleness_window: Duration) -> (PaymentStoreRef, PaymentValidationRef) {
    let store = InMemoryPaymentStore::new().with_staleness_window(staleness_window);
    (Arc::new(store.clone()), Arc::new(store))
}

fn load_catalog(path: &Path) -> Result<InMemoryProductCatalog> {
    let file = File::open(path).into_diagnostic()?;
    let products = ProductReader::new(file)
        .products()
        .filter_map(|product| match product {
            Ok(product) => Some(product),
            Err(e) => {
                warn!(error = %e, "Skipping malformed catalog row");
                None
            }
        });
    let catalog = InMemoryProductCatalog::new(products);
    info!(products = catalog.len(), "Catalog loaded");
    Ok(catalog)
}

fn confirm_service(
    cli: &Cli,
    store: PaymentStoreRef,
    validation: PaymentValidationRef,
) -> Result<PaymentConfirmService> {
    let executor = TossPaymentExecutor::new(cli.psp_config()).into_diagnostic()?;
    Ok(PaymentConfirmService::new(store, validation, Arc::new(executor)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level);

    let (store, validation) = open_store(cli.db_path.clone(), cli.staleness_window())?;

    match &cli.command {
        Commands::Checkout {
            catalog,
            cart_id,
            buyer_id,
            product_ids,
            seed,
        } => {
            let catalog = load_catalog(catalog)?;
            let service = CheckoutService::new(Arc::new(catalog), store);
            let result = service
                .checkout(CheckoutCommand {
                    cart_id: *cart_id,
                    buyer_id: *buyer_id,
                    product_ids: product_ids.clone(),
                    idempotency_key: IdempotencyKey::from_seed(seed),
                })
                .await
                .into_diagnostic()?;
            print_json(&result)?;
        }
        Commands::Confirm {
            order_id,
            payment_key,
            amount,
        } => {
            let service = confirm_service(&cli, store, validation)?;
            let result = service
                .confirm(&PaymentConfirmCommand {
                    payment_key: payment_key.clone(),
                    order_id: order_id.clone(),
                    amount: *amount,
                })
                .await
                .into_diagnostic()?;
            print_json(&result)?;
        }
        Commands::Recover(args) => {
            let confirm = confirm_service(&cli, store.clone(), validation)?;
            let recovery =
                PaymentRecoveryService::new(store, Arc::new(confirm), cli.recovery_config(args));
            let report = recovery.sweep().await;
            print_json(&report)?;
        }
        Commands::Serve(args) => {
            let confirm = confirm_service(&cli, store.clone(), validation)?;
            let recovery = Arc::new(PaymentRecoveryService::new(
                store,
                Arc::new(confirm),
                cli.recovery_config(args),
            ));

            let shutdown = CancellationToken::new();
            let worker = recovery.spawn(shutdown.clone());

            tokio::signal::ctrl_c().await.into_diagnostic()?;
            info!("Shutdown signal received");
            shutdown.cancel();
            worker.await.into_diagnostic()?;
        }
    }

    Ok(())
}
