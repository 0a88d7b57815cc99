pub mod access_links;
pub mod approvals;
pub mod database;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod quotations;
pub mod store;
pub mod tax_config;

pub use access_links::AccessLinkService;
pub use database::PgStore;
pub use memory::MemoryStore;
pub use quotations::{QuotationService, QuotationView};
pub use store::QuotationStore;
pub use tax_config::TaxConfigService;
