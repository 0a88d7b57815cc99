//! Domain models for quotation-service.

mod access_link;
mod client_response;
mod line_item;
mod quotation;
mod status_history;
mod tax;

pub use access_link::{AccessLink, ViewRecord};
pub use client_response::{ClientResponse, ResponseType, SubmitResponse};
pub use line_item::{CreateLineItem, LineItem};
pub use quotation::{CreateQuotation, Quotation, QuotationStatus, TaxContext, UpdateQuotation};
pub use status_history::StatusHistoryEntry;
pub use tax::{
    AppendAudit, Country, CreateCategory, CreateCountry, CreateJurisdiction, CreateTaxFramework,
    CreateTaxRate, Jurisdiction, ProductServiceCategory, TaxConfigAudit, TaxFramework, TaxRate,
    TaxRateComponent, TaxRateRow,
};
