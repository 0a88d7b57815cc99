//! Quotation-to-cash service: quotations, client access links,
//! jurisdiction-aware tax and lifecycle sweeps.

pub mod config;
pub mod domain;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod startup;
