pub mod health;
pub mod portal;
pub mod quotations;
pub mod tax_config;
