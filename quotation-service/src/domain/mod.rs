//! Pure domain logic: the status state machine, tax resolution and the
//! calculation engine. Nothing here touches the store or the clock.

pub mod state_machine;
pub mod tax_engine;
pub mod tax_resolver;
pub mod totals;

pub use state_machine::{apply, QuotationEvent, TransitionContext, TransitionOutcome};
pub use tax_engine::{TaxBreakdown, TaxComponentAmount, TaxTreatment};
pub use totals::{compute_totals, QuotationTotals};
