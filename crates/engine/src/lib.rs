//! Order ledger and cascade dispatch.
//!
//! [`OrderLedger::report`] records a status report for an order and, when
//! the order completes, asks the [`DispatchEngine`] to fan out to the
//! children of its job. [`CompletionWatcher`] closes the loop by polling
//! backend runs and reporting their completion back into the ledger.

pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod templates;
pub mod watcher;

pub use dispatch::{DispatchEngine, LaunchedOrder};
pub use error::EngineError;
pub use ledger::{OrderLedger, ReportOutcome};
pub use templates::{ResolvedTemplate, TemplateService};
pub use watcher::CompletionWatcher;
