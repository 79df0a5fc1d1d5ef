//! Strategy-facing entry points: [`Market`] for data, [`Trade`] for orders.

pub mod market;
pub mod trade;

pub use market::Market;
pub use trade::Trade;

use crate::core::errors::ExchangeError;
use crate::core::runtime::Runtime;
use crate::core::traits::ErrorSink;
use std::sync::Arc;

/// Schedule `on_error(error)` followed by `on_init(false)`.
pub(crate) fn report_setup_failure(
    runtime: &Runtime,
    errors: Arc<dyn ErrorSink>,
    error: ExchangeError,
) {
    runtime.scheduler.run_once(
        async move {
            errors.on_error(error).await;
            errors.on_init(false).await;
        },
        None,
    );
}
