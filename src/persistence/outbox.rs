//! Event outbox.
//!
//! Market events are appended to [`keys::EVENT_OUTBOX`] inside the batch
//! that persists the change they announce. Delivery to players is handled
//! by a separate consumer.

use super::keys;
use super::store::Batch;
use crate::domain::MarketEvent;
use crate::error::Result;

/// Stages `event` for delivery.
///
/// # Errors
///
/// Returns [`crate::error::MarketError::Json`] if the event cannot be
/// serialized.
pub fn stage_event(event: &MarketEvent, batch: &mut Batch) -> Result<()> {
    let payload = serde_json::to_string(event)?;
    batch.list_push(keys::EVENT_OUTBOX, payload);
    tracing::debug!(event_type = event.kind(), "event staged");
    Ok(())
}
