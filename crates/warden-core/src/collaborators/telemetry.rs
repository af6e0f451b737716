//! The `Telemetry` trait: event emission without committing to a metrics
//! backend. Telemetry-the-product is out of scope for this core;
//! telemetry-the-logging-call is part of the ambient stack every
//! component carries regardless.

use std::collections::HashMap;

use async_trait::async_trait;

#[async_trait]
pub trait Telemetry: Send + Sync {
    async fn emit(&self, event_name: &str, properties: HashMap<String, String>);
}

// Compile-time assertion: Telemetry must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Telemetry) {}
};

/// Emits a structured `tracing` event per telemetry call. The default
/// for hosts that don't wire up a real sink.
pub struct NoopTelemetry;

#[async_trait]
impl Telemetry for NoopTelemetry {
    async fn emit(&self, event_name: &str, properties: HashMap<String, String>) {
        tracing::info!(target: "warden::telemetry", event = event_name, ?properties);
    }
}
