//! Host event payloads (§4.1 "Events", §9 "Event emitters → typed broadcasters").
//!
//! The original design uses an inheritance-based string-keyed event emitter;
//! per the redesign note we use a closed `enum` instead, so every listener
//! sees a typed payload and the compiler enforces exhaustive handling.

use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    ServerConnected {
        server_id: String,
    },
    ServerDisconnected {
        server_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<HostError>,
    },
    ServerError {
        server_id: String,
        error: HostError,
    },
    CapabilitiesUpdated,
    ResourceUpdated {
        server_id: String,
        uri: String,
    },
    SamplingRequest {
        request_id: String,
        server_id: String,
        params: serde_json::Value,
    },
    Log {
        /// Composite level `server-<lvl>` per §4.1 step 3.
        level: String,
        server_id: String,
        message: serde_json::Value,
    },
}
