//! Vendor-facing edge of the orchestrator: webhook payload normalization
//! into a closed event set, and the call-control adapter interface.

pub mod adapter;
pub mod events;

pub use adapter::{
    HttpTelephonyAdapter, NoopTelephonyAdapter, SpeakPayload, TelephonyAdapter, TelephonyError,
};
pub use events::{normalize, VendorEvent, VendorEventKind};
