//! Client for the retrieval-backed knowledge service. The orchestrator
//! fails open around it: any transport, timeout, or decode failure is
//! downgraded to an empty passage list.

pub mod client;

pub use client::{
    HttpKbClient, KbClient, KbClientError, KbPassage, KbSearchRequest, KbSearchResponse, KbSource,
    NoopKbClient, CRISIS_HEADER,
};
