// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Traffic capture
//!
//! Raw observations from page hooks are normalized into captured events,
//! filtered through the capture rules and uploaded to the backend.

mod event;
mod log;
mod normalizer;
mod raw;
mod sink;
mod upload;

pub use event::CapturedEvent;
pub use log::{RequestLog, DEFAULT_LOG_CAPACITY};
pub use normalizer::{EventNormalizer, DEFAULT_MAX_BODY_SIZE, DEFAULT_PENDING_MAX_AGE};
pub use raw::{ObservationSource, RawBody, RawHeaders, RawObservation, RawRequest, RawResponse};
pub use sink::{CollectingSink, EventSink, NullSink};
pub use upload::{DeliveryOutcome, UploadPipeline};
