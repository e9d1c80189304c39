// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Credentials, token refresh and the 401 retry contract

mod credentials;
mod notify;
mod refresh;
mod retry;

pub use credentials::{CredentialCallback, CredentialState, CredentialStore};
pub use notify::{AuthNotifier, SessionCallback, SessionEvent};
pub use refresh::RefreshCoordinator;
pub use retry::{AuthOutcome, AuthorizedSender, RetryEvent, RetryState};
