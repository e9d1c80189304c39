// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Request forwarding through the privileged side

mod gateway;

pub use gateway::{ProxyGateway, ProxyOptions, ProxyRequest, ProxyResponse};
