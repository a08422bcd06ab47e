// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - CAPI access and OAuth plumbing.

pub mod capi;
pub mod oauth_state;

pub use capi::{AuthorizationRequest, CapiClient, CapiService, FetchOutcome};
pub use oauth_state::OAuthStateSigner;
