// Copyright 2025 NANO Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # NANO CLI
//!
//! Command-line interface for the NANO handler runtime.
//!
//! ## Architecture
//!
//! The binary uses the `argh` crate for argument parsing, maps the flags onto
//! [`nano_server::ResourceLimits`] and hands off to [`serve`], which loads the
//! app and runs the HTTP server until it fails.
//!
//! ## Key Commands
//!
//! - `nano serve`: Serve a JavaScript app over HTTP

use anyhow::{Context, Result};
use nano_server::{App, HttpServer, ResourceLimits};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Loads the app at `script` and serves it on `addr`.
///
/// # Errors
///
/// Returns an error if the limits are invalid, the app fails to load, or the
/// listener cannot be bound.
pub async fn serve(script: PathBuf, addr: SocketAddr, limits: ResourceLimits) -> Result<()> {
    tracing::info!("Starting NANO with script: {}", script.display());
    tracing::info!(
        drain = ?limits.drain_mode(),
        max_buffer_size = limits.max_buffer_size,
        max_request_body = limits.max_request_body,
        read_policy = ?limits.empty_read_policy,
        "Resource limits"
    );

    let app = App::load(script.clone(), limits)
        .await
        .with_context(|| format!("Failed to load app {}", script.display()))?;

    HttpServer::new(Arc::new(app)).run(addr).await?;
    Ok(())
}
