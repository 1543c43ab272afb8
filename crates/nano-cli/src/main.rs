//! # NANO CLI Entry Point
//!
//! Main binary for the NANO handler runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Serve an app on port 8000
//! nano serve -s app.js -b 127.0.0.1:8000
//!
//! # Bound every request by 10 000 drain cycles instead of wall-clock time
//! nano serve -s app.js --drain-iterations 10000
//!
//! # Reject read() on an empty stream instead of waiting
//! nano serve -s app.js --legacy-sync-read
//! ```

use anyhow::Result;
use argh::FromArgs;
use nano_server::{EmptyReadPolicy, ResourceLimits};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;


/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// NANO - JavaScript fetch handlers on the Boa engine
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
}

/// Arguments for serving an app.
///
/// # Example
///
/// ```bash
/// nano serve -s app.js -b 0.0.0.0:8000 --max-buffer-size 1048576
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve a JavaScript app over HTTP
struct ServeArgs {
    /// path to the app's ES module
    ///
    /// The default export must be an object with a `fetch(request)` method
    /// or a function. The module is evaluated once at startup.
    #[argh(option, short = 's')]
    script: String,

    /// address to bind the HTTP server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:8000\".into()")]
    bind: String,

    /// maximum wall-clock time per request in milliseconds
    ///
    /// Defaults to 30000ms (30 seconds). Must be between 1 and 3600000 (1 hour).
    #[argh(option, long = "max-execution-time-ms", default = "30000")]
    max_execution_time_ms: u64,

    /// bound each request by a number of drain cycles instead of time
    #[argh(option, long = "drain-iterations")]
    drain_iterations: Option<u32>,

    /// maximum bytes any single stream may buffer (default 64 MiB)
    #[argh(option, long = "max-buffer-size")]
    max_buffer_size: Option<usize>,

    /// reject read() on an empty stream instead of waiting for data
    #[argh(switch, long = "legacy-sync-read")]
    legacy_sync_read: bool,

    /// maximum request body in bytes (default 10 MiB)
    #[argh(option, long = "max-request-body")]
    max_request_body: Option<usize>,
}

impl ServeArgs {
    /// Maps the flags onto resource limits. Unset flags keep the defaults.
    fn resource_limits(&self) -> ResourceLimits {
        let mut limits = ResourceLimits::new()
            .with_execution_timeout(Duration::from_millis(self.max_execution_time_ms));

        if let Some(iterations) = self.drain_iterations {
            limits = limits.with_drain_iterations(iterations);
        }
        if let Some(bytes) = self.max_buffer_size {
            limits = limits.with_max_buffer_size(bytes);
        }
        if self.legacy_sync_read {
            limits = limits.with_empty_read_policy(EmptyReadPolicy::Reject);
        }
        if let Some(bytes) = self.max_request_body {
            limits = limits.with_max_request_body(bytes);
        }
        limits
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Serve(args) => {
            let limits = args.resource_limits();
            limits.validate()?;

            let addr: SocketAddr = args
                .bind
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

            nano_cli::serve(PathBuf::from(&args.script), addr, limits).await
        }
    }
}
