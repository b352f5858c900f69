//! wirehttp demo server.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ connection task ──▶ http::request (parse)
//!                                        │
//!                                        ▼
//!     Client ◀── http::response ◀── demo handler
//! ```
//!
//! Routes:
//! - `/yourproblem` → 400
//! - `/myproblem` → 500
//! - `/chunked` → chunked body
//! - anything else → 200

use std::path::PathBuf;

use clap::Parser;

use wirehttp::config::{load_config, ServerConfig};
use wirehttp::lifecycle::shutdown_signal;
use wirehttp::observability::{logging, metrics};
use wirehttp::{Request, ResponseWriter, Server, StatusCode};

#[derive(Debug, Parser)]
#[command(name = "wirehttp", version, about = "Minimal HTTP/1.1 server over raw TCP")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

const OK_BODY: &str = "<html>
  <head>
    <title>200 OK</title>
  </head>
  <body>
    <h1>Success!</h1>
    <p>Your request was an absolute banger.</p>
  </body>
</html>
";

const BAD_REQUEST_BODY: &str = "<html>
  <head>
    <title>400 Bad Request</title>
  </head>
  <body>
    <h1>Bad Request</h1>
    <p>Your request honestly kinda sucked.</p>
  </body>
</html>
";

const SERVER_ERROR_BODY: &str = "<html>
  <head>
    <title>500 Internal Server Error</title>
  </head>
  <body>
    <h1>Internal Server Error</h1>
    <p>Okay, you know what? This one is on me.</p>
  </body>
</html>
";

fn demo(request: &Request, writer: &mut ResponseWriter<'_>) {
    writer.headers_mut().set("content-type", "text/html");

    match request.target() {
        "/yourproblem" => {
            writer.set_status(StatusCode::BAD_REQUEST);
            writer.set_body(BAD_REQUEST_BODY);
        }
        "/myproblem" => {
            writer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            writer.set_body(SERVER_ERROR_BODY);
        }
        "/chunked" => {
            writer.headers_mut().override_value("content-type", "text/plain");
            writer.headers_mut().set("transfer-encoding", "chunked");
            let body: String = (0..100)
                .map(|i| format!("line {i}: streamed in 1 KiB chunks\n"))
                .collect();
            writer.set_body(body);
        }
        _ => writer.set_body(OK_BODY),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!("wirehttp v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = ?config.listener.max_connections,
        read_timeout_secs = ?config.timeouts.read_secs,
        "Configuration loaded"
    );

    let server = Server::serve(config, demo).await?;
    tracing::info!(address = %server.local_addr(), "Server started");

    shutdown_signal().await;
    server.close();
    server.wait().await;

    tracing::info!("Server gracefully stopped");
    Ok(())
}
