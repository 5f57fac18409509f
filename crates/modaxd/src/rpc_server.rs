//! RPC server - unix socket server for daemon-client communication.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

use modax_shared::ipc::{Method, Request, Response, ResponseData};
use modax_shared::ModuleId;

use crate::orchestrator::Engine;

/// Start the RPC server
pub async fn start_server(engine: Arc<Engine>, socket_path: &Path) -> Result<()> {
    // Ensure socket directory exists
    if let Some(socket_dir) = socket_path.parent() {
        tokio::fs::create_dir_all(socket_dir)
            .await
            .context("Failed to create socket directory")?;
    }

    // Remove old socket if it exists
    let _ = tokio::fs::remove_file(socket_path).await;

    let listener = UnixListener::bind(socket_path).context("Failed to bind Unix socket")?;
    info!("RPC server listening on {}", socket_path.display());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666))?;
    }

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, engine).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, engine: Arc<Engine>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read from socket")?;

        if bytes_read == 0 {
            break;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!("Invalid request JSON: {}", e);
                continue;
            }
        };

        let response = handle_request(request.id, request.method, &engine).await;

        let response_json = serde_json::to_string(&response)? + "\n";
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
    }

    Ok(())
}

/// Handle a single request
async fn handle_request(id: u64, method: Method, engine: &Engine) -> Response {
    let result = match method {
        Method::Ping => Ok(ResponseData::Ok),

        Method::Status => Ok(ResponseData::Status(engine.status().await)),

        Method::List => Ok(ResponseData::List(engine.list_active().await)),

        Method::GetActive { name } => {
            let module = ModuleId::from(name.as_str());
            match engine.active_info(&module).await {
                Some(info) => Ok(ResponseData::Active(info)),
                None => Err(format!("unknown module: {}", name)),
            }
        }

        Method::Submit { package_dir } => engine
            .submit(&package_dir)
            .await
            .map(ResponseData::Update)
            .map_err(|e| e.to_string()),

        Method::Bootstrap => Ok(ResponseData::Bootstrap(engine.bootstrap_modules().await)),

        Method::Flags => Ok(ResponseData::Flags(engine.coordinator().flags().await)),
    };

    Response { id, result }
}
