use crate::router;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use helpdesk_core::ipc::{HelpdeskRequest, HelpdeskResponse};
use helpdesk_core::{HelpdeskError, SessionManager};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub async fn run_unix_server(
    socket_path: &str,
    manager: Arc<SessionManager>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), HelpdeskError> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, manager).await {
                        tracing::error!("IPC connection closed: {}", e);
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// 4-byte little-endian length prefix + MessagePack payload, one response per
/// request frame.
async fn serve_connection(
    stream: UnixStream,
    manager: Arc<SessionManager>,
) -> Result<(), HelpdeskError> {
    let (read, write) = stream.into_split();
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = frame?;
        let response = match rmp_serde::from_slice::<HelpdeskRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &manager),
            Err(e) => HelpdeskResponse::err(format!("Deserialization error: {}", e)),
        };

        framed_write.send(encode(&response)?).await?;
    }

    Ok(())
}

pub fn encode(response: &HelpdeskResponse) -> Result<Bytes, HelpdeskError> {
    rmp_serde::to_vec_named(response)
        .map(Bytes::from)
        .map_err(|e| HelpdeskError::Ipc(format!("Failed to serialize response: {}", e)))
}
