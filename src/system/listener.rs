//! The TCP listener a system enters via `listen()` (spec §4.7, §6.3).

// Layer 1: Standard library imports
use std::process::Stdio;

// Layer 2: Third-party crate imports
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use tracing::warn;

// Layer 3: Internal module imports
use super::actor_system::ActorSystem;
use crate::actor::error::ActorError;
use crate::endpoint::forked::WORKER_BINARY_ENV;
use crate::message::frame::bodies::ActorCreatedBody;
use crate::message::frame::{Frame, FrameKind};
use crate::transport::FrameCodec;

/// Reads exactly one `create-actor` frame off `stream` (spec §6.3: "The
/// sole accepted frame is `create-actor`"), spawns a worker process to
/// host it, and relays the worker's `{id, port}` reply back to the
/// bootstrap connection before closing it.
pub async fn handle_bootstrap_connection(stream: TcpStream, _system: std::sync::Arc<ActorSystem>) -> Result<(), ActorError> {
    use futures::{SinkExt, StreamExt};

    let mut bootstrap = Framed::new(stream, FrameCodec);
    let Some(frame) = bootstrap.next().await else {
        return Ok(());
    };
    let frame = frame.map_err(|e| ActorError::TransportError(e.to_string()))?;
    if frame.kind != FrameKind::CreateActor {
        warn!(kind = %frame.kind, "rejecting non create-actor frame on bootstrap listener");
        let _ = bootstrap
            .send(Frame::new(FrameKind::ActorCreated).with_error("only create-actor is accepted here"))
            .await;
        return Ok(());
    }

    let worker_bin = std::env::var(WORKER_BINARY_ENV).unwrap_or_else(|_| "transept-worker".to_string());
    let mut child = Command::new(worker_bin)
        .arg("--listen")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(ActorError::ProcessError)?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ActorError::ProcessError(std::io::Error::other("worker stdin was not piped")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ActorError::ProcessError(std::io::Error::other("worker stdout was not piped")))?;
    let mut writer = FramedWrite::new(stdin, FrameCodec);
    let mut reader = FramedRead::new(BufReader::new(stdout), FrameCodec);

    writer
        .send(frame)
        .await
        .map_err(|e| ActorError::TransportError(e.to_string()))?;

    let reply = reader
        .next()
        .await
        .ok_or_else(|| ActorError::TransportError("worker exited before replying".into()))?
        .map_err(|e| ActorError::TransportError(e.to_string()))?;

    if reply.error.is_some() {
        bootstrap
            .send(reply)
            .await
            .map_err(|e| ActorError::TransportError(e.to_string()))?;
        return Ok(());
    }

    let created: ActorCreatedBody = reply.body_as().map_err(ActorError::SerializationError)?;
    let ack = Frame::new(FrameKind::ActorCreated).with_body(created).map_err(ActorError::SerializationError)?;
    bootstrap
        .send(ack)
        .await
        .map_err(|e| ActorError::TransportError(e.to_string()))?;

    // The worker now listens for the client's second connection on its
    // own port (spec §6.3); this process's job here is done.
    Ok(())
}
