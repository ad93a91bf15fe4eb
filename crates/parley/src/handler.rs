//! Per-connection handler: one request in, one response out.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Await the request, bounded by the configured timeout
//!   2. Decode and dispatch it against the registry
//!   3. Write the response and close

use std::sync::Arc;

use parley_protocol::{Codec, DirectoryRequest, DirectoryResponse, Member};
use parley_room::{RoomError, RoomRegistry};
use parley_transport::{Connection, TcpConnection, TransportError};

use crate::ParleyError;
use crate::server::ServerState;

const INVALID_JSON: &str = "Invalid JSON format";
const INVALID_REQUEST: &str = "Invalid request format";

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: TcpConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ParleyError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling directory connection");

    let data = match tokio::time::timeout(state.config.request_timeout, read_request(&conn)).await {
        Ok(Ok(Some(data))) => Some(data),
        Ok(Ok(None)) => {
            tracing::debug!(%conn_id, "closed before sending a request");
            return Ok(());
        }
        Ok(Err(TransportError::FrameTooLarge { max })) => {
            tracing::debug!(%conn_id, max, "oversized request");
            None
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            tracing::info!(%conn_id, %peer, "request timed out");
            return Err(TransportError::TimedOut("directory request").into());
        }
    };

    let response = match data.map(|data| state.codec.decode::<DirectoryRequest>(&data)) {
        Some(Ok(request)) => {
            // The registry knows a member by the address its datagrams come
            // from, which the client makes equal to this connection's source.
            let requester = Member::from(peer);
            dispatch(&state.registry, requester, request).await
        }
        Some(Err(e)) => {
            tracing::debug!(%conn_id, error = %e, "malformed request");
            DirectoryResponse::error(INVALID_JSON)
        }
        None => DirectoryResponse::error(INVALID_JSON),
    };

    let bytes = state.codec.encode(&response)?;
    conn.send(&bytes).await?;
    conn.close().await?;
    Ok(())
}

/// Reads one request. An oversized one is skipped to its end before the
/// error is returned, so the answer is not lost to a reset connection.
async fn read_request(conn: &TcpConnection) -> Result<Option<Vec<u8>>, TransportError> {
    match conn.recv().await {
        Err(TransportError::FrameTooLarge { max }) => {
            while let Err(TransportError::FrameTooLarge { .. }) = conn.recv().await {}
            Err(TransportError::FrameTooLarge { max })
        }
        other => other,
    }
}

/// Applies one request to the registry and builds the response.
///
/// Business failures come back as `failure` responses, never as errors.
pub(crate) async fn dispatch(
    registry: &RoomRegistry,
    requester: Member,
    request: DirectoryRequest,
) -> DirectoryResponse {
    tracing::debug!(action = request.action(), room = ?request.room(), %requester, "dispatch");
    if request.room().is_some_and(str::is_empty) {
        return DirectoryResponse::error(INVALID_REQUEST);
    }

    match request {
        DirectoryRequest::List => {
            let rooms = registry.list_rooms().await;
            DirectoryResponse::success(format!("Listed {} rooms", rooms.len())).with_rooms(rooms)
        }

        DirectoryRequest::Create { room } => match registry.create_room(&room, requester).await {
            Ok(()) => DirectoryResponse::success(format!("Successfully created room '{room}'"))
                .with_ips(vec![requester]),
            Err(e) => refused(e),
        },

        DirectoryRequest::Join { room } => match registry.join_room(&room, requester).await {
            Ok(members) => {
                DirectoryResponse::success(format!("Successfully joined room '{room}'"))
                    .with_ips(members)
            }
            Err(e) => refused(e),
        },

        DirectoryRequest::Leave {
            room,
            original_address,
            original_port,
        } => {
            let member = Member::new(original_address, original_port);
            match registry.leave_room(&room, member).await {
                Ok(()) => DirectoryResponse::success(format!("Successfully left room '{room}'")),
                Err(e) => refused(e),
            }
        }

        DirectoryRequest::UpdateRoom {
            room,
            active_clients,
        } => match registry.update_room(&room, active_clients).await {
            Ok(()) => DirectoryResponse::success(format!("Updated room '{room}'")),
            Err(e) => refused(e),
        },
    }
}

fn refused(e: RoomError) -> DirectoryResponse {
    match e {
        RoomError::InvalidName => DirectoryResponse::error(INVALID_REQUEST),
        other => DirectoryResponse::failure(other.to_string()),
    }
}
