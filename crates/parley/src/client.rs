//! Client side of the directory protocol.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use parley_protocol::{
    Codec, DirectoryRequest, DirectoryResponse, JsonCodec, Member, ProtocolError,
};
use parley_transport::{Connection, TcpConnection, TransportError};

use crate::{ClientConfig, ParleyError};

/// Talks to a Directory Service, one short-lived connection per request.
///
/// `create` and `join` register the *source address* of their connection
/// as the new member. Give the client the address of your datagram socket
/// with [`bound_to`](Self::bound_to) so that address is one peers can
/// actually reach.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    directory: SocketAddr,
    local: Option<SocketAddr>,
    timeout: Duration,
    codec: JsonCodec,
}

impl DirectoryClient {
    pub fn new(directory: SocketAddr) -> Self {
        Self {
            directory,
            local: None,
            timeout: ClientConfig::default().request_timeout,
            codec: JsonCodec,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.directory_addr).with_timeout(config.request_timeout)
    }

    /// Makes `create` and `join` connect from `local`.
    pub fn bound_to(mut self, local: SocketAddr) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Room name → member count.
    pub async fn list(&self) -> Result<BTreeMap<String, usize>, ParleyError> {
        let response = self.request(&DirectoryRequest::List, None).await?;
        Ok(response.rooms.unwrap_or_default())
    }

    /// Creates `room` and returns the address the directory registered us
    /// under.
    pub async fn create(&self, room: &str) -> Result<Member, ParleyError> {
        let request = DirectoryRequest::Create {
            room: room.to_string(),
        };
        let response = self.request(&request, self.local).await?;
        response
            .ips
            .and_then(|ips| ips.first().copied())
            .ok_or_else(no_address)
    }

    /// Joins `room`. Returns our registered address and the full member
    /// list, ourselves included.
    pub async fn join(&self, room: &str) -> Result<(Member, Vec<Member>), ParleyError> {
        let request = DirectoryRequest::Join {
            room: room.to_string(),
        };
        let response = self.request(&request, self.local).await?;
        let members = response.ips.unwrap_or_default();
        // The registry appends the joiner, so we are the last entry.
        let me = members.last().copied().ok_or_else(no_address)?;
        Ok((me, members))
    }

    /// Removes `member` from `room`.
    pub async fn leave(&self, room: &str, member: Member) -> Result<(), ParleyError> {
        let request = DirectoryRequest::Leave {
            room: room.to_string(),
            original_address: member.host,
            original_port: member.port,
        };
        self.request(&request, None).await?;
        Ok(())
    }

    /// Replaces the member list of `room`.
    pub async fn update_room(
        &self,
        room: &str,
        active_clients: Vec<Member>,
    ) -> Result<(), ParleyError> {
        let request = DirectoryRequest::UpdateRoom {
            room: room.to_string(),
            active_clients,
        };
        self.request(&request, None).await?;
        Ok(())
    }

    /// One full exchange: connect, send, read the single response.
    ///
    /// # Errors
    /// Transport failures and timeouts as [`ParleyError::Transport`], and
    /// any non-`success` answer as [`ParleyError::Rejected`].
    async fn request(
        &self,
        request: &DirectoryRequest,
        local: Option<SocketAddr>,
    ) -> Result<DirectoryResponse, ParleyError> {
        let exchange = async {
            let conn = TcpConnection::connect(self.directory, local).await?;
            conn.send(&self.codec.encode(request)?).await?;
            let data = conn.recv().await?.ok_or_else(|| {
                TransportError::ConnectionClosed("directory closed without answering".into())
            })?;
            Ok::<_, ParleyError>(self.codec.decode::<DirectoryResponse>(&data)?)
        };

        let response = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::TimedOut("directory request").into()),
        };
        tracing::debug!(
            action = request.action(),
            status = %response.status,
            message = %response.message,
            "directory answered"
        );

        if !response.is_success() {
            return Err(ParleyError::Rejected {
                status: response.status,
                message: response.message,
            });
        }
        Ok(response)
    }
}

fn no_address() -> ParleyError {
    ProtocolError::InvalidMessage("directory response carries no member address".into()).into()
}
