/// Errors that can occur in the transport layer.
///
/// Every variant is a `ConnectionFailure` in the protocol's terms: the
/// operation is aborted and the caller decides what to tell the user.
/// None of them is fatal to a process.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed by the remote side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening an outbound connection failed (refused, unreachable).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Binding a listener or socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A frame exceeded the configured size limit.
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    /// An operation did not finish within its deadline.
    #[error("{0} timed out")]
    TimedOut(&'static str),
}
