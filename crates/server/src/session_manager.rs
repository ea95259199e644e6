//! Session manager wrapper for rmcp's streamable HTTP transport.
//!
//! Delegates to rmcp's `LocalSessionManager` and logs session open/close. Session ids are
//! logged; API keys live in the per-session handler and never reach this layer.

use futures::Stream;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::common::server_side_http::ServerSseMessage;
use rmcp::transport::streamable_http_server::session::SessionId;
use rmcp::transport::streamable_http_server::session::SessionManager;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use std::future::Future;

#[derive(Default)]
pub struct ProxySessionManager {
    inner: LocalSessionManager,
}

impl ProxySessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn create_session_impl(
        &self,
    ) -> Result<
        (SessionId, <LocalSessionManager as SessionManager>::Transport),
        <LocalSessionManager as SessionManager>::Error,
    > {
        let (id, transport) = self.inner.create_session().await?;
        tracing::info!(session = %id, "mcp session opened");
        Ok((id, transport))
    }

    async fn close_session_impl(
        &self,
        id: &SessionId,
    ) -> Result<(), <LocalSessionManager as SessionManager>::Error> {
        let result = self.inner.close_session(id).await;
        match &result {
            Ok(()) => tracing::info!(session = %id, "mcp session closed"),
            Err(e) => tracing::debug!(session = %id, error = %e, "mcp session close failed"),
        }
        result
    }
}

impl SessionManager for ProxySessionManager {
    type Error = <LocalSessionManager as SessionManager>::Error;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    fn create_session(
        &self,
    ) -> impl Future<Output = Result<(SessionId, Self::Transport), Self::Error>> + Send {
        self.create_session_impl()
    }

    fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<ServerJsonRpcMessage, Self::Error>> + Send {
        self.inner.initialize_session(id, message)
    }

    fn has_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.inner.has_session(id)
    }

    fn close_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.close_session_impl(id)
    }

    fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_stream(id, message)
    }

    fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inner.accept_message(id, message)
    }

    fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_standalone_stream(id)
    }

    fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.resume(id, last_event_id)
    }
}
