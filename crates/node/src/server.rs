//! Sequential accept loop.
//!
//! A listening process handles exactly one connection at a time, end to end:
//! accept, read one request frame, dispatch, write the response if there is
//! one, close. The dispatcher therefore owns its state outright and needs no
//! locks; two requests to the same process are serialized in accept order.

use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use transport::{read_message, write_message, Request, Response, TransportError};

/// Turns one decoded request into its response.
///
/// `None` means the command is one-way and nothing is written back.
#[async_trait]
pub trait Dispatch: Send {
    async fn dispatch(&mut self, request: Request) -> Option<Response>;
}

/// A bound listener plus the dispatcher it feeds.
pub struct Server<D> {
    listener: TcpListener,
    dispatcher: D,
}

impl<D: Dispatch> Server<D> {
    pub fn new(listener: TcpListener, dispatcher: D) -> Self {
        Self {
            listener,
            dispatcher,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Serves connections until the task is dropped.
    pub async fn serve(mut self) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = handle_connection(stream, &mut self.dispatcher).await {
                error!(%peer, error = %e, "connection failed");
            }
        }
    }
}

async fn handle_connection<D: Dispatch + ?Sized>(
    mut stream: TcpStream,
    dispatcher: &mut D,
) -> Result<()> {
    let response = match read_message::<_, Request>(&mut stream).await {
        Ok(Some(request)) => {
            debug!(command = request.command(), "dispatch");
            dispatcher.dispatch(request).await
        }
        Ok(None) => return Ok(()),
        Err(TransportError::Codec(e)) => {
            warn!(error = %e, "unrecognized request");
            Some(Response::Err(format!("unrecognized request: {}", e)))
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(response) = response {
        write_message(&mut stream, &response).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use transport::TcpRpc;

    /// Answers every request with the number of requests seen so far.
    struct Counter(usize);

    #[async_trait]
    impl Dispatch for Counter {
        async fn dispatch(&mut self, request: Request) -> Option<Response> {
            self.0 += 1;
            request
                .expects_response()
                .then(|| Response::Err(self.0.to_string()))
        }
    }

    async fn spawn_counter() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(listener, Counter(0));
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());
        addr
    }

    #[tokio::test]
    async fn test_requests_are_served_in_order() {
        let addr = spawn_counter().await;
        let rpc = TcpRpc::new();
        for expected in 1..=3 {
            let response = rpc.call(addr, &Request::GetNode).await.unwrap();
            assert_eq!(response, Response::Err(expected.to_string()));
        }
    }

    #[tokio::test]
    async fn test_garbage_is_answered_with_err() {
        let addr = spawn_counter().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&5u32.to_le_bytes()).await.unwrap();
        stream.write_all(&[0xff; 5]).await.unwrap();
        let response: Response = transport::read_message(&mut stream).await.unwrap().unwrap();
        assert!(matches!(response, Response::Err(m) if m.starts_with("unrecognized request")));

        // The listener keeps serving afterwards.
        let response = TcpRpc::new().call(addr, &Request::GetNode).await.unwrap();
        assert_eq!(response, Response::Err("1".to_string()));
    }

    #[tokio::test]
    async fn test_empty_connection_is_ignored() {
        let addr = spawn_counter().await;
        drop(TcpStream::connect(addr).await.unwrap());
        let response = TcpRpc::new().call(addr, &Request::GetNode).await.unwrap();
        assert_eq!(response, Response::Err("1".to_string()));
    }
}
