//! Outbound calls over TCP.
//!
//! Every call opens a fresh connection, writes one request frame, reads at
//! most one response frame and closes. Nothing is pooled: a member serves one
//! connection at a time, so a held-open connection would block it.

use crate::codec::{read_message, write_message};
use crate::error::{Result, TransportError};
use crate::protocol::{ClientReply, Request, Response};
use async_trait::async_trait;
use corelib::{Identifier, NodeRef, NodeSnapshot, RingRpc, Trace};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::trace;

/// TCP implementation of [`RingRpc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpRpc;

impl TcpRpc {
    pub fn new() -> Self {
        Self
    }

    /// Sends `request` and waits for the response.
    pub async fn call(&self, addr: SocketAddr, request: &Request) -> Result<Response> {
        trace!(%addr, command = request.command(), "call");
        let mut stream = TcpStream::connect(addr).await?;
        write_message(&mut stream, request).await?;
        read_message(&mut stream)
            .await?
            .ok_or(TransportError::Closed)
    }

    /// Sends `request` without waiting for anything back.
    pub async fn send_oneway(&self, addr: SocketAddr, request: &Request) -> Result<()> {
        trace!(%addr, command = request.command(), "send");
        let mut stream = TcpStream::connect(addr).await?;
        write_message(&mut stream, request).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Delivers a reply to a client's listener.
    pub async fn deliver(&self, addr: SocketAddr, reply: &ClientReply) -> Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        write_message(&mut stream, reply).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// `call`, with `Err` answers and transport failures lifted into the
    /// ring error of `target`.
    async fn call_node(&self, target: &NodeRef, request: Request) -> corelib::Result<Response> {
        match self.call(target.addr, &request).await {
            Ok(Response::Err(message)) => Err(TransportError::Rejected(message).into_ring(target.id)),
            Ok(response) => Ok(response),
            Err(e) => Err(e.into_ring(target.id)),
        }
    }
}

fn unexpected(target: &NodeRef, command: &'static str, response: Response) -> corelib::Error {
    TransportError::UnexpectedResponse {
        command,
        response: response.kind().to_string(),
    }
    .into_ring(target.id)
}

#[async_trait]
impl RingRpc for TcpRpc {
    async fn get_node(&self, target: &NodeRef) -> corelib::Result<NodeSnapshot> {
        match self.call_node(target, Request::GetNode).await? {
            Response::Snapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected(target, "GET NODE", other)),
        }
    }

    async fn find_successor(
        &self,
        target: &NodeRef,
        key: Identifier,
        trace: Option<&mut Trace>,
    ) -> corelib::Result<NodeRef> {
        let request = Request::FindSuccessor {
            key,
            trace: trace.is_some(),
        };
        match self.call_node(target, request).await? {
            Response::Found { node, trace: hops } => {
                if let Some(trace) = trace {
                    trace.extend(hops.into_vec());
                }
                Ok(node)
            }
            other => Err(unexpected(target, "FIND SUCC", other)),
        }
    }

    async fn find_predecessor(&self, target: &NodeRef, key: Identifier) -> corelib::Result<NodeRef> {
        match self.call_node(target, Request::FindPredecessor { key }).await? {
            Response::Node(node) => Ok(node),
            other => Err(unexpected(target, "FIND PRED", other)),
        }
    }

    async fn closest_preceding_finger(
        &self,
        target: &NodeRef,
        key: Identifier,
    ) -> corelib::Result<NodeRef> {
        match self
            .call_node(target, Request::ClosestPrecedingFinger { key })
            .await?
        {
            Response::Node(node) => Ok(node),
            other => Err(unexpected(target, "CLOSEST PRE FINGER", other)),
        }
    }

    async fn set_predecessor(&self, target: &NodeRef, predecessor: NodeRef) -> corelib::Result<()> {
        self.send_oneway(target.addr, &Request::SetPredecessor { node: predecessor })
            .await
            .map_err(|e| e.into_ring(target.id))
    }

    async fn update_finger_table(
        &self,
        target: &NodeRef,
        candidate: NodeRef,
        index: usize,
    ) -> corelib::Result<()> {
        let request = Request::UpdateFingerTable {
            node: candidate,
            index,
        };
        match self.call_node(target, request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(target, "UPDATE FINGER TABLE", other)),
        }
    }
}
