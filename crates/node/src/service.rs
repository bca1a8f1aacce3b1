//! Per-member request dispatcher.
//!
//! A member starts with no ring state. The JOIN request from the bootstrap
//! driver tells it its identifier and the ring parameters; it then joins
//! through the coordinator and answers ring commands from that point on.

use crate::error::{NodeError, Result};
use crate::server::{Dispatch, Server};
use async_trait::async_trait;
use corelib::{Identifier, NodeRef, RingNode, Trace};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use transport::{
    ClientReply, PublishRequest, Request, Response, RingParams, SubscribeRequest, TcpRpc,
};

/// Ring member: local state plus the RPC client it reaches peers with.
pub struct NodeService {
    addr: SocketAddr,
    rpc: TcpRpc,
    ring: Option<RingNode>,
    coordinator: Option<NodeRef>,
}

impl NodeService {
    /// A member listening on `addr` that has not joined yet.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            rpc: TcpRpc::new(),
            ring: None,
            coordinator: None,
        }
    }

    /// A member that already holds ring state (the coordinator's own node).
    pub fn with_ring(ring: RingNode, coordinator: NodeRef) -> Self {
        Self {
            addr: ring.me().addr,
            rpc: TcpRpc::new(),
            ring: Some(ring),
            coordinator: Some(coordinator),
        }
    }

    /// Binds `addr` and wraps a fresh member in a server.
    pub async fn bind(addr: SocketAddr) -> Result<Server<NodeService>> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        Ok(Server::new(listener, NodeService::new(local)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn rpc(&self) -> &TcpRpc {
        &self.rpc
    }

    pub fn ring(&self) -> Option<&RingNode> {
        self.ring.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.ring.is_some()
    }

    fn joined(&self) -> Result<&RingNode> {
        self.ring.as_ref().ok_or(NodeError::NotJoined)
    }

    async fn handle(&mut self, request: Request) -> Result<Option<Response>> {
        match request {
            Request::Join { id, params } => {
                self.join(id, params).await?;
                Ok(Some(Response::Ok))
            }
            Request::Publish(request) => {
                let (tag, reply_to) = (request.tag, request.reply_to);
                if let Err(e) = self.store(request).await {
                    self.report_failure(reply_to, tag, &e).await;
                    return Err(e);
                }
                Ok(None)
            }
            Request::Subscribe(request) => {
                if !self.is_joined() {
                    for tag in &request.tags {
                        self.report_failure(request.reply_to, *tag, &NodeError::NotJoined)
                            .await;
                    }
                    return Err(NodeError::NotJoined);
                }
                self.answer(request).await?;
                Ok(None)
            }
            Request::GetNode => Ok(Some(Response::Snapshot(self.joined()?.snapshot()))),
            Request::FindPredecessor { key } => {
                let mut hops = Trace::new();
                let node = self
                    .joined()?
                    .lookup(&self.rpc)
                    .find_predecessor(key, &mut hops)
                    .await?;
                Ok(Some(Response::Node(node)))
            }
            Request::FindSuccessor { key, trace } => {
                let mut hops = Trace::new();
                let node = self
                    .joined()?
                    .lookup(&self.rpc)
                    .find_successor(key, &mut hops)
                    .await?;
                debug!(key = %key, node = %node.id, hops = ?hops.hops(), "successor resolved");
                if !trace {
                    hops.clear();
                }
                Ok(Some(Response::Found { node, trace: hops }))
            }
            Request::SetPredecessor { node } => {
                let ring = self.ring.as_mut().ok_or(NodeError::NotJoined)?;
                debug!(id = %ring.id(), predecessor = %node.id, "predecessor set");
                ring.set_predecessor(node);
                Ok(None)
            }
            Request::UpdateFingerTable { node, index } => {
                let ring = self.ring.as_mut().ok_or(NodeError::NotJoined)?;
                ring.update_finger_table(&self.rpc, node, index).await?;
                Ok(Some(Response::Ok))
            }
            Request::ClosestPrecedingFinger { key } => {
                let node = self.joined()?.lookup(&self.rpc).closest_preceding_finger(key);
                Ok(Some(Response::Node(node)))
            }
            Request::PrintData { reply_to } => {
                self.print_data(reply_to).await?;
                Ok(Some(Response::Ok))
            }
        }
    }

    async fn join(&mut self, id: Identifier, params: RingParams) -> Result<()> {
        if let Some(ring) = &self.ring {
            return Err(NodeError::AlreadyJoined(ring.id()));
        }
        let me = NodeRef::new(id, self.addr);
        let mut ring = RingNode::solitary(me, params.space()?);
        ring.join(&self.rpc, &params.coordinator).await?;
        self.ring = Some(ring);
        self.coordinator = Some(params.coordinator);
        Ok(())
    }

    /// Stores a publish on this member and acknowledges it to the client.
    pub(crate) async fn store(&mut self, request: PublishRequest) -> Result<()> {
        let ring = self.ring.as_mut().ok_or(NodeError::NotJoined)?;
        let PublishRequest {
            tag,
            urls,
            reply_to,
            mut trace,
        } = request;
        if !ring.owns(tag) {
            warn!(id = %ring.id(), tag = %tag, "storing tag outside own arc");
        }
        info!(id = %ring.id(), tag = %tag, urls = urls.len(), "published");
        ring.publish(tag, urls);
        trace.record_once(ring.id());
        self.rpc
            .deliver(reply_to, &ClientReply::Published { tag, trace })
            .await?;
        Ok(())
    }

    /// Reads every requested tag and sends one reply per tag to the client.
    /// A failed delivery does not stop the remaining tags; the first failure
    /// is returned.
    pub(crate) async fn answer(&self, request: SubscribeRequest) -> Result<()> {
        let ring = self.joined()?;
        let mut first_error = None;
        for tag in request.tags {
            let urls = ring.lookup_entries(tag).map(<[String]>::to_vec).unwrap_or_default();
            let mut trace = request.trace.clone();
            trace.record_once(ring.id());
            debug!(id = %ring.id(), tag = %tag, urls = urls.len(), "subscribe answered");
            if let Err(e) = self
                .rpc
                .deliver(request.reply_to, &ClientReply::Urls { tag, urls, trace })
                .await
            {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Tells the client that `tag` could not be served.
    pub(crate) async fn report_failure(
        &self,
        reply_to: SocketAddr,
        tag: Identifier,
        cause: &NodeError,
    ) {
        let reply = ClientReply::Failed {
            tag,
            reason: cause.to_string(),
        };
        if let Err(e) = self.rpc.deliver(reply_to, &reply).await {
            error!(tag = %tag, %reply_to, error = %e, "could not report failure to client");
        }
    }

    /// Reports this member to the client and passes the walk on to the
    /// successor, stopping before it would return to the coordinator.
    async fn print_data(&self, reply_to: SocketAddr) -> Result<()> {
        let ring = self.joined()?;
        self.rpc
            .deliver(reply_to, &ClientReply::Report(ring.snapshot()))
            .await?;

        let successor = *ring.successor();
        let stop = self.coordinator.map_or(ring.id(), |c| c.id);
        if successor.id == stop || successor.id == ring.id() {
            return Ok(());
        }
        match self
            .rpc
            .call(successor.addr, &Request::PrintData { reply_to })
            .await?
        {
            Response::Ok => Ok(()),
            Response::Err(reason) => Err(transport::TransportError::Rejected(reason).into()),
            other => Err(transport::TransportError::UnexpectedResponse {
                command: "PRINT DATA",
                response: other.kind().to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl Dispatch for NodeService {
    async fn dispatch(&mut self, request: Request) -> Option<Response> {
        let command = request.command();
        let expects_response = request.expects_response();
        match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    NodeError::NotJoined => warn!(command, "rejected before join"),
                    _ => error!(command, error = %e, "request failed"),
                }
                expects_response.then(|| Response::Err(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::IdentifierSpace;

    fn coordinator() -> NodeRef {
        NodeRef::new(Identifier(1), "127.0.0.1:5370".parse().unwrap())
    }

    #[tokio::test]
    async fn test_ring_commands_before_join() {
        let mut service = NodeService::new("127.0.0.1:6000".parse().unwrap());
        assert!(!service.is_joined());
        for request in [
            Request::GetNode,
            Request::ClosestPrecedingFinger { key: Identifier(3) },
            Request::FindSuccessor {
                key: Identifier(3),
                trace: false,
            },
        ] {
            assert_eq!(
                service.dispatch(request).await,
                Some(Response::Err("not joined".into()))
            );
        }
        // One-way commands get no answer even when they fail.
        assert_eq!(
            service
                .dispatch(Request::SetPredecessor {
                    node: coordinator()
                })
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_subscribe_before_join_reports_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let reply_to = listener.local_addr().unwrap();
        let mut service = NodeService::new("127.0.0.1:6000".parse().unwrap());

        let response = service
            .dispatch(Request::Subscribe(SubscribeRequest {
                tags: vec![Identifier(4), Identifier(9)],
                reply_to,
                trace: Trace::new(),
            }))
            .await;
        assert_eq!(response, None);

        let mut failed = Vec::new();
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            match transport::read_message(&mut stream).await.unwrap().unwrap() {
                ClientReply::Failed { tag, reason } => {
                    assert_eq!(reason, "not joined");
                    failed.push(tag);
                }
                other => panic!("unexpected reply: {:?}", other),
            }
        }
        assert_eq!(failed, vec![Identifier(4), Identifier(9)]);
    }

    #[tokio::test]
    async fn test_solitary_coordinator_answers_locally() {
        let space = IdentifierSpace::new(6).unwrap();
        let me = coordinator();
        let mut service = NodeService::with_ring(RingNode::solitary(me, space), me);

        let response = service
            .dispatch(Request::FindSuccessor {
                key: Identifier(40),
                trace: true,
            })
            .await;
        assert_eq!(
            response,
            Some(Response::Found {
                node: me,
                trace: Trace::from(vec![Identifier(1)])
            })
        );

        let response = service
            .dispatch(Request::FindSuccessor {
                key: Identifier(40),
                trace: false,
            })
            .await;
        assert_eq!(
            response,
            Some(Response::Found {
                node: me,
                trace: Trace::new()
            })
        );

        assert_eq!(
            service
                .dispatch(Request::ClosestPrecedingFinger { key: Identifier(9) })
                .await,
            Some(Response::Node(me))
        );
    }

    #[tokio::test]
    async fn test_second_join_is_rejected() {
        let space = IdentifierSpace::new(6).unwrap();
        let me = coordinator();
        let mut service = NodeService::with_ring(RingNode::solitary(me, space), me);
        let response = service
            .dispatch(Request::Join {
                id: Identifier(8),
                params: RingParams {
                    bits: 6,
                    coordinator: me,
                },
            })
            .await;
        assert_eq!(
            response,
            Some(Response::Err("already joined as node 1".into()))
        );
    }

    #[tokio::test]
    async fn test_set_predecessor_updates_snapshot() {
        let space = IdentifierSpace::new(6).unwrap();
        let me = coordinator();
        let mut service = NodeService::with_ring(RingNode::solitary(me, space), me);
        let other = NodeRef::new(Identifier(40), "127.0.0.1:6040".parse().unwrap());

        assert_eq!(service.dispatch(Request::SetPredecessor { node: other }).await, None);
        match service.dispatch(Request::GetNode).await {
            Some(Response::Snapshot(snapshot)) => assert_eq!(snapshot.predecessor, other),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
