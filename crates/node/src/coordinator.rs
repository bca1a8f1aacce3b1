//! The coordinator: a ring member that is also the client-facing front door.
//!
//! The coordinator is a [`NodeService`] with a fixed, well-known identifier
//! that is part of the ring from the start. On top of the ordinary ring
//! commands it routes PUBLISH and SUBSCRIBE: it resolves the owner of each
//! tag, serves the tag itself when it is the owner, and otherwise forwards
//! the payload to the owner, which replies to the client directly.

use crate::error::{NodeError, Result};
use crate::server::{Dispatch, Server};
use crate::service::NodeService;
use async_trait::async_trait;
use corelib::{Identifier, IdentifierSpace, NodeRef, RingNode, Trace};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error};
use transport::{PublishRequest, Request, Response, SubscribeRequest};

pub struct CoordinatorService {
    inner: NodeService,
}

impl CoordinatorService {
    /// Coordinator alone on its ring.
    pub fn new(me: NodeRef, space: IdentifierSpace) -> Self {
        Self {
            inner: NodeService::with_ring(RingNode::solitary(me, space), me),
        }
    }

    /// Binds `addr` and wraps a fresh coordinator with identifier `id`.
    pub async fn bind(
        addr: SocketAddr,
        id: Identifier,
        space: IdentifierSpace,
    ) -> Result<Server<CoordinatorService>> {
        let listener = TcpListener::bind(addr).await?;
        let me = NodeRef::new(id, listener.local_addr()?);
        Ok(Server::new(listener, CoordinatorService::new(me, space)))
    }

    pub fn node(&self) -> &NodeService {
        &self.inner
    }

    pub fn me(&self) -> Result<NodeRef> {
        Ok(*self.ring()?.me())
    }

    fn ring(&self) -> Result<&RingNode> {
        self.inner.ring().ok_or(NodeError::NotJoined)
    }

    /// Owner of `tag`, recording the lookup hops in `trace`.
    ///
    /// A tag on the arc `(self, successor]` belongs to the successor and
    /// needs no lookup.
    async fn resolve_owner(&self, tag: Identifier, trace: &mut Trace) -> Result<NodeRef> {
        let ring = self.ring()?;
        let successor = *ring.successor();
        if ring.space().in_half_open(tag, ring.id(), successor.id) {
            trace.record(ring.id());
            return Ok(successor);
        }
        Ok(ring
            .lookup(self.inner.rpc())
            .find_successor(tag, trace)
            .await?)
    }

    async fn route_publish(&mut self, mut request: PublishRequest) -> Result<()> {
        let owner = self.resolve_owner(request.tag, &mut request.trace).await?;
        debug!(tag = %request.tag, owner = %owner.id, "publish routed");
        if owner.id == self.ring()?.id() {
            return self.inner.store(request).await;
        }
        self.inner
            .rpc()
            .send_oneway(owner.addr, &Request::Publish(request))
            .await?;
        Ok(())
    }

    /// Routes one tag of a query; its owner answers the client itself.
    async fn route_subscribe_tag(&self, tag: Identifier, request: &SubscribeRequest) -> Result<()> {
        let mut trace = request.trace.clone();
        let owner = self.resolve_owner(tag, &mut trace).await?;
        debug!(tag = %tag, owner = %owner.id, "subscribe routed");
        let single = SubscribeRequest {
            tags: vec![tag],
            reply_to: request.reply_to,
            trace,
        };
        if owner.id == self.ring()?.id() {
            return self.inner.answer(single).await;
        }
        self.inner
            .rpc()
            .send_oneway(owner.addr, &Request::Subscribe(single))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Dispatch for CoordinatorService {
    async fn dispatch(&mut self, request: Request) -> Option<Response> {
        match request {
            Request::Publish(publish) => {
                let (tag, reply_to) = (publish.tag, publish.reply_to);
                if let Err(e) = self.route_publish(publish).await {
                    error!(tag = %tag, error = %e, "publish failed");
                    self.inner.report_failure(reply_to, tag, &e).await;
                }
                None
            }
            Request::Subscribe(subscribe) => {
                // Tags fan out independently; one failure leaves the rest alone.
                for tag in &subscribe.tags {
                    if let Err(e) = self.route_subscribe_tag(*tag, &subscribe).await {
                        error!(tag = %tag, error = %e, "subscribe failed");
                        self.inner
                            .report_failure(subscribe.reply_to, *tag, &e)
                            .await;
                    }
                }
                None
            }
            other => self.inner.dispatch(other).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use transport::{read_message, ClientReply};

    #[tokio::test]
    async fn test_solitary_coordinator_serves_everything() {
        let space = IdentifierSpace::new(6).unwrap();
        let me = NodeRef::new(Identifier(1), "127.0.0.1:5370".parse().unwrap());
        let mut coordinator = CoordinatorService::new(me, space);
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let reply_to = client.local_addr().unwrap();

        let publish = Request::Publish(PublishRequest {
            tag: Identifier(10),
            urls: vec!["http://x".into()],
            reply_to,
            trace: Trace::new(),
        });
        assert_eq!(coordinator.dispatch(publish).await, None);
        let (mut stream, _) = client.accept().await.unwrap();
        let reply: ClientReply = read_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(
            reply,
            ClientReply::Published {
                tag: Identifier(10),
                trace: Trace::from(vec![Identifier(1)])
            }
        );

        let subscribe = Request::Subscribe(SubscribeRequest {
            tags: vec![Identifier(10), Identifier(11)],
            reply_to,
            trace: Trace::new(),
        });
        assert_eq!(coordinator.dispatch(subscribe).await, None);
        let mut replies = Vec::new();
        for _ in 0..2 {
            let (mut stream, _) = client.accept().await.unwrap();
            replies.push(read_message::<_, ClientReply>(&mut stream).await.unwrap().unwrap());
        }
        assert_eq!(
            replies,
            vec![
                ClientReply::Urls {
                    tag: Identifier(10),
                    urls: vec!["http://x".into()],
                    trace: Trace::from(vec![Identifier(1)])
                },
                ClientReply::Urls {
                    tag: Identifier(11),
                    urls: vec![],
                    trace: Trace::from(vec![Identifier(1)])
                },
            ]
        );
    }

    /// Coordinator 1 whose only other finger points at member 40, which is
    /// not listening.
    async fn coordinator_with_dead_successor() -> CoordinatorService {
        let space = IdentifierSpace::new(6).unwrap();
        let me = NodeRef::new(Identifier(1), "127.0.0.1:5370".parse().unwrap());
        let gone = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = NodeRef::new(Identifier(40), gone.local_addr().unwrap());
        drop(gone);

        let mut ring = RingNode::solitary(me, space);
        ring.set_finger(1, dead).unwrap();
        CoordinatorService {
            inner: NodeService::with_ring(ring, me),
        }
    }

    async fn next_reply(client: &TcpListener) -> ClientReply {
        let accepted = tokio::time::timeout(Duration::from_secs(5), client.accept())
            .await
            .expect("client was never answered");
        let (mut stream, _) = accepted.unwrap();
        read_message(&mut stream).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_owner_fails_publish_to_client() {
        let mut coordinator = coordinator_with_dead_successor().await;
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let reply_to = client.local_addr().unwrap();

        let publish = Request::Publish(PublishRequest {
            tag: Identifier(10),
            urls: vec!["http://x".into()],
            reply_to,
            trace: Trace::new(),
        });
        assert_eq!(coordinator.dispatch(publish).await, None);
        match next_reply(&client).await {
            ClientReply::Failed { tag, reason } => {
                assert_eq!(tag, Identifier(10));
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_subscribed_tag_gets_an_answer() {
        let mut coordinator = coordinator_with_dead_successor().await;
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let reply_to = client.local_addr().unwrap();

        // 10 is forwarded to the dead successor; 0 needs a remote lookup hop.
        let subscribe = Request::Subscribe(SubscribeRequest {
            tags: vec![Identifier(10), Identifier(0)],
            reply_to,
            trace: Trace::new(),
        });
        assert_eq!(coordinator.dispatch(subscribe).await, None);
        let mut failed = Vec::new();
        for _ in 0..2 {
            match next_reply(&client).await {
                ClientReply::Failed { tag, .. } => failed.push(tag),
                other => panic!("unexpected reply: {:?}", other),
            }
        }
        assert_eq!(failed, vec![Identifier(10), Identifier(0)]);
    }

    #[tokio::test]
    async fn test_coordinator_refuses_join() {
        let space = IdentifierSpace::new(6).unwrap();
        let me = NodeRef::new(Identifier(1), "127.0.0.1:5370".parse().unwrap());
        let mut coordinator = CoordinatorService::new(me, space);
        let response = coordinator
            .dispatch(Request::Join {
                id: Identifier(9),
                params: transport::RingParams {
                    bits: 6,
                    coordinator: me,
                },
            })
            .await;
        assert!(matches!(response, Some(Response::Err(_))));
    }
}
