//! Ring client.
//!
//! Requests go to the coordinator; answers come back as inbound connections
//! from whichever member owns the tag, so the client listens on its own
//! reply address for the whole session.

use crate::query::{Query, QueryError};
use crate::registry::TagRegistry;
use corelib::{Identifier, NodeSnapshot, Trace};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, warn};
use transport::{
    read_message, ClientReply, PublishRequest, Request, Response, SubscribeRequest, TcpRpc,
    TransportError,
};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("malformed query: {0}")]
    Query(#[from] QueryError),
    #[error(transparent)]
    Ring(#[from] corelib::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("coordinator answered PRINT DATA with {0}")]
    Dump(String),
    #[error("ring walk did not close after {0} reports")]
    UnclosedRing(usize),
    #[error("tag {tag} could not be served: {reason}")]
    Failed { tag: Identifier, reason: String },
}

/// Result of one subscribe query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    /// URLs matching the whole query.
    pub urls: Vec<String>,
    /// Lookup trace of each tag that reached the ring.
    pub traces: Vec<(String, Trace)>,
}

pub struct Client {
    coordinator: SocketAddr,
    listener: TcpListener,
    reply_to: SocketAddr,
    rpc: TcpRpc,
    tags: TagRegistry,
}

impl Client {
    /// Binds the reply listener on `reply_addr` before anything is sent.
    pub async fn new(
        coordinator: SocketAddr,
        reply_addr: SocketAddr,
        tags: TagRegistry,
    ) -> Result<Self> {
        let listener = TcpListener::bind(reply_addr).await?;
        let reply_to = listener.local_addr()?;
        Ok(Self {
            coordinator,
            listener,
            reply_to,
            rpc: TcpRpc::new(),
            tags,
        })
    }

    pub fn reply_addr(&self) -> SocketAddr {
        self.reply_to
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagRegistry {
        &mut self.tags
    }

    /// Publishes `urls` under `tag`, replacing what the tag held before.
    /// Returns the members the request passed through.
    pub async fn publish(&mut self, tag: &str, urls: Vec<String>) -> Result<Trace> {
        let id = self.tags.register(tag)?;
        let request = Request::Publish(PublishRequest {
            tag: id,
            urls,
            reply_to: self.reply_to,
            trace: Trace::new(),
        });
        self.rpc.send_oneway(self.coordinator, &request).await?;

        loop {
            match self.next_reply().await? {
                ClientReply::Published { tag: acked, trace } if acked == id => {
                    debug!(tag, id = %id, hops = trace.len(), "publish acknowledged");
                    return Ok(trace);
                }
                ClientReply::Failed { tag: failed, reason } if failed == id => {
                    return Err(ClientError::Failed { tag: id, reason });
                }
                other => warn!(reply = ?other, "ignoring unrelated reply"),
            }
        }
    }

    /// Runs a subscribe query.
    ///
    /// The query is validated before anything is sent. Tags this client has
    /// never registered match nothing; if none of the query's tags are known
    /// the ring is not contacted at all.
    pub async fn subscribe(&mut self, query: &str) -> Result<Subscription> {
        let query = Query::parse(query)?;

        let mut wanted: Vec<(String, Identifier)> = Vec::new();
        let mut seen = HashSet::new();
        for tag in query.tags() {
            if let Some(id) = self.tags.resolve(tag) {
                if seen.insert(id) {
                    wanted.push((tag.to_string(), id));
                }
            }
        }
        if wanted.is_empty() {
            return Ok(Subscription::default());
        }

        let request = Request::Subscribe(SubscribeRequest {
            tags: wanted.iter().map(|(_, id)| *id).collect(),
            reply_to: self.reply_to,
            trace: Trace::new(),
        });
        self.rpc.send_oneway(self.coordinator, &request).await?;

        // Owners answer independently; match replies by tag, not arrival.
        // Every tag is drained, failed or not, so no answer is left queued.
        let mut answers: HashMap<Identifier, std::result::Result<(Vec<String>, Trace), String>> =
            HashMap::new();
        while answers.len() < wanted.len() {
            match self.next_reply().await? {
                ClientReply::Urls { tag, urls, trace } if seen.contains(&tag) => {
                    answers.insert(tag, Ok((urls, trace)));
                }
                ClientReply::Failed { tag, reason } if seen.contains(&tag) => {
                    warn!(tag = %tag, reason = %reason, "tag failed");
                    answers.insert(tag, Err(reason));
                }
                other => warn!(reply = ?other, "ignoring unrelated reply"),
            }
        }

        let mut by_name = HashMap::new();
        let mut traces = Vec::with_capacity(wanted.len());
        for (name, id) in wanted {
            match answers.remove(&id) {
                Some(Ok((urls, trace))) => {
                    by_name.insert(name.clone(), urls);
                    traces.push((name, trace));
                }
                Some(Err(reason)) => return Err(ClientError::Failed { tag: id, reason }),
                None => {}
            }
        }
        Ok(Subscription {
            urls: query.evaluate(&by_name),
            traces,
        })
    }

    /// Walks the ring from the coordinator and returns every member's record
    /// in ring order.
    pub async fn dump(&self) -> Result<Vec<NodeSnapshot>> {
        let request = Request::PrintData {
            reply_to: self.reply_to,
        };
        let call = self.rpc.call(self.coordinator, &request);
        let collect = self.collect_reports();
        tokio::pin!(call, collect);

        // The walk may close before the call returns; a failed call ends
        // collection, since no report will follow.
        let mut reports = None;
        let response = loop {
            tokio::select! {
                response = &mut call => break response?,
                collected = &mut collect, if reports.is_none() => reports = Some(collected?),
            }
        };
        match response {
            Response::Ok => match reports {
                Some(reports) => Ok(reports),
                None => collect.await,
            },
            Response::Err(reason) => Err(ClientError::Dump(reason)),
            other => Err(ClientError::Dump(other.kind().to_string())),
        }
    }

    /// Collects reports until one names the first reporter as its successor.
    async fn collect_reports(&self) -> Result<Vec<NodeSnapshot>> {
        let limit = self.tags.space().size();
        let mut reports: Vec<NodeSnapshot> = Vec::new();
        loop {
            match self.next_reply().await? {
                ClientReply::Report(snapshot) => {
                    let closed = reports
                        .first()
                        .map_or(snapshot.successor.id == snapshot.node.id, |first| {
                            snapshot.successor.id == first.node.id
                        });
                    reports.push(snapshot);
                    if closed {
                        return Ok(reports);
                    }
                    if reports.len() as u64 >= limit {
                        return Err(ClientError::UnclosedRing(reports.len()));
                    }
                }
                other => warn!(reply = ?other, "ignoring unrelated reply"),
            }
        }
    }

    async fn next_reply(&self) -> Result<ClientReply> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            match read_message(&mut stream).await {
                Ok(Some(reply)) => return Ok(reply),
                Ok(None) => debug!(%peer, "empty reply connection"),
                Err(e) => warn!(%peer, error = %e, "unreadable reply"),
            }
        }
    }
}
