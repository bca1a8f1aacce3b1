//! Typed ring protocol.
//!
//! Every command is one [`Request`] variant sent as a single frame; the
//! answer, when the command has one, is a single [`Response`] frame on the
//! same connection. Replies to clients travel on separate, inbound
//! connections to the client's `reply_to` address as [`ClientReply`]s.

use corelib::{Identifier, IdentifierSpace, NodeRef, NodeSnapshot, Trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Ring configuration handed to a member when it is told to join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingParams {
    /// Ring modulus exponent M.
    pub bits: u32,
    /// The member every join is resolved through.
    pub coordinator: NodeRef,
}

impl RingParams {
    pub fn space(&self) -> corelib::Result<IdentifierSpace> {
        IdentifierSpace::new(self.bits)
    }
}

/// Tag publication, as sent by a client and forwarded to the owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub tag: Identifier,
    pub urls: Vec<String>,
    pub reply_to: SocketAddr,
    pub trace: Trace,
}

/// Tag query. The coordinator splits it into one request per tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub tags: Vec<Identifier>,
    pub reply_to: SocketAddr,
    pub trace: Trace,
}

/// One ring command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Join { id: Identifier, params: RingParams },
    Publish(PublishRequest),
    Subscribe(SubscribeRequest),
    GetNode,
    FindPredecessor { key: Identifier },
    FindSuccessor { key: Identifier, trace: bool },
    SetPredecessor { node: NodeRef },
    UpdateFingerTable { node: NodeRef, index: usize },
    ClosestPrecedingFinger { key: Identifier },
    PrintData { reply_to: SocketAddr },
}

impl Request {
    /// Command tag, for logs.
    pub fn command(&self) -> &'static str {
        match self {
            Request::Join { .. } => "JOIN",
            Request::Publish(_) => "PUBLISH",
            Request::Subscribe(_) => "SUBSCRIBE",
            Request::GetNode => "GET NODE",
            Request::FindPredecessor { .. } => "FIND PRED",
            Request::FindSuccessor { .. } => "FIND SUCC",
            Request::SetPredecessor { .. } => "SET PRED",
            Request::UpdateFingerTable { .. } => "UPDATE FINGER TABLE",
            Request::ClosestPrecedingFinger { .. } => "CLOSEST PRE FINGER",
            Request::PrintData { .. } => "PRINT DATA",
        }
    }

    /// Whether the sender waits for a [`Response`] on the same connection.
    pub fn expects_response(&self) -> bool {
        !matches!(
            self,
            Request::Publish(_) | Request::Subscribe(_) | Request::SetPredecessor { .. }
        )
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Answer to a [`Request`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Err(String),
    Node(NodeRef),
    Snapshot(NodeSnapshot),
    Found { node: NodeRef, trace: Trace },
}

impl Response {
    /// Short name, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Ok => "OK",
            Response::Err(_) => "ERR",
            Response::Node(_) => "node",
            Response::Snapshot(_) => "snapshot",
            Response::Found { .. } => "found",
        }
    }
}

/// Message delivered to a client's reply listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientReply {
    Published { tag: Identifier, trace: Trace },
    Urls { tag: Identifier, urls: Vec<String>, trace: Trace },
    Report(NodeSnapshot),
    /// The tag could not be served; the ring's `ERR` answer.
    Failed { tag: Identifier, reason: String },
}

impl ClientReply {
    /// Tag the reply answers, if it answers one.
    pub fn tag(&self) -> Option<Identifier> {
        match self {
            ClientReply::Published { tag, .. }
            | ClientReply::Urls { tag, .. }
            | ClientReply::Failed { tag, .. } => Some(*tag),
            ClientReply::Report(_) => None,
        }
    }
}
