//! JSON wire protocol for graph and presence deltas.
//!
//! One object per text frame, discriminated by `type`:
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┬───────────┐
//! │ type         │ payload                                        │ direction │
//! ├──────────────┼────────────────────────────────────────────────┼───────────┤
//! │ create_shape │ shape {x, y, draggable, isDragging, rotation,  │ out, echo │
//! │              │        node_type}                              │           │
//! │ update_shape │ shape {id, x, y, rotation, isDragging, ...}    │ both      │
//! │ create_edge  │ edge_info {source, source_handle, target, ...} │ both      │
//! │ update_mouse │ mouse_info {x, y[, conn_id]}                   │ both      │
//! │ disconnect   │ mouse_info {conn_id}                           │ in        │
//! └──────────────┴────────────────────────────────────────────────┴───────────┘
//! ```
//!
//! Outbound shapes always carry `node_type` and outbound edges always carry
//! both handles; the server requires the fields, so absent values go out
//! as `""`. Inbound, an empty string reads as absent.
//!
//! Inbound frames that are not valid JSON, carry no or an unknown `type`,
//! or lack a required field decode to `None`. That is the normal path for
//! junk, not an error the engine reports.

use flowsync_core::{EdgeEndpoints, Point, ShapeFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame discriminators understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    CreateShape,
    UpdateShape,
    CreateEdge,
    UpdateMouse,
    Disconnect,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::CreateShape,
        MessageType::UpdateShape,
        MessageType::CreateEdge,
        MessageType::UpdateMouse,
        MessageType::Disconnect,
    ];

    /// Wire name of the discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CreateShape => "create_shape",
            MessageType::UpdateShape => "update_shape",
            MessageType::CreateEdge => "create_edge",
            MessageType::UpdateMouse => "update_mouse",
            MessageType::Disconnect => "disconnect",
        }
    }

    /// Parse a wire name; `None` for anything this client does not handle.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// Shape state carried by `create_shape` / `update_shape` frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeState {
    pub id: String,
    pub position: Point,
    pub flags: ShapeFlags,
    pub node_type: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Server echo of a creation, now carrying the assigned id.
    ShapeCreated(ShapeState),
    ShapeUpdated(ShapeState),
    EdgeCreated(EdgeEndpoints),
    /// Remote pointer position in canvas space.
    MouseMoved { conn_id: String, position: Point },
    /// A remote participant left the session.
    PeerDisconnected { conn_id: String },
}

impl Event {
    /// Decode a raw frame, dropping anything malformed or unrecognized.
    pub fn decode(raw: &str) -> Option<Self> {
        match Self::try_decode(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("Dropping inbound frame: {e}");
                None
            }
        }
    }

    /// Decode a raw frame, reporting why it was rejected.
    pub fn try_decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;

        let name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if MessageType::parse(name).is_none() {
            return Err(ProtocolError::UnknownType(name.to_owned()));
        }

        let frame: InboundFrame = serde_json::from_value(value).map_err(ProtocolError::Malformed)?;
        Ok(frame.into_event())
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Event::ShapeCreated(_) => MessageType::CreateShape,
            Event::ShapeUpdated(_) => MessageType::UpdateShape,
            Event::EdgeCreated(_) => MessageType::CreateEdge,
            Event::MouseMoved { .. } => MessageType::UpdateMouse,
            Event::PeerDisconnected { .. } => MessageType::Disconnect,
        }
    }
}

/// A locally generated request for a shared-state change.
///
/// Intents are never applied locally; state changes only when the server's
/// broadcast echo comes back as an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    CreateShape {
        position: Point,
        flags: ShapeFlags,
        node_type: Option<String>,
    },
    UpdateShape {
        id: String,
        position: Point,
        flags: ShapeFlags,
        node_type: Option<String>,
    },
    CreateEdge(EdgeEndpoints),
    /// Local pointer position in canvas space.
    UpdateMouse { position: Point },
}

impl Intent {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let frame = match self {
            Intent::CreateShape { position, flags, node_type } => OutboundFrame::CreateShape {
                shape: OutShape::new(None, *position, *flags, node_type.as_deref()),
            },
            Intent::UpdateShape { id, position, flags, node_type } => OutboundFrame::UpdateShape {
                shape: OutShape::new(Some(id), *position, *flags, node_type.as_deref()),
            },
            Intent::CreateEdge(endpoints) => OutboundFrame::CreateEdge {
                edge_info: OutEdge {
                    source: &endpoints.source,
                    source_handle: endpoints.source_handle.as_deref().unwrap_or_default(),
                    target: &endpoints.target,
                    target_handle: endpoints.target_handle.as_deref().unwrap_or_default(),
                },
            },
            Intent::UpdateMouse { position } => OutboundFrame::UpdateMouse {
                mouse_info: OutMouse { x: position.x, y: position.y },
            },
        };
        serde_json::to_string(&frame).map_err(ProtocolError::Encode)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Intent::CreateShape { .. } => MessageType::CreateShape,
            Intent::UpdateShape { .. } => MessageType::UpdateShape,
            Intent::CreateEdge(_) => MessageType::CreateEdge,
            Intent::UpdateMouse { .. } => MessageType::UpdateMouse,
        }
    }
}

/// Codec errors. Only ever logged; never surfaced to the server.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no type discriminator")]
    MissingType,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    #[error("serialization error: {0}")]
    Encode(#[source] serde_json::Error),
}

// ───────────────────────────────────────────────────────────────────
// Wire shapes
// ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    CreateShape { shape: WireShape },
    UpdateShape { shape: WireShape },
    CreateEdge { edge_info: WireEdge },
    UpdateMouse { mouse_info: WireMouse },
    Disconnect { mouse_info: WireConn },
}

#[derive(Deserialize)]
struct WireShape {
    id: String,
    x: f64,
    y: f64,
    #[serde(default)]
    draggable: Option<bool>,
    #[serde(default, rename = "isDragging")]
    is_dragging: Option<bool>,
    #[serde(default)]
    rotation: Option<i64>,
    #[serde(default)]
    node_type: Option<String>,
}

impl WireShape {
    fn into_state(self) -> ShapeState {
        ShapeState {
            id: self.id,
            position: Point::new(self.x, self.y),
            flags: ShapeFlags {
                draggable: self.draggable.unwrap_or(false),
                is_dragging: self.is_dragging.unwrap_or(false),
                rotation: self.rotation.unwrap_or(0),
            },
            node_type: non_empty(self.node_type),
        }
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
struct WireEdge {
    source: String,
    #[serde(default)]
    source_handle: Option<String>,
    target: String,
    #[serde(default)]
    target_handle: Option<String>,
}

#[derive(Deserialize)]
struct WireMouse {
    x: f64,
    y: f64,
    conn_id: String,
}

#[derive(Deserialize)]
struct WireConn {
    conn_id: String,
}

impl InboundFrame {
    fn into_event(self) -> Event {
        match self {
            InboundFrame::CreateShape { shape } => Event::ShapeCreated(shape.into_state()),
            InboundFrame::UpdateShape { shape } => Event::ShapeUpdated(shape.into_state()),
            InboundFrame::CreateEdge { edge_info } => Event::EdgeCreated(EdgeEndpoints {
                source: edge_info.source,
                source_handle: non_empty(edge_info.source_handle),
                target: edge_info.target,
                target_handle: non_empty(edge_info.target_handle),
            }),
            InboundFrame::UpdateMouse { mouse_info } => Event::MouseMoved {
                conn_id: mouse_info.conn_id,
                position: Point::new(mouse_info.x, mouse_info.y),
            },
            InboundFrame::Disconnect { mouse_info } => Event::PeerDisconnected {
                conn_id: mouse_info.conn_id,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    CreateShape { shape: OutShape<'a> },
    UpdateShape { shape: OutShape<'a> },
    CreateEdge { edge_info: OutEdge<'a> },
    UpdateMouse { mouse_info: OutMouse },
}

#[derive(Serialize)]
struct OutShape<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    x: f64,
    y: f64,
    draggable: bool,
    #[serde(rename = "isDragging")]
    is_dragging: bool,
    rotation: i64,
    node_type: &'a str,
}

impl<'a> OutShape<'a> {
    fn new(
        id: Option<&'a str>,
        position: Point,
        flags: ShapeFlags,
        node_type: Option<&'a str>,
    ) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
            draggable: flags.draggable,
            is_dragging: flags.is_dragging,
            rotation: flags.rotation,
            node_type: node_type.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct OutEdge<'a> {
    source: &'a str,
    source_handle: &'a str,
    target: &'a str,
    target_handle: &'a str,
}

#[derive(Serialize)]
struct OutMouse {
    x: f64,
    y: f64,
}
