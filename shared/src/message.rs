//! Wire protocol shared by server and client.
//!
//! Every datagram carries exactly one message: a [`RawMessage`] record encoded
//! with bincode and compressed with LZ4 (size-prepended block format). The
//! record holds an explicit `kind` discriminator plus only the fields that kind
//! uses; unused fields are `None`. [`Message`] is the validated form handed to
//! the rest of the code.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

use crate::entity::Snapshot;
use crate::physics::Vector2;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Upper bound on the decompressed size a peer may declare.
pub const MAX_DECOMPRESSED_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Connect,
    Ping,
    ChangeSpeed,
    GameStatusUpdate,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("payload too short to carry a size prefix")]
    Truncated,
    #[error("declared payload size {0} exceeds the 1 MiB limit")]
    TooLarge(usize),
    #[error("decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    #[error("malformed record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("`{field}` required for {kind:?}")]
    MissingField { kind: MessageType, field: &'static str },
    #[error("speed components must be finite, got ({magnitude}, {angle})")]
    NonFiniteSpeed { magnitude: f32, angle: f32 },
    #[error("speed components must not be negative, got ({magnitude}, {angle})")]
    NegativeSpeed { magnitude: f32, angle: f32 },
    #[error("speed magnitude must not exceed 1, got {0}")]
    MagnitudeTooLarge(f32),
}

/// Requested speed as a fraction of max speed and a heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarSpeed {
    magnitude: f32,
    angle: f32,
}

impl PolarSpeed {
    /// Both components must be finite and non-negative, `magnitude` at most 1.
    pub fn new(magnitude: f32, angle: f32) -> Result<Self, MessageError> {
        if !magnitude.is_finite() || !angle.is_finite() {
            return Err(MessageError::NonFiniteSpeed { magnitude, angle });
        }

        if magnitude < 0.0 || angle < 0.0 {
            return Err(MessageError::NegativeSpeed { magnitude, angle });
        }

        if magnitude > 1.0 {
            return Err(MessageError::MagnitudeTooLarge(magnitude));
        }

        Ok(Self { magnitude, angle })
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Cartesian speed for an organism with the given max speed.
    pub fn to_velocity(&self, max_speed: f32) -> Vector2 {
        Vector2::from_polar(max_speed * self.magnitude, self.angle)
    }

    fn validate(self) -> Result<Self, MessageError> {
        Self::new(self.magnitude, self.angle)
    }
}

/// Validated message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client asks to join with a display name.
    Connect { name: String },
    /// Server reply to [`Message::Connect`]; travels as a `Connect` record.
    Connected {
        bacteria_id: u32,
        name: String,
        world_size: f32,
        total_nutrient: f32,
    },
    /// Keep-alive.
    Ping,
    ChangeSpeed { bacteria_id: u32, speed: PolarSpeed },
    GameStatusUpdate { snapshot: Snapshot },
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Connect { .. } | Message::Connected { .. } => MessageType::Connect,
            Message::Ping => MessageType::Ping,
            Message::ChangeSpeed { .. } => MessageType::ChangeSpeed,
            Message::GameStatusUpdate { .. } => MessageType::GameStatusUpdate,
        }
    }

    pub fn pack(self) -> Result<Vec<u8>, MessageError> {
        RawMessage::from(self).pack()
    }

    pub fn unpack(data: &[u8]) -> Result<Message, MessageError> {
        Message::try_from(RawMessage::unpack(data)?)
    }
}

/// Record as it travels on the wire, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub kind: MessageType,
    pub name: Option<String>,
    pub bacteria_id: Option<u32>,
    pub speed_polar: Option<PolarSpeed>,
    pub world_size: Option<f32>,
    pub total_nutrient: Option<f32>,
    pub snapshot: Option<Snapshot>,
}

impl RawMessage {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            name: None,
            bacteria_id: None,
            speed_polar: None,
            world_size: None,
            total_nutrient: None,
            snapshot: None,
        }
    }

    pub fn pack(&self) -> Result<Vec<u8>, MessageError> {
        let encoded = bincode::serialize(self)?;
        Ok(compress_prepend_size(&encoded))
    }

    pub fn unpack(data: &[u8]) -> Result<RawMessage, MessageError> {
        let prefix: [u8; 4] = data
            .get(..4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(MessageError::Truncated)?;

        let declared = u32::from_le_bytes(prefix) as usize;
        if declared > MAX_DECOMPRESSED_SIZE {
            return Err(MessageError::TooLarge(declared));
        }

        let decompressed = decompress_size_prepended(data)?;
        Ok(bincode::deserialize(&decompressed)?)
    }

    fn required<T>(kind: MessageType, field: &'static str, value: Option<T>) -> Result<T, MessageError> {
        value.ok_or(MessageError::MissingField { kind, field })
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        let mut raw = RawMessage::new(message.kind());

        match message {
            Message::Connect { name } => {
                raw.name = Some(name);
            }
            Message::Connected {
                bacteria_id,
                name,
                world_size,
                total_nutrient,
            } => {
                raw.bacteria_id = Some(bacteria_id);
                raw.name = Some(name);
                raw.world_size = Some(world_size);
                raw.total_nutrient = Some(total_nutrient);
            }
            Message::Ping => {}
            Message::ChangeSpeed { bacteria_id, speed } => {
                raw.bacteria_id = Some(bacteria_id);
                raw.speed_polar = Some(speed);
            }
            Message::GameStatusUpdate { snapshot } => {
                raw.snapshot = Some(snapshot);
            }
        }

        raw
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let kind = raw.kind;

        match kind {
            MessageType::Connect => {
                let name = RawMessage::required(kind, "name", raw.name)?;

                // A CONNECT record that carries world parameters is the reply
                match (raw.bacteria_id, raw.world_size, raw.total_nutrient) {
                    (Some(bacteria_id), Some(world_size), Some(total_nutrient)) => {
                        Ok(Message::Connected {
                            bacteria_id,
                            name,
                            world_size,
                            total_nutrient,
                        })
                    }
                    _ => Ok(Message::Connect { name }),
                }
            }
            MessageType::Ping => Ok(Message::Ping),
            MessageType::ChangeSpeed => {
                let speed = RawMessage::required(kind, "speed_polar", raw.speed_polar)?.validate()?;
                let bacteria_id = RawMessage::required(kind, "bacteria_id", raw.bacteria_id)?;
                Ok(Message::ChangeSpeed { bacteria_id, speed })
            }
            MessageType::GameStatusUpdate => {
                let snapshot = RawMessage::required(kind, "snapshot", raw.snapshot)?;
                Ok(Message::GameStatusUpdate { snapshot })
            }
        }
    }
}
