pub mod bcd;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod packet;
pub mod server;
pub mod session;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Gt06Error, Result};
pub use frame::{Frame, FrameBuffer};
pub use packet::{LoginPacket, Packet, PositionPacket, StatusPacket, TerminalId, Timestamp};
pub use session::{AckPolicy, Session, SessionState};
pub use telemetry::TelemetryRecord;
