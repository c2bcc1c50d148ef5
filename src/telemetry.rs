use log::info;
use tokio::sync::mpsc;

use crate::packet::{PositionPacket, TerminalId};

/// A decoded fix paired with the terminal that reported it.
#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub terminal_id: TerminalId,
    pub position: PositionPacket,
}

pub type TelemetrySender = mpsc::UnboundedSender<TelemetryRecord>;
pub type TelemetryReceiver = mpsc::UnboundedReceiver<TelemetryRecord>;

/// Create the fire-and-forget channel between connection tasks and the
/// telemetry consumer. Connection tasks never block on the sink; the
/// consumer owns its own buffering.
pub fn channel() -> (TelemetrySender, TelemetryReceiver) {
    mpsc::unbounded_channel()
}

/// Default sink: log every fix at info level.
pub async fn log_positions(mut rx: TelemetryReceiver) {
    while let Some(record) = rx.recv().await {
        let p = &record.position;
        info!(
            "fix from {}: {} lat {:.6} lon {:.6} speed {} km/h heading {}° satellites {}",
            record.terminal_id,
            p.timestamp,
            p.latitude,
            p.longitude,
            p.speed_kph,
            p.heading_degrees,
            p.satellites,
        );
    }
}
