use std::net::SocketAddr;

use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::frame::FrameBuffer;
use crate::session::{Session, SessionState};
use crate::telemetry::{TelemetryRecord, TelemetrySender};

/// Bind the listener and serve terminal connections until dropped.
///
/// Each accepted connection gets its own task owning its session and frame
/// buffer; nothing is shared between connections apart from the config and
/// the telemetry sender.
pub async fn run(config: ServerConfig, sink: TelemetrySender) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Transient accept failures (e.g. fd exhaustion) should not
                // take the listener down.
                error!("accept failed: {e}");
                continue;
            }
        };
        info!("connection from {peer}");

        let config = config.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            match serve_stream(stream, peer, config, sink).await {
                Ok(()) => info!("connection from {peer} closed"),
                Err(e) => error!("connection from {peer} failed: {e}"),
            }
        });
    }
}

/// Drive one terminal connection: frames in, acknowledgements out.
///
/// Generic over the stream so tests can run it against an in-memory duplex
/// pipe instead of a socket.
pub async fn serve_stream<S>(
    mut stream: S,
    peer: SocketAddr,
    config: ServerConfig,
    sink: TelemetrySender,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames = FrameBuffer::new();
    let mut session = Session::new(config.ack_policy, config.max_decode_failures);
    let mut buf = vec![0u8; config.read_buffer_size];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!("{peer} reached EOF");
            session.close();
            return Ok(());
        }
        trace!("RX {peer}: {:02X?}", &buf[..n]);
        frames.extend(&buf[..n]);

        loop {
            match frames.next_frame() {
                Ok(Some(frame)) => {
                    let handled = session.handle_frame(&frame);
                    if let Some(ack) = handled.ack {
                        let bytes = ack.encode()?;
                        trace!("TX {peer}: {:02X?}", bytes);
                        stream.write_all(&bytes).await?;
                        stream.flush().await?;
                    }
                    if let Some((terminal_id, position)) = handled.position {
                        let record = TelemetryRecord {
                            terminal_id,
                            position,
                        };
                        if sink.send(record).is_err() {
                            debug!("telemetry sink is gone, dropping fix");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{peer}: {e}");
                    session.note_decode_error();
                }
            }
            if session.state() == SessionState::Closed {
                info!("session for {peer} closed by the state machine");
                return Ok(());
            }
        }
    }
}
