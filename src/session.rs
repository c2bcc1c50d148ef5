use log::{debug, info, warn};

use crate::error::Gt06Error;
use crate::frame::Frame;
use crate::packet::{trailing_sequence, protocol_id, Packet, PositionPacket, StatusPacket, TerminalId};

/// Acknowledgement construction policy.
///
/// Firmware variants disagree about what the server must echo, so the
/// deviations live here as configuration instead of forked code paths.
#[derive(Debug, Clone)]
pub struct AckPolicy {
    /// Protocol id placed in login and position acknowledgements.
    pub login_ack_protocol: u8,
    /// Acknowledge packets that arrive before a successful login, as a
    /// probe for terminals that stall otherwise.
    pub ack_before_login: bool,
    /// Process frames whose checksum failed verification. Slightly noisy
    /// links produce these; dropping them stalls some terminals.
    pub accept_bad_checksum: bool,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            login_ack_protocol: protocol_id::LOGIN,
            ack_before_login: false,
            accept_bad_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingLogin,
    LoggedIn,
    Closed,
}

/// What the state machine decided for one incoming frame.
#[derive(Debug, Default)]
pub struct Handled {
    /// Acknowledgement to transmit, if any.
    pub ack: Option<Frame>,
    /// Decoded fix to hand to the telemetry sink.
    pub position: Option<(TerminalId, PositionPacket)>,
}

/// Per-connection protocol state.
///
/// Owned exclusively by the connection's task; never shared.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    terminal_id: Option<TerminalId>,
    last_sequence: u16,
    decode_failures: u32,
    max_decode_failures: u32,
    policy: AckPolicy,
}

impl Session {
    pub fn new(policy: AckPolicy, max_decode_failures: u32) -> Self {
        Self {
            state: SessionState::AwaitingLogin,
            terminal_id: None,
            last_sequence: 0,
            decode_failures: 0,
            max_decode_failures,
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn terminal_id(&self) -> Option<TerminalId> {
        self.terminal_id
    }

    pub fn last_sequence(&self) -> u16 {
        self.last_sequence
    }

    /// Transport closed; the session is finished.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Record a decode failure reported by the framing layer.
    ///
    /// Failures are counted consecutively; exhausting the budget closes
    /// the session. Any successfully decoded packet resets the count.
    pub fn note_decode_error(&mut self) {
        self.decode_failures += 1;
        if self.decode_failures >= self.max_decode_failures {
            warn!(
                "closing session after {} consecutive decode failures",
                self.decode_failures
            );
            self.state = SessionState::Closed;
        }
    }

    /// Run one decoded frame through the state machine.
    pub fn handle_frame(&mut self, frame: &Frame) -> Handled {
        let mut out = Handled::default();
        if self.state == SessionState::Closed {
            return out;
        }

        if let Err(e) = frame.verify() {
            if !self.policy.accept_bad_checksum {
                warn!("{e}: dropping frame");
                self.note_decode_error();
                return out;
            }
            debug!("{e}: processing anyway per policy");
        }

        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(Gt06Error::UnsupportedProtocolId(id)) => {
                debug!("ignoring unsupported protocol id {id:#04x}");
                // Mid-handshake probe: some firmware expects a login-style
                // ack even for packets the server does not decode.
                if self.state == SessionState::AwaitingLogin && self.policy.ack_before_login {
                    let sequence = trailing_sequence(&frame.payload).unwrap_or(0);
                    out.ack = Some(self.login_style_ack(sequence));
                }
                return out;
            }
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                self.note_decode_error();
                return out;
            }
        };
        self.decode_failures = 0;

        match packet {
            Packet::Login(login) => {
                info!(
                    "terminal {} logged in (sequence {})",
                    login.terminal_id, login.sequence
                );
                self.terminal_id = Some(login.terminal_id);
                self.last_sequence = login.sequence;
                self.state = SessionState::LoggedIn;
                out.ack = Some(self.login_style_ack(login.sequence));
            }
            Packet::Position(position) => {
                let sequence = position.sequence.unwrap_or(0);
                match self.state {
                    SessionState::LoggedIn => {
                        if let Some(seq) = position.sequence {
                            self.last_sequence = seq;
                        }
                        out.ack = Some(self.login_style_ack(sequence));
                        if let Some(terminal_id) = self.terminal_id {
                            out.position = Some((terminal_id, position));
                        }
                    }
                    SessionState::AwaitingLogin => {
                        debug!("position before login");
                        if self.policy.ack_before_login {
                            out.ack = Some(self.login_style_ack(sequence));
                        }
                    }
                    SessionState::Closed => {}
                }
            }
            Packet::Heartbeat(status) => {
                debug!("heartbeat, {} byte payload", status.payload.len());
                out.ack = self.ack_status(&status);
            }
            Packet::Alarm(status) => {
                // Not decoded further here; the log line flags it for
                // external handling.
                warn!(
                    "alarm packet (protocol {:#04x}) from terminal {}",
                    status.protocol_id,
                    self.terminal_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "<unknown>".into())
                );
                out.ack = self.ack_status(&status);
            }
        }

        out
    }

    /// Acknowledge a heartbeat or alarm by mirroring its protocol id and
    /// trailing sequence number.
    fn ack_status(&mut self, status: &StatusPacket) -> Option<Frame> {
        if self.state != SessionState::LoggedIn && !self.policy.ack_before_login {
            return None;
        }
        let sequence = status.sequence.unwrap_or(0);
        if let Some(seq) = status.sequence {
            self.last_sequence = seq;
        }
        Some(Frame::new(
            status.protocol_id,
            sequence.to_be_bytes().to_vec(),
        ))
    }

    /// The conventional acknowledgement: policy protocol id (0x01 by
    /// default) carrying the echoed sequence number. The round-tripped
    /// sequence is how the terminal correlates server responses to its
    /// own packets.
    fn login_style_ack(&self, sequence: u16) -> Frame {
        Frame::new(
            self.policy.login_ack_protocol,
            sequence.to_be_bytes().to_vec(),
        )
    }
}
