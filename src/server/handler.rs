// ABOUTME: Per-connection reader task: decodes inbound frames and drives the session state machine
// ABOUTME: Submits and MO messages are admitted here and handed to the worker pool

use super::GatewayContext;
use super::pipeline;
use super::session::{ConnectionHandle, Session, SessionState};
use crate::codec::RawFrame;
use crate::connection::{ConnectionError, FrameReader};
use crate::datatypes::{
    ActiveTest, AUTHENTICATOR_LEN, CommandId, Connect, ConnectResp, ConnectStatus, Deliver,
    DeliverResp, DeliverResult, ProtocolVersion, Submit, SubmitResp, SubmitResult, Terminate,
};
use crate::fragment::Reassembler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Whether the reader should keep going after a frame
enum Flow {
    Continue,
    Close,
}

/// Reader-side state of one connection
struct ConnectionState {
    ctx: Arc<GatewayContext>,
    handle: ConnectionHandle,
    version: ProtocolVersion,
    authenticated: bool,
    reassembler: Reassembler,
}

/// Serve one accepted socket until either side closes it
pub(crate) async fn run(ctx: Arc<GatewayContext>, socket: TcpStream, peer: SocketAddr) {
    let gateway = &ctx.config.gateway;
    let (read_half, write_half) = socket.into_split();
    let (handle, mut closed) = ConnectionHandle::spawn(peer, write_half);
    ctx.sessions.insert(Session::new(handle.clone(), gateway.version));

    let mut reader = FrameReader::new(read_half, gateway.max_frame_length);
    let mut state = ConnectionState {
        ctx: ctx.clone(),
        handle: handle.clone(),
        version: gateway.version,
        authenticated: false,
        reassembler: Reassembler::new(gateway.reassembly_ttl()),
    };

    info!(%peer, "connection accepted");

    loop {
        let raw = tokio::select! {
            read = reader.read_raw() => read,
            _ = closed.changed() => break,
        };

        match raw {
            Ok(Some(raw)) => {
                ctx.sessions.touch(&peer);
                if let Flow::Close = state.dispatch(raw).await {
                    break;
                }
            }
            Ok(None) => {
                debug!(%peer, "peer closed the connection");
                break;
            }
            Err(ConnectionError::Codec(e)) => {
                warn!(%peer, "framing error, dropping connection: {}", e);
                break;
            }
            Err(e) => {
                debug!(%peer, "read failed: {}", e);
                break;
            }
        }
    }

    handle.close().await;
    match ctx.sessions.remove(&peer) {
        Some(session) => info!(
            %peer,
            source_addr = %session.source_addr,
            duration = ?session.connected_at.elapsed(),
            "connection closed"
        ),
        None => info!(%peer, "connection closed"),
    }
}

impl ConnectionState {
    async fn dispatch(&mut self, raw: RawFrame) -> Flow {
        let peer = self.handle.peer();
        debug!(
            %peer,
            command_id = ?raw.header.command_id,
            sequence_id = raw.header.sequence_id,
            length = raw.header.total_length,
            "<<<"
        );
        match raw.header.command_id {
            CommandId::Connect => self.on_connect(raw).await,
            CommandId::Terminate => {
                let response = Terminate::new(raw.header.sequence_id).to_response();
                self.handle.respond_confirmed(response, self.version).await;
                info!(%peer, "terminated by peer");
                Flow::Close
            }
            CommandId::TerminateResp => {
                if self.ctx.sessions.state(&peer) == Some(SessionState::Closing) {
                    debug!(%peer, "terminate acknowledged");
                    Flow::Close
                } else {
                    debug!(%peer, "ignoring unsolicited terminate response");
                    Flow::Continue
                }
            }
            CommandId::ActiveTest => {
                let response = ActiveTest::new(raw.header.sequence_id).to_response();
                self.handle.respond(response, self.version).await;
                Flow::Continue
            }
            CommandId::ActiveTestResp => Flow::Continue,
            CommandId::Submit => self.on_submit(raw).await,
            CommandId::Deliver => self.on_deliver(raw).await,
            other => {
                debug!(
                    %peer,
                    command_id = ?other,
                    sequence_id = raw.header.sequence_id,
                    "ignoring response"
                );
                Flow::Continue
            }
        }
    }

    async fn on_connect(&mut self, raw: RawFrame) -> Flow {
        let gateway = &self.ctx.config.gateway;
        let peer = self.handle.peer();

        let connect = match raw.decode_as::<Connect>(gateway.version) {
            Ok(connect) if raw.header.total_length as usize == Connect::SIZE => connect,
            result => {
                if let Err(e) = result {
                    warn!(%peer, "malformed connect: {}", e);
                } else {
                    warn!(%peer, length = raw.header.total_length, "connect has wrong length");
                }
                let response = ConnectResp::new(
                    raw.header.sequence_id,
                    ConnectStatus::InvalidStructure,
                    [0u8; AUTHENTICATOR_LEN],
                    gateway.version,
                );
                self.handle.respond_confirmed(response, gateway.version).await;
                return Flow::Close;
            }
        };

        let status = connect.check(&gateway.shared_secret, gateway.version, gateway.auth_check);
        let response = connect.to_response(status, &gateway.shared_secret, gateway.version);

        // The SP reads the response with its own field widths
        if !self.handle.respond_confirmed(response, connect.version).await {
            warn!(%peer, "connect response could not be written");
            return Flow::Close;
        }

        if status != ConnectStatus::Ok {
            warn!(%peer, source_addr = %connect.source_addr, ?status, "login refused");
            return Flow::Close;
        }

        self.version = connect.version;
        self.authenticated = true;
        self.ctx
            .sessions
            .authenticate(&peer, &connect.source_addr, connect.version);
        info!(
            %peer,
            source_addr = %connect.source_addr,
            version = %connect.version,
            "login accepted"
        );
        Flow::Continue
    }

    async fn on_submit(&mut self, raw: RawFrame) -> Flow {
        let peer = self.handle.peer();
        if !self.authenticated {
            warn!(%peer, "submit before login, closing");
            return Flow::Close;
        }

        let Some(permit) = self.ctx.window.try_admit() else {
            warn!(%peer, sequence_id = raw.header.sequence_id, "receive window full");
            let response = SubmitResp::new(
                raw.header.sequence_id,
                0,
                SubmitResult::FlowControl,
                self.version,
            );
            self.handle.respond(response, self.version).await;
            return Flow::Continue;
        };

        let submit = match raw.decode_as::<Submit>(self.version) {
            Ok(submit) => submit,
            Err(e) => {
                warn!(%peer, "malformed submit: {}", e);
                let response = SubmitResp::new(
                    raw.header.sequence_id,
                    0,
                    SubmitResult::InvalidStructure,
                    self.version,
                );
                self.handle.respond(response, self.version).await;
                return Flow::Continue;
            }
        };

        if let Some(header) = submit.concat_header() {
            if let Some(joined) = self
                .reassembler
                .push(&submit.msg_src, header, submit.body())
            {
                info!(
                    %peer,
                    parts = header.count,
                    text = %submit.msg_fmt.decode_text(&joined),
                    "long message reassembled"
                );
            }
        } else {
            debug!(%peer, text = %submit.text(), "submit received");
        }

        let job = pipeline::process_submit(
            self.ctx.clone(),
            self.handle.clone(),
            submit,
            permit,
            self.version,
            self.handle.begin_job(),
        );
        self.ctx.pool.spawn("submit", job);
        Flow::Continue
    }

    async fn on_deliver(&mut self, raw: RawFrame) -> Flow {
        let peer = self.handle.peer();
        if !self.authenticated {
            warn!(%peer, "deliver before login, closing");
            return Flow::Close;
        }

        match raw.decode_as::<Deliver>(self.version) {
            Ok(deliver) => {
                debug!(%peer, src = %deliver.src_terminal_id, "mo message received");
                let job = pipeline::process_mo(
                    self.ctx.clone(),
                    self.handle.clone(),
                    deliver,
                    self.version,
                    self.handle.begin_job(),
                );
                self.ctx.pool.spawn("mo", job);
            }
            Err(e) => {
                warn!(%peer, "malformed deliver: {}", e);
                let response = DeliverResp::new(
                    raw.header.sequence_id,
                    0,
                    DeliverResult::InvalidStructure,
                    self.version,
                );
                self.handle.respond(response, self.version).await;
            }
        }
        Flow::Continue
    }
}
