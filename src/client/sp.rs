// ABOUTME: SP-side CMPP client: login, submit, heartbeat and terminate over one Connection
// ABOUTME: Frames that arrive while waiting for a specific response are queued for read_frame

use crate::client::error::{ClientError, ClientResult};
use crate::codec::Frame;
use crate::config::SubmitDefaults;
use crate::connection::Connection;
use crate::datatypes::{
    ActiveTest, CommandId, Connect, ConnectResp, DeliverResult, ProtocolVersion, Submit,
    SubmitBuilder, Terminate, timestamp_now,
};
use crate::sequence::{CycleSequence, SequenceGenerator};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, warn};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a service provider talking to the gateway
pub struct SpClient {
    connection: Connection,
    sequences: CycleSequence,
    source_addr: String,
    /// Frames read while waiting for a specific response
    pending: VecDeque<Frame>,
    response_timeout: Duration,
}

impl SpClient {
    pub async fn connect<T: ToSocketAddrs>(
        addr: T,
        version: ProtocolVersion,
        max_frame_length: u32,
    ) -> ClientResult<Self> {
        let socket = TcpStream::connect(addr).await?;
        Ok(SpClient {
            connection: Connection::new(socket, version, max_frame_length),
            sequences: CycleSequence::new(),
            source_addr: String::new(),
            pending: VecDeque::new(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.connection.version()
    }

    pub fn next_sequence(&self) -> u32 {
        self.sequences.next_val()
    }

    /// Authenticate; any non-zero status is returned as [`ClientError::LoginRefused`]
    pub async fn login(&mut self, source_addr: &str, shared_secret: &str) -> ClientResult<ConnectResp> {
        let sequence_id = self.next_sequence();
        let connect = Connect::new(
            sequence_id,
            source_addr,
            shared_secret,
            self.connection.version(),
            timestamp_now(),
        );
        let connect_digest = connect.authenticator_source;
        self.connection.write_frame(&Frame::Connect(connect)).await?;

        match self.await_response(CommandId::ConnectResp, sequence_id).await? {
            Frame::ConnectResp(resp) if resp.status.is_ok() => {
                if !resp.verify(&connect_digest, shared_secret) {
                    warn!("gateway authenticator does not match the shared secret");
                }
                self.source_addr = source_addr.to_string();
                Ok(resp)
            }
            Frame::ConnectResp(resp) => Err(ClientError::LoginRefused(resp.status)),
            other => Err(unexpected("ConnectResp", &other)),
        }
    }

    /// Write one Submit without waiting for its response
    pub async fn submit(&mut self, submit: Submit) -> ClientResult<()> {
        self.connection.write_frame(&Frame::Submit(Box::new(submit))).await?;
        Ok(())
    }

    /// Build, fragment and write a text message; returns the sequence IDs used
    pub async fn submit_text(
        &mut self,
        defaults: &SubmitDefaults,
        destination: &str,
        text: &str,
    ) -> ClientResult<Vec<u32>> {
        let submits = SubmitBuilder::new(defaults, self.connection.version())
            .msg_src(&self.source_addr)
            .destination(destination)
            .text(text)
            .build(&self.sequences)?;

        let mut sequence_ids = Vec::with_capacity(submits.len());
        for submit in submits {
            sequence_ids.push(submit.header.sequence_id);
            self.submit(submit).await?;
        }
        Ok(sequence_ids)
    }

    /// Send a heartbeat and wait for its echo
    pub async fn active_test(&mut self) -> ClientResult<()> {
        let sequence_id = self.next_sequence();
        self.connection
            .write_frame(&Frame::ActiveTest(ActiveTest::new(sequence_id)))
            .await?;
        self.await_response(CommandId::ActiveTestResp, sequence_id)
            .await
            .map(|_| ())
    }

    /// Ask the gateway to end the session and wait for its acknowledgement
    pub async fn terminate(&mut self) -> ClientResult<()> {
        let sequence_id = self.next_sequence();
        self.connection
            .write_frame(&Frame::Terminate(Terminate::new(sequence_id)))
            .await?;

        match self.await_response(CommandId::TerminateResp, sequence_id).await {
            Ok(_) | Err(ClientError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Next frame from the gateway, queued frames first
    pub async fn read_frame(&mut self) -> ClientResult<Option<Frame>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        Ok(self.connection.read_frame().await?)
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> ClientResult<()> {
        Ok(self.connection.write_frame(frame).await?)
    }

    /// Answer a gateway-initiated request (heartbeat, report, terminate).
    ///
    /// Returns false for frames that need no answer.
    pub async fn respond(&mut self, frame: &Frame) -> ClientResult<bool> {
        let version = self.connection.version();
        let response = match frame {
            Frame::ActiveTest(pdu) => Frame::ActiveTestResp(pdu.to_response()),
            Frame::Deliver(pdu) => Frame::DeliverResp(pdu.to_response(DeliverResult::Ok, version)),
            Frame::Terminate(pdu) => Frame::TerminateResp(pdu.to_response()),
            _ => return Ok(false),
        };
        self.connection.write_frame(&response).await?;
        Ok(true)
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.connection.shutdown().await?;
        Ok(())
    }

    async fn await_response(&mut self, command_id: CommandId, sequence_id: u32) -> ClientResult<Frame> {
        let deadline = self.response_timeout;
        timeout(deadline, self.read_until(command_id, sequence_id))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn read_until(&mut self, command_id: CommandId, sequence_id: u32) -> ClientResult<Frame> {
        loop {
            match self.connection.read_frame().await? {
                Some(frame)
                    if frame.command_id() == command_id && frame.sequence_id() == sequence_id =>
                {
                    return Ok(frame);
                }
                Some(frame) => {
                    debug!("queueing {:?} while waiting for {:?}", frame.command_id(), command_id);
                    self.pending.push_back(frame);
                }
                None => return Err(ClientError::ConnectionClosed),
            }
        }
    }
}

fn unexpected(expected: &str, actual: &Frame) -> ClientError {
    ClientError::UnexpectedFrame {
        expected: expected.to_string(),
        actual: format!("{:?}", actual.command_id()),
    }
}
