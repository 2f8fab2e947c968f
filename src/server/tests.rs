use super::*;
use crate::client::{ClientError, SpClient};
use crate::codec::{Frame, MessageHeader};
use crate::config::SubmitDefaults;
use crate::datatypes::{
    CommandId, ConnectStatus, Deliver, DeliverResult, ProtocolVersion, SubmitResult,
    TerminateResp,
};
use bytes::{BufMut, BytesMut};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const SOURCE_ADDR: &str = "901234";
const SECRET: &str = "123456";
const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> Config {
    let mut config = Config::default();
    config.gateway.shutdown_grace_ms = 300;
    config.simulation.success_rate = 1.0;
    config.simulation.min_submit_resp_ms = 5;
    config.simulation.max_submit_resp_ms = 5;
    config.simulation.fix_report_resp_ms = 50;
    config.simulation.report_skip_rate = 0.0;
    config.simulation.seed = Some(1);
    config
}

fn quiet_defaults() -> SubmitDefaults {
    SubmitDefaults {
        registered_delivery: 0,
        ..SubmitDefaults::default()
    }
}

async fn start(config: Config) -> (Gateway, SocketAddr) {
    let gateway = Gateway::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = gateway.clone();
    tokio::spawn(async move { server.serve(listener).await });
    (gateway, addr)
}

async fn connect(addr: SocketAddr, version: ProtocolVersion) -> SpClient {
    SpClient::connect(addr, version, 512)
        .await
        .unwrap()
        .with_response_timeout(WAIT)
}

async fn logged_in(addr: SocketAddr) -> SpClient {
    let mut client = connect(addr, ProtocolVersion::V30).await;
    client.login(SOURCE_ADDR, SECRET).await.unwrap();
    client
}

/// Read until a frame with `command_id` shows up, answering gateway requests on the way
async fn next_of(client: &mut SpClient, command_id: CommandId) -> Frame {
    timeout(WAIT, async {
        loop {
            let frame = client.read_frame().await.unwrap().expect("connection closed");
            if frame.command_id() == command_id {
                return frame;
            }
            client.respond(&frame).await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for frame")
}

/// True once the gateway has closed the connection
async fn closed_by_gateway(client: &mut SpClient) -> bool {
    timeout(WAIT, async {
        loop {
            match client.read_frame().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return true,
            }
        }
    })
    .await
    .unwrap_or(false)
}

#[tokio::test]
async fn login_heartbeat_and_terminate() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = connect(addr, ProtocolVersion::V30).await;

    let resp = client.login(SOURCE_ADDR, SECRET).await.unwrap();
    assert_eq!(resp.status, ConnectStatus::Ok);
    assert_eq!(resp.version, ProtocolVersion::V30);

    client.active_test().await.unwrap();
    client.terminate().await.unwrap();
    assert!(closed_by_gateway(&mut client).await);
}

#[tokio::test]
async fn wrong_secret_is_refused_and_closed() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = connect(addr, ProtocolVersion::V30).await;

    let result = client.login(SOURCE_ADDR, "wrong").await;
    assert!(matches!(
        result,
        Err(ClientError::LoginRefused(ConnectStatus::AuthError))
    ));
    assert!(closed_by_gateway(&mut client).await);
}

#[tokio::test]
async fn older_major_version_is_refused() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = connect(addr, ProtocolVersion::V20).await;

    let result = client.login(SOURCE_ADDR, SECRET).await;
    assert!(matches!(
        result,
        Err(ClientError::LoginRefused(ConnectStatus::VersionTooHigh))
    ));
}

#[tokio::test]
async fn v2_gateway_serves_v2_clients() {
    let mut config = fast_config();
    config.gateway.version = ProtocolVersion::V20;
    let (_gateway, addr) = start(config).await;
    let mut client = connect(addr, ProtocolVersion::V20).await;

    client.login(SOURCE_ADDR, SECRET).await.unwrap();
    let sequence_ids = client
        .submit_text(&SubmitDefaults::default(), "13800138000", "hello")
        .await
        .unwrap();

    let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
        unreachable!()
    };
    assert_eq!(resp.header.sequence_id, sequence_ids[0]);
    assert_eq!(resp.header.total_length, 21);
    assert_eq!(resp.result, SubmitResult::Ok);

    let Frame::Deliver(report) = next_of(&mut client, CommandId::Deliver).await else {
        unreachable!()
    };
    assert_eq!(report.as_report().unwrap().msg_id, resp.msg_id);
}

#[tokio::test]
async fn digest_check_can_be_disabled() {
    let mut config = fast_config();
    config.gateway.auth_check = false;
    let (_gateway, addr) = start(config).await;
    let mut client = connect(addr, ProtocolVersion::V30).await;

    let resp = client.login(SOURCE_ADDR, "anything").await.unwrap();
    assert!(resp.status.is_ok());
}

#[tokio::test]
async fn connect_with_wrong_length_gets_structure_error() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut frame = BytesMut::new();
    MessageHeader {
        total_length: 40,
        command_id: CommandId::Connect,
        sequence_id: 7,
    }
    .encode(&mut frame);
    frame.put_bytes(0, 28);
    stream.write_all(&frame).await.unwrap();

    let mut resp = [0u8; 33];
    timeout(WAIT, stream.read_exact(&mut resp)).await.unwrap().unwrap();
    assert_eq!(&resp[0..4], &33u32.to_be_bytes());
    assert_eq!(&resp[4..8], &0x8000_0001u32.to_be_bytes());
    assert_eq!(&resp[8..12], &7u32.to_be_bytes());
    assert_eq!(&resp[12..16], &1u32.to_be_bytes());

    let mut rest = Vec::new();
    let read = timeout(WAIT, stream.read_to_end(&mut rest)).await.unwrap();
    assert!(read.map(|n| n == 0).unwrap_or(true));
}

#[tokio::test]
async fn bad_headers_close_without_response() {
    let (gateway, addr) = start(fast_config()).await;

    // Too short, too long, unknown command
    for (length, command_id) in [(8u32, 0x0000_0001u32), (4096, 0x0000_0004), (12, 0x0000_0099)] {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut header = BytesMut::new();
        header.put_u32(length);
        header.put_u32(command_id);
        header.put_u32(1);
        stream.write_all(&header).await.unwrap();

        let mut received = Vec::new();
        let _ = timeout(WAIT, stream.read_to_end(&mut received)).await.unwrap();
        assert!(received.is_empty(), "response to {length}/{command_id:#x}");
    }

    let drained = timeout(WAIT, async {
        while !gateway.sessions().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn submit_before_login_closes_connection() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = connect(addr, ProtocolVersion::V30).await;

    client
        .submit_text(&quiet_defaults(), "13800138000", "too early")
        .await
        .unwrap();
    assert!(closed_by_gateway(&mut client).await);
}

#[tokio::test]
async fn submit_gets_response_then_matching_report() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let started = Instant::now();
    let sequence_ids = client
        .submit_text(&SubmitDefaults::default(), "13800138000", "hello")
        .await
        .unwrap();

    let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
        unreachable!()
    };
    assert_eq!(resp.header.sequence_id, sequence_ids[0]);
    assert_eq!(resp.result, SubmitResult::Ok);
    assert_ne!(resp.msg_id, 0);

    let Frame::Deliver(deliver) = next_of(&mut client, CommandId::Deliver).await else {
        unreachable!()
    };
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(deliver.is_report());
    assert_eq!(deliver.dest_id, SubmitDefaults::default().src_id);

    let report = deliver.as_report().unwrap();
    assert_eq!(report.msg_id, resp.msg_id);
    assert_eq!(report.dest_terminal_id, "13800138000");

    assert!(client.respond(&Frame::Deliver(deliver)).await.unwrap());
}

#[tokio::test]
async fn failed_submit_has_no_report() {
    let mut config = fast_config();
    config.simulation.success_rate = 0.0;
    let (_gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    client
        .submit_text(&SubmitDefaults::default(), "13800138000", "hello")
        .await
        .unwrap();

    let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
        unreachable!()
    };
    assert_eq!(resp.result, SubmitResult::InvalidDestTerminalId);
    assert_eq!(resp.msg_id, 0);

    let quiet = timeout(Duration::from_millis(300), client.read_frame()).await;
    assert!(quiet.is_err(), "unexpected frame after failed submit");
}

#[tokio::test]
async fn skipped_reports_are_never_sent() {
    let mut config = fast_config();
    config.simulation.report_skip_rate = 1.0;
    let (_gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    client
        .submit_text(&SubmitDefaults::default(), "13800138000", "hello")
        .await
        .unwrap();

    let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
        unreachable!()
    };
    assert_eq!(resp.result, SubmitResult::Ok);
    assert_ne!(resp.msg_id, 0);

    let quiet = timeout(Duration::from_millis(300), client.read_frame()).await;
    assert!(quiet.is_err(), "report sent despite skip rate 1.0");
}

#[tokio::test]
async fn full_window_answers_flow_control() {
    let mut config = fast_config();
    config.gateway.receive_window_size = 1;
    config.simulation.min_submit_resp_ms = 200;
    config.simulation.max_submit_resp_ms = 200;
    let (gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    for text in ["one", "two", "three"] {
        client
            .submit_text(&quiet_defaults(), "13800138000", text)
            .await
            .unwrap();
    }

    let mut results = Vec::new();
    for _ in 0..3 {
        let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
            unreachable!()
        };
        results.push(resp.result);
    }
    let ok = results.iter().filter(|r| **r == SubmitResult::Ok).count();
    let throttled = results
        .iter()
        .filter(|r| **r == SubmitResult::FlowControl)
        .count();
    assert_eq!((ok, throttled), (1, 2));

    let stats = gateway.window_statistics();
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.rejected, 2);

    client.active_test().await.unwrap();
}

#[tokio::test]
async fn long_text_is_sent_as_fragments() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let text: String = (0..161).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    let sequence_ids = client
        .submit_text(&quiet_defaults(), "13800138000", &text)
        .await
        .unwrap();
    assert_eq!(sequence_ids.len(), 2);

    let mut answered = Vec::new();
    for _ in 0..2 {
        let Frame::SubmitResp(resp) = next_of(&mut client, CommandId::SubmitResp).await else {
            unreachable!()
        };
        assert!(resp.result.is_ok());
        answered.push(resp.header.sequence_id);
    }
    answered.sort_unstable();
    let mut expected = sequence_ids.clone();
    expected.sort_unstable();
    assert_eq!(answered, expected);
}

#[tokio::test]
async fn silent_session_times_out() {
    let mut config = fast_config();
    config.gateway.heartbeat_interval_ms = 100;
    config.gateway.heartbeat_max_missed = 2;
    let (gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    // Read without answering: the probe arrives, then the gateway gives up
    let probe = timeout(WAIT, client.read_frame()).await.unwrap().unwrap();
    assert!(matches!(probe, Some(Frame::ActiveTest(_))));
    assert!(closed_by_gateway(&mut client).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(gateway.sessions().is_empty());
}

#[tokio::test]
async fn answering_probes_keeps_session_alive() {
    let mut config = fast_config();
    config.gateway.heartbeat_interval_ms = 100;
    config.gateway.heartbeat_max_missed = 2;
    let (_gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        if let Ok(frame) = timeout(Duration::from_millis(50), client.read_frame()).await {
            let frame = frame.unwrap().expect("gateway closed a live session");
            client.respond(&frame).await.unwrap();
        }
    }
    client.active_test().await.unwrap();
}

#[tokio::test]
async fn mo_deliver_is_acknowledged() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let sequence_id = client.next_sequence();
    let deliver = Deliver::mo(
        sequence_id,
        42,
        "1068888",
        "MI0000",
        "13800138000",
        "reply",
        ProtocolVersion::V30,
    );
    client
        .write_frame(&Frame::Deliver(Box::new(deliver)))
        .await
        .unwrap();

    let Frame::DeliverResp(resp) = next_of(&mut client, CommandId::DeliverResp).await else {
        unreachable!()
    };
    assert_eq!(resp.header.sequence_id, sequence_id);
    assert_eq!(resp.msg_id, 42);
    assert_eq!(resp.result, DeliverResult::Ok);
}

#[tokio::test]
async fn gateway_initiated_terminate() {
    let (gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let peers = gateway.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(gateway.sessions().state(&peers[0]), Some(SessionState::Authenticated));

    gateway.terminate(peers[0]).await.unwrap();
    let terminate = next_of(&mut client, CommandId::Terminate).await;
    assert!(client.respond(&terminate).await.unwrap());
    assert!(closed_by_gateway(&mut client).await);

    let unknown: SocketAddr = "127.0.0.1:1".parse().unwrap();
    assert!(matches!(
        gateway.terminate(unknown).await,
        Err(GatewayError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn terminate_waits_for_pending_replies() {
    let mut config = fast_config();
    config.gateway.shutdown_grace_ms = 2_000;
    config.simulation.min_submit_resp_ms = 300;
    config.simulation.max_submit_resp_ms = 300;
    let (gateway, addr) = start(config).await;
    let mut client = logged_in(addr).await;

    let sequence_ids = client
        .submit_text(&SubmitDefaults::default(), "13800138000", "hello")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    gateway.terminate(gateway.peers()[0]).await.unwrap();
    assert_eq!(
        gateway.sessions().state(&gateway.peers()[0]),
        Some(SessionState::Closing)
    );

    let mut seen = Vec::new();
    timeout(WAIT, async {
        while let Ok(Some(frame)) = client.read_frame().await {
            if let Frame::SubmitResp(resp) = &frame {
                assert_eq!(resp.header.sequence_id, sequence_ids[0]);
            }
            seen.push(frame.command_id());
            client.respond(&frame).await.unwrap();
        }
    })
    .await
    .unwrap();

    assert_eq!(
        seen,
        [CommandId::SubmitResp, CommandId::Deliver, CommandId::Terminate]
    );
}

#[tokio::test]
async fn unsolicited_terminate_resp_is_ignored() {
    let (_gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let stray = TerminateResp::new(client.next_sequence());
    client
        .write_frame(&Frame::TerminateResp(stray))
        .await
        .unwrap();

    client.active_test().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_unresponsive_sessions_after_grace() {
    let (gateway, addr) = start(fast_config()).await;
    let mut client = logged_in(addr).await;

    let stopping = gateway.clone();
    let shutdown = tokio::spawn(async move { stopping.shutdown().await });

    let frame = timeout(WAIT, client.read_frame()).await.unwrap().unwrap();
    assert!(matches!(frame, Some(Frame::Terminate(_))));
    assert!(closed_by_gateway(&mut client).await);

    timeout(WAIT, shutdown).await.unwrap().unwrap();

    let drained = timeout(WAIT, async {
        while !gateway.sessions().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn connection_limit_rejects_extra_peers() {
    let mut config = fast_config();
    config.gateway.max_connections = 1;
    let (_gateway, addr) = start(config).await;

    let mut first = logged_in(addr).await;
    let mut second = connect(addr, ProtocolVersion::V30).await;
    assert!(second.login(SOURCE_ADDR, SECRET).await.is_err());

    first.active_test().await.unwrap();
}
