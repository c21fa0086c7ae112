//! Connection State Machine Tests (wifilink-client)
//!
//! Tests for everything built on the command/response protocol including:
//! - Initialization to Complete and the retry ceiling
//! - TCP prepare, connect, send and disconnect
//! - HTTP GET through the TCP session

use std::net::Ipv4Addr;
use std::sync::Arc;

use wifilink_client::{
    ClientConfig, ClientError, ConnectionKind, InitState, LinkHandle, Release, TcpState,
    WifiConfig,
};
use wifilink_core::{HttpMethod, HttpRequest};
use wifilink_test_utils::{Script, SimulatedPeer, SIMULATED_STATION_IP};
use wifilink_transport::irq_channel;

const STATUS: &str = "STATUS:3\r\n+CIPSTATUS:0,\"TCP\",\"93.184.216.34\",80,50000,0\r\n\r\nOK\r\n";

fn link_with(script: Script) -> (LinkHandle<Arc<SimulatedPeer>>, Arc<SimulatedPeer>) {
    let config = ClientConfig::new(WifiConfig::new("lab", "secret"));
    let (irq, inbox) = irq_channel(config.link.queue_depth);
    let peer = SimulatedPeer::new(irq, script);
    let link = LinkHandle::new(peer.clone(), inbox, config).expect("link setup failed");
    (link, peer)
}

fn server() -> Script {
    Script::always_ok()
        .on("AT+CIPSTART", &["CONNECT\r\n\r\nOK\r\n"])
        .on("AT+CIPSTATUS", &[STATUS])
}

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_init_completes_in_four_transitions() {
    let (link, peer) = link_with(Script::always_ok());

    let report = link.initialize().await.unwrap();

    assert_eq!(
        report.transitions,
        [
            (InitState::CheckLink, InitState::SetMode),
            (InitState::SetMode, InitState::Associate),
            (InitState::Associate, InitState::AcquireAddress),
            (InitState::AcquireAddress, InitState::Complete),
        ]
    );
    let expected_ip: Ipv4Addr = SIMULATED_STATION_IP.parse().unwrap();
    assert_eq!(report.station_ip, Some(expected_ip));
    assert_eq!(report.failures, 0);
    assert_eq!(
        peer.sent_lines(),
        ["AT", "AT+CWMODE=1", "AT+CWJAP=\"lab\",\"secret\"", "AT+CIFSR"]
    );
    assert_eq!(peer.resets(), 0);

    let session = link.lock().await.unwrap();
    assert_eq!(session.init_state(), InitState::Complete);
    assert_eq!(session.connection().station_ip, Some(expected_ip));
    assert_eq!(session.connection().retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_init_silent_module_hits_ceiling() {
    let (link, peer) = link_with(Script::new());
    let mut session = link.lock().await.unwrap();

    let err = session.initialize().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::InitFailed {
            state: InitState::CheckLink
        }
    ));
    assert!(!err.is_recoverable());
    assert_eq!(peer.sent_lines(), ["AT", "AT", "AT"]);
    assert_eq!(peer.resets(), 1);
    assert_eq!(session.init_state(), InitState::Error);
    assert_eq!(session.connection().station_ip, None);
    assert_eq!(session.connection().retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_init_rejected_association() {
    let script = Script::always_ok().on("AT+CWJAP", &["+CWJAP:1\r\n\r\nFAIL\r\n"]);
    let (link, peer) = link_with(script);

    let err = link.initialize().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::InitFailed {
            state: InitState::Associate
        }
    ));
    let joins = peer
        .sent_lines()
        .iter()
        .filter(|line| line.starts_with("AT+CWJAP="))
        .count();
    assert_eq!(joins, 3);
    assert_eq!(peer.resets(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_init_recovers_after_failure() {
    let (link, peer) = link_with(Script::new());
    let mut session = link.lock().await.unwrap();

    // First attempt at CheckLink goes unanswered
    peer.set_script(Script::new().on("AT", &["busy p...\r\n"]));
    let init = session.initialize();
    tokio::pin!(init);
    tokio::select! {
        _ = &mut init => panic!("init finished against a busy module"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(600)) => {}
    }
    peer.set_script(Script::always_ok());

    let report = init.await.unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.transitions.len(), 4);
    assert_eq!(peer.resets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_init_rejects_bad_credentials() {
    let config = ClientConfig::new(WifiConfig::new(&"s".repeat(33), "secret"));
    let (irq, inbox) = irq_channel(config.link.queue_depth);
    let peer = SimulatedPeer::new(irq, Script::always_ok());
    let link = LinkHandle::new(peer.clone(), inbox, config).unwrap();

    let err = link.initialize().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(peer.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_query_association() {
    let script = Script::always_ok().on(
        "AT+CWJAP?",
        &["+CWJAP:\"lab\",\"aa:bb:cc:dd:ee:ff\",6,-60\r\n\r\nOK\r\n"],
    );
    let (link, _peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    assert_eq!(
        session.query_association().await.unwrap().as_deref(),
        Some("lab")
    );
    assert!(!session.frame_pending());
}

// ============================================================================
// TCP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_tcp_prepare_forces_single_normal_mode() {
    let script = Script::always_ok()
        .on(
            "AT+CWJAP?",
            &["+CWJAP:\"lab\",\"aa:bb:cc:dd:ee:ff\",6,-60\r\n\r\nOK\r\n"],
        )
        .on("AT+CIPMUX?", &["+CIPMUX:1\r\n\r\nOK\r\n"])
        .on("AT+CIPMODE?", &["+CIPMODE:0\r\n\r\nOK\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    session.tcp_prepare().await.unwrap();

    assert_eq!(
        peer.sent_lines(),
        ["AT+CWJAP?", "AT+CIPMUX?", "AT+CIPMUX=0", "AT+CIPMODE?"]
    );
    assert_eq!(session.tcp().state, TcpState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_prepare_requires_configured_ap() {
    let script = Script::always_ok().on("AT+CWJAP?", &["+CWJAP:\"guest\"\r\n\r\nOK\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    let result = session.tcp_prepare().await;
    assert!(matches!(result, Err(ClientError::NotAssociated(ssid)) if ssid == "lab"));

    peer.set_script(Script::always_ok().on("AT+CWJAP?", &["No AP\r\n\r\nOK\r\n"]));
    let result = session.tcp_prepare().await;
    assert!(matches!(result, Err(ClientError::NotAssociated(_))));
}

#[tokio::test(start_paused = true)]
async fn test_tcp_prepare_rejects_unknown_mux_value() {
    let script = Script::always_ok()
        .on("AT+CWJAP?", &["+CWJAP:\"lab\"\r\n\r\nOK\r\n"])
        .on("AT+CIPMUX?", &["+CIPMUX:2\r\n\r\nOK\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    let result = session.tcp_prepare().await;
    assert!(matches!(result, Err(ClientError::UnexpectedReply(ref reply)) if reply == "CIPMUX 2"));
    assert_eq!(peer.sent_lines(), ["AT+CWJAP?", "AT+CIPMUX?"]);
    assert!(!session.frame_pending());

    peer.set_script(
        Script::always_ok()
            .on("AT+CWJAP?", &["+CWJAP:\"lab\"\r\n\r\nOK\r\n"])
            .on("AT+CIPMUX?", &["+CIPMUX:0\r\n\r\nOK\r\n"])
            .on("AT+CIPMODE?", &["+CIPMODE:7\r\n\r\nOK\r\n"]),
    );
    let result = session.tcp_prepare().await;
    assert!(matches!(result, Err(ClientError::UnexpectedReply(ref reply)) if reply == "CIPMODE 7"));
    assert!(!peer.sent_lines().iter().any(|line| line.ends_with("=0")));
}

#[tokio::test(start_paused = true)]
async fn test_tcp_connect_reads_status() {
    let (link, peer) = link_with(server());
    let mut session = link.lock().await.unwrap();

    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    let tcp = session.tcp();
    assert_eq!(tcp.state, TcpState::Connected);
    assert_eq!(tcp.remote_ip.as_deref(), Some("93.184.216.34"));
    assert_eq!(tcp.link_id, Some(0));
    assert_eq!(tcp.host, "example.com");
    assert_eq!(tcp.port, 80);
    assert_eq!(
        peer.sent_lines(),
        ["AT+CIPSTART=\"TCP\",\"example.com\",80", "AT+CIPSTATUS"]
    );
    assert!(!session.frame_pending());
}

#[tokio::test(start_paused = true)]
async fn test_tcp_connect_without_status_stays_connected() {
    let script = Script::new().on("AT+CIPSTART", &["CONNECT\r\n\r\nOK\r\n"]);
    let (link, _peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();
    assert_eq!(session.tcp().state, TcpState::Connected);
    assert_eq!(session.tcp().remote_ip, None);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_connect_refused() {
    let script = Script::new().on("AT+CIPSTART", &["ERROR\r\nCLOSED\r\n"]);
    let (link, _peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    let result = session.tcp_connect("example.com", 80, ConnectionKind::Tcp).await;
    assert!(matches!(result, Err(ClientError::ConnectFailed(_))));
    assert_eq!(session.tcp().state, TcpState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_connect_timeout_is_error_state() {
    let (link, _peer) = link_with(Script::new());
    let mut session = link.lock().await.unwrap();

    let result = session.tcp_connect("example.com", 80, ConnectionKind::Udp).await;
    assert!(matches!(result, Err(ClientError::NoResponse { .. })));
    assert_eq!(session.tcp().state, TcpState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_connect_argument_checks() {
    let (link, peer) = link_with(server());
    let mut session = link.lock().await.unwrap();

    for (host, port) in [("", 80), ("example.com", 0)] {
        let result = session.tcp_connect(host, port, ConnectionKind::Tcp).await;
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
    let long_host = "h".repeat(65);
    let result = session.tcp_connect(&long_host, 80, ConnectionKind::Tcp).await;
    assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    assert!(peer.sent().is_empty());

    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();
    let result = session.tcp_connect("example.org", 80, ConnectionKind::Tcp).await;
    assert!(matches!(result, Err(ClientError::Busy)));
}

#[tokio::test(start_paused = true)]
async fn test_tcp_send_roundtrip() {
    let script = server()
        .on("AT+CIPSEND", &[">"])
        .on("ping", &["Recv 4 bytes\r\n\r\nSEND OK\r\n", "+IPD,4:pong"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    let result = session.tcp_send(b"ping").await;
    assert!(matches!(result, Err(ClientError::NotConnected)));

    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    let frame = session.tcp_send(b"ping").await.unwrap();
    assert_eq!(frame.bytes(), b"+IPD,4:pong");
    frame.release();

    let sent = peer.sent_lines();
    assert_eq!(&sent[2..], ["AT+CIPSEND=4", "ping"]);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_send_payload_bounds() {
    let (link, _peer) = link_with(server());
    let mut session = link.lock().await.unwrap();
    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    assert!(matches!(
        session.tcp_send(b"").await,
        Err(ClientError::InvalidArgument(_))
    ));
    let oversized = vec![b'x'; 2049];
    assert!(matches!(
        session.tcp_send(&oversized).await,
        Err(ClientError::InvalidArgument(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_tcp_disconnect() {
    let script = server().on("AT+CIPCLOSE", &["CLOSED\r\n\r\nOK\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();

    // Nothing to close yet
    session.tcp_disconnect().await.unwrap();
    assert!(peer.sent().is_empty());

    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();
    session.tcp_disconnect().await.unwrap();

    let tcp = session.tcp();
    assert_eq!(tcp.state, TcpState::Disconnected);
    assert_eq!(tcp.remote_ip, None);
    assert_eq!(tcp.link_id, None);
    assert!(tcp.host.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tcp_disconnect_timeout_is_error_state() {
    let (link, peer) = link_with(server());
    let mut session = link.lock().await.unwrap();
    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    peer.set_script(Script::new());
    let result = session.tcp_disconnect().await;
    assert!(matches!(result, Err(ClientError::NoResponse { .. })));
    assert_eq!(session.tcp().state, TcpState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_disconnect_on_closed_link() {
    let script = server().on("AT+CIPCLOSE", &["ERROR\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();
    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    session.tcp_disconnect().await.unwrap();

    let tcp = session.tcp();
    assert_eq!(tcp.state, TcpState::Disconnected);
    assert_eq!(tcp.link_id, None);
    assert_eq!(tcp.remote_ip, None);
    assert!(tcp.host.is_empty());
    assert_eq!(peer.sent_lines().last().unwrap(), "AT+CIPCLOSE");
    assert!(!session.frame_pending());
}

#[tokio::test(start_paused = true)]
async fn test_tcp_send_on_dropped_link() {
    let script = server().on("AT+CIPSEND", &["link is not valid\r\n\r\nERROR\r\n"]);
    let (link, peer) = link_with(script);
    let mut session = link.lock().await.unwrap();
    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    let result = session.tcp_send(b"ping").await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(session.tcp().state, TcpState::Disconnected);
    assert_eq!(session.tcp().link_id, None);
    assert!(!session.frame_pending());

    // The payload never went out
    assert_eq!(peer.sent_lines().last().unwrap(), "AT+CIPSEND=4");
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_close_drops_session() {
    let (link, peer) = link_with(server());
    let mut session = link.lock().await.unwrap();
    session
        .tcp_connect("example.com", 80, ConnectionKind::Tcp)
        .await
        .unwrap();

    peer.inject(b"CLOSED\r\n");
    session
        .expect("AT", wifilink_core::token::OK, std::time::Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(session.tcp().state, TcpState::Disconnected);
    assert!(session.tcp().host.is_empty());
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_http_get_connects_and_returns_body() {
    let script = server()
        .on("AT+CIPSEND", &[">"])
        .on("GET", &["+IPD,13:HTTP/1.1 200 OK\r\nX:1\r\n\r\nhello"]);
    let (link, peer) = link_with(script);

    let mut request = HttpRequest::get("example.com", "/").unwrap();
    let body = link.http_get(&mut request).await.unwrap();

    assert_eq!(&body[..], b"hello");
    assert!(!link.frame_pending());

    let sent = peer.sent();
    assert_eq!(sent[0], b"AT+CIPSTART=\"TCP\",\"example.com\",80\r\n".to_vec());
    let payload = sent.last().unwrap();
    assert!(payload.starts_with(b"GET / HTTP/1.1\r\nHost: example.com\r\n"));
    assert_eq!(payload.len(), request.total_len());

    let session = link.lock().await.unwrap();
    assert!(session.tcp().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_http_get_reconnects_after_server_close() {
    let script = server()
        .on("AT+CIPSEND", &[">"])
        .on("GET", &["+IPD,13:HTTP/1.1 200 OK\r\nX:1\r\n\r\nhello\r\nCLOSED\r\n"]);
    let (link, peer) = link_with(script);

    let mut request = HttpRequest::get("example.com", "/").unwrap();
    let body = link.http_get(&mut request).await.unwrap();
    assert!(body.starts_with(b"hello"));
    assert_eq!(link.lock().await.unwrap().tcp().state, TcpState::Disconnected);

    link.http_get(&mut request).await.unwrap();

    let connects = peer
        .sent_lines()
        .iter()
        .filter(|line| line.starts_with("AT+CIPSTART"))
        .count();
    assert_eq!(connects, 2);
    assert!(!link.frame_pending());
}

#[tokio::test(start_paused = true)]
async fn test_http_get_without_body() {
    let script = server()
        .on("AT+CIPSEND", &[">"])
        .on("GET", &["+IPD,17:HTTP/1.1 200 OK\r\n"]);
    let (link, _peer) = link_with(script);

    let mut request = HttpRequest::get("example.com", "/").unwrap();
    let result = link.http_get(&mut request).await;
    assert!(matches!(
        result,
        Err(ClientError::Parse(wifilink_core::Error::NotFound))
    ));
    assert!(!link.frame_pending());
}

#[tokio::test(start_paused = true)]
async fn test_http_post_rejected_before_connecting() {
    let (link, peer) = link_with(server());

    let mut request = HttpRequest::new(HttpMethod::Post);
    request.set_host("example.com").unwrap();
    request.set_path("/submit").unwrap();

    let result = link.http_get(&mut request).await;
    assert!(matches!(
        result,
        Err(ClientError::Parse(wifilink_core::Error::UnsupportedMethod(_)))
    ));
    assert!(peer.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_frame_read_with_release_modes() {
    let (link, _peer) = link_with(server());
    let mut session = link.lock().await.unwrap();

    session.send_command("AT+CIPSTATUS").await.unwrap();
    let mut frame = session
        .wait_for(wifilink_core::token::STATUS, std::time::Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(frame.number("CIPSTATUS", Release::Keep).unwrap(), 0);
    assert!(frame.number("CIPSTATUS", Release::Auto).is_ok());
    assert!(!session.frame_pending());
}

// ============================================================================
// Runtime
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_work_on_spawned_tasks() {
    let script = server()
        .on("AT+CIPSEND", &[">"])
        .on("GET", &["+IPD,13:HTTP/1.1 200 OK\r\nX:1\r\n\r\nhello"]);
    let (link, _peer) = link_with(script);

    let worker = link.clone();
    let report = tokio::spawn(async move { worker.initialize().await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.transitions.len(), 4);

    let worker = link.clone();
    let body = tokio::spawn(async move {
        let mut request = HttpRequest::get("example.com", "/").unwrap();
        worker.http_get(&mut request).await
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(&body[..], b"hello");

    let worker = link.clone();
    tokio::spawn(async move { worker.lock().await.unwrap().tcp_disconnect().await })
        .await
        .unwrap()
        .unwrap();
    assert!(!link.lock().await.unwrap().tcp().is_connected());
}
