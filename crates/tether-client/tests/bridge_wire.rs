// Wire format checks for the protocol sidecar bridge, plus one end-to-end
// exchange against an in-process WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tether_client::bridge::{BridgeClient, BridgeEvent, BridgeRequest};
use tether_client::{
    ClientError, ClientEvent, CloseReason, ConnectionUpdate, MessageKey, MessagingClient,
    OutboundPayload,
};
use tether_core::Credentials;
use tokio_tungstenite::tungstenite::Message;

fn creds() -> Credentials {
    Credentials::from_value(
        serde_json::json!({"noiseKey": {"k": 1}, "signedIdentityKey": {"k": 2}}),
        &[],
    )
    .unwrap()
}

#[test]
fn send_request_serialization() {
    let req = BridgeRequest::Send {
        id: "r-1".into(),
        chat_id: "9477@s.whatsapp.net".into(),
        payload: OutboundPayload::text("pong"),
    };
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains(r#""type":"send""#));
    assert!(json.contains(r#""kind":"text""#));
    // no quoted key on a plain text send
    assert!(!json.contains("quoted"));
}

#[test]
fn connect_request_carries_creds_inline() {
    let json = serde_json::to_string(&BridgeRequest::Connect { creds: creds() }).unwrap();
    assert!(json.contains(r#""type":"connect""#));
    assert!(json.contains(r#""noiseKey""#));
}

#[test]
fn upsert_frame_parses() {
    let json = r#"{"type":"messages.upsert","messages":[
        {"key":{"remoteJid":"status@broadcast","id":"S1","participant":"9477@s.whatsapp.net"},
         "message":{"imageMessage":{"caption":"sunset"}}}
    ]}"#;
    let frame: BridgeEvent = serde_json::from_str(json).unwrap();
    match frame {
        BridgeEvent::MessagesUpsert { messages } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].key.sender(), "9477@s.whatsapp.net");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn ack_frame_defaults() {
    let frame: BridgeEvent = serde_json::from_str(r#"{"type":"ack","id":"r-9"}"#).unwrap();
    match frame {
        BridgeEvent::Ack { id, error, result } => {
            assert_eq!(id, "r-9");
            assert!(error.is_none());
            assert!(result.is_none());
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn end_to_end_exchange() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // First frame must be the connect handshake.
        let first = ws.next().await.unwrap().unwrap();
        let req: BridgeRequest = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert!(matches!(req, BridgeRequest::Connect { .. }));

        for frame in [
            r#"{"type":"connection.update","connection":"open"}"#,
            r#"{"type":"creds.update","creds":{"noiseKey":1,"signedIdentityKey":2,"registered":true}}"#,
            r#"{"type":"messages.upsert","messages":[{"key":{"remoteJid":"9477@s.whatsapp.net","id":"M1"},"message":{"conversation":".ping"}}]}"#,
        ] {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }

        // Answer the send request, fail the read request.
        for _ in 0..2 {
            let msg = ws.next().await.unwrap().unwrap();
            let req: BridgeRequest = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            let ack = match req {
                BridgeRequest::Send { id, .. } => format!(r#"{{"type":"ack","id":"{id}"}}"#),
                BridgeRequest::Read { id, .. } => {
                    format!(r#"{{"type":"ack","id":"{id}","error":"rate limited"}}"#)
                }
                other => panic!("unexpected request: {other:?}"),
            };
            ws.send(Message::Text(ack.into())).await.unwrap();
        }

        ws.send(Message::Text(
            r#"{"type":"connection.update","connection":"close","status_code":401}"#.into(),
        ))
        .await
        .unwrap();
    });

    let client = BridgeClient::new(format!("ws://{addr}"), Duration::from_secs(5));
    let mut conn = client.connect(&creds()).await.unwrap();

    assert!(matches!(
        conn.events.recv().await,
        Some(ClientEvent::ConnectionUpdate(ConnectionUpdate::Open))
    ));
    match conn.events.recv().await {
        Some(ClientEvent::CredentialsUpdate(c)) => assert!(c.is_registered()),
        other => panic!("expected creds update, got {other:?}"),
    }
    match conn.events.recv().await {
        Some(ClientEvent::MessagesUpsert(msgs)) => assert_eq!(msgs[0].key.id, "M1"),
        other => panic!("expected upsert, got {other:?}"),
    }

    conn.handle
        .send_message("9477@s.whatsapp.net", OutboundPayload::text("pong"))
        .await
        .unwrap();

    let key = MessageKey {
        remote_jid: "9477@s.whatsapp.net".into(),
        id: "M1".into(),
        ..Default::default()
    };
    let err = conn.handle.read_messages(&[key]).await.unwrap_err();
    assert!(matches!(err, ClientError::SendFailed(ref m) if m == "rate limited"));

    assert!(matches!(
        conn.events.recv().await,
        Some(ClientEvent::ConnectionUpdate(ConnectionUpdate::Closed(CloseReason::LoggedOut)))
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_bridge_is_retryable() {
    let addr = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let client = BridgeClient::new(format!("ws://{addr}"), Duration::from_secs(1));
    let err = match client.connect(&creds()).await {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };
    assert_eq!(err.close_reason(), CloseReason::NetworkLost);
}

#[tokio::test]
async fn silent_bridge_times_out_during_handshake() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // Accept the TCP connection and never answer the upgrade.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let client = BridgeClient::new(format!("ws://{addr}"), Duration::from_millis(200));
    let result = tokio::time::timeout(Duration::from_secs(3), client.connect(&creds()))
        .await
        .expect("connect must give up on its own");
    let err = match result {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, ClientError::Timeout { ms: 200 }));
    assert_eq!(err.close_reason(), CloseReason::NetworkLost);
    server.abort();
}
