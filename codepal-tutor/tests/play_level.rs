//! Plays the first level end to end through the compatibility wire format,
//! against a local server that answers with canned model replies.

use codepal_core::{render, Curriculum, ModelAdapter, ModelProvider, ProviderConfig, WireFormat};
use codepal_tutor::{Command, GuideFocus, Locale, Phase, Tutor, TutorConfig, View};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve each reply to one connection, in order, returning the request bodies
async fn model_server(replies: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/v1", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut bodies = Vec::new();
        for content in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let length: usize = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break end + 4;
                    }
                }
                assert!(n > 0, "client closed early");
            };
            bodies.push(String::from_utf8_lossy(&buf[body_start..]).to_string());

            let envelope = serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
            })
            .to_string();
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                envelope.len(),
                envelope
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        bodies
    });

    (base, handle)
}

fn playing(tutor: &Tutor<ModelAdapter>) -> codepal_tutor::Snapshot {
    match tutor.view() {
        View::Playing(snapshot) => snapshot,
        View::Menu(_) => panic!("expected a session"),
    }
}

#[tokio::test]
async fn test_first_step_of_night_sky() {
    let judgement = serde_json::json!({
        "message": "Yes! Let's make it dark like night.",
        "stepComplete": true,
        "code": "screen.fill(\"#000000\")",
        "visualAction": "fill_screen"
    })
    .to_string();
    let execution = serde_json::json!({
        "consoleOutput": "",
        "isSuccess": true,
        "isObjectiveMet": true,
        "drawingCommands": [{"type": "fill", "color": "#000000"}]
    })
    .to_string();
    let (base, server) = model_server(vec![judgement, execution]).await;

    let adapter = ModelAdapter::from_config(
        ProviderConfig::new("test-key")
            .with_base_url(base)
            .with_model("kid-tutor"),
    )
    .unwrap();
    assert_eq!(adapter.wire_format(), WireFormat::Compat);

    let config = TutorConfig {
        next_step_delay: Duration::from_millis(20),
        locale: Locale::En,
        ..TutorConfig::default()
    };
    let mut tutor = Tutor::new(adapter, Curriculum::builtin(), config);
    let mut views = tutor.subscribe();

    tutor.dispatch(Command::SelectLevel(1)).unwrap();
    tutor
        .dispatch(Command::Submit("make the screen black".into()))
        .unwrap();
    assert!(tutor.step().await);

    let snapshot = playing(&tutor);
    assert_eq!(snapshot.code, "screen.fill(\"#000000\")");
    assert_eq!(snapshot.focus, GuideFocus::AwaitingExecution);
    assert_eq!(snapshot.chat.len(), 3);

    tutor.dispatch(Command::Run).unwrap();
    assert_eq!(playing(&tutor).phase, Phase::Executing);
    assert!(tutor.step().await);

    let snapshot = playing(&tutor);
    assert_eq!(snapshot.step_index, 1);
    assert_eq!(snapshot.visual.len(), 1);
    assert_eq!(snapshot.focus, GuideFocus::AwaitingInput);
    assert_eq!(render(&snapshot.visual).background, "#000000");
    let chat_before_delay = snapshot.chat.len();

    // The next-step line arrives only after the delay
    tutor.settle().await;
    let snapshot = playing(&tutor);
    assert_eq!(snapshot.chat.len(), chat_before_delay + 1);
    assert!(snapshot
        .chat
        .last()
        .unwrap()
        .text
        .contains("Now put a big yellow moon in the sky."));

    assert!(views.has_changed().unwrap());
    assert!(matches!(&*views.borrow_and_update(), View::Playing(s) if s.step_index == 1));

    let bodies = server.await.unwrap();
    assert_eq!(bodies.len(), 2);
    let first: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(first["model"], "kid-tutor");
    assert_eq!(first["response_format"]["type"], "json_object");
    assert_eq!(first["messages"][0]["role"], "system");
    assert_eq!(first["messages"][1]["content"], "make the screen black");
}
