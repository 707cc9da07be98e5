//! Integration tests for `SmtpMailSender` against a scripted SMTP server.
//!
//! The server runs in-process on a loopback port, answers a fixed
//! dialogue and records every line the client sent.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use mailhook::{DeliveryError, MailSender, Notification, Party, SmtpConfig, SmtpMailSender};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Accept one connection and play a minimal ESMTP dialogue.
///
/// `auth_reply` is returned verbatim to any `AUTH` command.
async fn scripted_server(auth_reply: &'static str) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut seen = Vec::new();
        let mut in_data = false;

        write.write_all(b"220 mock ESMTP ready\r\n").await.unwrap();

        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line.clone());
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
                }
                continue;
            }

            let command = line.to_ascii_uppercase();
            let reply: &str = if command.starts_with("EHLO") {
                "250-mock\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if command.starts_with("AUTH") {
                auth_reply
            } else if command.starts_with("DATA") {
                in_data = true;
                "354 end data with <CR><LF>.<CR><LF>\r\n"
            } else if command.starts_with("QUIT") {
                let _ = write.write_all(b"221 bye\r\n").await;
                break;
            } else {
                "250 OK\r\n"
            };
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }

        seen
    });

    (port, handle)
}

fn party(name: &str, address: &str) -> Party {
    Party {
        name: name.to_string(),
        address: address.to_string(),
    }
}

fn notification() -> Notification {
    Notification {
        subject: "cpu anomaly".to_string(),
        body: "Anomaly detected by LoudML!".to_string(),
    }
}

fn local_smtp(port: u16, user: Option<&str>, password: &str) -> SmtpConfig {
    SmtpConfig {
        host: "127.0.0.1".into(),
        port,
        tls: false,
        user: user.map(str::to_string),
        password: password.into(),
    }
}

#[tokio::test]
async fn delivers_one_message_and_quits() {
    let (port, server) = scripted_server("235 2.7.0 accepted\r\n").await;
    let sender = SmtpMailSender::new();

    let result = timeout(
        TIMEOUT,
        sender.send(
            &notification(),
            &party("LoudML", "loudml@example.com"),
            &party("", "ops@example.com"),
            &local_smtp(port, None, ""),
        ),
    )
    .await
    .expect("send timed out");
    assert!(result.is_ok(), "got: {result:?}");

    let seen = timeout(TIMEOUT, server).await.expect("server timed out").unwrap();
    assert!(seen.iter().any(|l| l.starts_with("MAIL FROM:<loudml@example.com>")), "{seen:?}");
    assert!(seen.iter().any(|l| l.starts_with("RCPT TO:<ops@example.com>")), "{seen:?}");
    assert!(seen.iter().any(|l| l == "Subject: cpu anomaly"), "{seen:?}");
    assert!(!seen.iter().any(|l| l.to_ascii_uppercase().starts_with("AUTH")), "{seen:?}");
    assert_eq!(seen.iter().filter(|l| l.starts_with("RCPT TO")).count(), 1);
    assert_eq!(seen.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn rejected_empty_password_is_authentication_error() {
    let (port, server) = scripted_server("535 5.7.8 authentication credentials invalid\r\n").await;
    let sender = SmtpMailSender::new();

    let result = timeout(
        TIMEOUT,
        sender.send(
            &notification(),
            &party("", "loudml@example.com"),
            &party("", "ops@example.com"),
            &local_smtp(port, Some("alerts"), ""),
        ),
    )
    .await
    .expect("send timed out");

    match result {
        Err(DeliveryError::Authentication(cause)) => assert!(cause.contains("535") || cause.contains("credentials"), "got: {cause}"),
        other => panic!("expected Authentication error, got: {other:?}"),
    }

    let seen = timeout(TIMEOUT, server).await.expect("server timed out").unwrap();
    assert!(seen.iter().any(|l| l.to_ascii_uppercase().starts_with("AUTH")), "{seen:?}");
    assert!(!seen.iter().any(|l| l.starts_with("MAIL FROM")), "{seen:?}");
}

#[tokio::test]
async fn refused_connection_is_connection_error() {
    // Reserve a port, then free it so nothing listens there.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let sender = SmtpMailSender::new();

    let result = timeout(
        TIMEOUT,
        sender.send(
            &notification(),
            &party("", "loudml@example.com"),
            &party("", "ops@example.com"),
            &local_smtp(port, None, ""),
        ),
    )
    .await
    .expect("send timed out");

    assert!(matches!(result, Err(DeliveryError::Connection(_))), "got: {result:?}");
}

#[tokio::test]
async fn tls_handshake_against_plain_server_is_tls_error() {
    let (port, server) = scripted_server("235 2.7.0 accepted\r\n").await;
    let sender = SmtpMailSender::new();
    let smtp = SmtpConfig {
        tls: true,
        ..local_smtp(port, None, "")
    };

    let result = timeout(
        TIMEOUT,
        sender.send(
            &notification(),
            &party("", "loudml@example.com"),
            &party("", "ops@example.com"),
            &smtp,
        ),
    )
    .await
    .expect("send timed out");

    assert!(matches!(result, Err(DeliveryError::Tls(_))), "got: {result:?}");

    // The plain greeting broke the handshake before any SMTP command was sent.
    let seen = timeout(TIMEOUT, server).await.expect("server timed out").unwrap();
    assert!(!seen.iter().any(|l| l.starts_with("MAIL FROM")), "{seen:?}");
}
