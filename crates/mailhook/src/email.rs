//! SMTP mail sender via `lettre`.
//!
//! Opens one connection per message, authenticates when a user is
//! configured, sends, and disconnects. Supports plain and implicit TLS
//! connections.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{Party, SmtpConfig};
use crate::traits::{DeliveryError, MailSender, Notification};

/// SMTP reply codes that mean the server refused our credentials.
const AUTH_FAILURE_CODES: [u16; 5] = [454, 530, 534, 535, 538];

/// Sends notifications as emails via SMTP.
///
/// Holds no connection state: each [`MailSender::send`] call builds its
/// own transport, so concurrent sends never share a session.
#[derive(Debug, Default)]
pub struct SmtpMailSender {
    _private: (),
}

impl SmtpMailSender {
    /// Create a new SMTP sender.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a transport for one delivery.
    ///
    /// - `tls = true` wraps the connection in TLS from the first byte.
    /// - `tls = false` talks plain SMTP.
    /// - A non-empty `user` attaches credentials, even with an empty password.
    fn build_transport(
        smtp: &SmtpConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
            .port(smtp.effective_port());

        if smtp.tls {
            let parameters = TlsParameters::new(smtp.host.clone())
                .map_err(|e| DeliveryError::Tls(e.to_string()))?;
            builder = builder.tls(Tls::Wrapper(parameters));
        }

        if let Some(user) = smtp.login_user() {
            builder = builder.credentials(Credentials::new(user.to_string(), smtp.password.clone()));
        }

        Ok(builder.build())
    }
}

/// Build a mailbox header value, omitting an empty display name.
pub fn mailbox(party: &Party) -> Result<Mailbox, DeliveryError> {
    let address: Address = party
        .address
        .parse()
        .map_err(|e: lettre::address::AddressError| {
            DeliveryError::Message(format!("invalid address '{}': {e}", party.address))
        })?;
    let name = (!party.name.is_empty()).then(|| party.name.clone());
    Ok(Mailbox::new(name, address))
}

/// Build the plain-text email for one recipient.
pub fn build_message(
    notification: &Notification,
    from: &Party,
    to: &Party,
) -> Result<Message, DeliveryError> {
    Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(to)?)
        .subject(&notification.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(notification.body.clone())
        .map_err(|e| DeliveryError::Message(e.to_string()))
}

/// Map a lettre SMTP error onto the delivery failure it represents.
///
/// lettre reports a failed TLS handshake as a connection error, so on a
/// TLS session the error chain is searched for the I/O error rustls
/// raises.
fn classify(err: lettre::transport::smtp::Error, tls: bool) -> DeliveryError {
    let cause = err.to_string();
    if err.is_tls() || (tls && handshake_failure(&err)) {
        return DeliveryError::Tls(cause);
    }
    if let Some(code) = err.status() {
        return if AUTH_FAILURE_CODES.contains(&u16::from(code)) {
            DeliveryError::Authentication(cause)
        } else {
            DeliveryError::Rejected(cause)
        };
    }
    if err.is_client() && cause.to_lowercase().contains("authentication") {
        return DeliveryError::Authentication(cause);
    }
    DeliveryError::Connection(cause)
}

/// Whether any error in the chain is an `InvalidData` I/O error, the kind
/// `tokio-rustls` wraps protocol and certificate failures in.
fn handshake_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::InvalidData)
        {
            return true;
        }
        current = e.source();
    }
    false
}

#[async_trait::async_trait]
impl MailSender for SmtpMailSender {
    /// Send one email and close the connection.
    async fn send(
        &self,
        notification: &Notification,
        from: &Party,
        to: &Party,
        smtp: &SmtpConfig,
    ) -> Result<(), DeliveryError> {
        let email = build_message(notification, from, to)?;
        let transport = Self::build_transport(smtp)?;

        tracing::debug!(
            host = %smtp.host,
            port = smtp.effective_port(),
            tls = smtp.tls,
            auth = smtp.login_user().is_some(),
            "connecting to SMTP server"
        );

        transport.send(email).await.map_err(|e| classify(e, smtp.tls))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            to = %to.address,
            "notification delivered"
        );

        Ok(())
    }

    /// Returns `"smtp"`.
    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(name: &str, address: &str) -> Party {
        Party {
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "[LoudML] anomaly end (model=cpu, score=0.1)".to_string(),
            body: "Anomaly end".to_string(),
        }
    }

    #[test]
    fn mailbox_with_display_name() {
        let mb = mailbox(&party("LoudML", "loudml@example.com")).unwrap();
        assert_eq!(mb.name.as_deref(), Some("LoudML"));
        assert_eq!(mb.email.to_string(), "loudml@example.com");
    }

    #[test]
    fn mailbox_without_display_name() {
        let mb = mailbox(&party("", "ops@example.com")).unwrap();
        assert_eq!(mb.name, None);
        assert_eq!(mb.to_string(), "ops@example.com");
    }

    #[test]
    fn mailbox_invalid_address() {
        let err = mailbox(&party("", "not-an-email")).unwrap_err();
        assert!(matches!(err, DeliveryError::Message(_)), "got: {err:?}");
    }

    #[test]
    fn build_message_headers() {
        let message = build_message(
            &notification(),
            &party("LoudML", "loudml@example.com"),
            &party("", "ops@example.com"),
        )
        .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: LoudML <loudml@example.com>"), "got: {raw}");
        assert!(raw.contains("To: ops@example.com"), "got: {raw}");
        assert!(raw.contains("Subject: [LoudML] anomaly end"), "got: {raw}");
        assert!(raw.contains("Anomaly end"));
    }

    #[test]
    fn plain_transport_builds() {
        let smtp = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 0,
            tls: false,
            user: Some("alerts".into()),
            password: String::new(),
        };
        assert!(SmtpMailSender::build_transport(&smtp).is_ok());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection error: {0}")]
    struct Wrapped(#[source] std::io::Error);

    #[test]
    fn handshake_failure_found_in_chain() {
        let corrupt = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "received corrupt message of type InvalidContentType",
        );
        assert!(handshake_failure(&Wrapped(corrupt)));

        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(!handshake_failure(&Wrapped(refused)));
    }

    #[test]
    fn sender_name_is_smtp() {
        assert_eq!(SmtpMailSender::new().name(), "smtp");
    }
}
