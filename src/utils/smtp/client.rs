//! Provides the SmtpProber for validating email addresses via a raw SMTP
//! dialogue against the configured relay.
//!
//! The probe deliberately goes through a fixed authenticated relay instead
//! of the destination domain's own MX hosts: the verdict therefore reflects
//! the relay's view of deliverability, which keeps the probing IP off MX
//! blocklists at the price of a small semantic gap.

use super::classify::classify;
use super::result::{DataOutcome, SmtpProbeResult};
use crate::core::config::Config;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rustls::{ClientConfig as TlsClientConfig, RootCertStore, ServerName};
use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// One parsed SMTP reply: the three-digit code of its final line plus the
/// full (possibly multi-line) text.
#[derive(Debug, Clone)]
struct SmtpReply {
    code: u16,
    text: String,
}

/// Internal failure modes of a probe dialogue. These never escape
/// [`SmtpProber::probe`]; they only steer the cleartext fallback.
#[derive(Debug, Error)]
enum DialogueError {
    #[error("connection to relay failed: {0}")]
    Connect(String),

    #[error("SMTP dialogue IO error: {0}")]
    Io(#[from] io::Error),

    #[error("STARTTLS upgrade failed: {0}")]
    TlsUpgrade(String),
}

/// The transport under the dialogue, either plain TCP or upgraded to TLS.
enum ProbeStream {
    Plain(BufStream<TcpStream>),
    Tls(Box<BufStream<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl AsyncRead for ProbeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncBufRead for ProbeStream {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_fill_buf(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_fill_buf(cx),
        }
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).consume(amt),
            Self::Tls(s) => Pin::new(s.as_mut()).consume(amt),
        }
    }
}

impl AsyncWrite for ProbeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Represents a client performing single-shot SMTP liveness probes.
#[derive(Clone)]
pub struct SmtpProber {
    config: Arc<Config>,
}

impl SmtpProber {
    /// Creates a new SmtpProber with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Performs one synchronous probe of `email` through the configured
    /// relay and returns a structured verdict.
    ///
    /// Never fails past this boundary: every transport problem degrades to a
    /// `connection_error` result. Retry policy belongs to the caller; the
    /// prober attempts the dialogue exactly once (plus at most one cleartext
    /// re-run when the STARTTLS upgrade itself breaks).
    pub async fn probe(&self, email: &str) -> SmtpProbeResult {
        tracing::debug!(target: "smtp_task",
            "Starting SMTP probe for <{}> via relay {}:{}",
            email, self.config.smtp_relay_host, self.config.smtp_relay_port
        );

        match self.run_dialogue(email, self.config.smtp_enable_starttls).await {
            Ok(result) => result,
            Err(DialogueError::TlsUpgrade(reason)) => {
                tracing::warn!(target: "smtp_task",
                    "STARTTLS upgrade to {} failed ({}), retrying probe in cleartext",
                    self.config.smtp_relay_host, reason
                );
                match self.run_dialogue(email, false).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(target: "smtp_task",
                            "Cleartext fallback probe for <{}> failed: {}", email, e);
                        SmtpProbeResult::connection_error(e.to_string())
                    }
                }
            }
            Err(e) => {
                tracing::error!(target: "smtp_task", "SMTP probe for <{}> failed: {}", email, e);
                SmtpProbeResult::connection_error(e.to_string())
            }
        }
    }

    /// Runs the full EHLO/STARTTLS/AUTH/MAIL/RCPT/DATA dialogue once.
    async fn run_dialogue(
        &self,
        email: &str,
        try_tls: bool,
    ) -> Result<SmtpProbeResult, DialogueError> {
        let cmd_timeout = self.config.smtp_timeout;
        let mut stream = self.connect().await?;

        // Greeting banner. Read but not further validated.
        let banner = read_reply(&mut stream, cmd_timeout).await?;
        tracing::trace!(target: "smtp_task", "Relay banner: {} {}", banner.code, banner.text);

        let ehlo_cmd = format!("EHLO {}", self.config.smtp_helo_domain);
        let ehlo = send_command(&mut stream, &ehlo_cmd, cmd_timeout).await?;
        let advertises_starttls = ehlo.text.to_uppercase().contains("STARTTLS");

        if try_tls && advertises_starttls {
            let reply = send_command(&mut stream, "STARTTLS", cmd_timeout).await?;
            match reply.code {
                220 => {
                    stream = self.upgrade_tls(stream).await?;
                    tracing::debug!(target: "smtp_task",
                        "Connection to {} upgraded to TLS", self.config.smtp_relay_host);
                    send_command(&mut stream, &ehlo_cmd, cmd_timeout).await?;
                }
                502 => {
                    tracing::debug!(target: "smtp_task",
                        "Relay advertises STARTTLS but answered 502, continuing in cleartext");
                }
                other => {
                    tracing::warn!(target: "smtp_task",
                        "Unexpected STARTTLS reply {} from {}, continuing in cleartext",
                        other, self.config.smtp_relay_host);
                }
            }
        }

        if let (Some(user), Some(pass)) = (
            self.config.smtp_auth_user.as_deref(),
            self.config.smtp_auth_password.as_deref(),
        ) {
            self.auth_login(&mut stream, user, pass, cmd_timeout).await?;
        }

        let mail_from = format!(
            "MAIL FROM:<verification@{}>",
            self.config.smtp_from_domain
        );
        let reply = send_command(&mut stream, &mail_from, cmd_timeout).await?;
        match reply.code {
            250 | 251 => {}
            550 | 553 => {
                // The relay refused our own identity: abort before RCPT so
                // the caller can tell this apart from recipient knowledge.
                tracing::error!(target: "smtp_task",
                    "Relay {} rejected sender identity: {} {}",
                    self.config.smtp_relay_host, reply.code, reply.text);
                quit_quietly(&mut stream, cmd_timeout).await;
                return Ok(SmtpProbeResult::sender_rejected(reply.code, reply.text));
            }
            other => {
                tracing::warn!(target: "smtp_task",
                    "Unexpected MAIL FROM reply {} from relay, continuing: {}",
                    other, reply.text);
            }
        }

        let rcpt_cmd = format!("RCPT TO:<{}>", email);
        let rcpt = send_command(&mut stream, &rcpt_cmd, cmd_timeout).await?;
        tracing::info!(target: "smtp_task",
            "RCPT TO:<{}> answered: {} {}", email, rcpt.code, rcpt.text);

        let data_outcome = if matches!(rcpt.code, 250 | 251) {
            self.data_probe(&mut stream, email, cmd_timeout).await
        } else {
            DataOutcome::NotAttempted
        };

        quit_quietly(&mut stream, cmd_timeout).await;

        Ok(classify(rcpt.code, &rcpt.text, &data_outcome))
    }

    /// Opens the TCP connection to the relay within the connect timeout.
    async fn connect(&self) -> Result<ProbeStream, DialogueError> {
        let host = self.config.smtp_relay_host.as_str();
        let port = self.config.smtp_relay_port;
        let connect_future = TcpStream::connect((host, port));

        let tcp = match timeout(self.config.smtp_connect_timeout, connect_future).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DialogueError::Connect(format!("{}:{}: {}", host, port, e)))
            }
            Err(_) => {
                return Err(DialogueError::Connect(format!(
                    "{}:{}: connect timed out",
                    host, port
                )))
            }
        };
        tcp.set_nodelay(true).map_err(DialogueError::Io)?;
        Ok(ProbeStream::Plain(BufStream::new(tcp)))
    }

    /// Upgrades the plain stream to TLS using the platform trust roots.
    async fn upgrade_tls(&self, stream: ProbeStream) -> Result<ProbeStream, DialogueError> {
        let buffered = match stream {
            ProbeStream::Plain(s) => s,
            tls @ ProbeStream::Tls(_) => return Ok(tls),
        };
        let tcp = buffered.into_inner();

        let tls_config = build_tls_config().map_err(DialogueError::TlsUpgrade)?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(self.config.smtp_relay_host.as_str())
            .map_err(|e| DialogueError::TlsUpgrade(format!("invalid relay host name: {}", e)))?;

        match timeout(
            self.config.smtp_timeout,
            connector.connect(server_name, tcp),
        )
        .await
        {
            Ok(Ok(tls_stream)) => Ok(ProbeStream::Tls(Box::new(BufStream::new(tls_stream)))),
            Ok(Err(e)) => Err(DialogueError::TlsUpgrade(e.to_string())),
            Err(_) => Err(DialogueError::TlsUpgrade("handshake timed out".to_string())),
        }
    }

    /// Attempts AUTH LOGIN with the configured relay credentials.
    ///
    /// Refusal or non-support is non-fatal: the dialogue carries on
    /// unauthenticated and the relay gets to decide at MAIL FROM time.
    async fn auth_login(
        &self,
        stream: &mut ProbeStream,
        user: &str,
        pass: &str,
        cmd_timeout: Duration,
    ) -> Result<(), DialogueError> {
        let reply = send_command(stream, "AUTH LOGIN", cmd_timeout).await?;
        if reply.code != 334 {
            tracing::warn!(target: "smtp_task",
                "Relay declined AUTH LOGIN ({} {}), continuing unauthenticated",
                reply.code, reply.text);
            return Ok(());
        }

        let reply = send_command(stream, &BASE64.encode(user), cmd_timeout).await?;
        if reply.code != 334 {
            tracing::warn!(target: "smtp_task",
                "Relay rejected AUTH username ({}), continuing unauthenticated", reply.code);
            return Ok(());
        }

        let reply = send_command(stream, &BASE64.encode(pass), cmd_timeout).await?;
        if reply.code == 235 {
            tracing::debug!(target: "smtp_task", "Relay authentication succeeded");
        } else {
            tracing::warn!(target: "smtp_task",
                "Relay authentication failed ({} {}), continuing unauthenticated",
                reply.code, reply.text);
        }
        Ok(())
    }

    /// Issues the non-committing DATA probe after a provisional RCPT accept.
    ///
    /// A 354 go-ahead is immediately aborted with RSET so no message content
    /// is ever transmitted. The probe exists to catch servers that accept
    /// any recipient at RCPT time but bounce at the content stage.
    async fn data_probe(
        &self,
        stream: &mut ProbeStream,
        email: &str,
        cmd_timeout: Duration,
    ) -> DataOutcome {
        match send_command(stream, "DATA", cmd_timeout).await {
            Ok(reply) if reply.code == 354 => {
                tracing::debug!(target: "smtp_task",
                    "DATA accepted for <{}>, aborting transaction with RSET", email);
                if let Err(e) = send_command(stream, "RSET", cmd_timeout).await {
                    tracing::warn!(target: "smtp_task",
                        "RSET after DATA probe failed for <{}>: {}", email, e);
                }
                DataOutcome::Accepted
            }
            Ok(reply) => {
                tracing::info!(target: "smtp_task",
                    "DATA probe rejected for <{}>: {} {}", email, reply.code, reply.text);
                DataOutcome::Rejected(format!("{} {}", reply.code, reply.text))
            }
            Err(e) => {
                tracing::warn!(target: "smtp_task",
                    "DATA probe for <{}> failed at the transport level: {}", email, e);
                DataOutcome::NotAttempted
            }
        }
    }
}

/// Builds a rustls client config backed by the platform certificate store.
fn build_tls_config() -> Result<TlsClientConfig, String> {
    let mut root_store = RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs()
        .map_err(|e| format!("failed to load native certificates: {}", e))?;
    for cert in native_certs {
        // Individual unparsable certs are skipped, not fatal.
        let _ = root_store.add(&rustls::Certificate(cert.0));
    }
    if root_store.is_empty() {
        return Err("no usable root certificates found".to_string());
    }
    Ok(TlsClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

/// Writes one command and reads the reply.
async fn send_command(
    stream: &mut ProbeStream,
    command: &str,
    cmd_timeout: Duration,
) -> io::Result<SmtpReply> {
    tracing::trace!(target: "smtp_task", "C: {}", command);
    let line = format!("{}\r\n", command);
    timeout(cmd_timeout, stream.write_all(line.as_bytes()))
        .await
        .map_err(|_| io::Error::new(ErrorKind::TimedOut, "timeout writing command"))??;
    timeout(cmd_timeout, stream.flush())
        .await
        .map_err(|_| io::Error::new(ErrorKind::TimedOut, "timeout flushing command"))??;
    read_reply(stream, cmd_timeout).await
}

/// Reads a full, possibly multi-line SMTP reply. The final line of a reply
/// has a space after the three-digit code; continuation lines use a dash.
async fn read_reply(stream: &mut ProbeStream, cmd_timeout: Duration) -> io::Result<SmtpReply> {
    let mut lines: Vec<String> = Vec::new();

    loop {
        let mut line = String::new();
        let n = timeout(cmd_timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "timeout reading reply"))??;
        if n == 0 {
            if lines.is_empty() {
                return Err(io::Error::new(
                    ErrorKind::ConnectionAborted,
                    "connection closed before reply",
                ));
            }
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        tracing::trace!(target: "smtp_task", "S: {}", trimmed);
        lines.push(trimmed.to_string());

        let is_final = trimmed.len() >= 4
            && trimmed.chars().take(3).all(|c| c.is_ascii_digit())
            && trimmed.chars().nth(3) == Some(' ');
        let is_bare_code =
            trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_digit());
        if is_final || is_bare_code {
            break;
        }
    }

    let last = lines.last().expect("at least one reply line");
    let code = last
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .unwrap_or(0);
    Ok(SmtpReply {
        code,
        text: lines.join(" "),
    })
}

/// Sends QUIT and shuts the stream down; failures are logged, never raised.
async fn quit_quietly(stream: &mut ProbeStream, cmd_timeout: Duration) {
    if let Err(e) = send_command(stream, "QUIT", cmd_timeout).await {
        tracing::trace!(target: "smtp_task", "QUIT failed (ignored): {}", e);
    }
    let _ = timeout(Duration::from_secs(2), stream.shutdown()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::smtp::result::{Confidence, ProbeStatus};
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Runs a single-connection scripted SMTP server: sends the greeting,
    /// then for each (reply) entry reads one client line, records it and
    /// answers. Returns the bound port and the command log.
    async fn scripted_relay(replies: Vec<&'static str>) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().unwrap().port();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let task_log = Arc::clone(&log);

        tokio::spawn(async move {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut stream = BufStream::new(stream);
            let _ = stream.write_all(b"220 test.relay ESMTP ready\r\n").await;
            let _ = stream.flush().await;

            for reply in replies {
                let mut line = String::new();
                if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                    return;
                }
                task_log.lock().unwrap().push(line.trim().to_string());
                let _ = stream
                    .write_all(format!("{}\r\n", reply).as_bytes())
                    .await;
                let _ = stream.flush().await;
            }
            // Drain whatever else the client sends (QUIT etc).
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        (port, log)
    }

    fn test_config(port: u16) -> Arc<Config> {
        let mut config = Config::default();
        config.smtp_relay_host = "127.0.0.1".to_string();
        config.smtp_relay_port = port;
        config.smtp_enable_starttls = false;
        config.smtp_auth_user = None;
        config.smtp_auth_password = None;
        config.smtp_timeout = Duration::from_secs(2);
        config.smtp_connect_timeout = Duration::from_secs(2);
        Arc::new(config)
    }

    #[tokio::test]
    async fn accepted_rcpt_with_data_probe_yields_high_confidence() {
        let (port, log) = scripted_relay(vec![
            "250-test.relay\r\n250 SIZE 35882577", // EHLO
            "250 2.1.0 Sender Ok",                 // MAIL FROM
            "250 2.1.5 Recipient Ok",              // RCPT TO
            "354 go ahead",                        // DATA
            "250 2.0.0 Ok",                        // RSET
            "221 bye",                             // QUIT
        ])
        .await;

        let prober = SmtpProber::new(test_config(port));
        let result = prober.probe("jane.doe@example.com").await;

        assert_eq!(result.status, ProbeStatus::Valid);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.success);
        assert!(result.data_test_performed);
        assert!(result.data_test_accepted);

        let commands = log.lock().unwrap().clone();
        assert!(commands.iter().any(|c| c.starts_with("DATA")));
        assert!(commands.iter().any(|c| c.starts_with("RSET")));
    }

    #[tokio::test]
    async fn rcpt_550_with_extended_code_is_mailbox_not_found() {
        let (port, _log) = scripted_relay(vec![
            "250 test.relay",
            "250 2.1.0 Sender Ok",
            "550 5.1.1 The email account does not exist",
            "221 bye",
        ])
        .await;

        let prober = SmtpProber::new(test_config(port));
        let result = prober.probe("nobody@example.com").await;

        assert_eq!(result.status, ProbeStatus::Invalid);
        assert_eq!(result.probable_cause, "mailbox_not_found");
        assert_eq!(result.extended_code.as_deref(), Some("5.1.1"));
        assert!(result.is_fatal());
        assert!(!result.data_test_performed);
    }

    #[tokio::test]
    async fn sender_rejection_short_circuits_before_rcpt() {
        let (port, log) = scripted_relay(vec![
            "250 test.relay",
            "550 5.7.1 sender address refused", // MAIL FROM
            "221 bye",                          // QUIT
        ])
        .await;

        let prober = SmtpProber::new(test_config(port));
        let result = prober.probe("jane.doe@example.com").await;

        assert_eq!(result.status, ProbeStatus::SenderRejected);
        assert!(!result.success);

        // Invariant: once MAIL FROM is refused with 550/553, neither RCPT
        // nor DATA may be issued.
        let commands = log.lock().unwrap().clone();
        assert!(!commands.iter().any(|c| c.starts_with("RCPT")));
        assert!(!commands.iter().any(|c| c.starts_with("DATA")));
    }

    #[tokio::test]
    async fn temporary_rcpt_failure_skips_data_probe() {
        let (port, log) = scripted_relay(vec![
            "250 test.relay",
            "250 2.1.0 Sender Ok",
            "451 4.7.1 greylisted, try again later",
            "221 bye",
        ])
        .await;

        let prober = SmtpProber::new(test_config(port));
        let result = prober.probe("jane.doe@example.com").await;

        assert_eq!(result.status, ProbeStatus::TemporaryError);
        assert!(result.needs_retry);
        assert!(!result.is_fatal());
        assert!(!log.lock().unwrap().iter().any(|c| c.starts_with("DATA")));
    }

    #[tokio::test]
    async fn unreachable_relay_degrades_to_connection_error() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = SmtpProber::new(test_config(port));
        let result = prober.probe("jane.doe@example.com").await;

        assert_eq!(result.status, ProbeStatus::ConnectionError);
        assert!(!result.success);
        assert!(!result.is_fatal());
    }
}
