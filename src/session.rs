use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc,
};
use tokio_native_tls::TlsStream;

use crate::smtp::{
    self, Direction, Error, Reply, ReplyPolicy, TranscriptEvent,
};

const END_OF_DATA: &str = "\r\n.\r\n";
const REDACTED: &str = "<password>";

/// The point a [`Session`] has reached in the SMTP transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Handshaked,
    Authenticated,
    SenderSet,
    RecipientsSet,
}

/// How a [`Session`] talks to the server.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// The name announced with `EHLO`.
    pub client_id: String,
    pub reply_policy: ReplyPolicy,
    pub connect_timeout: Duration,
    /// Bound on waiting for each complete reply.
    pub read_timeout: Duration,
    /// Skip certificate and hostname checks. Only for test servers.
    pub accept_invalid_certs: bool,
    /// Receives every line sent and received when set.
    pub transcript: Option<mpsc::UnboundedSender<TranscriptEvent>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_id: "localhost".to_string(),
            reply_policy: ReplyPolicy::Lenient,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            accept_invalid_certs: false,
            transcript: None,
        }
    }
}

/// One SMTP transaction over a single exclusively owned stream.
///
/// Operations must be called in order:
/// [`authenticate`](Self::authenticate), [`set_from`](Self::set_from),
/// [`add_recipients`](Self::add_recipients) and finally
/// [`send_data`](Self::send_data), which consumes the session
/// and closes the stream.
pub struct Session<S> {
    stream: BufReader<S>,
    state: State,
    options: SessionOptions,
}

impl Session<TlsStream<TcpStream>> {
    /// Open an implicit-TLS connection to `host:port` and perform the handshake.
    pub async fn connect(
        host: &str,
        port: u16,
        options: SessionOptions,
    ) -> Result<Self, Error> {
        let address = format!("{host}:{port}");
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::DEBUG, %address, "connecting");
        }

        let connect = async {
            let tcp = TcpStream::connect((host, port)).await.map_err(
                |source| Error::Connect {
                    address: address.clone(),
                    source,
                },
            )?;
            let mut builder = native_tls::TlsConnector::builder();
            if options.accept_invalid_certs {
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
            let tls_error = |source| Error::Tls {
                address: address.clone(),
                source,
            };
            let connector = tokio_native_tls::TlsConnector::from(
                builder.build().map_err(tls_error)?,
            );
            connector.connect(host, tcp).await.map_err(tls_error)
        };
        let stream = tokio::time::timeout(options.connect_timeout, connect)
            .await
            .map_err(|_| Error::Timeout {
                stage: format!("connecting to {address}"),
            })??;

        Self::handshake(stream, options).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Start a session on an already secured stream:
    /// read the greeting, then send `EHLO`.
    pub async fn handshake(
        stream: S,
        options: SessionOptions,
    ) -> Result<Self, Error> {
        let mut session = Self {
            stream: BufReader::new(stream),
            state: State::Handshaked,
            options,
        };
        let greeting = session.receive("reading the greeting").await?;
        session.check("greeting", greeting)?;
        let ehlo = format!("EHLO {}", session.options.client_id);
        session.command(&ehlo, &ehlo).await?;
        Ok(session)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Log in with `AUTH LOGIN`.
    ///
    /// The username and password are sent base64 encoded on their own lines.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), Error> {
        self.expect_state("authenticate", &[State::Handshaked])?;
        self.command("AUTH LOGIN", "AUTH LOGIN").await?;
        let username = smtp::encode_login(username);
        self.command(&username, &username).await?;
        self.command(&smtp::encode_login(password), REDACTED).await?;
        self.advance(State::Authenticated);
        Ok(())
    }

    pub async fn set_from(&mut self, address: &str) -> Result<(), Error> {
        self.expect_state("set the sender", &[State::Authenticated])?;
        let line = format!("MAIL FROM: <{address}>");
        self.command(&line, &line).await?;
        self.advance(State::SenderSet);
        Ok(())
    }

    pub async fn add_recipient(&mut self, address: &str) -> Result<(), Error> {
        self.expect_state(
            "add a recipient",
            &[State::SenderSet, State::RecipientsSet],
        )?;
        let line = format!("RCPT TO: <{address}>");
        self.command(&line, &line).await?;
        self.advance(State::RecipientsSet);
        Ok(())
    }

    /// Declare each recipient with its own `RCPT TO`, in order.
    pub async fn add_recipients<I>(&mut self, addresses: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for address in addresses {
            self.add_recipient(address.as_ref()).await?;
        }
        Ok(())
    }

    /// Transmit the message, say `QUIT` and close the stream.
    ///
    /// The payload goes out in one write, followed by the end marker.
    /// The server answers once, after the marker.
    pub async fn send_data(mut self, payload: &str) -> Result<(), Error> {
        self.expect_state("send data", &[State::RecipientsSet])?;
        self.command("DATA", "DATA").await?;

        self.emit(Direction::Sent, payload);
        smtp::write(&mut self.stream, &smtp::dot_stuff(payload), payload)
            .await?;
        self.emit(Direction::Sent, ".");
        smtp::write(&mut self.stream, END_OF_DATA, ".").await?;
        let reply = self.receive("waiting for the data to be accepted").await?;
        self.check("end of data", reply)?;

        // the message is out; a failed goodbye does not undo that
        if let Err(error) = self.quit().await {
            #[cfg(feature = "tracing")]
            {
                use tracing::{event, Level};
                event!(Level::DEBUG, %error, "ignoring failed QUIT");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = error;
        }
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), Error> {
        self.command("QUIT", "QUIT").await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Write one CRLF terminated line and read the complete reply.
    ///
    /// `shown` is what appears in the transcript and in errors.
    async fn command(&mut self, line: &str, shown: &str) -> Result<Reply, Error> {
        self.emit(Direction::Sent, shown);
        smtp::write(&mut self.stream, &format!("{line}\r\n"), shown).await?;
        let reply = self.receive(&format!("waiting for a reply to {shown:?}")).await?;
        self.check(shown, reply)
    }

    async fn receive(&mut self, stage: &str) -> Result<Reply, Error> {
        let reply = tokio::time::timeout(
            self.options.read_timeout,
            smtp::read_reply(&mut self.stream),
        )
        .await
        .map_err(|_| Error::Timeout {
            stage: stage.to_string(),
        })??;
        for line in &reply.lines {
            self.emit(Direction::Received, line);
        }
        Ok(reply)
    }

    fn check(&self, command: &str, reply: Reply) -> Result<Reply, Error> {
        if !reply.is_rejection() {
            return Ok(reply);
        }
        match self.options.reply_policy {
            ReplyPolicy::Strict => Err(Error::Protocol {
                command: command.to_string(),
                reply,
            }),
            ReplyPolicy::Lenient => {
                #[cfg(feature = "tracing")]
                {
                    use tracing::{event, Level};
                    event!(Level::WARN, command, code = reply.code, "ignoring rejection");
                }
                Ok(reply)
            }
        }
    }

    fn emit(&self, direction: Direction, line: &str) {
        if let Some(transcript) = &self.options.transcript {
            // a dropped receiver only means nobody is listening
            let _ = transcript.send(TranscriptEvent {
                direction,
                line: line.to_string(),
            });
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[State],
    ) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::OutOfOrder {
                operation,
                state: self.state,
            })
        }
    }

    fn advance(&mut self, state: State) {
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::DEBUG, from = ?self.state, to = ?state, "session state");
        }
        self.state = state;
    }
}
