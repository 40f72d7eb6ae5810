use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    compose::{self, CompositionError},
    config::MailConfig,
    session::{Session, SessionOptions},
    smtp::TranscriptEvent,
    template::TemplateError,
};

/// An error while sending mail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Smtp(#[from] crate::smtp::Error),
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Sends one configured message per call to [`send`](Self::send).
pub struct Mailer {
    config: MailConfig,
    transcript: Option<mpsc::UnboundedSender<TranscriptEvent>>,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            transcript: None,
        }
    }

    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Subscribe to the protocol transcript.
    ///
    /// Lines are only emitted when the config is verbose.
    /// A later call replaces the earlier subscription.
    pub fn transcript(&mut self) -> mpsc::UnboundedReceiver<TranscriptEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.transcript = Some(tx);
        rx
    }

    /// Compose the message and deliver it over a fresh implicit-TLS connection.
    pub async fn send(&self) -> Result<(), Error> {
        let payload = self.payload()?;
        let session = Session::connect(
            &self.config.host,
            self.config.port,
            self.session_options(),
        )
        .await?;
        self.deliver(session, &payload).await
    }

    /// Like [`send`](Self::send), over a stream the caller already secured.
    pub async fn send_over<S>(&self, stream: S) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let payload = self.payload()?;
        let session = Session::handshake(stream, self.session_options()).await?;
        self.deliver(session, &payload).await
    }

    fn payload(&self) -> Result<String, CompositionError> {
        compose::validate(&self.config)?;
        compose::compose(&self.config)
    }

    async fn deliver<S>(
        &self,
        mut session: Session<S>,
        payload: &str,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.config;
        session.authenticate(&config.username, &config.password).await?;
        session.set_from(config.from.address()).await?;
        session.add_recipients(&config.to).await?;
        session.send_data(payload).await?;

        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::DEBUG, recipients = config.to.len(), "message sent");
        }
        Ok(())
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            client_id: self.config.client_id.clone(),
            reply_policy: self.config.reply_policy,
            connect_timeout: self.config.connect_timeout,
            read_timeout: self.config.read_timeout,
            accept_invalid_certs: self.config.accept_invalid_certs,
            transcript: self
                .transcript
                .clone()
                .filter(|_| self.config.verbose),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::{Error, Mailer};
    use crate::{compose::CompositionError, config::MailConfig};

    #[tokio::test]
    async fn refuses_to_send_without_recipients() {
        let mailer = Mailer::new(
            MailConfig::builder().from("a@x.com").text("Hello").build(),
        );
        // nothing is read or written
        let mock = Builder::new().build();
        match mailer.send_over(mock).await {
            Err(Error::Composition(CompositionError::NoRecipients)) => (),
            other => panic!("expected no recipients, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quiet_config_emits_no_transcript() {
        let mut mailer = Mailer::new(
            MailConfig::builder()
                .from("a@x.com")
                .to(["b@y.com"])
                .text("Hello")
                .verbose(false)
                .build(),
        );
        let mut transcript = mailer.transcript();
        let mock = Builder::new()
            .read(b"220 hi\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"421 closing\r\n")
            .build();
        let session = crate::session::Session::handshake(
            mock,
            mailer.session_options(),
        )
        .await
        .unwrap();
        drop(session);
        drop(mailer);
        assert!(transcript.recv().await.is_none());
    }
}
