use std::{collections::HashMap, path::Path, str::FromStr, time::Duration};

use crate::{smtp::ReplyPolicy, template};

pub const DEFAULT_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_PORT: u16 = 465;

/// Where to send mail, and as whom.
///
/// This type can be parsed from a string of the form
/// `[username:password@]host[:port]`.
/// The username may itself contain `@`,
/// and an IPv6 host is written in brackets: `[::1]:465`.
#[derive(PartialEq, Eq, Debug)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
    pub username_password: Option<(String, String)>,
}

impl FromStr for Endpoint {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (username_password, host) =
            if let Some((user, host)) = s.rsplit_once('@') {
                if let Some((username, password)) = user.split_once(':') {
                    let username_password =
                        (username.to_string(), password.to_string());
                    (Some(username_password), host)
                } else {
                    return Err("missing ':' in user");
                }
            } else {
                (None, s)
            };
        let (host, port) = if let Some(bracketed) = host.strip_prefix('[') {
            let (host, rest) =
                bracketed.split_once(']').ok_or("missing ']' in host")?;
            match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if rest.is_empty() => (host, None),
                None => return Err("invalid port number"),
            }
        } else {
            match host.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host, None),
            }
        };
        let port = port
            .map(|port| port.parse().map_err(|_| "invalid port number"))
            .transpose()?;
        if host.is_empty() {
            return Err("missing host");
        }
        Ok(Endpoint {
            host: host.to_string(),
            port,
            username_password,
        })
    }
}

/// The sender of a message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Sender {
    Address(String),
    Named { name: String, address: String },
}

impl Sender {
    /// The bare email address.
    pub fn address(&self) -> &str {
        match self {
            Sender::Address(address) | Sender::Named { address, .. } => address,
        }
    }
}

impl Default for Sender {
    fn default() -> Self {
        Sender::Address(String::new())
    }
}

/// Everything needed to compose and send one message.
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub from: Sender,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    /// Falls back to the sender's address when unset.
    pub reply_to: Option<String>,
    pub subject: String,
    pub charset: String,
    pub transfer_encoding: String,
    pub text: String,
    /// Switches the body to `multipart/alternative` when set.
    pub html: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub verbose: bool,
    pub reply_policy: ReplyPolicy,
    pub client_id: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: Sender::default(),
            to: Vec::new(),
            cc: Vec::new(),
            reply_to: None,
            subject: "No subject".to_string(),
            charset: "UTF-8".to_string(),
            transfer_encoding: "7bit".to_string(),
            text: String::new(),
            html: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            verbose: true,
            reply_policy: ReplyPolicy::Lenient,
            client_id: "localhost".to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            accept_invalid_certs: false,
        }
    }
}

impl MailConfig {
    pub fn builder() -> MailBuilder {
        MailBuilder::default()
    }
}

/// Accumulates settings and produces a [`MailConfig`].
#[derive(Default, Debug)]
pub struct MailBuilder {
    config: MailConfig,
}

impl MailBuilder {
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.config.from = Sender::Address(address.into());
        self
    }

    pub fn from_named(
        mut self,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.config.from = Sender::Named {
            name: name.into(),
            address: address.into(),
        };
        self
    }

    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.config.reply_to = Some(address.into());
        self
    }

    pub fn to<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.config.to = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn cc<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.config.cc = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.subject = subject.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.config.text = text.into();
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.config.html = Some(html.into());
        self
    }

    /// Render the template at `path` and use it as the html body.
    pub async fn load_template(
        self,
        path: impl AsRef<Path>,
        variables: &HashMap<String, String>,
    ) -> Result<Self, template::TemplateError> {
        let html = template::load(path, variables).await?;
        Ok(self.html(html))
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.config.charset = charset.into();
        self
    }

    pub fn transfer_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.transfer_encoding = encoding.into();
        self
    }

    /// Take host, port and credentials from an [`Endpoint`].
    ///
    /// Parts missing from the endpoint keep their current values.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.host = endpoint.host;
        if let Some(port) = endpoint.port {
            self.config.port = port;
        }
        if let Some((username, password)) = endpoint.username_password {
            self.config.username = username;
            self.config.password = password;
        }
        self
    }

    pub fn host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.host = host.into();
        self.config.port = port;
        self
    }

    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.config.reply_policy = policy;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.config.connect_timeout = connect;
        self.config.read_timeout = read;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> MailConfig {
        self.config
    }
}
