//! Building the message payload handed to the `DATA` command.

use chrono::{Local, NaiveDateTime};

use crate::config::{MailConfig, Sender};

/// An error while composing a message.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CompositionError {
    #[error("the message has neither text nor html content")]
    MissingBody,
    #[error("the message has no `To` recipients")]
    NoRecipients,
    #[error("the message has no sender address")]
    MissingSender,
}

/// Check that a message can be sent at all.
pub fn validate(config: &MailConfig) -> Result<(), CompositionError> {
    if config.from.address().is_empty() {
        return Err(CompositionError::MissingSender);
    }
    if config.to.is_empty() {
        return Err(CompositionError::NoRecipients);
    }
    if config.text.is_empty() && config.html.is_none() {
        return Err(CompositionError::MissingBody);
    }
    Ok(())
}

/// The addressing headers, stamped with the current local time.
pub fn compose_headers(config: &MailConfig) -> Vec<String> {
    headers_at(config, Local::now().naive_local())
}

fn headers_at(config: &MailConfig, date: NaiveDateTime) -> Vec<String> {
    let from = match &config.from {
        Sender::Address(address) => format!("From: <{address}>"),
        Sender::Named { name, address } => format!("From: {name} <{address}>"),
    };
    let reply_to = config
        .reply_to
        .as_deref()
        .unwrap_or_else(|| config.from.address());
    let mut headers = vec![
        from,
        format!("Reply-To: <{reply_to}>"),
        format!("Subject: {}", config.subject),
        format!("Date: {}", date.format("%m/%d/%Y %H:%M")),
        format!("To: {}", address_list(&config.to)),
    ];
    if !config.cc.is_empty() {
        headers.push(format!("CC: {}", address_list(&config.cc)));
    }
    headers
}

fn address_list(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|address| format!("<{address}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The content headers and body, plain or `multipart/alternative`.
pub fn compose_body(config: &MailConfig) -> Result<String, CompositionError> {
    if config.text.is_empty() && config.html.is_none() {
        return Err(CompositionError::MissingBody);
    }
    let lines = match &config.html {
        None => part(config, "text/plain", &config.text),
        Some(html) => {
            let boundary = boundary(&config.text, html);
            let mut lines = vec![
                "MIME-Version: 1.0".to_string(),
                format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\""
                ),
                String::new(),
                format!("--{boundary}"),
            ];
            lines.extend(part(config, "text/plain", &config.text));
            lines.push(format!("--{boundary}"));
            lines.extend(part(config, "text/html", html));
            lines.push(format!("--{boundary}--"));
            lines
        }
    };
    Ok(lines.join("\r\n"))
}

fn part(config: &MailConfig, mime: &str, content: &str) -> Vec<String> {
    vec![
        format!("Content-Type: {mime}; charset=\"{}\"", config.charset),
        format!("Content-Transfer-Encoding: {}", config.transfer_encoding),
        String::new(),
        content.to_string(),
    ]
}

/// A fresh boundary that occurs in neither body.
fn boundary(text: &str, html: &str) -> String {
    loop {
        let candidate = format!(
            "{:x}{}",
            Local::now().timestamp(),
            uuid::Uuid::new_v4().simple()
        );
        if !text.contains(&candidate) && !html.contains(&candidate) {
            return candidate;
        }
    }
}

/// The complete CRLF-joined payload.
pub fn compose(config: &MailConfig) -> Result<String, CompositionError> {
    let body = compose_body(config)?;
    let mut payload = compose_headers(config).join("\r\n");
    payload.push_str("\r\n");
    payload.push_str(&body);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        compose, compose_body, compose_headers, headers_at, validate,
        CompositionError,
    };
    use crate::config::MailConfig;

    fn plain() -> MailConfig {
        MailConfig::builder()
            .from("a@x.com")
            .to(["b@y.com"])
            .subject("Hi")
            .text("Hello")
            .build()
    }

    fn boundary_of(body: &str) -> String {
        let start = body.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = start + body[start..].find('"').unwrap();
        body[start..end].to_string()
    }

    #[test]
    fn plain_headers() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(
            headers_at(&plain(), date),
            [
                "From: <a@x.com>",
                "Reply-To: <a@x.com>",
                "Subject: Hi",
                "Date: 03/07/2024 09:05",
                "To: <b@y.com>",
            ]
        );
    }

    #[test]
    fn named_sender_and_cc() {
        let config = MailConfig::builder()
            .from_named("Jane Doe", "jane@x.com")
            .to(["b@y.com", "c@y.com"])
            .cc(["d@y.com", "e@y.com"])
            .text("Hello")
            .build();
        let headers = compose_headers(&config);
        assert_eq!(headers[0], "From: Jane Doe <jane@x.com>");
        assert_eq!(headers[1], "Reply-To: <jane@x.com>");
        assert_eq!(headers[2], "Subject: No subject");
        assert_eq!(headers[4], "To: <b@y.com>, <c@y.com>");
        assert_eq!(headers[5], "CC: <d@y.com>, <e@y.com>");
        assert_eq!(headers.len(), 6);
    }

    #[test]
    fn explicit_reply_to() {
        let config = MailConfig::builder()
            .from_named("Jane Doe", "jane@x.com")
            .reply_to("support@x.com")
            .to(["b@y.com"])
            .text("Hello")
            .build();
        assert_eq!(compose_headers(&config)[1], "Reply-To: <support@x.com>");
    }

    #[test]
    fn plain_payload() {
        let payload = compose(&plain()).unwrap();
        let lines: Vec<_> = payload.split("\r\n").collect();
        assert_eq!(lines[0], "From: <a@x.com>");
        assert_eq!(lines[4], "To: <b@y.com>");
        let body = compose_body(&plain()).unwrap();
        assert_eq!(
            body,
            "Content-Type: text/plain; charset=\"UTF-8\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\r\nHello"
        );
        assert!(payload.ends_with(&format!("To: <b@y.com>\r\n{body}")));
        assert_eq!(payload.matches("Content-Type: text/plain").count(), 1);
        assert!(!payload.contains("boundary"));
        assert!(!payload.contains("--"));
    }

    #[test]
    fn multipart_payload() {
        let config = MailConfig {
            html: Some("<b>Hi</b>".to_string()),
            ..plain()
        };
        let body = compose_body(&config).unwrap();
        let boundary = boundary_of(&body);
        assert!(body.contains(&format!(
            "Content-Type: multipart/alternative; boundary=\"{boundary}\""
        )));
        let lines: Vec<_> = body.split("\r\n").collect();
        let open = format!("--{boundary}");
        let close = format!("--{boundary}--");
        assert_eq!(lines.iter().filter(|l| **l == open).count(), 2);
        assert_eq!(lines.iter().filter(|l| **l == close).count(), 1);
        assert_eq!(lines.last(), Some(&close.as_str()));
        assert!(!config.text.contains(&boundary));
    }

    #[test]
    fn multipart_parses_as_alternative() {
        let config = MailConfig {
            html: Some("<b>Hi</b>".to_string()),
            ..plain()
        };
        let payload = compose(&config).unwrap();
        let mail = mailparse::parse_mail(payload.as_bytes()).unwrap();
        assert_eq!(mail.ctype.mimetype, "multipart/alternative");
        assert_eq!(mail.subparts.len(), 2);
        assert_eq!(mail.subparts[0].ctype.mimetype, "text/plain");
        assert_eq!(mail.subparts[1].ctype.mimetype, "text/html");
        assert_eq!(mail.subparts[0].get_body().unwrap().trim_end(), "Hello");
        assert_eq!(mail.subparts[1].get_body().unwrap().trim_end(), "<b>Hi</b>");
    }

    #[test]
    fn boundaries_are_unique() {
        let config = MailConfig {
            html: Some("<b>Hi</b>".to_string()),
            ..plain()
        };
        let first = boundary_of(&compose_body(&config).unwrap());
        let second = boundary_of(&compose_body(&config).unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn missing_body() {
        let config = MailConfig {
            text: String::new(),
            ..plain()
        };
        assert_eq!(compose(&config), Err(CompositionError::MissingBody));
        assert_eq!(validate(&config), Err(CompositionError::MissingBody));
        let html_only = MailConfig {
            html: Some("<p>x</p>".to_string()),
            ..config
        };
        assert!(compose(&html_only).is_ok());
    }

    #[test]
    fn validation() {
        assert_eq!(validate(&plain()), Ok(()));
        let config = MailConfig {
            to: Vec::new(),
            ..plain()
        };
        assert_eq!(validate(&config), Err(CompositionError::NoRecipients));
        let config = MailConfig::builder().to(["b@y.com"]).text("x").build();
        assert_eq!(validate(&config), Err(CompositionError::MissingSender));
    }
}
