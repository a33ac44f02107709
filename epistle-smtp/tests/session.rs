//! Scripted SMTP sessions driven through the full transport loop.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use epistle_core::{
    config::{ServerConfig, ServerPolicy},
    transport::{SessionContext, serve},
};
use epistle_smtp::{
    ChainOptions, SmtpDialect, chain,
    dns::{DnsError, DnsService},
};

struct StaticDns;

#[async_trait]
impl DnsService for StaticDns {
    async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        match domain {
            "nodomain.invalid" => Ok(Vec::new()),
            _ => Ok(vec![format!("mx.{domain}")]),
        }
    }
}

fn policy() -> ServerPolicy {
    ServerPolicy {
        hello_name: "mail.example.com".to_string(),
        greeting: "Service ready".to_string(),
        ..ServerPolicy::default()
    }
}

/// Run a whole client script against a fresh session and collect every
/// reply line the server produced until it closed the connection.
async fn run_script(options: ChainOptions, config: ServerConfig, script: &[&str]) -> Vec<String> {
    let ctx = SessionContext {
        chain: Arc::new(chain(options).wire().unwrap()),
        dialect: Arc::new(SmtpDialect),
        policy: Arc::new(policy()),
        tls: None,
    };

    let (shutdown, signal) = tokio::sync::broadcast::channel(1);
    let (mut client, server) = tokio::io::duplex(64 * 1024);

    let session = tokio::spawn(serve(
        server,
        "127.0.0.1:4321".parse().unwrap(),
        "127.0.0.1:25".parse().unwrap(),
        ctx,
        config,
        signal,
    ));

    for line in script {
        client.write_all(line.as_bytes()).await.unwrap();
        client.write_all(b"\r\n").await.unwrap();
    }

    client.shutdown().await.unwrap();

    let mut output = Vec::new();
    client.read_to_end(&mut output).await.unwrap();

    session.await.unwrap().unwrap();
    drop(shutdown);

    String::from_utf8(output)
        .unwrap()
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn happy_path() {
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig::default(),
        &[
            "EHLO client.example",
            "MAIL FROM:<a@example.org>",
            "RCPT TO:<b@example.com>",
            "DATA",
            "Subject: x",
            "",
            "hi",
            ".",
            "QUIT",
        ],
    )
    .await;

    assert_eq!(replies[0], "220 mail.example.com ESMTP Service ready");
    assert_eq!(replies[1], "250-mail.example.com Hello client.example");
    // capability lines follow, ending in a space-separated final line
    let last_ehlo = replies
        .iter()
        .position(|line| line.starts_with("250 "))
        .unwrap();
    assert_eq!(replies[last_ehlo + 1], "250 2.1.0 Sender OK");
    assert_eq!(replies[last_ehlo + 2], "250 2.1.5 Recipient OK");
    assert_eq!(replies[last_ehlo + 3], "354 End data with <CR><LF>.<CR><LF>");
    assert_eq!(
        replies[last_ehlo + 4],
        "250 2.6.0 Message accepted for delivery"
    );
    assert_eq!(
        replies[last_ehlo + 5],
        "221 2.0.0 mail.example.com Service closing transmission channel"
    );
}

#[tokio::test]
async fn bad_sequence_leaves_state_unchanged() {
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig::default(),
        &[
            "MAIL FROM:<a@example.org>",
            "EHLO client.example",
            "MAIL FROM:<a@example.org>",
            "QUIT",
        ],
    )
    .await;

    // before any greeting, MAIL is refused without side effect
    assert_eq!(replies[1], "503 5.5.1 Send HELO or EHLO first");
    // after EHLO the same MAIL goes through
    assert!(replies.iter().any(|line| line == "250 2.1.0 Sender OK"));
}

#[tokio::test]
async fn rset_preserves_the_greeting() {
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig::default(),
        &[
            "EHLO client.example",
            "MAIL FROM:<a@example.org>",
            "RSET",
            "MAIL FROM:<c@example.org>",
            "QUIT",
        ],
    )
    .await;

    assert!(replies.iter().any(|line| line == "250 2.0.0 Ok"));

    // the second MAIL succeeds: RSET kept the EHLO but dropped the sender
    let accepted = replies
        .iter()
        .filter(|line| *line == "250 2.1.0 Sender OK")
        .count();
    assert_eq!(accepted, 2);
}

#[tokio::test]
async fn sender_domain_mx_fast_fail() {
    let replies = run_script(
        ChainOptions {
            dns: Some(Arc::new(StaticDns)),
            ..ChainOptions::default()
        },
        ServerConfig::default(),
        &[
            "EHLO client.example",
            "MAIL FROM:<x@nodomain.invalid>",
            "MAIL FROM:<a@example.org>",
            "QUIT",
        ],
    )
    .await;

    assert!(replies.iter().any(
        |line| line == "501 5.1.7 sender domain nodomain.invalid has no valid MX records"
    ));

    // the session stayed usable and no sender was recorded by the refusal
    assert!(replies.iter().any(|line| line == "250 2.1.0 Sender OK"));
}

#[tokio::test]
async fn unknown_command() {
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig::default(),
        &["FROBNICATE now", "QUIT"],
    )
    .await;

    assert!(replies
        .iter()
        .any(|line| line == "500 5.5.1 Command FROBNICATE unrecognized"));
}

#[tokio::test]
async fn over_long_command_line_closes_the_session() {
    let long = format!("MAIL FROM:<{}@example.org>", "x".repeat(256));
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig {
            max_line_length: 64,
            ..ServerConfig::default()
        },
        &["EHLO client.example", &long],
    )
    .await;

    assert_eq!(replies.last().unwrap(), "500 5.5.2 Line too long");
}

#[tokio::test]
async fn dot_stuffed_body_is_unstuffed_before_the_hooks() {
    // The round-trip property is asserted in the DATA handler unit tests;
    // here the stuffed form travels the full transport path.
    let replies = run_script(
        ChainOptions::default(),
        ServerConfig::default(),
        &[
            "EHLO client.example",
            "MAIL FROM:<a@example.org>",
            "RCPT TO:<b@example.com>",
            "DATA",
            "..not a terminator",
            ".",
            "QUIT",
        ],
    )
    .await;

    assert!(replies
        .iter()
        .any(|line| line == "250 2.6.0 Message accepted for delivery"));
}
