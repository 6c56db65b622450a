//! Command implementations.

use crate::cli::Cli;
use crate::endpoint::{discovery_for, merged_config, resolve_client};
use crate::ui;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dldht_types::{DhtError, DhtResult};
use dldht_wire::{DhtClient, Transport};
use serde_json::{json, Value};
use std::io::Write;
use tracing::debug;

pub async fn cmd_get(cli: &Cli, key: &str, raw: bool) -> DhtResult<()> {
    let client = resolve_client(cli).await?;
    let value = client.get(key).await;

    let Some(bytes) = finish(&client, value).await? else {
        if cli.json {
            print_json(&json!({ "key": key, "found": false }));
        }
        return Err(DhtError::NotFound(key.to_string()));
    };

    if raw {
        let mut out = std::io::stdout().lock();
        out.write_all(&bytes)?;
        out.flush()?;
        return Ok(());
    }

    let text = String::from_utf8(bytes).map_err(|e| e.into_bytes());
    if cli.json {
        let body = match &text {
            Ok(s) => json!({ "key": key, "found": true, "value": s }),
            Err(b) => json!({ "key": key, "found": true, "base64": BASE64.encode(b) }),
        };
        print_json(&body);
        return Ok(());
    }
    match text {
        Ok(s) => println!("{s}"),
        Err(b) => {
            println!("{}", BASE64.encode(&b));
            ui::hint("binary value shown as base64; use --raw for the bytes");
        }
    }
    Ok(())
}

pub async fn cmd_put(cli: &Cli, key: &str, value: &str, ttl: u64, file: bool) -> DhtResult<()> {
    let bytes = if file {
        tokio::fs::read(value)
            .await
            .map_err(|e| DhtError::Config(format!("cannot read {value}: {e}")))?
    } else {
        value.as_bytes().to_vec()
    };
    let size = bytes.len();

    let client = resolve_client(cli).await?;
    let result = client.put(key, bytes, ttl).await;
    finish(&client, result).await?;

    if cli.json {
        print_json(&json!({ "key": key, "stored": true, "bytes": size, "ttl": ttl }));
    } else {
        ui::success(&format!("Stored {key} ({size} bytes)"));
    }
    Ok(())
}

pub async fn cmd_del(cli: &Cli, key: &str) -> DhtResult<()> {
    let client = resolve_client(cli).await?;
    let result = client.del(key).await;
    finish(&client, result).await?;

    if cli.json {
        print_json(&json!({ "key": key, "deleted": true }));
    } else {
        ui::success(&format!("Deleted {key}"));
    }
    Ok(())
}

pub async fn cmd_status(cli: &Cli) -> DhtResult<()> {
    let client = resolve_client(cli).await?;
    let result = client.status().await;
    let body = finish(&client, result).await?;

    if cli.json {
        print_json(&body);
        return Ok(());
    }

    ui::section("dl-dht Node Status");
    ui::blank();
    ui::kv_ok("Peer", client.peer_id());
    match body.as_object() {
        Some(fields) if !fields.is_empty() => {
            for (name, value) in fields {
                ui::kv(name, &display_value(value));
            }
        }
        _ => ui::kv("Status", "(empty)"),
    }
    Ok(())
}

pub async fn cmd_discover(cli: &Cli) -> DhtResult<()> {
    let config = merged_config(cli)?;
    let found = discovery_for(&config)?.discover().await?;

    if cli.json {
        print_json(&json!({ "peerId": found.peer_id, "addrs": found.addrs }));
        return Ok(());
    }

    ui::section("Discovered dl-dht node");
    ui::blank();
    ui::kv_ok("Peer", &found.peer_id);
    for addr in &found.addrs {
        ui::kv("Addr", addr);
    }
    Ok(())
}

/// Stop the client after an operation and hand back the operation's result.
/// A failed stop is logged and otherwise ignored.
async fn finish<R, T: Transport>(client: &DhtClient<T>, result: DhtResult<R>) -> DhtResult<R> {
    if let Err(e) = client.stop().await {
        debug!(error = %e, "client stop failed");
    }
    result
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dldht_types::ClientConfig;
    use dldht_wire::DialTarget;
    use std::io;
    use tokio::io::DuplexStream;

    /// Transport that starts but cannot stop cleanly.
    struct BrokenStop;

    #[async_trait]
    impl Transport for BrokenStop {
        type Connection = ();
        type Stream = DuplexStream;

        async fn start(&self) -> io::Result<()> {
            Ok(())
        }

        async fn dial(&self, _target: &DialTarget) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }

        async fn open_stream(&self, _conn: (), _protocol: &str) -> io::Result<DuplexStream> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "na"))
        }

        async fn stop(&self) -> io::Result<()> {
            Err(io::Error::other("listener already closed"))
        }
    }

    fn started_client() -> DhtClient<BrokenStop> {
        let config = ClientConfig::new(
            "12D3KooWAbCdEfGhJkLmNpQrStUvWxYz123456789abcdefghijk",
            vec!["/ip4/127.0.0.1/tcp/46345".to_string()],
        );
        DhtClient::with_transport(config, BrokenStop).unwrap()
    }

    #[tokio::test]
    async fn test_finish_keeps_operation_error_over_stop_error() {
        let client = started_client();
        client.start().await.unwrap();
        let err = finish(&client, client.del("/ns/gone").await)
            .await
            .unwrap_err();
        assert!(matches!(err, DhtError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused), "{err}");
    }

    #[tokio::test]
    async fn test_finish_keeps_success_when_stop_fails() {
        let client = started_client();
        client.start().await.unwrap();
        let out = finish(&client, Ok::<_, DhtError>(7)).await.unwrap();
        assert_eq!(out, 7);
        assert!(client.stop().await.is_err());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("up")), "up");
        assert_eq!(display_value(&json!(["/a", "/b"])), "/a, /b");
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&json!({"k": 1})), "{\"k\":1}");
    }
}
