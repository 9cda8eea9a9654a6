use crate::models::HeightsSample;
use reqwest::Client;
use serde::Deserialize;
use std::{path::PathBuf, process::Stdio, time::Duration};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error running {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("command exited with {status}: {output}")]
    CommandFailed { status: String, output: String },
    #[error("unable to contact follower: {0}")]
    PeerUnreachable(String),
    #[error("malformed heights output: {0}")]
    Malformed(String),
    #[error("rpc error: {0}")]
    Rpc(serde_json::Value),
    #[error("rpc response missing result")]
    MissingRpcResult,
    #[error("height parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

/// Anything that can report the follower's view of leader and follower heights.
#[async_trait::async_trait]
pub trait HeightSource: Send + Sync {
    async fn sample(&self) -> Result<HeightsSample, SourceError>;
}

/// Anything that can report the explorer's current height.
#[async_trait::async_trait]
pub trait ExplorerSource: Send + Sync {
    async fn sample(&self) -> Result<u64, SourceError>;
}

pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Samples heights by running `factom-cli get heights` against the follower.
#[derive(Debug, Clone)]
pub struct CliHeightSource {
    binary: PathBuf,
    address: String,
    timeout: Duration,
}

impl CliHeightSource {
    pub fn new(binary: PathBuf, address: String, timeout: Duration) -> Self {
        Self {
            binary,
            address,
            timeout,
        }
    }

    async fn run_cli(&self) -> Result<String, SourceError> {
        let mut command = Command::new(&self.binary);
        command
            .args(["-s", &self.address, "get", "heights"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(|source| SourceError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        // factom-cli reports connection problems on either stream.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(address = %self.address, output = %combined, "factom-cli output");
        check_dial_error(&self.address, &combined)?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(combined)
    }
}

#[async_trait::async_trait]
impl HeightSource for CliHeightSource {
    async fn sample(&self) -> Result<HeightsSample, SourceError> {
        let output = self.run_cli().await?;
        parse_cli_output(&output)
    }
}

fn check_dial_error(address: &str, output: &str) -> Result<(), SourceError> {
    let dial_error = format!("Post http://{address}/v2: dial tcp");
    if output.starts_with(&dial_error) {
        return Err(SourceError::PeerUnreachable(output.trim().to_owned()));
    }
    Ok(())
}

/// Parses the two-line output of `factom-cli get heights`:
///
/// ```text
/// DirectoryBlockHeight: 1234
/// LeaderHeight: 1235
/// ```
pub fn parse_cli_output(output: &str) -> Result<HeightsSample, SourceError> {
    let mut lines = output.lines();
    let follower = parse_height_line(lines.next())?;
    let leader = parse_height_line(lines.next())?;
    Ok(HeightsSample { leader, follower })
}

fn parse_height_line(line: Option<&str>) -> Result<u64, SourceError> {
    let line = line.ok_or_else(|| SourceError::Malformed("missing line".to_owned()))?;
    let value = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| SourceError::Malformed(line.to_owned()))?;
    Ok(value.parse::<u64>()?)
}

/// Samples heights through the follower's `heights` JSON-RPC method.
#[derive(Debug, Clone)]
pub struct RpcHeightSource {
    client: Client,
    url: String,
}

impl RpcHeightSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            url,
        })
    }
}

#[async_trait::async_trait]
impl HeightSource for RpcHeightSource {
    async fn sample(&self) -> Result<HeightsSample, SourceError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "heights"
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse>()
            .await?;

        heights_from_rpc(response)
    }
}

fn heights_from_rpc(response: RpcResponse) -> Result<HeightsSample, SourceError> {
    if let Some(error) = response.error {
        return Err(SourceError::Rpc(error));
    }
    let result = response.result.ok_or(SourceError::MissingRpcResult)?;
    Ok(HeightsSample {
        leader: result.leaderheight,
        follower: result.directoryblockheight,
    })
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcHeights>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcHeights {
    directoryblockheight: u64,
    leaderheight: u64,
}

/// Reads the bare height served by the explorer.
#[derive(Debug, Clone)]
pub struct HttpExplorerSource {
    client: Client,
    url: String,
}

impl HttpExplorerSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            url,
        })
    }
}

#[async_trait::async_trait]
impl ExplorerSource for HttpExplorerSource {
    async fn sample(&self) -> Result<u64, SourceError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(body.trim().parse::<u64>()?)
    }
}
