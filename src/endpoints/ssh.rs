//! SSH client endpoint executing remote commands through the `ssh` binary.
//!
//! Requests and responses travel as JSON payloads:
//! `{"ssh-request":{"command":"ls","stdin":""}}` and
//! `{"ssh-response":{"stdout":"..","stderr":"..","exit":0}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::Endpoint;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message, MessageQueue, MessageSelector};

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5 * 60 * 1000;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 60 * 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration of an SSH client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SshClientConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// Password authentication, requires `sshpass`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub strict_host_checking: bool,
    /// Known hosts file, mandatory with strict host checking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts: Option<PathBuf>,
    /// Maximum command runtime in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Receive timeout in milliseconds
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
    /// SSH executable
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn default_connection_timeout() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshRequest {
    pub command: String,
    #[serde(default)]
    pub stdin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit: i32,
}

#[derive(Serialize, Deserialize)]
struct SshRequestPayload {
    #[serde(rename = "ssh-request")]
    request: SshRequest,
}

#[derive(Serialize, Deserialize)]
struct SshResponsePayload {
    #[serde(rename = "ssh-response")]
    response: SshResponse,
}

impl SshRequest {
    pub fn from_payload(payload: &str) -> CitrusResult<Self> {
        let parsed: SshRequestPayload = serde_json::from_str(payload)
            .map_err(|e| CitrusError::parse("SSH request", e))?;
        Ok(parsed.request)
    }

    pub fn to_payload(&self) -> CitrusResult<String> {
        Ok(serde_json::to_string(&SshRequestPayload { request: self.clone() })?)
    }
}

impl SshResponse {
    pub fn from_payload(payload: &str) -> CitrusResult<Self> {
        let parsed: SshResponsePayload = serde_json::from_str(payload)
            .map_err(|e| CitrusError::parse("SSH response", e))?;
        Ok(parsed.response)
    }

    pub fn to_payload(&self) -> CitrusResult<String> {
        Ok(serde_json::to_string(&SshResponsePayload { response: self.clone() })?)
    }
}

/// Executes commands on a remote host, the response of each command is kept
/// until the test receives it
pub struct SshClient {
    config: SshClientConfig,
    responses: MessageQueue,
}

impl SshClient {
    pub fn new(config: SshClientConfig) -> CitrusResult<Self> {
        if config.strict_host_checking && config.known_hosts.is_none() {
            return Err(CitrusError::config_invalid(
                "knownHosts",
                "Strict host checking is enabled but no knownHosts given",
            ));
        }
        Ok(Self {
            responses: MessageQueue::new(format!("{}.responses", config.name)),
            config,
        })
    }

    /// Program and arguments for running a command as the given user
    fn command_line(&self, user: &str, command: &str) -> (String, Vec<String>) {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", (self.config.connection_timeout / 1000).max(1)),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.config.strict_host_checking { "yes" } else { "no" }
            ),
        ];

        match &self.config.known_hosts {
            Some(path) => {
                args.push("-o".to_string());
                args.push(format!("UserKnownHostsFile={}", path.display()));
            }
            None if !self.config.strict_host_checking => {
                args.push("-o".to_string());
                args.push("UserKnownHostsFile=/dev/null".to_string());
            }
            None => {}
        }

        if let Some(key) = &self.config.private_key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }

        if self.config.password.is_none() {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }

        args.push(format!("{}@{}", user, self.config.host));
        args.push(command.to_string());

        if self.config.password.is_some() {
            let mut wrapped = vec!["-e".to_string(), self.config.ssh_binary.clone()];
            wrapped.extend(args);
            ("sshpass".to_string(), wrapped)
        } else {
            (self.config.ssh_binary.clone(), args)
        }
    }

    #[instrument(skip(self, request), level = "debug")]
    async fn execute(&self, user: &str, request: &SshRequest) -> CitrusResult<SshResponse> {
        let (program, args) = self.command_line(user, &request.command);
        debug!(program = %program, command = %request.command, "Executing SSH command");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &self.config.password {
            command.env("SSHPASS", password);
        }

        let mut child = command
            .spawn()
            .map_err(|e| CitrusError::endpoint(&self.config.name, format!("failed to run {}: {}", program, e)))?;

        // stdin is written while the output is drained so large inputs can
        // not block on a full pipe
        let stdin = child.stdin.take().map(|mut input| {
            let data = request.stdin.clone().into_bytes();
            tokio::spawn(async move {
                if let Err(e) = input.write_all(&data).await {
                    debug!(error = %e, "SSH command stopped reading stdin");
                }
                // dropping stdin signals end of input to the remote command
            })
        });

        let stdout = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = out.read_to_string(&mut buffer).await;
                buffer
            })
        });
        let stderr = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = err.read_to_string(&mut buffer).await;
                buffer
            })
        });

        let command_timeout = Duration::from_millis(self.config.command_timeout);
        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= command_timeout {
                warn!(command = %request.command, ?command_timeout, "SSH command timed out");
                if let Some(task) = &stdin {
                    task.abort();
                }
                let _ = child.kill().await;
                return Err(CitrusError::endpoint(
                    &self.config.name,
                    format!(
                        "Timeout: Waited {} milliseconds for command '{}' to finish",
                        self.config.command_timeout, request.command
                    ),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };
        if let Some(task) = stdin {
            task.abort();
        }

        let stdout = match stdout {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let stderr = match stderr {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        Ok(SshResponse {
            stdout,
            stderr,
            exit: status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl Endpoint for SshClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "ssh"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        let request = SshRequest::from_payload(&message.payload)?;
        let user = message
            .header(headers::SSH_USER)
            .unwrap_or(self.config.user.as_str())
            .to_string();

        info!(host = %self.config.host, user = %user, command = %request.command, "Sending SSH request");
        let response = self.execute(&user, &request).await?;
        debug!(exit = response.exit, "SSH command finished");

        self.responses.push(
            Message::new(response.to_payload()?)
                .with_header(headers::SSH_COMMAND, request.command)
                .with_header(headers::SSH_EXIT, response.exit.to_string()),
        );
        Ok(())
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        self.responses
            .receive(selector, timeout)
            .await
            .ok_or_else(|| CitrusError::timeout(&self.config.name, timeout))
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.responses.purge(selector))
    }
}
