// Typed views over the `data` payload of specific message types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::message::{DecodeError, Payload};

/// How the remote interpreter should treat the command text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Execute a file path, or literal source text, as a script
    #[default]
    ExecFile,
    /// Execute a single statement, result is not captured
    ExecStatement,
    /// Evaluate a single expression and return its value
    EvalStatement,
}

impl ExecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecMode::ExecFile => "exec_file",
            ExecMode::ExecStatement => "exec_statement",
            ExecMode::EvalStatement => "eval_statement",
        }
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exec_file" => Ok(ExecMode::ExecFile),
            "exec_statement" => Ok(ExecMode::ExecStatement),
            "eval_statement" => Ok(ExecMode::EvalStatement),
            other => Err(format!(
                "unknown exec mode '{other}' (expected exec_file, exec_statement or eval_statement)"
            )),
        }
    }
}

fn from_payload<T: DeserializeOwned>(data: &Payload) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(data.clone()))
        .map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Payload of a `command` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub unattended: bool,
    pub exec_mode: ExecMode,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, unattended: bool, exec_mode: ExecMode) -> Self {
        Self {
            command: command.into(),
            unattended,
            exec_mode,
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut data = Payload::new();
        data.insert("command".to_string(), Value::String(self.command.clone()));
        data.insert("unattended".to_string(), Value::Bool(self.unattended));
        data.insert(
            "exec_mode".to_string(),
            Value::String(self.exec_mode.as_str().to_string()),
        );
        data
    }

    pub fn from_payload(data: &Payload) -> Result<Self, DecodeError> {
        from_payload(data)
    }
}

/// Payload of an `open_connection` message: where the remote node must dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenConnectionRequest {
    pub command_ip: String,
    pub command_port: u16,
}

impl OpenConnectionRequest {
    pub fn for_endpoint(endpoint: SocketAddr) -> Self {
        Self {
            command_ip: endpoint.ip().to_string(),
            command_port: endpoint.port(),
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut data = Payload::new();
        data.insert(
            "command_ip".to_string(),
            Value::String(self.command_ip.clone()),
        );
        data.insert("command_port".to_string(), Value::from(self.command_port));
        data
    }

    pub fn from_payload(data: &Payload) -> Result<Self, DecodeError> {
        from_payload(data)
    }

    /// Socket address to dial
    pub fn endpoint(&self) -> Result<SocketAddr, DecodeError> {
        let ip: IpAddr = self
            .command_ip
            .parse()
            .map_err(|e| DecodeError::Malformed(format!("invalid command_ip: {e}")))?;
        Ok(SocketAddr::new(ip, self.command_port))
    }
}

/// One captured line of interpreter output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(rename = "type")]
    pub output_type: String,
    pub output: String,
}

/// Conventional shape of a `command_result` payload.
///
/// The command channel hands back the raw payload; this view is for callers
/// that know their remote interpreter follows the convention.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub output: Vec<CommandOutput>,
}

impl CommandResult {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            output: Vec::new(),
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
            output: Vec::new(),
        }
    }

    pub fn with_output(mut self, output_type: impl Into<String>, output: impl Into<String>) -> Self {
        self.output.push(CommandOutput {
            output_type: output_type.into(),
            output: output.into(),
        });
        self
    }

    pub fn to_payload(&self) -> Payload {
        let mut data = Payload::new();
        data.insert("success".to_string(), Value::Bool(self.success));
        data.insert("result".to_string(), Value::String(self.result.clone()));
        let output = self
            .output
            .iter()
            .map(|entry| {
                let mut line = Payload::new();
                line.insert("type".to_string(), Value::String(entry.output_type.clone()));
                line.insert("output".to_string(), Value::String(entry.output.clone()));
                Value::Object(line)
            })
            .collect();
        data.insert("output".to_string(), Value::Array(output));
        data
    }

    pub fn from_payload(data: &Payload) -> Result<Self, DecodeError> {
        from_payload(data)
    }

    /// True only when the payload carries `success: true`
    pub fn payload_succeeded(data: &Payload) -> bool {
        data.get("success").and_then(Value::as_bool) == Some(true)
    }
}
