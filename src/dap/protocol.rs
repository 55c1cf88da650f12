//! DAP message envelopes and the subset of the protocol the adapter understands.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// DAP request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct DapRequest {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// DAP response envelope.
///
/// Note: DAP allows responses with no `body` field at all.
/// Using a `serde_json::Value` keeps the envelope stable and avoids type
/// inference issues around `None` bodies.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeArguments {
    #[serde(rename = "adapterID")]
    pub adapter_id: Option<String>,
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchArguments {
    /// Loader file (or directory) of the application to debug.
    pub program: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub no_debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachArguments {
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisconnectArguments {
    pub terminate_debuggee: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackTraceArguments {
    pub thread_id: i64,
    pub start_frame: Option<usize>,
    pub levels: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceBreakpoint {
    pub line: i64,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetBreakpointsArguments {
    pub source: Source,
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionBreakpoint {
    pub name: String,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetFunctionBreakpointsArguments {
    pub breakpoints: Vec<FunctionBreakpoint>,
}

/// Requests known to the adapter.
#[derive(Debug, Clone)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    ConfigurationDone,
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    Disconnect(DisconnectArguments),
    Terminate,
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    SetBreakpoints(SetBreakpointsArguments),
    SetFunctionBreakpoints(SetFunctionBreakpointsArguments),
    /// Any other command, answered with a failure response.
    Unknown(String),
}

fn arguments<T: DeserializeOwned + Default>(value: &Value) -> Result<T, serde_json::Error> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::deserialize(value)
}

impl Command {
    /// Decode request command with its arguments.
    pub fn from_request(req: &DapRequest) -> Result<Self, serde_json::Error> {
        let args = &req.arguments;
        let cmd = match req.command.as_str() {
            "initialize" => Command::Initialize(arguments(args)?),
            "launch" => Command::Launch(arguments(args)?),
            "attach" => Command::Attach(arguments(args)?),
            "configurationDone" => Command::ConfigurationDone,
            "continue" => Command::Continue,
            "next" => Command::Next,
            "stepIn" => Command::StepIn,
            "stepOut" => Command::StepOut,
            "pause" => Command::Pause,
            "disconnect" => Command::Disconnect(arguments(args)?),
            "terminate" => Command::Terminate,
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(arguments(args)?),
            "scopes" => Command::Scopes(arguments(args)?),
            "variables" => Command::Variables(arguments(args)?),
            "setBreakpoints" => Command::SetBreakpoints(arguments(args)?),
            "setFunctionBreakpoints" => Command::SetFunctionBreakpoints(arguments(args)?),
            other => Command::Unknown(other.to_string()),
        };
        Ok(cmd)
    }
}

/// Adapter capabilities reported in `initialize` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_function_breakpoints: bool,
    pub supports_conditional_breakpoints: bool,
    pub supports_hit_conditional_breakpoints: bool,
    pub supports_log_points: bool,
    pub supports_terminate_request: bool,
    pub supports_step_back: bool,
    pub supports_set_variable: bool,
    pub supports_restart_frame: bool,
    pub supports_goto_targets_request: bool,
    pub supports_step_in_targets_request: bool,
    pub supports_completions_request: bool,
    pub supports_modules_request: bool,
    pub supports_exception_info_request: bool,
    pub supports_exception_options: bool,
    pub supports_single_thread_execution_requests: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_function_breakpoints: true,
            supports_conditional_breakpoints: true,
            supports_hit_conditional_breakpoints: true,
            supports_log_points: true,
            supports_terminate_request: true,
            supports_step_back: false,
            supports_set_variable: false,
            supports_restart_frame: false,
            supports_goto_targets_request: false,
            supports_step_in_targets_request: false,
            supports_completions_request: false,
            supports_modules_request: false,
            supports_exception_info_request: false,
            supports_exception_options: false,
            supports_single_thread_execution_requests: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub presentation_hint: &'static str,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: &'static str,
    pub thread_id: i64,
    pub all_threads_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputEventBody {
    pub category: &'static str,
    pub output: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn request(command: &str, arguments: Value) -> DapRequest {
        serde_json::from_value(json!({
            "seq": 1,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_commands() {
        let cmd = Command::from_request(&request(
            "stackTrace",
            json!({"threadId": 1, "startFrame": 2, "levels": 5}),
        ))
        .unwrap();
        assert!(matches!(
            cmd,
            Command::StackTrace(StackTraceArguments {
                thread_id: 1,
                start_frame: Some(2),
                levels: Some(5)
            })
        ));

        let cmd = Command::from_request(&request(
            "launch",
            json!({"program": "/w/loader.lgt", "noDebug": true, "extra": 1}),
        ))
        .unwrap();
        let Command::Launch(args) = cmd else {
            panic!("launch expected");
        };
        assert_eq!(args.program, Some(PathBuf::from("/w/loader.lgt")));
        assert!(args.no_debug);
        assert_eq!(args.cwd, None);

        let cmd = Command::from_request(&request("disconnect", Value::Null)).unwrap();
        assert!(matches!(
            cmd,
            Command::Disconnect(DisconnectArguments {
                terminate_debuggee: None,
                ..
            })
        ));

        let cmd = Command::from_request(&request("evaluate", json!({"expression": "X"}))).unwrap();
        assert!(matches!(cmd, Command::Unknown(name) if name == "evaluate"));
    }

    #[test]
    fn test_decode_bad_arguments() {
        assert!(Command::from_request(&request("variables", json!({"variablesReference": "x"})))
            .is_err());
    }

    #[test]
    fn test_capabilities() {
        let caps = serde_json::to_value(Capabilities::default()).unwrap();
        assert_eq!(caps["supportsConfigurationDoneRequest"], json!(true));
        assert_eq!(caps["supportsLogPoints"], json!(true));
        assert_eq!(caps["supportsTerminateRequest"], json!(true));
        assert_eq!(caps["supportsStepBack"], json!(false));
        assert_eq!(caps["supportsSingleThreadExecutionRequests"], json!(false));
    }
}
