//! DAP debug session on top of the Logtalk terminal debugger.
//!
//! The terminal debugger has no structured output, so the session reconstructs the debugging
//! state from the side-channel stack of stop locations. Stops after stepping commands are
//! approximated: a stepping command schedules a pending stop that fires on the next stack push
//! or, at the latest, after a fixed delay.

use crate::clause;
use crate::config::Settings;
use crate::dap::outbox::Outbox;
use crate::dap::protocol::{
    AttachArguments, Breakpoint, Capabilities, Command, DapRequest, InitializeArguments,
    LaunchArguments, Scope, ScopesArguments, SetBreakpointsArguments,
    SetFunctionBreakpointsArguments, Source, StackFrame, StackTraceArguments, StoppedEventBody,
    Thread, Variable, VariablesArguments,
};
use crate::dap::transport::DapReader;
use crate::error::Error;
use crate::port::{PortCommandTranslator, StepVerb};
use crate::state::{DebugLocation, DebugStateStack, StackChange, Subscription};
use crate::terminal::{goal, Terminal};
use crate::{muted_error, weak_error};
use itertools::Itertools;
use serde_json::{json, Value};
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Id of the single synthetic thread.
pub const THREAD_ID: i64 = 1;
pub const THREAD_NAME: &str = "Logtalk";
/// Variables reference of the single known scope.
pub const SCOPE_REFERENCE: i64 = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Upper bound of a wait for a stack push after a stepping command.
    pub stop_delay: Duration,
    /// Side-channel file passed to the debug bridge predicate.
    pub debug_info_file: PathBuf,
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            stop_delay: settings.stop_delay,
            debug_info_file: settings.debug_info_file.clone(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

struct Control {
    state: SessionState,
    /// Incremented every time a pending stop is scheduled or cancelled.
    generation: u64,
    pending_reason: Option<&'static str>,
}

/// Completes pending stops, shared between the session and stop workers.
#[derive(Clone)]
struct StopSignal {
    control: Arc<Mutex<Control>>,
    outbox: Outbox,
}

impl StopSignal {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a running session into stopped state and emit `stopped` event.
    ///
    /// Does nothing if session isn't running or if `generation` is given and is not
    /// the current one.
    fn fire(&self, generation: Option<u64>) {
        let mut control = self.lock();
        if control.state != SessionState::Running {
            return;
        }
        if generation.is_some_and(|generation| generation != control.generation) {
            return;
        }

        control.generation += 1;
        control.state = SessionState::Stopped;
        let reason = control.pending_reason.take().unwrap_or("step");
        // emit under the lock, teardown must never be followed by a `stopped` event
        muted_error!(
            self.outbox.send_event_body("stopped", stopped_body(reason)),
            "send stopped event:"
        );
    }
}

fn stopped_body(reason: &'static str) -> StoppedEventBody {
    StoppedEventBody {
        reason,
        thread_id: THREAD_ID,
        all_threads_stopped: true,
        description: None,
    }
}

/// Debug session of a single DAP client.
pub struct DebugSession {
    outbox: Outbox,
    stack: Arc<DebugStateStack>,
    translator: PortCommandTranslator,
    terminal: Box<dyn Terminal>,
    options: SessionOptions,
    signal: StopSignal,
    subscription: Option<Subscription>,
    configured: bool,
    launched: bool,
    no_debug: bool,
    terminated: bool,
}

impl DebugSession {
    pub fn new(
        outbox: Outbox,
        stack: Arc<DebugStateStack>,
        translator: PortCommandTranslator,
        terminal: Box<dyn Terminal>,
        options: SessionOptions,
    ) -> Self {
        let signal = StopSignal {
            control: Arc::new(Mutex::new(Control {
                state: SessionState::Uninitialized,
                generation: 0,
                pending_reason: None,
            })),
            outbox: outbox.clone(),
        };
        Self {
            subscription: Some(stack.subscribe()),
            outbox,
            stack,
            translator,
            terminal,
            options,
            signal,
            configured: false,
            launched: false,
            no_debug: false,
            terminated: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.signal.lock().state
    }

    fn set_state(&self, state: SessionState) {
        self.signal.lock().state = state;
    }

    /// Serve requests until the client disconnects.
    pub fn run<R: BufRead>(mut self, reader: &mut DapReader<R>) -> Result<(), Error> {
        loop {
            let msg = match reader.read_message() {
                Ok(msg) => msg,
                Err(Error::ConnectionClosed) => {
                    log::info!(target: "dap", "DAP client gone");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if !self.handle_message(msg) {
                return Ok(());
            }
        }
    }

    /// Handle a single incoming message. Return false if the session is over.
    pub fn handle_message(&mut self, msg: Value) -> bool {
        self.drain_stack();

        let req: DapRequest = match serde_json::from_value(msg) {
            Ok(req) => req,
            Err(e) => {
                log::warn!(target: "dap", "malformed DAP message: {e:#}");
                return true;
            }
        };
        if req.r#type != "request" {
            return true;
        }

        let cmd = match Command::from_request(&req) {
            Ok(cmd) => cmd,
            Err(e) => {
                let message = format!("invalid `{}` arguments: {e}", req.command);
                return weak_error!(self.outbox.respond_err(&req, message)).is_some();
            }
        };
        let is_disconnect = matches!(cmd, Command::Disconnect(_));

        match self.dispatch(&req, cmd) {
            Ok(()) => !is_disconnect,
            Err(e) => {
                log::warn!(target: "dap", "{} request failed: {e:#}", req.command);
                false
            }
        }
    }

    /// Apply stack changes observed since the previous request.
    ///
    /// Only a push while running completes a pending stop. A push while already stopped
    /// (for example the first port hit after the `entry` stop) emits nothing, the editor
    /// sees the new location on its next `stackTrace` after a stepping command.
    fn drain_stack(&self) {
        let Some(subscription) = &self.subscription else {
            return;
        };
        while let Some(change) = subscription.try_recv() {
            if let StackChange::Pushed(_) = change {
                if !self.no_debug {
                    self.signal.fire(None);
                }
            }
        }
    }

    fn dispatch(&mut self, req: &DapRequest, cmd: Command) -> Result<(), Error> {
        match cmd {
            Command::Initialize(args) => self.handle_initialize(req, args),
            Command::Launch(args) => self.handle_launch(req, args),
            Command::Attach(args) => self.handle_attach(req, args),
            Command::ConfigurationDone => self.handle_configuration_done(req),
            Command::Continue => self.handle_step(req, StepVerb::Continue),
            Command::Next => self.handle_step(req, StepVerb::StepOver),
            Command::StepIn => self.handle_step(req, StepVerb::StepInto),
            Command::StepOut => self.handle_step(req, StepVerb::StepOut),
            // the terminal debugger can't be interrupted on demand
            Command::Pause => self.outbox.respond(req),
            Command::Disconnect(args) => {
                self.handle_disconnect(req, args.terminate_debuggee.unwrap_or(false))
            }
            Command::Terminate => self.handle_disconnect(req, true),
            Command::Threads => self.handle_threads(req),
            Command::StackTrace(args) => self.handle_stack_trace(req, args),
            Command::Scopes(args) => self.handle_scopes(req, args),
            Command::Variables(args) => self.handle_variables(req, args),
            Command::SetBreakpoints(args) => self.handle_set_breakpoints(req, args),
            Command::SetFunctionBreakpoints(args) => {
                self.handle_set_function_breakpoints(req, args)
            }
            Command::Unknown(name) => self
                .outbox
                .respond_err(req, format!("unsupported DAP command: {name}")),
        }
    }

    fn handle_initialize(&mut self, req: &DapRequest, args: InitializeArguments) -> Result<(), Error> {
        if self.state() != SessionState::Uninitialized {
            return self.outbox.respond_err(req, "session is already initialized");
        }
        log::info!(
            target: "dap",
            "initialize session, client: {}, adapter: {}",
            args.client_name.as_deref().unwrap_or("unknown"),
            args.adapter_id.as_deref().unwrap_or("unknown"),
        );

        self.set_state(SessionState::Initialized);
        self.outbox.respond_body(req, Capabilities::default())?;
        self.outbox.send_event("initialized")
    }

    /// Launch and attach are accepted once, after initialization.
    fn can_start(&self) -> bool {
        let state = self.state();
        !self.launched
            && state != SessionState::Uninitialized
            && state != SessionState::Terminated
    }

    fn handle_launch(&mut self, req: &DapRequest, args: LaunchArguments) -> Result<(), Error> {
        if !self.can_start() {
            return self.outbox.respond_err(req, "session is not in initialized state");
        }

        let program = match (args.program, &args.cwd) {
            (Some(program), Some(cwd)) if program.is_relative() => cwd.join(program),
            (Some(program), _) => program,
            (None, Some(cwd)) => cwd.clone(),
            (None, None) => PathBuf::from("."),
        };
        let goal = if args.no_debug {
            goal::load(&program)
        } else {
            goal::debug(&program, &self.options.debug_info_file)
        };

        let started = self
            .terminal
            .create(args.cwd.as_deref())
            .and_then(|_| self.terminal.send_string(&goal));
        if let Err(e) = started {
            return self
                .outbox
                .respond_err(req, format!("failed to start logtalk: {e:#}"));
        }

        log::info!(
            target: "dap",
            "launched {} ({})",
            program.display(),
            if args.no_debug { "no debug" } else { "debug" }
        );
        self.launched = true;
        self.no_debug = args.no_debug;
        self.outbox.respond(req)?;
        self.terminal.show();
        Ok(())
    }

    fn handle_attach(&mut self, req: &DapRequest, args: AttachArguments) -> Result<(), Error> {
        if !self.can_start() {
            return self.outbox.respond_err(req, "session is not in initialized state");
        }
        if let Err(e) = self.terminal.create(args.cwd.as_deref()) {
            return self
                .outbox
                .respond_err(req, format!("failed to start logtalk: {e:#}"));
        }
        self.launched = true;
        self.outbox.respond(req)
    }

    fn handle_configuration_done(&mut self, req: &DapRequest) -> Result<(), Error> {
        match self.state() {
            SessionState::Uninitialized | SessionState::Terminated => {
                return self.outbox.respond_err(req, "session is not in initialized state");
            }
            _ if self.configured => return self.outbox.respond(req),
            _ => {}
        }
        self.configured = true;
        self.outbox.respond(req)?;

        if self.no_debug {
            self.set_state(SessionState::Running);
            return Ok(());
        }
        // there is no stop signal until the first port is hit, an entry stop enables
        // stepping in the editor
        self.set_state(SessionState::Stopped);
        self.outbox.send_event_body("stopped", stopped_body("entry"))
    }

    fn handle_step(&mut self, req: &DapRequest, verb: StepVerb) -> Result<(), Error> {
        if self.state() != SessionState::Stopped {
            return self.outbox.respond_err(req, "debugger is not stopped");
        }

        // subscribe before sending a command, the stop can't be missed
        let subscription = self.stack.subscribe();
        let command = self.translator.translate(verb);
        if let Err(e) = self.terminal.send_string(&command) {
            return self
                .outbox
                .respond_err(req, format!("failed to send debugger command: {e:#}"));
        }

        let reason = match verb {
            StepVerb::Continue => "breakpoint",
            StepVerb::StepOver | StepVerb::StepInto | StepVerb::StepOut => "step",
        };
        let generation = {
            let mut control = self.signal.lock();
            control.generation += 1;
            control.state = SessionState::Running;
            control.pending_reason = Some(reason);
            control.generation
        };

        match verb {
            StepVerb::Continue => self
                .outbox
                .respond_body(req, json!({"allThreadsContinued": true}))?,
            _ => self.outbox.respond(req)?,
        }
        self.schedule_stop(subscription, generation);
        Ok(())
    }

    /// Fire a pending stop on the next stack push or after a stop delay.
    /// Stack clearing or a newer generation cancels it.
    fn schedule_stop(&self, subscription: Subscription, generation: u64) {
        let signal = self.signal.clone();
        let delay = self.options.stop_delay;
        let worker = thread::Builder::new()
            .name("pending stop".to_string())
            .spawn(move || {
                match subscription.recv_timeout(delay) {
                    Ok(StackChange::Pushed(_)) | Err(RecvTimeoutError::Timeout) => {}
                    Ok(StackChange::Cleared) | Err(RecvTimeoutError::Disconnected) => return,
                }
                drop(subscription);
                signal.fire(Some(generation));
            });

        if let Err(e) = worker {
            log::warn!(target: "dap", "spawn pending stop worker: {e:#}");
            self.signal.fire(Some(generation));
        }
    }

    fn handle_disconnect(&mut self, req: &DapRequest, terminate: bool) -> Result<(), Error> {
        if self.terminated {
            return self.outbox.respond(req);
        }

        if terminate && self.terminal.is_running() {
            weak_error!(
                self.terminal.send_string(&goal::nodebug()),
                "send terminate goal:"
            );
        }
        self.teardown();

        self.outbox.respond(req)?;
        self.outbox.send_event("terminated")
    }

    /// Cancel a pending stop, detach from the stack and clear it.
    fn teardown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        {
            let mut control = self.signal.lock();
            control.generation += 1;
            control.pending_reason = None;
            control.state = SessionState::Terminated;
        }
        self.subscription = None;
        self.stack.clear();
        log::info!(target: "dap", "debug session terminated");
    }

    fn handle_threads(&mut self, req: &DapRequest) -> Result<(), Error> {
        let threads = [Thread {
            id: THREAD_ID,
            name: THREAD_NAME.to_string(),
        }];
        self.outbox.respond_body(req, json!({ "threads": threads }))
    }

    fn handle_stack_trace(&mut self, req: &DapRequest, args: StackTraceArguments) -> Result<(), Error> {
        let locations = self.stack.all();
        let frames = if locations.is_empty() {
            vec![StackFrame {
                id: 1,
                name: THREAD_NAME.to_string(),
                source: None,
                line: 0,
                column: 0,
            }]
        } else {
            locations
                .iter()
                .rev()
                .enumerate()
                .map(|(i, location)| stack_frame(i as i64 + 1, location))
                .collect_vec()
        };

        let total = frames.len();
        let levels = args.levels.filter(|&levels| levels > 0).unwrap_or(total);
        let frames = frames
            .into_iter()
            .skip(args.start_frame.unwrap_or_default())
            .take(levels)
            .collect_vec();

        self.outbox.respond_body(
            req,
            json!({"stackFrames": frames, "totalFrames": total}),
        )
    }

    fn handle_scopes(&mut self, req: &DapRequest, args: ScopesArguments) -> Result<(), Error> {
        log::debug!(target: "dap", "scopes for frame {}", args.frame_id);

        let scope = self.stack.top().and_then(|top| {
            let source = muted_error!(fs::read_to_string(top.path()), "read source file:")?;
            let indicator = clause::indicator(&top.head, clause::source_line(&source, top.line as usize));
            Some(Scope {
                name: indicator.to_string(),
                presentation_hint: "arguments",
                variables_reference: SCOPE_REFERENCE,
                expensive: false,
            })
        });
        let scopes = scope.into_iter().collect_vec();

        self.outbox.respond_body(req, json!({ "scopes": scopes }))
    }

    fn handle_variables(&mut self, req: &DapRequest, args: VariablesArguments) -> Result<(), Error> {
        let top = self
            .stack
            .top()
            .filter(|_| args.variables_reference == SCOPE_REFERENCE);

        let variables = match top {
            None => vec![],
            Some(top) => {
                let source = muted_error!(fs::read_to_string(top.path()), "read source file:");
                let head = source
                    .as_deref()
                    .and_then(|source| clause::source_head(source, top.line as usize));
                clause::reconcile(head.as_deref(), &top.head)
                    .into_iter()
                    .map(|binding| Variable {
                        name: binding.name,
                        value: binding.value,
                        variables_reference: 0,
                    })
                    .collect_vec()
            }
        };

        self.outbox
            .respond_body(req, json!({ "variables": variables }))
    }

    fn handle_set_breakpoints(
        &mut self,
        req: &DapRequest,
        args: SetBreakpointsArguments,
    ) -> Result<(), Error> {
        let breakpoints = args
            .breakpoints
            .iter()
            .map(|bp| {
                log::debug!(
                    target: "dap",
                    "breakpoint at {}:{} (condition: {:?}, hit condition: {:?}, log message: {:?})",
                    args.source.path.as_deref().unwrap_or("?"),
                    bp.line,
                    bp.condition,
                    bp.hit_condition,
                    bp.log_message,
                );
                Breakpoint {
                    verified: true,
                    line: Some(bp.line),
                    source: Some(args.source.clone()),
                }
            })
            .collect_vec();

        self.outbox
            .respond_body(req, json!({ "breakpoints": breakpoints }))
    }

    fn handle_set_function_breakpoints(
        &mut self,
        req: &DapRequest,
        args: SetFunctionBreakpointsArguments,
    ) -> Result<(), Error> {
        let breakpoints = args
            .breakpoints
            .iter()
            .map(|bp| {
                log::debug!(
                    target: "dap",
                    "function breakpoint at {} (condition: {:?}, hit condition: {:?})",
                    bp.name,
                    bp.condition,
                    bp.hit_condition,
                );
                Breakpoint {
                    verified: true,
                    line: None,
                    source: None,
                }
            })
            .collect_vec();

        self.outbox
            .respond_body(req, json!({ "breakpoints": breakpoints }))
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        self.teardown();
        self.outbox.close();
    }
}

fn stack_frame(id: i64, location: &DebugLocation) -> StackFrame {
    let path = location.file.to_string_lossy().to_string();
    StackFrame {
        id,
        name: location.head.clone(),
        source: Some(Source {
            name: location
                .file
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            path: Some(path),
        }),
        line: location.line as i64,
        column: 1,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    fn signal() -> (StopSignal, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel();
        let signal = StopSignal {
            control: Arc::new(Mutex::new(Control {
                state: SessionState::Running,
                generation: 1,
                pending_reason: Some("breakpoint"),
            })),
            outbox: Outbox::new(tx),
        };
        (signal, rx)
    }

    #[test]
    fn test_stale_pending_stop_is_ignored() {
        let (signal, rx) = signal();
        signal.fire(Some(0));
        assert!(rx.try_recv().is_err());
        assert_eq!(signal.lock().state, SessionState::Running);

        signal.fire(Some(1));
        let event = rx.try_recv().unwrap();
        assert_eq!(event["event"], json!("stopped"));
        assert_eq!(event["body"]["reason"], json!("breakpoint"));
        assert_eq!(signal.lock().state, SessionState::Stopped);

        // already stopped
        signal.fire(None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_fires_once() {
        let (signal, rx) = signal();
        signal.fire(None);
        signal.fire(Some(1));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_stack_frame() {
        let frame = stack_frame(2, &DebugLocation::new("/p/f.lgt", 10, "bar(1)"));
        assert_eq!(
            serde_json::to_value(frame).unwrap(),
            json!({
                "id": 2,
                "name": "bar(1)",
                "source": {"name": "f.lgt", "path": "/p/f.lgt"},
                "line": 10,
                "column": 1
            })
        );
    }
}
