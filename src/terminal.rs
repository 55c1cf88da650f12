//! Logtalk terminal: a process running the Logtalk REPL with the debugger inside.
//!
//! The terminal is write-only, the only feedback from the debugger is the side-channel file
//! (see [`crate::state`]) and the process output forwarded to the editor.

use crate::error::Error;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;

/// Text sink for the terminal process output, receives an output category
/// (`stdout` or `stderr`) and a line of text.
pub type OutputHandler = Arc<dyn Fn(&'static str, String) + Send + Sync>;

/// Interface of the Logtalk terminal.
pub trait Terminal: Send {
    /// Create the terminal (start the Logtalk process) if it is not running yet.
    fn create(&mut self, cwd: Option<&Path>) -> Result<(), Error>;

    /// Return true if terminal is already created.
    fn is_running(&mut self) -> bool;

    /// Send raw text into the terminal.
    fn send_string(&mut self, text: &str) -> Result<(), Error>;

    /// Bring the terminal to the user attention.
    fn show(&mut self) {}
}

/// Terminal implemented as a child process with piped standard streams.
pub struct ProcessTerminal {
    executable: PathBuf,
    args: Vec<String>,
    output: Option<OutputHandler>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl ProcessTerminal {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            output: None,
            child: None,
            stdin: None,
        }
    }

    /// Forward process output into a handler.
    pub fn with_output(mut self, output: OutputHandler) -> Self {
        self.output = Some(output);
        self
    }

    fn forward(reader: impl Read + Send + 'static, category: &'static str, output: OutputHandler) {
        thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = String::new();
            loop {
                buf.clear();
                match reader.read_line(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => output(category, buf.clone()),
                }
            }
        });
    }
}

impl Terminal for ProcessTerminal {
    fn create(&mut self, cwd: Option<&Path>) -> Result<(), Error> {
        if self.is_running() {
            return Ok(());
        }

        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args).stdin(Stdio::piped());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        match self.output {
            Some(_) => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
            None => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
        };

        let mut child = cmd.spawn()?;
        log::info!(
            target: "dap",
            "logtalk terminal started: {} (pid {})",
            self.executable.display(),
            child.id()
        );

        if let Some(output) = &self.output {
            if let Some(stdout) = child.stdout.take() {
                Self::forward(stdout, "stdout", output.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                Self::forward(stderr, "stderr", output.clone());
            }
        }

        self.stdin = child.stdin.take();
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                log::info!(target: "dap", "logtalk terminal exited: {status}");
                self.child = None;
                self.stdin = None;
                false
            }
            Some(Err(_)) | None => false,
        }
    }

    fn send_string(&mut self, text: &str) -> Result<(), Error> {
        let stdin = self.stdin.as_mut().ok_or(Error::TerminalNotRunning)?;
        log::debug!(target: "dap", "-> terminal {text:?}");
        stdin.write_all(text.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    fn show(&mut self) {
        log::debug!(target: "dap", "logtalk terminal focused");
    }
}

impl Drop for ProcessTerminal {
    fn drop(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            _ = child.kill();
            _ = child.wait();
        }
    }
}

/// Goals sent into the Logtalk top-level.
pub mod goal {
    use std::path::Path;

    /// Quote a path as a Prolog atom.
    pub fn quoted_path(path: &Path) -> String {
        let path = path.to_string_lossy().replace('\\', "/").replace('\'', "\\'");
        format!("'{path}'")
    }

    /// Load the target, recompile it in debug mode and start the debug bridge predicate
    /// that writes the side-channel file.
    pub fn debug(program: &Path, debug_info: &Path) -> String {
        format!(
            "logtalk_load({}), logtalk_make(debug), vscode::debug({}).\n",
            quoted_path(program),
            quoted_path(debug_info)
        )
    }

    /// Stop the debug bridge predicate and recompile the target in normal mode.
    pub fn nodebug() -> String {
        "vscode::nodebug, logtalk_make(normal).\n".to_string()
    }

    /// Load the target without debugging.
    pub fn load(program: &Path) -> String {
        format!("logtalk_load({}).\n", quoted_path(program))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn test_goals() {
        assert_eq!(
            goal::debug(Path::new("/w/loader.lgt"), Path::new("/w/.debug_info")),
            "logtalk_load('/w/loader.lgt'), logtalk_make(debug), vscode::debug('/w/.debug_info').\n"
        );
        assert_eq!(goal::nodebug(), "vscode::nodebug, logtalk_make(normal).\n");
        assert_eq!(
            goal::load(Path::new("C:\\it's\\loader.lgt")),
            "logtalk_load('C:/it\\'s/loader.lgt').\n"
        );
    }

    #[test]
    fn test_not_running_terminal() {
        let mut term = ProcessTerminal::new("cat", vec![]);
        assert!(!term.is_running());
        assert!(matches!(
            term.send_string("l"),
            Err(Error::TerminalNotRunning)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_terminal_echo() {
        let lines = Arc::new(Mutex::new(Vec::<(&'static str, String)>::new()));
        let output: OutputHandler = {
            let lines = lines.clone();
            Arc::new(move |category, line| lines.lock().unwrap().push((category, line)))
        };

        let mut term = ProcessTerminal::new("cat", vec![]).with_output(output);
        term.create(None).unwrap();
        assert!(term.is_running());
        // second create is a noop
        term.create(None).unwrap();
        term.send_string("hello\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while lines.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            lines.lock().unwrap().first(),
            Some(&("stdout", "hello\n".to_string()))
        );
    }
}
