//! lgt-dap - Debug Adapter Protocol (DAP) adapter for the Logtalk terminal debugger.
//!
//! Serves DAP over stdio (default, the editor spawns the adapter) or over TCP (`--listen`),
//! one debug session per client.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use logtalk_dap::config::{Backend, Settings};
use logtalk_dap::dap::logger::DapLogger;
use logtalk_dap::dap::outbox::Outbox;
use logtalk_dap::dap::protocol::OutputEventBody;
use logtalk_dap::dap::session::{DebugSession, SessionOptions};
use logtalk_dap::dap::tracer::FileTracer;
use logtalk_dap::dap::transport::{self, DapReader, MessageSink};
use logtalk_dap::log::LOGGER_SWITCHER;
use logtalk_dap::port::{LineTerminator, PortCommandTranslator};
use logtalk_dap::state::DebugStateStack;
use logtalk_dap::terminal::{OutputHandler, ProcessTerminal};
use logtalk_dap::{watcher, weak_error};
use std::io::BufRead;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (for example 127.0.0.1:4711), DAP is served over stdio if omitted
    #[clap(long)]
    listen: Option<String>,

    /// Exit after the first debug session ends (single-client mode).
    #[clap(long)]
    oneshot: bool,

    /// Optional log file for adapter diagnostics (no output to stdout).
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    trace_dap: bool,

    /// Configuration file (default: ~/.config/logtalk-dap/config.toml)
    #[clap(short, long, env = "LOGTALK_DAP_CONFIG")]
    config: Option<PathBuf>,

    /// Logtalk backend (swi, gnu, eclipse, ...), overrides configuration file
    #[clap(short, long)]
    backend: Option<Backend>,
}

/// Process wide state shared by all debug sessions.
struct Adapter {
    settings: Settings,
    executable: PathBuf,
    stack: Arc<DebugStateStack>,
    terminator: LineTerminator,
}

impl Adapter {
    fn serve<R: BufRead>(
        &self,
        mut reader: DapReader<R>,
        writer: impl MessageSink + 'static,
        log_to_client: bool,
    ) -> Result<(), logtalk_dap::Error> {
        let outbox = Outbox::new(writer);
        if log_to_client {
            let logger = DapLogger::new(outbox.clone());
            let filter = logger.filter();
            LOGGER_SWITCHER.switch(logger, filter);
        }

        let output: OutputHandler = {
            let outbox = outbox.clone();
            Arc::new(move |category, output| {
                _ = outbox.send_event_body("output", OutputEventBody { category, output });
            })
        };
        let terminal = ProcessTerminal::new(
            self.executable.clone(),
            self.settings.logtalk_args.clone(),
        )
        .with_output(output);

        let session = DebugSession::new(
            outbox,
            self.stack.clone(),
            PortCommandTranslator::new(self.terminator.clone()),
            Box::new(terminal),
            SessionOptions::from(&self.settings),
        );
        session.run(&mut reader)
    }
}

fn main() -> anyhow::Result<()> {
    let logger = env_logger::Logger::from_default_env();
    let filter = logger.filter();
    LOGGER_SWITCHER.switch(logger, filter);

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("load configuration")?;
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if settings.debug_info_file.is_relative() {
        settings.debug_info_file = std::env::current_dir()
            .context("current directory")?
            .join(&settings.debug_info_file);
    }

    let executable = match settings.resolve_executable() {
        Ok(path) => path,
        Err(err) => {
            let script = settings.backend.script();
            warn!(target: "dap", "{err:#}, fallback to `{script}`");
            PathBuf::from(script)
        }
    };
    info!(
        target: "dap",
        "backend: {}, executable: {}",
        settings.backend,
        executable.display()
    );

    let stack = DebugStateStack::new();
    let terminator = LineTerminator::from_settings(&settings);

    let _debug_info_watcher = watcher::watch_debug_info(
        &settings.debug_info_file,
        settings.poll_interval,
        stack.clone(),
    )
    .context("watch debug info file")?;
    // backend given in command line wins over the configuration file
    let _settings_watcher = match (&args.backend, args.config.clone().or_else(Settings::default_path)) {
        (None, Some(path)) => weak_error!(
            watcher::watch_settings(path, settings.poll_interval, terminator.clone()),
            "watch configuration file:"
        ),
        _ => None,
    };

    let tracer = match &args.log_file {
        Some(path) => Some(FileTracer::new(path).context("open log file")?),
        None => None,
    };
    if args.trace_dap && tracer.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }
    let dap_tracer = tracer.clone().filter(|_| args.trace_dap);

    let adapter = Adapter {
        settings,
        executable,
        stack,
        terminator,
    };

    let Some(listen) = &args.listen else {
        let (reader, writer) = transport::stdio(dap_tracer);
        return adapter
            .serve(reader, writer, true)
            .context("debug session");
    };

    let addr: SocketAddr = listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(target: "dap", "lgt-dap listening on {addr}");

    // Server mode: accept multiple clients sequentially. One client == one debug session.
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "dap", "accept failed: {err:#}");
                continue;
            }
        };
        info!(target: "dap", "DAP client connected: {peer}");
        if let Some(t) = &tracer {
            t.line(&format!("client connected: {peer}"));
        }

        let (reader, writer) = match transport::tcp(stream, dap_tracer.clone()) {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "dap", "failed to init DAP I/O: {err:#}");
                continue;
            }
        };

        if let Err(err) = adapter.serve(reader, writer, false) {
            warn!(target: "dap", "session ended with error: {err:#}");
            if let Some(t) = &tracer {
                t.line(&format!("session error: {err:#}"));
            }
        } else if let Some(t) = &tracer {
            t.line("session finished OK");
        }

        if args.oneshot {
            break;
        }
    }
    Ok(())
}
