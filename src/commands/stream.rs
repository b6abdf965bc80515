//! `drift stream`: live change capture written as JSON lines.

use crate::{JsonLinesSink, SourceAdapter, SourceOpts};
use anyhow::Context;
use drift_capture::{CaptureSession, SessionState};
use drift_source::Connection;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StreamArgs {
    pub source: SourceOpts,
    /// JSON lines output file (stdout when omitted)
    pub out: Option<PathBuf>,
    /// Stop after this long
    pub timeout: Option<Duration>,
    /// Overrides `session.window` from the config file
    pub window: Option<usize>,
}

pub async fn run(args: StreamArgs) -> anyhow::Result<()> {
    let config = args.source.load_config()?;
    let connection = Connection::parse(&args.source.connection)?;
    let adapter = SourceAdapter::for_connection(&connection, &config);
    let source = adapter.stream_source(&connection)?;

    let mut session_config = config.session.clone();
    if let Some(window) = args.window {
        anyhow::ensure!(window > 0, "--window must be at least 1");
        session_config.window = window;
    }

    let writer: Box<dyn Write + Send> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let mut session = CaptureSession::new(source, connection, session_config);
    session.start(JsonLinesSink::new(writer)).await?;
    if session.state() == SessionState::Stopped {
        info!("Stopped before capture began");
        return Ok(());
    }
    info!("Streaming changes, press Ctrl-C to stop");

    let mut states = session.subscribe();
    let timeout = async {
        match args.timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, draining"),
        _ = timeout => info!("Timeout reached, draining"),
        _ = states.wait_for(|s| *s == SessionState::Stopped) => {}
    }

    let report = session.stop().await?;
    info!("Forwarded {} deltas", report.forwarded);
    Ok(())
}
