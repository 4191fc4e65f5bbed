//! External worker processes.
//!
//! A [`WorkerHandle`] is the only thing a session keeps for a running worker:
//! a one-shot termination signal and a watch on the exit notification. The
//! process itself is owned by a supervisor task spawned by [`ProcessLauncher`].

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRole {
    /// Produces the locally served playback format.
    LocalFormat,
    /// Relays the stream to one broadcast destination.
    Restream { name: String },
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::LocalFormat => write!(f, "hls"),
            WorkerRole::Restream { name } => write!(f, "restream {name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub session_id: String,
    pub role: WorkerRole,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerSpec {
    fn tag(&self) -> String {
        format!("[{} {}]", self.session_id, self.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub pid: Option<u32>,
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

#[derive(Debug)]
pub struct WorkerHandle {
    role: WorkerRole,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    exit: Option<watch::Receiver<Option<WorkerExit>>>,
}

impl WorkerHandle {
    pub fn new(
        role: WorkerRole,
        pid: Option<u32>,
        kill: oneshot::Sender<()>,
        exit: watch::Receiver<Option<WorkerExit>>,
    ) -> Self {
        WorkerHandle {
            role,
            pid,
            kill: Some(kill),
            exit: Some(exit),
        }
    }

    /// A slot whose process never started. Terminating it does nothing.
    pub fn inert(role: WorkerRole) -> Self {
        WorkerHandle {
            role,
            pid: None,
            kill: None,
            exit: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Signals the supervisor to kill the process and returns immediately.
    ///
    /// Returns `true` if a signal was issued by this call. Later calls, and
    /// calls on a worker that already exited, are no-ops.
    pub fn terminate(&mut self) -> bool {
        let Some(kill) = self.kill.take() else {
            return false;
        };
        if kill.send(()).is_err() {
            debug!("{} worker (pid {:?}) already exited", self.role, self.pid);
        }
        true
    }

    /// Waits for the exit notification. `None` for an inert slot.
    pub async fn exited(&mut self) -> Option<WorkerExit> {
        let exit = self.exit.as_mut()?;
        let notice = exit.wait_for(|notice| notice.is_some()).await.ok()?;
        *notice
    }
}

/// Starts worker processes. Swappable so that supervision policy stays out of
/// the orchestrator.
pub trait Launcher: Send + Sync + 'static {
    /// Must not wait for the process to finish.
    fn launch(&self, spec: WorkerSpec) -> Result<WorkerHandle>;
}

impl<L: Launcher + ?Sized> Launcher for Arc<L> {
    fn launch(&self, spec: WorkerSpec) -> Result<WorkerHandle> {
        (**self).launch(spec)
    }
}

/// Spawns real operating-system processes on the tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: WorkerSpec) -> Result<WorkerHandle> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                role: spec.role.to_string(),
                source,
            })?;

        let pid = child.id();
        let tag = spec.tag();
        info!("{tag} spawned {} (pid {pid:?})", spec.program.display());

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(tag.clone(), stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(tag, spec.role.clone(), child, kill_rx, exit_tx));

        Ok(WorkerHandle::new(spec.role, pid, kill_tx, exit_rx))
    }
}

/// Longest stderr record forwarded as one log line; longer output is split.
const MAX_STDERR_RECORD: usize = 4096;

/// Splits worker stderr into records ended by `\n` or `\r`. ffmpeg ends its
/// progress reports with a bare `\r`.
#[derive(Debug, Clone)]
pub struct StderrCodec {
    max_length: usize,
}

impl StderrCodec {
    pub fn new(max_length: usize) -> Self {
        StderrCodec {
            max_length: max_length.max(1),
        }
    }
}

impl Decoder for StderrCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<String>> {
        loop {
            let end = buf
                .iter()
                .take(self.max_length)
                .position(|b| *b == b'\n' || *b == b'\r');
            match end {
                Some(end) => {
                    let record = buf.split_to(end + 1);
                    // skips the empty record between "\r\n"
                    if end > 0 {
                        return Ok(Some(String::from_utf8_lossy(&record[..end]).into_owned()));
                    }
                }
                None if buf.len() >= self.max_length => {
                    let record = buf.split_to(self.max_length);
                    return Ok(Some(String::from_utf8_lossy(&record).into_owned()));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<String>> {
        if let Some(record) = self.decode(buf)? {
            return Ok(Some(record));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let record = buf.split_to(buf.len());
        Ok(Some(String::from_utf8_lossy(&record).into_owned()))
    }
}

fn stderr_records<R: AsyncRead>(stderr: R) -> FramedRead<R, StderrCodec> {
    FramedRead::new(stderr, StderrCodec::new(MAX_STDERR_RECORD))
}

async fn forward_stderr<R: AsyncRead + Unpin>(tag: String, stderr: R) {
    let mut records = stderr_records(stderr);
    while let Some(record) = records.next().await {
        match record {
            Ok(line) => info!(target: "ffmpeg", "{tag} {line}"),
            Err(e) => {
                debug!("{tag} stderr closed: {e}");
                break;
            }
        }
    }
}

async fn supervise(
    tag: String,
    role: WorkerRole,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exit: watch::Sender<Option<WorkerExit>>,
) {
    let pid = child.id();

    let terminated = tokio::select! {
        status = child.wait() => {
            let notice = exit_notice(pid, status);
            info!("{tag} exited with code {:?}", notice.code);
            exit.send_replace(Some(notice));
            return;
        }
        signal = kill => signal.is_ok(),
    };

    if terminated {
        if let Err(source) = child.start_kill() {
            warn!("{tag} {}", Error::Termination { role: role.to_string(), pid, source });
        }
    }

    // Nothing acts on an exit after termination; it is only recorded.
    let notice = exit_notice(pid, child.wait().await);
    debug!("{tag} exited after termination with code {:?}", notice.code);
    exit.send_replace(Some(notice));
}

fn exit_notice(pid: Option<u32>, status: std::io::Result<ExitStatus>) -> WorkerExit {
    WorkerExit {
        pid,
        code: status.ok().and_then(|status| status.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> WorkerSpec {
        WorkerSpec {
            session_id: "test".to_string(),
            role: WorkerRole::LocalFormat,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn role_tags() {
        assert_eq!(WorkerRole::LocalFormat.to_string(), "hls");
        let role = WorkerRole::Restream { name: "YouTube".to_string() };
        assert_eq!(role.to_string(), "restream YouTube");
    }

    #[test]
    fn inert_handle_ignores_terminate() {
        let mut handle = WorkerHandle::inert(WorkerRole::LocalFormat);
        assert!(!handle.terminate());
        assert!(!handle.terminate());
    }

    fn decode_all(input: &[u8], max_length: usize) -> Vec<String> {
        let mut codec = StderrCodec::new(max_length);
        let mut buf = BytesMut::from(input);
        let mut records = Vec::new();
        while let Some(record) = codec.decode_eof(&mut buf).unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn splits_progress_reports_on_carriage_return() {
        let records = decode_all(
            b"Input #0, flv\nframe=1 fps=30\rframe=2 fps=30\r\nbye",
            MAX_STDERR_RECORD,
        );
        assert_eq!(records, ["Input #0, flv", "frame=1 fps=30", "frame=2 fps=30", "bye"]);
    }

    #[test]
    fn bounds_record_length() {
        let mut codec = StderrCodec::new(4);
        let mut buf = BytesMut::from(&b"abcdefghij"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("abcd"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("efgh"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn waits_for_record_end() {
        let mut codec = StderrCodec::new(MAX_STDERR_RECORD);
        let mut buf = BytesMut::from(&b"frame=1"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" fps=30\r");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("frame=1 fps=30"));
    }

    #[tokio::test]
    async fn progress_records_arrive_while_worker_runs() {
        let mut child = Command::new("sh")
            .args([
                "-c",
                "for i in 1 2 3; do printf 'frame=%s fps=30\\r' $i >&2; done; sleep 30",
            ])
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut records = stderr_records(child.stderr.take().unwrap());

        for i in 1..=3 {
            let record = tokio::time::timeout(std::time::Duration::from_secs(5), records.next())
                .await
                .expect("record not forwarded while worker runs")
                .unwrap()
                .unwrap();
            assert_eq!(record, format!("frame={i} fps=30"));
        }
        assert!(child.try_wait().unwrap().is_none());
        child.start_kill().unwrap();
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_failure() {
        let result = ProcessLauncher.launch(spec("/nonexistent/worker-binary", &[]));
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[tokio::test]
    async fn reports_natural_exit() {
        let mut handle = ProcessLauncher
            .launch(spec("sh", &["-c", "echo starting >&2; exit 3"]))
            .unwrap();
        let exit = handle.exited().await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.pid, handle.pid());

        // Already exited: still a harmless no-op.
        handle.terminate();
    }

    #[tokio::test]
    async fn terminate_kills_and_is_idempotent() {
        let mut handle = ProcessLauncher.launch(spec("sleep", &["30"])).unwrap();
        assert!(handle.terminate());
        assert!(!handle.terminate());

        let exit = tokio::time::timeout(std::time::Duration::from_secs(10), handle.exited())
            .await
            .expect("worker was not killed")
            .unwrap();
        assert_eq!(exit.code, None);
    }
}
