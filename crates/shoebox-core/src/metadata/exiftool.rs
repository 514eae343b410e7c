use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ExtractError, Metadata, MetadataExtractor, KEY_ERROR};
use crate::media::MediaClass;

const READY_TOKEN: &str = "{ready}";
const OPEN_ARGS: &[&str] = &["-stay_open", "True", "-@", "-"];
const EXTRACT_ARGS: &[&str] = &["-json", "-api", "largefilesupport=1"];

struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One long-lived `exiftool -stay_open` process shared by all requests.
///
/// The process is started on first use and restarted after a protocol error.
pub struct Exiftool {
    program: PathBuf,
    worker: Mutex<Option<Worker>>,
}

impl Exiftool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            worker: Mutex::new(None),
        }
    }

    /// Whether `program -ver` runs successfully.
    pub fn is_available(program: &Path) -> bool {
        Command::new(program)
            .arg("-ver")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn spawn(&self) -> Result<Worker, ExtractError> {
        debug!(program = %self.program.display(), "starting exiftool worker");
        let mut child = Command::new(&self.program)
            .args(OPEN_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        let stdin = child.stdin.take().ok_or(ExtractError::Empty)?;
        let stdout = child.stdout.take().ok_or(ExtractError::Empty)?;
        Ok(Worker {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn request(worker: &mut Worker, path: &str) -> Result<String, ExtractError> {
        for arg in EXTRACT_ARGS {
            writeln!(worker.stdin, "{arg}")?;
        }
        writeln!(worker.stdin, "{path}")?;
        writeln!(worker.stdin, "-execute")?;
        worker.stdin.flush()?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if worker.stdout.read_line(&mut line)? == 0 {
                return Err(ExtractError::Empty);
            }
            if line.trim_end() == READY_TOKEN {
                return Ok(output);
            }
            output.push_str(&line);
        }
    }
}

impl MetadataExtractor for Exiftool {
    fn extract(&self, path: &Path, _class: MediaClass) -> Result<Metadata, ExtractError> {
        let arg = path
            .to_str()
            .filter(|s| !s.contains('\n'))
            .ok_or_else(|| ExtractError::UnsupportedPath(path.to_path_buf()))?;

        let mut guard = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(worker) = guard.as_mut() else {
            return Err(ExtractError::Empty);
        };

        let output = match Self::request(worker, arg) {
            Ok(output) => output,
            Err(err) => {
                // The stream is out of sync; drop the worker so the next call respawns.
                if let Some(mut dead) = guard.take() {
                    let _ = dead.child.kill();
                    let _ = dead.child.wait();
                }
                return Err(err);
            }
        };
        drop(guard);

        parse_output(&output)
    }
}

/// Parse `exiftool -json` output for a single file.
pub(crate) fn parse_output(output: &str) -> Result<Metadata, ExtractError> {
    if output.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    let records: Vec<Value> = serde_json::from_str(output)?;
    let object = records
        .first()
        .and_then(Value::as_object)
        .ok_or(ExtractError::Empty)?;
    let metadata = Metadata::from_json_object(object);
    if let Some(reported) = metadata.get(KEY_ERROR) {
        return Err(ExtractError::Reported(reported.to_string()));
    }
    Ok(metadata)
}

impl Drop for Exiftool {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(mut worker) = worker.take() {
            let closed = writeln!(worker.stdin, "-stay_open\nFalse")
                .and_then(|_| worker.stdin.flush());
            if let Err(err) = closed {
                warn!("cannot stop exiftool cleanly: {err}");
                let _ = worker.child.kill();
            }
            let _ = worker.child.wait();
        }
    }
}
