//! Append-only journal of completed transfers, one JSON record per line.
//!
//! The log is the only resume state. Readers look at the tail only: the file is
//! scanned backward in fixed-size chunks until the first parsable line.

use crate::error::ProgressLogError;
use crate::types::ProgressRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

const CHUNK: usize = 8 * 1024;

fn read_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProgressLogError + '_ {
    move |source| ProgressLogError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProgressLogError + '_ {
    move |source| ProgressLogError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Tạo file rỗng (và thư mục cha) nếu chưa có. Idempotent.
pub fn ensure_exists(path: &Path) -> Result<(), ProgressLogError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err(path))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err(path))?;
    Ok(())
}

/// Most recent record, or `None` for an empty log.
///
/// Blank lines and unparsable lines (a torn final write, say) are skipped
/// from the end inward.
pub fn last_record(path: &Path) -> Result<Option<ProgressRecord>, ProgressLogError> {
    let file = File::open(path).map_err(read_err(path))?;
    let mut lines = ReverseLines::new(file).map_err(read_err(path))?;

    while let Some(line) = lines.next_line().map_err(read_err(path))? {
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<ProgressRecord>(text) {
            Ok(rec) => return Ok(Some(rec)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skip unreadable progress line");
            }
        }
    }

    Ok(None)
}

/// Append one record as a single line.
///
/// The whole line goes out in one `write_all` on an `O_APPEND` handle and is
/// synced before returning. If the previous writer died mid-line, a line
/// terminator is inserted first so the new record stays on its own line.
pub fn append(path: &Path, record: &ProgressRecord) -> Result<(), ProgressLogError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut f = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(write_err(path))?;

    if ends_without_newline(&mut f).map_err(write_err(path))? {
        debug!(path = %path.display(), "progress log has a torn tail, starting a new line");
        line.insert(0, b'\n');
    }

    f.write_all(&line).map_err(write_err(path))?;
    f.sync_data().map_err(write_err(path))?;
    Ok(())
}

/// Every readable record, oldest first. Used for reporting only.
pub fn records(path: &Path) -> Result<Vec<ProgressRecord>, ProgressLogError> {
    let f = File::open(path).map_err(read_err(path))?;
    let mut out = Vec::new();

    // split theo byte: một dòng bị cắt giữa ký tự UTF-8 không làm hỏng cả file
    for line in BufReader::new(f).split(b'\n') {
        let line = line.map_err(read_err(path))?;
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str(text) {
            Ok(rec) => out.push(rec),
            Err(e) => warn!(path = %path.display(), error = %e, "skip unreadable progress line"),
        }
    }

    Ok(out)
}

fn ends_without_newline(f: &mut File) -> std::io::Result<bool> {
    let len = f.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Yields lines from the end of a reader towards the start.
///
/// `pending` holds bytes (in file order) read but not yet split off; `pos` is
/// how many bytes from the start are still unread.
struct ReverseLines<R> {
    inner: R,
    pos: u64,
    pending: Vec<u8>,
    done: bool,
}

impl<R: Read + Seek> ReverseLines<R> {
    fn new(mut inner: R) -> std::io::Result<Self> {
        let pos = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            pos,
            pending: Vec::new(),
            done: false,
        })
    }

    fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if let Some(i) = self.pending.iter().rposition(|b| *b == b'\n') {
                let line = self.pending.split_off(i + 1);
                self.pending.truncate(i);
                return Ok(Some(line));
            }

            if self.pos == 0 {
                self.done = true;
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let n = (self.pos as usize).min(CHUNK);
            self.pos -= n as u64;
            self.inner.seek(SeekFrom::Start(self.pos))?;

            let mut chunk = vec![0u8; n];
            self.inner.read_exact(&mut chunk)?;
            chunk.extend_from_slice(&self.pending);
            self.pending = chunk;
        }
    }
}
