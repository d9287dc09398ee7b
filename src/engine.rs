//! Streaming import engine: drives one handler over one file, reports
//! progress, tolerates bad rows, and persists what parsed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, trace, warn};

use crate::handler::FormatHandler;
use crate::models::{ImportResult, Transaction};
use crate::store::PersistenceGateway;

/// Used when the line source cannot be pre-counted.
const FALLBACK_LINE_ESTIMATE: usize = 100;
const PARSE_PROGRESS_EVERY: usize = 10;
const SAVE_PROGRESS_EVERY: usize = 5;

const PARSE_START: u32 = 10;
const PARSE_SPAN: u32 = 60;
const SAVE_START: u32 = 70;
const SAVE_SPAN: u32 = 25;
const FINISHING: u32 = 95;

/// Out-of-band progress notifications. `on_progress` mirrors every
/// `Progress` event; `on_scan` reports spreadsheet row scanning, which has
/// its own scale and never reaches the event stream.
pub trait ProgressCallback: Send {
    fn on_progress(&mut self, current: u32, total: u32, message: &str);

    fn on_scan(&mut self, _rows_read: usize, _total_rows: usize) {}
}

impl<F> ProgressCallback for F
where
    F: FnMut(u32, u32, &str) + Send,
{
    fn on_progress(&mut self, current: u32, total: u32, message: &str) {
        self(current, total, message)
    }
}

pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&mut self, _current: u32, _total: u32, _message: &str) {}
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Delivers events to the consumer and the callback, keeping `current`
/// non-decreasing and nothing after the terminal event.
struct Emitter<'a> {
    sink: &'a mut dyn FnMut(ImportResult) -> bool,
    progress: &'a mut dyn ProgressCallback,
    cancel: &'a CancelToken,
    last: u32,
    detached: bool,
    finished: bool,
}

impl Emitter<'_> {
    fn progress(&mut self, current: u32, message: &str) {
        if self.detached || self.finished {
            return;
        }
        let current = current.max(self.last);
        self.last = current;
        self.progress.on_progress(current, 100, message);
        self.deliver(ImportResult::progress(current, 100, message));
    }

    fn finish(&mut self, result: ImportResult) {
        if self.detached || self.finished {
            return;
        }
        self.finished = true;
        self.deliver(result);
    }

    fn deliver(&mut self, event: ImportResult) {
        if !(self.sink)(event) {
            debug!("event consumer went away");
            self.detached = true;
        }
    }

    fn should_stop(&self) -> bool {
        self.detached || self.cancel.is_cancelled()
    }
}

/// One configured import: a handler and the store it saves into.
#[derive(Clone)]
pub struct Importer {
    handler: Arc<dyn FormatHandler>,
    store: Arc<dyn PersistenceGateway>,
}

impl Importer {
    pub fn new(handler: Arc<dyn FormatHandler>, store: Arc<dyn PersistenceGateway>) -> Self {
        Self { handler, store }
    }

    pub fn handler(&self) -> &dyn FormatHandler {
        self.handler.as_ref()
    }

    /// Runs the import on a worker thread and returns its event stream.
    /// Dropping the stream cancels the run.
    pub fn import(
        &self,
        path: impl Into<PathBuf>,
        progress: impl ProgressCallback + 'static,
    ) -> ImportStream {
        let path = path.into();
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let worker = self.clone();
        let token = cancel.clone();
        let mut progress = progress;
        let spawned = thread::Builder::new()
            .name("finimport-import".to_string())
            .spawn(move || {
                let mut send = |event: ImportResult| tx.send(event).is_ok();
                worker.run(&path, &mut progress, &token, &mut send);
            });
        if let Err(e) = spawned {
            error!(error = %e, "cannot start import worker");
            let (tx, rx) = mpsc::channel();
            let _ = tx.send(ImportResult::error(format!("cannot start import worker: {e}")));
            return ImportStream::new(rx, cancel);
        }
        ImportStream::new(rx, cancel)
    }

    /// Runs the import on the calling thread. `sink` receives every event
    /// in order and returns `false` once nobody is listening.
    pub fn run(
        &self,
        path: &Path,
        progress: &mut dyn ProgressCallback,
        cancel: &CancelToken,
        sink: &mut dyn FnMut(ImportResult) -> bool,
    ) {
        let mut out = Emitter {
            sink,
            progress,
            cancel,
            last: 0,
            detached: false,
            finished: false,
        };
        self.run_inner(path, &mut out);
        if !out.finished && !out.detached {
            // Cancelled before any record was saved.
            out.finish(ImportResult::error("import cancelled, 0 records saved"));
        }
    }

    fn run_inner(&self, path: &Path, out: &mut Emitter<'_>) {
        let bank = self.handler.bank_name();
        let file = path.display().to_string();
        info!(bank, file = %file, "import started");

        let mut source = match self.handler.open_source(path, &mut *out.progress) {
            Ok(source) => source,
            Err(e) => {
                error!(bank, file = %file, error = %e, "cannot open file");
                out.finish(ImportResult::error_with_cause(format!("cannot open {file}"), e));
                return;
            }
        };

        out.progress(0, "starting");
        out.progress(5, "checking file format");
        if !self.handler.is_valid_format(&mut source) {
            warn!(bank, file = %file, "format check failed");
            out.finish(ImportResult::error(format!("file does not match format for {bank}")));
            return;
        }
        if let Err(e) = self.handler.skip_headers(&mut source) {
            out.finish(ImportResult::error_with_cause("cannot read headers", e));
            return;
        }
        out.progress(PARSE_START, "reading transactions");

        let estimate = source
            .estimated_lines()
            .filter(|n| *n > 0)
            .unwrap_or(FALLBACK_LINE_ESTIMATE);
        let mut accepted: Vec<Transaction> = Vec::new();
        let mut skipped = 0usize;
        let mut line_no = 0usize;

        loop {
            if out.should_stop() {
                info!(bank, line = line_no, "import cancelled while parsing");
                return;
            }
            let line = match source.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!(bank, line = line_no + 1, error = %e, "read failed");
                    out.finish(ImportResult::error_with_cause(format!("cannot read {file}"), e.into()));
                    return;
                }
            };
            line_no += 1;
            if line_no % PARSE_PROGRESS_EVERY == 0 {
                let step = ((line_no * PARSE_SPAN as usize) / estimate).min(PARSE_SPAN as usize) as u32;
                out.progress(PARSE_START + step, &format!("processed {line_no} lines"));
            }

            if self.handler.should_skip_line(&line) {
                debug!(bank, line = line_no, "blank line");
                continue;
            }
            match self.handler.parse_line(&line) {
                Ok(Some(record)) => {
                    trace!(bank, line = line_no, title = %record.title, amount = %record.amount, "accepted");
                    accepted.push(record);
                }
                Ok(None) => {
                    debug!(bank, line = line_no, "not a transaction");
                    skipped += 1;
                }
                Err(e) => {
                    warn!(bank, line = line_no, error = %e, "line skipped");
                    skipped += 1;
                }
            }
        }
        drop(source);

        info!(bank, imported = accepted.len(), skipped, "parsing finished");
        out.progress(SAVE_START, &format!("parsed {} transactions", accepted.len()));

        if accepted.is_empty() {
            out.finish(ImportResult::error(format!(
                "unsupported file format: no transactions recognized for {bank}"
            )));
            return;
        }

        let total = accepted.len();
        let mut saved = 0usize;
        let mut failed = 0usize;
        for (i, record) in accepted.iter().enumerate() {
            if out.should_stop() {
                info!(bank, saved, "import cancelled while saving");
                out.finish(ImportResult::error(format!(
                    "import cancelled, {saved} records saved"
                )));
                return;
            }
            match self.store.add_record(record) {
                Ok(id) => {
                    trace!(bank, %id, "saved");
                    saved += 1;
                }
                Err(e) => {
                    error!(bank, id = %record.id, error = %e, "cannot save record");
                    failed += 1;
                }
            }
            let done = i + 1;
            if done % SAVE_PROGRESS_EVERY == 0 || done == total {
                let step = (done * SAVE_SPAN as usize / total) as u32;
                out.progress(SAVE_START + step, &format!("saved {done} of {total}"));
            }
        }

        match self.store.count_all() {
            Ok(count) => info!(bank, saved, failed, stored_total = count, "import saved"),
            Err(e) => warn!(bank, error = %e, "cannot count stored records"),
        }

        out.progress(FINISHING, "finishing");
        let message = if failed > 0 {
            format!("{failed} of {total} records could not be saved")
        } else {
            String::new()
        };
        out.finish(ImportResult::Success {
            imported_count: total,
            skipped_count: skipped,
            bank_name: bank.to_string(),
            message,
        });
    }
}

/// Events of one run, ending with exactly one `Success` or `Error`.
pub struct ImportStream {
    rx: Receiver<ImportResult>,
    cancel: CancelToken,
    done: bool,
}

impl ImportStream {
    fn new(rx: Receiver<ImportResult>, cancel: CancelToken) -> Self {
        Self {
            rx,
            cancel,
            done: false,
        }
    }

    /// Stops the run at the next line or save boundary. The stream still
    /// ends with a terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains the stream and returns the terminal event.
    pub fn wait(self) -> Option<ImportResult> {
        self.last()
    }
}

impl Iterator for ImportStream {
    type Item = ImportResult;

    fn next(&mut self) -> Option<ImportResult> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(event) => {
                self.done = event.is_terminal();
                Some(event)
            }
            Err(_) => {
                // The worker hung up without a terminal event, so it panicked.
                error!("import worker stopped without a result");
                self.done = true;
                Some(ImportResult::error("import worker stopped unexpectedly"))
            }
        }
    }
}

impl Drop for ImportStream {
    fn drop(&mut self) {
        if !self.done {
            self.cancel.cancel();
        }
    }
}
