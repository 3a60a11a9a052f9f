//! Console output capture, scoped to one job's execution context.
//!
//! Engines narrate through [`Console`]. Without a capture, console writes
//! go straight to the process stdout. While a [`CaptureGuard`] is alive on
//! the current thread, every write is still forwarded to the original
//! destination unchanged and is also fed to the job's [`LineBuffer`];
//! each completed line becomes a pass-through [`LogMessage`].
//!
//! At most one capture can be installed per thread. Dropping the guard
//! flushes the residual partial line and restores plain stdout, so the
//! capture ends on every exit path of the job, unwinding included.

use std::cell::RefCell;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use crewcast_core::log_message::LogMessage;
use crewcast_core::types::JobId;

use crate::line_buffer::LineBuffer;
use crate::sink::LogSink;

thread_local! {
    static ACTIVE: RefCell<Option<ActiveCapture>> = const { RefCell::new(None) };
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("output of job {0} is already captured on this execution context")]
    AlreadyActive(JobId),
}

struct ActiveCapture {
    job_id: JobId,
    buffer: LineBuffer,
    sink: Arc<dyn LogSink>,
    original: Box<dyn Write + Send>,
}

impl ActiveCapture {
    /// Tee `buf` and return the lines it completed. The caller emits them
    /// once the thread-local is no longer borrowed.
    fn write(&mut self, buf: &[u8]) -> (Arc<dyn LogSink>, Vec<String>) {
        if let Err(e) = self.original.write_all(buf).and_then(|()| self.original.flush()) {
            tracing::debug!(job_id = %self.job_id, error = %e, "Console passthrough write failed");
        }
        (Arc::clone(&self.sink), self.buffer.push(buf))
    }

    fn finish(mut self) {
        let _ = self.original.flush();
        if let Some(rest) = self.buffer.flush() {
            self.sink.emit(LogMessage::raw(rest));
        }
    }
}

/// Start capturing console output of the current thread for `job_id`,
/// teeing it to the process stdout.
pub fn install(job_id: JobId, sink: Arc<dyn LogSink>) -> Result<CaptureGuard, CaptureError> {
    install_with(job_id, sink, Box::new(io::stdout()))
}

/// Like [`install`], with an explicit original destination.
pub fn install_with(
    job_id: JobId,
    sink: Arc<dyn LogSink>,
    original: Box<dyn Write + Send>,
) -> Result<CaptureGuard, CaptureError> {
    ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(active) = slot.as_ref() {
            return Err(CaptureError::AlreadyActive(active.job_id));
        }
        *slot = Some(ActiveCapture {
            job_id,
            buffer: LineBuffer::new(),
            sink,
            original,
        });
        Ok(())
    })?;

    tracing::debug!(job_id = %job_id, "Console capture installed");
    Ok(CaptureGuard {
        job_id,
        _thread_bound: PhantomData,
    })
}

/// Job whose output is captured on the current thread, if any.
pub fn active_job() -> Option<JobId> {
    ACTIVE.with(|slot| slot.borrow().as_ref().map(|active| active.job_id))
}

/// Keeps a capture installed; releases it on drop.
///
/// Not `Send`: the capture belongs to the thread that installed it.
#[must_use = "the capture is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CaptureGuard {
    job_id: JobId,
    _thread_bound: PhantomData<*const ()>,
}

impl CaptureGuard {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Release explicitly. Same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        // The slot is emptied before flushing so the sink never runs while
        // the thread-local is borrowed.
        let active = ACTIVE
            .try_with(|slot| slot.borrow_mut().take())
            .ok()
            .flatten();
        if let Some(active) = active {
            active.finish();
            tracing::debug!(job_id = %self.job_id, "Console capture released");
        }
    }
}

/// Writer for engine narration.
///
/// Routes to the capture installed on the current thread, or to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let completed = ACTIVE.with(|slot| {
            slot.borrow_mut()
                .as_mut()
                .map(|active| active.write(buf))
        });
        let Some((sink, lines)) = completed else {
            return io::stdout().write(buf);
        };
        for line in lines {
            sink.emit(LogMessage::raw(line));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        ACTIVE.with(|slot| match slot.borrow_mut().as_mut() {
            Some(active) => active.original.flush(),
            None => io::stdout().flush(),
        })
    }
}
