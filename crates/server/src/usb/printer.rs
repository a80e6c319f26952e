//! Printer transport
//!
//! Prints plain text on an ESC/POS receipt printer: each copy is the UTF-8
//! payload plus a newline, followed by a cut. Copies are written strictly in
//! order and the job stops at the first failing write.

use crate::usb::backend::UsbPort;
use crate::usb::cancel::CancelToken;
use crate::usb::session::DeviceSession;
use protocol::TransportError;
use protocol::escpos::{self, CUT, STATUS_QUERY};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier handed back to clients for a print job
///
/// Unique per call for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl JobId {
    fn next() -> Self {
        JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:06}", self.0)
    }
}

/// Outcome of a completed print job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub copies: u32,
}

/// Print `copies` copies of `content`, each followed by a cut
///
/// `cancel` is checked before every copy; a copy already being written is
/// always finished.
pub fn print<P: UsbPort>(
    session: &mut DeviceSession<P>,
    content: &str,
    copies: u32,
    cancel: &CancelToken,
) -> Result<JobResult, TransportError> {
    let job_id = JobId::next();
    let payload = escpos::encode_text(content);

    debug!(
        "{}: {} copies of {} bytes to {}",
        job_id,
        copies,
        payload.len(),
        session.identity()
    );

    for completed in 0..copies {
        if cancel.is_cancelled() {
            warn!("{} cancelled after {} of {} copies", job_id, completed, copies);
            return Err(TransportError::Cancelled { completed });
        }

        let written = session
            .write_out(&payload)
            .and_then(|()| session.write_out(&CUT));

        if let Err(e) = written {
            warn!("{} failed on copy {}: {}", job_id, completed + 1, e);
            return Err(TransportError::PrintAborted {
                completed,
                requested: copies,
                source: Box::new(e),
            });
        }
    }

    info!("{} printed {} copies on {}", job_id, copies, session.identity());
    Ok(JobResult { job_id, copies })
}

/// Ask the printer for its roll paper sensor byte
pub fn query_status<P: UsbPort>(session: &mut DeviceSession<P>) -> Result<u8, TransportError> {
    session.write_out(&STATUS_QUERY)?;

    let mut buf = [0u8; 8];
    let len = session.read_in(&mut buf)?;
    if len == 0 {
        return Err(TransportError::Decode("empty status response".to_string()));
    }

    debug!("Status byte from {}: {:#04x}", session.identity(), buf[0]);
    Ok(buf[0])
}
