//! Async driver from a response byte stream into a [`StreamTarget`].
//!
//! DESIGN
//! ======
//! One `tokio::select!` loop waits on three things: the next body chunk,
//! the stop switch, and (after a stop) the grace deadline. Chunks go
//! through `SseDecoder` and `decode_event`; each decoded event is applied
//! to the target synchronously. The loop ends on a terminal event, the end
//! of the body, a transport error, or an expired stop deadline.
//!
//! Timestamps handed to the target are wall-clock milliseconds advanced by
//! tokio's clock, so tests with a paused clock see deadlines expire.
//!
//! ERROR HANDLING
//! ==============
//! Undecodable frames and refused events are logged and skipped. A
//! transport error fails the open message with the user-facing error text.

use std::time::Duration;

use events::{ProgressScale, SseDecoder, StreamEvent, decode_event};
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ErrorCode};
use crate::session::{Applied, MessageStatus, Session, SessionError};

/// Whatever a stream's events are folded into.
pub trait StreamTarget {
    /// Apply one decoded event.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] the event was refused with.
    fn apply_event(&mut self, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError>;

    /// The transport broke mid-stream.
    fn transport_failed(&mut self, text: &str, now_ms: i64);

    /// The body ended. Anything still open should be finished.
    fn stream_ended(&mut self, now_ms: i64);

    /// A stop was requested; start the grace period.
    fn stop_requested(&mut self, now_ms: i64, grace_ms: i64);

    /// The grace deadline passed. Returns true if the target was forced into error.
    fn stop_expired(&mut self, now_ms: i64) -> bool;

    /// Status of the latest assistant message.
    fn final_status(&self) -> Option<MessageStatus>;
}

impl StreamTarget for Session {
    fn apply_event(&mut self, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError> {
        self.apply(event, now_ms)
    }

    fn transport_failed(&mut self, text: &str, _now_ms: i64) {
        self.fail(text);
    }

    fn stream_ended(&mut self, _now_ms: i64) {
        self.finish_stream();
    }

    fn stop_requested(&mut self, now_ms: i64, grace_ms: i64) {
        self.request_stop(now_ms, grace_ms);
    }

    fn stop_expired(&mut self, now_ms: i64) -> bool {
        self.check_stop_deadline(now_ms)
    }

    fn final_status(&self) -> Option<MessageStatus> {
        self.latest_assistant().map(|m| m.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOptions {
    pub scale: ProgressScale,
    pub stop_grace: Duration,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            scale: ProgressScale::default(),
            stop_grace: Duration::from_millis(crate::config::DEFAULT_STOP_GRACE_MS),
        }
    }
}

/// How a drive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A `message_complete` or `error` event arrived.
    Terminal,
    /// The body ended without a terminal event.
    Eof,
    /// Reading the body failed.
    Transport,
    /// A stop was requested and the grace period ran out.
    StopTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub applied: usize,
    pub skipped: usize,
    pub end: StreamEnd,
    pub stop_requested: bool,
    pub final_status: Option<MessageStatus>,
}

impl StreamOutcome {
    /// Fail with [`ClientError::Timeout`] if a stop outlived its grace period.
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] carrying the grace in milliseconds.
    pub fn ensure_finished(&self, grace: Duration) -> Result<(), ClientError> {
        if self.end == StreamEnd::StopTimeout {
            return Err(ClientError::Timeout(u64::try_from(grace.as_millis()).unwrap_or(u64::MAX)));
        }
        Ok(())
    }
}

/// Decode one framed payload into an event.
///
/// # Errors
///
/// [`ClientError::Protocol`] for a broken frame or an unknown event.
pub fn decode_frame(
    payload: Result<String, events::CodecError>,
    scale: ProgressScale,
) -> Result<StreamEvent, ClientError> {
    Ok(decode_event(&payload?, scale)?)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Wall clock that advances with tokio's (possibly paused) clock.
struct DriveClock {
    base_ms: i64,
    base: Instant,
}

impl DriveClock {
    fn start() -> Self {
        Self { base_ms: now_ms(), base: Instant::now() }
    }

    fn now_ms(&self) -> i64 {
        self.base_ms.saturating_add(millis(self.base.elapsed()))
    }
}

/// Drive `body` to its end, folding every decodable event into `target`.
pub async fn drive_stream<T, S, B>(
    target: &mut T,
    mut body: S,
    mut stop: watch::Receiver<bool>,
    options: DriveOptions,
) -> StreamOutcome
where
    T: StreamTarget + ?Sized,
    S: Stream<Item = Result<B, ClientError>> + Unpin,
    B: AsRef<[u8]>,
{
    let clock = DriveClock::start();
    let mut decoder = SseDecoder::new();
    let mut applied = 0usize;
    let mut skipped = 0usize;
    let mut deadline: Option<Instant> = None;
    let mut stop_open = true;

    if *stop.borrow_and_update() {
        deadline = Some(begin_stop(target, &clock, options.stop_grace));
    }

    let end = loop {
        tokio::select! {
            biased;

            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if target.stop_expired(clock.now_ms()) {
                    warn!(grace_ms = millis(options.stop_grace), "stream did not finish after stop; forcing error");
                }
                break StreamEnd::StopTimeout;
            }

            changed = stop.changed(), if stop_open && deadline.is_none() => {
                match changed {
                    Ok(()) => {
                        if *stop.borrow_and_update() {
                            deadline = Some(begin_stop(target, &clock, options.stop_grace));
                        }
                    }
                    Err(_) => stop_open = false,
                }
            }

            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    let mut terminal = false;
                    for payload in decoder.push(bytes.as_ref()) {
                        match fold_payload(target, payload, options.scale, clock.now_ms()) {
                            Folded::Applied { terminal: t } => {
                                applied += 1;
                                terminal |= t;
                            }
                            Folded::Skipped => skipped += 1,
                        }
                        if terminal {
                            break;
                        }
                    }
                    if terminal {
                        break StreamEnd::Terminal;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "stream transport failed");
                    target.transport_failed(&e.user_message(), clock.now_ms());
                    break StreamEnd::Transport;
                }
                None => {
                    let mut terminal = false;
                    if let Some(payload) = decoder.finish() {
                        match fold_payload(target, payload, options.scale, clock.now_ms()) {
                            Folded::Applied { terminal: t } => {
                                applied += 1;
                                terminal = t;
                            }
                            Folded::Skipped => skipped += 1,
                        }
                    }
                    if terminal {
                        break StreamEnd::Terminal;
                    }
                    target.stream_ended(clock.now_ms());
                    break StreamEnd::Eof;
                }
            },
        }
    };

    let outcome = StreamOutcome {
        applied,
        skipped,
        end,
        stop_requested: deadline.is_some(),
        final_status: target.final_status(),
    };
    info!(applied, skipped, end = ?outcome.end, status = ?outcome.final_status, "stream finished");
    outcome
}

fn begin_stop<T: StreamTarget + ?Sized>(target: &mut T, clock: &DriveClock, grace: Duration) -> Instant {
    debug!(grace_ms = millis(grace), "stop requested");
    target.stop_requested(clock.now_ms(), millis(grace));
    Instant::now() + grace
}

enum Folded {
    Applied { terminal: bool },
    Skipped,
}

fn fold_payload<T: StreamTarget + ?Sized>(
    target: &mut T,
    payload: Result<String, events::CodecError>,
    scale: ProgressScale,
    now_ms: i64,
) -> Folded {
    let event = match decode_frame(payload, scale) {
        Ok(event) => event,
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "skipping undecodable stream frame");
            return Folded::Skipped;
        }
    };
    match target.apply_event(&event, now_ms) {
        Ok(_) => Folded::Applied { terminal: event.kind.is_terminal() },
        Err(SessionError::StaleUpdate { current, incoming }) => {
            debug!(current, incoming, "ignoring stale progress update");
            Folded::Skipped
        }
        Err(e) => {
            warn!(error = %e, kind = event.kind.type_name(), "ignoring stream event");
            Folded::Skipped
        }
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
