//! The `RequestHandler` adapter that wires [`xrd_msghandler::MsgHandler`]
//! into a live [`xrd_postmaster::PostMaster`].
//!
//! `xrd-msghandler` is deliberately transport-free: it is a pure function
//! of `(state, event) -> (state, action)` with no socket of its own. This
//! module is the thin bridge its own doc comment names as belonging to
//! whichever crate wires the two together — here. [`MsgHandlerAdapter`]
//! implements [`RequestHandler`], decodes the raw [`ResponseHeader`] each
//! `Stream` hands it (the header travels undecoded inside the `Message`
//! body; see [`xrd_stream::stream::Stream::dispatch`]), feeds the decoded
//! event to the `MsgHandler`, and carries out whatever [`Action`] comes
//! back: resending at a new endpoint, scheduling a wake-up through the
//! shared [`TaskManager`], or delivering the terminal [`Outcome`] to the
//! caller's completion channel.

use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

use xrd_msghandler::{Action, Event, HandlerConfig, MsgHandler, Outcome};
use xrd_postmaster::PostMaster;
use xrd_stream::{RawChunkOutcome, RequestHandler, StreamError};
use xrd_task::TaskManager;
use xrd_transport::TransportHandler;
use xrd_wire::{Message, RequestHeader, ResponseHeader, StatusCode};

/// Splits a `host:port` id back into its parts, falling back to `default`
/// if no port is present (redirect targets and `current_host_id` always
/// carry one, but this keeps the split total rather than panicking on an
/// unexpected shape).
fn split_host_id(host_id: &str, default_port: u16) -> (String, u16) {
    match host_id.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(default_port)),
        None => (host_id.to_string(), default_port),
    }
}

fn decode_response_header(mut body: BytesMut) -> Result<(ResponseHeader, BytesMut), xrd_wire::WireError> {
    let header_bytes = if body.len() < ResponseHeader::LEN {
        return Err(xrd_wire::WireError::Truncated {
            expected: ResponseHeader::LEN,
            actual: body.len(),
        });
    } else {
        body.split_to(ResponseHeader::LEN)
    };
    let mut array = [0u8; ResponseHeader::LEN];
    array.copy_from_slice(&header_bytes);
    let header = ResponseHeader::decode(&array)?;
    Ok((header, body))
}

/// Bridges one in-flight request's [`MsgHandler`] to a live
/// [`PostMaster`]: drives redirects and retries by resubmitting through
/// the Post Master, schedules `wait`/deadline wake-ups through a shared
/// [`TaskManager`], and reports the terminal outcome on a one-shot
/// completion channel.
///
/// Cyclic by construction — a scheduled wake-up task needs to call back
/// into the very adapter that scheduled it — so it's always built behind
/// `Arc::new_cyclic`.
pub struct MsgHandlerAdapter<T: TransportHandler + 'static> {
    inner: Mutex<MsgHandler>,
    postmaster: Arc<PostMaster<T>>,
    tasks: Arc<TaskManager>,
    default_port: u16,
    completion: Mutex<Option<oneshot::Sender<Outcome>>>,
    self_weak: Weak<Self>,
}

impl<T: TransportHandler + 'static> MsgHandlerAdapter<T> {
    /// Builds a fresh adapter for one request addressed at `host_id`
    /// (`host:port`), wired to resubmit through `postmaster` and schedule
    /// deadline/wait wake-ups through `tasks`. The terminal [`Outcome`] is
    /// delivered on `completion`.
    #[must_use]
    pub fn new(
        host_id: impl Into<String>,
        default_port: u16,
        header: RequestHeader,
        body: BytesMut,
        config: HandlerConfig,
        postmaster: Arc<PostMaster<T>>,
        tasks: Arc<TaskManager>,
        completion: oneshot::Sender<Outcome>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: Mutex::new(MsgHandler::new(host_id, header, body, config)),
            postmaster,
            tasks,
            default_port,
            completion: Mutex::new(Some(completion)),
            self_weak: weak.clone(),
        })
    }

    /// The redirect trail accumulated so far, for building the final
    /// `XrdStatus`'s host-list.
    #[must_use]
    pub fn redirect_trail(&self) -> Vec<String> {
        self.inner.lock().redirect_trail().to_vec()
    }

    /// The host (`host:port`) this request is currently, or was finally,
    /// addressed to -- the endpoint a caller opening a file should keep
    /// using for subsequent reads/writes on the handle it got back.
    #[must_use]
    pub fn current_host_id(&self) -> String {
        self.inner.lock().current_host_id().to_string()
    }

    fn run_action(&self, action: Action) {
        match action {
            Action::Continue | Action::EnterRawMode => {}
            Action::ScheduleWake(delay) => {
                let Some(this) = self.self_weak.upgrade() else {
                    return;
                };
                self.tasks.schedule_after(delay, move |now| {
                    this.deliver_tick(now);
                    None
                });
            }
            Action::Resend { header, body } => {
                let Some(this) = self.self_weak.upgrade() else {
                    return;
                };
                tokio::spawn(async move { this.resend(header, body).await });
            }
            Action::Complete(outcome) => {
                if let Some(tx) = self.completion.lock().take() {
                    let _ = tx.send(outcome);
                }
            }
        }
    }

    fn deliver_tick(&self, now: tokio::time::Instant) {
        let action = self.inner.lock().handle(Event::Tick(now));
        self.run_action(action);
    }

    async fn resend(self: Arc<Self>, header: RequestHeader, body: BytesMut) {
        let host_id = self.inner.lock().current_host_id().to_string();
        let (host, port) = split_host_id(&host_id, self.default_port);
        let handler: Arc<dyn RequestHandler> = self.clone();
        match self.postmaster.send(&host, port, header, body, 0, handler).await {
            Ok(_) => {}
            Err(err) => {
                let action = self.inner.lock().handle(Event::FatalError(err.to_string()));
                self.run_action(action);
            }
        }
    }
}

impl<T: TransportHandler + 'static> RequestHandler for MsgHandlerAdapter<T> {
    fn on_sent(&self) {
        let action = self.inner.lock().handle(Event::Sent);
        self.run_action(action);
    }

    fn process(&self, _status: StatusCode, msg: Message) {
        match decode_response_header(msg.into_body()) {
            Ok((header, body)) => {
                let action = self.inner.lock().handle(Event::Response { header, body });
                self.run_action(action);
            }
            Err(err) => {
                warn!(%err, "dropping response with an undecodable header");
                let action = self.inner.lock().handle(Event::FatalError(err.to_string()));
                self.run_action(action);
            }
        }
    }

    fn on_fatal_error(&self, err: StreamError) {
        let action = self.inner.lock().handle(Event::FatalError(err.to_string()));
        self.run_action(action);
    }

    fn wants_raw_mode(&self) -> bool {
        self.inner.lock().wants_raw_mode()
    }

    fn on_raw_chunk(&self, chunk: &[u8]) -> RawChunkOutcome {
        let mut guard = self.inner.lock();
        let action = guard.handle(Event::RawChunk(BytesMut::from(chunk)));
        let terminal = guard.state().is_terminal();
        drop(guard);
        self.run_action(action);
        if terminal {
            RawChunkOutcome::Done
        } else {
            RawChunkOutcome::NeedMore
        }
    }
}
