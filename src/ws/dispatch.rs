//! Callback set and event delivery.
//!
//! Callbacks run synchronously on the task driving
//! [`Ticker::serve`](crate::ws::ticker::Ticker::serve), in the order events
//! were received. A panic inside a callback is caught and reported to the
//! error callback; delivery then continues with the next event.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crate::error::TickerError;
use crate::types::{OrderUpdate, Tick};
use crate::ws::codec::{Decoded, FeedEvent};

pub type ErrorCallback = Box<dyn FnMut(&TickerError) + Send>;
pub type CloseCallback = Box<dyn FnMut(u16, &str) + Send>;
pub type ConnectCallback = Box<dyn FnMut() + Send>;
pub type ReconnectCallback = Box<dyn FnMut(u32, Duration) + Send>;
pub type NoReconnectCallback = Box<dyn FnMut(u32) + Send>;
pub type TickCallback = Box<dyn FnMut(Tick) + Send>;
pub type OrderUpdateCallback = Box<dyn FnMut(OrderUpdate) + Send>;

/// One optional handler per event category. A missing handler is a no-op.
#[derive(Default)]
pub struct Dispatcher {
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_close: Option<CloseCallback>,
    pub(crate) on_connect: Option<ConnectCallback>,
    pub(crate) on_reconnect: Option<ReconnectCallback>,
    pub(crate) on_no_reconnect: Option<NoReconnectCallback>,
    pub(crate) on_tick: Option<TickCallback>,
    pub(crate) on_order_update: Option<OrderUpdateCallback>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_no_reconnect", &self.on_no_reconnect.is_some())
            .field("on_tick", &self.on_tick.is_some())
            .field("on_order_update", &self.on_order_update.is_some())
            .finish()
    }
}

impl Dispatcher {
    /// Report an error. A panicking error callback is logged and swallowed.
    pub fn error(&mut self, err: &TickerError) {
        if let Some(f) = self.on_error.as_mut() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(err))) {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    error = %err,
                    "error callback panicked"
                );
            }
        }
    }

    pub fn close(&mut self, code: u16, reason: &str) {
        let failure = self
            .on_close
            .as_mut()
            .and_then(|f| guarded("close", || f(code, reason)));
        self.report(failure);
    }

    pub fn connect(&mut self) {
        let failure = self.on_connect.as_mut().and_then(|f| guarded("connect", f));
        self.report(failure);
    }

    pub fn reconnect(&mut self, attempt: u32, delay: Duration) {
        let failure = self
            .on_reconnect
            .as_mut()
            .and_then(|f| guarded("reconnect", || f(attempt, delay)));
        self.report(failure);
    }

    pub fn no_reconnect(&mut self, attempts: u32) {
        let failure = self
            .on_no_reconnect
            .as_mut()
            .and_then(|f| guarded("no_reconnect", || f(attempts)));
        self.report(failure);
    }

    /// Deliver one decoded unit of a frame.
    pub fn dispatch(&mut self, decoded: Decoded) {
        match decoded {
            Ok(FeedEvent::Tick(tick)) => {
                let failure = self
                    .on_tick
                    .as_mut()
                    .and_then(|f| guarded("tick", || f(tick)));
                self.report(failure);
            }
            Ok(FeedEvent::OrderUpdate(update)) => {
                let failure = self
                    .on_order_update
                    .as_mut()
                    .and_then(|f| guarded("order_update", || f(*update)));
                self.report(failure);
            }
            Ok(FeedEvent::Heartbeat) => {}
            Ok(FeedEvent::ServerError(message)) => {
                tracing::warn!(%message, "Server reported an error");
                self.error(&TickerError::Server(message));
            }
            Ok(FeedEvent::ServerMessage(message)) => {
                tracing::info!(%message, "Server message");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode ticker packet");
                self.error(&TickerError::Decode(e));
            }
        }
    }

    fn report(&mut self, failure: Option<TickerError>) {
        if let Some(err) = failure {
            tracing::error!(error = %err, "callback panicked");
            self.error(&err);
        }
    }
}

/// Run `f`, turning a panic into [`TickerError::CallbackPanic`].
fn guarded(category: &'static str, f: impl FnOnce()) -> Option<TickerError> {
    catch_unwind(AssertUnwindSafe(f))
        .err()
        .map(|payload| TickerError::CallbackPanic {
            category,
            message: panic_message(payload.as_ref()),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::DecodeError;
    use crate::types::{Mode, Segment};

    fn tick(token: u32) -> Tick {
        Tick::new(Mode::Ltp, token, Segment::Nse)
    }

    #[test]
    fn missing_callbacks_are_noops() {
        let mut d = Dispatcher::default();
        d.connect();
        d.close(1000, "bye");
        d.reconnect(1, Duration::from_secs(1));
        d.no_reconnect(3);
        d.dispatch(Ok(FeedEvent::Tick(tick(1))));
        d.dispatch(Err(DecodeError::UnknownPacketLength(3)));
    }

    #[test]
    fn panicking_tick_callback_is_reported_and_delivery_continues() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let mut d = Dispatcher::default();
        let s = seen.clone();
        d.on_tick = Some(Box::new(move |t: Tick| {
            if t.instrument_token == 2 {
                panic!("boom on {}", t.instrument_token);
            }
            s.lock().unwrap().push(t.instrument_token);
        }));
        let e = errors.clone();
        d.on_error = Some(Box::new(move |err: &TickerError| {
            e.lock().unwrap().push(err.to_string());
        }));

        for token in [1, 2, 3] {
            d.dispatch(Ok(FeedEvent::Tick(tick(token))));
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "tick callback panicked: boom on 2");
    }

    #[test]
    fn panicking_error_callback_is_swallowed() {
        let mut d = Dispatcher::default();
        d.on_error = Some(Box::new(|_: &TickerError| panic!("nested")));
        d.on_connect = Some(Box::new(|| panic!("first")));
        d.connect();
        d.error(&TickerError::Server("x".into()));
    }

    #[test]
    fn server_errors_reach_error_callback() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::default();
        let e = errors.clone();
        d.on_error = Some(Box::new(move |err: &TickerError| {
            e.lock().unwrap().push(matches!(err, TickerError::Server(m) if m == "bad"));
        }));
        d.dispatch(Ok(FeedEvent::ServerError("bad".into())));
        d.dispatch(Ok(FeedEvent::Heartbeat));
        d.dispatch(Ok(FeedEvent::ServerMessage("hello".into())));
        assert_eq!(*errors.lock().unwrap(), vec![true]);
    }
}
