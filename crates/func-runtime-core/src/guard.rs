//! Panic containment for handler execution.
//!
//! [`catch_panic`] wraps a future so that a panic raised while polling it is
//! turned into a [`CrashError`] value instead of unwinding into the transport.
//!
//! A process-wide panic hook is installed on first use. While a guarded future
//! is being polled on the current thread the hook records the panic location
//! and a backtrace instead of printing; panics anywhere else are passed to the
//! previously installed hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use func_runtime_common::CrashError;

static HOOK: Once = Once::new();

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

struct Captured {
    location: Option<String>,
    stack: String,
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }

            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let stack = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(Captured { location, stack }));
        }));
    });
}

/// Future returned by [`catch_panic`].
pub struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

/// Run `future`, converting a panic into a [`CrashError`].
pub fn catch_panic<F: Future>(future: F) -> CatchPanic<F> {
    install_hook();
    CatchPanic {
        inner: Box::pin(future),
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, CrashError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();

        GUARD_DEPTH.with(|d| d.set(d.get() + 1));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx)));
        GUARD_DEPTH.with(|d| d.set(d.get() - 1));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(crash_from(payload.as_ref()))),
        }
    }
}

fn crash_from(payload: &(dyn Any + Send)) -> CrashError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    let captured = LAST_PANIC.with(|slot| slot.borrow_mut().take());

    CrashError {
        message,
        location: captured.as_ref().and_then(|c| c.location.clone()),
        stack: captured.map(|c| c.stack),
    }
}
