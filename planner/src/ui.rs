//! Dedicated UI thread that owns the rendering surface.
//!
//! Work reaches the UI thread through a command channel and runs there in
//! submission order. Delayed tasks are timed by the thread's own event loop.
//!
//! ```text
//! worker ──run_later / run_after / invoke──► [ command channel ] ──► UI thread
//!    ▲                                                                  │
//!    └──────────────────────── oneshot (invoke) ◄───────────────────────┘
//! ```

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

enum UiCommand {
    Run(UiTask),
    RunAfter(Duration, UiTask),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("UI thread is no longer running")]
pub struct UiClosed;

/// Cloneable access to the UI thread's task queue.
#[derive(Clone)]
pub struct UiHandle {
    sender: mpsc::UnboundedSender<UiCommand>,
    thread_id: ThreadId,
}

impl UiHandle {
    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queues `task` behind everything already submitted.
    pub fn run_later(&self, task: impl FnOnce() + Send + 'static) -> Result<(), UiClosed> {
        self.send(UiCommand::Run(Box::new(task)))
    }

    /// Runs `task` on the UI thread once `delay` has elapsed.
    pub fn run_after(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), UiClosed> {
        self.send(UiCommand::RunAfter(delay, Box::new(task)))
    }

    /// Runs `task` inline when already on the UI thread, otherwise queues it.
    pub fn run(&self, task: impl FnOnce() + Send + 'static) -> Result<(), UiClosed> {
        if self.is_ui_thread() {
            task();
            Ok(())
        } else {
            self.run_later(task)
        }
    }

    /// Runs `task` on the UI thread and resolves with its result.
    ///
    /// If the returned future is dropped before the task starts (for example
    /// by a timeout), the task is skipped.
    pub async fn invoke<R, F>(&self, task: F) -> Result<R, UiClosed>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.run_later(move || {
            if tx.is_closed() {
                tracing::debug!("skipping UI task abandoned by its caller");
                return;
            }
            let _ = tx.send(task());
        })?;
        rx.await.map_err(|_| UiClosed)
    }

    fn send(&self, command: UiCommand) -> Result<(), UiClosed> {
        self.sender.send(command).map_err(|_| UiClosed)
    }
}

/// Owner of the UI thread. Dropping it stops the event loop after the tasks
/// already queued have run.
pub struct UiThread {
    handle: UiHandle,
    thread: Option<JoinHandle<()>>,
}

impl UiThread {
    pub fn start() -> io::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("ui".to_string())
            .spawn(move || run_event_loop(receiver))?;

        let handle = UiHandle {
            sender,
            thread_id: thread.thread().id(),
        };
        tracing::debug!("UI thread started");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        let _ = self.handle.send(UiCommand::Shutdown);
        if self.handle.is_ui_thread() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("UI thread terminated abnormally");
            }
        }
    }
}

fn run_event_loop(mut receiver: mpsc::UnboundedReceiver<UiCommand>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start UI event loop: {err}");
            return;
        }
    };

    runtime.block_on(async move {
        while let Some(command) = receiver.recv().await {
            match command {
                UiCommand::Run(task) => run_task(task),
                UiCommand::RunAfter(delay, task) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        run_task(task);
                    });
                }
                UiCommand::Shutdown => break,
            }
        }
    });
    tracing::debug!("UI thread stopped");
}

fn run_task(task: UiTask) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!("UI task panicked");
    }
}
