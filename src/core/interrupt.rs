//! Ctrl-C handling: cancel the in-flight request, or leave when idle.

use std::io;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::dispatcher::RequestState;

/// Listen for process interrupts for the rest of the program.
///
/// The signal handler is registered before this returns, so an interrupt
/// that arrives while the listener task is still starting is not lost.
pub fn spawn_interrupt_listener<F>(state: RequestState, on_idle: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    match interrupt_signals() {
        Ok(signals) => tokio::spawn(handle_interrupts(signals, state, on_idle)),
        Err(err) => {
            warn!("Unable to listen for Ctrl-C: {err}");
            tokio::spawn(async {})
        }
    }
}

/// One SIGINT registration polled for the life of the process.
#[cfg(unix)]
fn interrupt_signals() -> io::Result<impl Stream<Item = ()> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(futures_util::stream::poll_fn(move |cx| sigint.poll_recv(cx)))
}

#[cfg(not(unix))]
fn interrupt_signals() -> io::Result<impl Stream<Item = ()> + Send> {
    use tokio::signal::windows::ctrl_c;

    let mut events = ctrl_c()?;
    Ok(futures_util::stream::poll_fn(move |cx| events.poll_recv(cx)))
}

async fn handle_interrupts<S, F>(signals: S, state: RequestState, on_idle: F)
where
    S: Stream<Item = ()>,
    F: Fn(),
{
    futures_util::pin_mut!(signals);
    while signals.next().await.is_some() {
        if state.interrupt() {
            debug!("interrupt cancelled the in-flight request");
        } else {
            on_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatCompletion, ChatRequest};
    use crate::core::dispatcher::{
        BufferSink, ByteStream, ChatTransport, DispatchError, Dispatcher,
    };
    use crate::core::message::Message;
    use crate::core::model_rules::ModelRules;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn idle_interrupt_calls_exit_hook() {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let signals = futures_util::stream::iter([(), ()]);

        handle_interrupts(signals, RequestState::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(exits.load(Ordering::SeqCst), 2);
    }

    struct HangingTransport;

    #[async_trait]
    impl ChatTransport for HangingTransport {
        async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, DispatchError> {
            Ok(futures_util::stream::pending().boxed())
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatCompletion, DispatchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn interrupt_cancels_active_request_instead_of_exiting() {
        let state = RequestState::new();
        let dispatcher = Dispatcher::new(
            Arc::new(HangingTransport),
            ModelRules::builtin().unwrap(),
            state.clone(),
        );
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let signals = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|signal| (signal, rx))
        });
        let listener = tokio::spawn(handle_interrupts(signals, state.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let transcript = vec![Message::system("sys"), Message::user("think hard")];
        let request = async {
            dispatcher
                .send_chat_request(&transcript, "o3", &mut BufferSink::default())
                .await
        };
        let trigger = async {
            while !state.is_in_flight() {
                tokio::task::yield_now().await;
            }
            tx.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(request, trigger);

        assert!(matches!(result, Err(DispatchError::Interrupted)));
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        drop(tx);
        listener.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_keeps_receiving_after_each_interrupt() {
        use std::time::Duration;

        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let listener = spawn_interrupt_listener(RequestState::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for expected in 1..=3 {
            let status = std::process::Command::new("kill")
                .args(["-INT", &std::process::id().to_string()])
                .status()
                .unwrap();
            assert!(status.success());
            tokio::time::timeout(Duration::from_secs(5), async {
                while exits.load(Ordering::SeqCst) < expected {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap_or_else(|_| panic!("interrupt {expected} was not delivered"));
        }

        listener.abort();
    }
}
