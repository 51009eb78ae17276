//! Subscribing: one consumer loop per channel.
//!
//! Each subscribed channel gets a broker consumer and a dedicated thread
//! running a blocking poll loop. The caller's handler runs synchronously
//! on that thread, so a slow handler delays that channel only. Loops exit
//! through cooperative cancellation, never because of broker errors.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::broker::{BrokerClient, ConsumerEvent, EventConsumer};
use crate::error::BusError;
use crate::settings::StreamSettings;

/// Raw message callback: `(channel, payload)` per consumed message.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Channel-subscription seam.
pub trait RemoteEventSubscriber: Send + Sync {
    /// Start consuming the given channels.
    ///
    /// Channels that already have an active consumer are skipped — a
    /// duplicate subscription is a benign no-op, never a second consumer.
    fn subscribe(&self, channels: &[&str], handler: MessageHandler) -> Result<(), BusError>;

    /// Stop consuming the named channels.
    fn unsubscribe(&self, channels: &[&str]);

    /// Stop consuming every active channel.
    fn unsubscribe_all(&self);
}

struct ConsumerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct Inner<B: BrokerClient> {
    client: B,
    settings: StreamSettings,
    channels: Mutex<HashMap<String, ConsumerHandle>>,
    cancelled: Arc<AtomicBool>,
    disposed: AtomicBool,
}

/// Stream-style subscriber.
///
/// Cloning shares the same channel map and cancellation flag; clones are
/// cheap handles used by the `*_async` variants to run on a background
/// thread.
pub struct StreamSubscriber<B: BrokerClient> {
    inner: Arc<Inner<B>>,
}

impl<B: BrokerClient> Clone for StreamSubscriber<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrokerClient> StreamSubscriber<B> {
    pub fn new(settings: StreamSettings, client: B) -> Result<Self, BusError> {
        BusError::require_setting(&settings.bootstrap_servers, "bootstrap.servers")?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                settings,
                channels: Mutex::new(HashMap::new()),
                cancelled: Arc::new(AtomicBool::new(false)),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    /// Channels with an active consumer loop.
    pub fn active_channels(&self) -> Vec<String> {
        let channels = self.inner.channels.lock().expect("channel map poisoned");
        channels.keys().cloned().collect()
    }

    /// `subscribe` on a background thread; the handle completes when the
    /// subscriptions are established.
    pub fn subscribe_async(
        &self,
        channels: Vec<String>,
        handler: MessageHandler,
    ) -> JoinHandle<Result<(), BusError>> {
        let this = self.clone();
        thread::spawn(move || {
            let refs: Vec<&str> = channels.iter().map(String::as_str).collect();
            this.subscribe(&refs, handler)
        })
    }

    /// `unsubscribe` on a background thread.
    pub fn unsubscribe_async(&self, channels: Vec<String>) -> JoinHandle<()> {
        let this = self.clone();
        thread::spawn(move || {
            let refs: Vec<&str> = channels.iter().map(String::as_str).collect();
            this.unsubscribe(&refs);
        })
    }

    /// `unsubscribe_all` on a background thread.
    pub fn unsubscribe_all_async(&self) -> JoinHandle<()> {
        let this = self.clone();
        thread::spawn(move || this.unsubscribe_all())
    }

    /// Set the cancellation flag, stop every consumer, and join the loops.
    /// Safe to call more than once; subsequent calls are no-ops.
    pub fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.unsubscribe_all();
        debug!("subscriber disposed");
    }

    fn stop_channels(&self, names: Vec<String>) {
        let mut handles = Vec::with_capacity(names.len());
        {
            let mut channels = self.inner.channels.lock().expect("channel map poisoned");
            for name in names {
                if let Some(handle) = channels.remove(&name) {
                    handle.stop.store(true, Ordering::SeqCst);
                    handles.push((name, handle));
                }
            }
        }
        // Join outside the lock so loops can finish their current iteration.
        for (name, mut handle) in handles {
            if let Some(thread) = handle.thread.take() {
                if thread.join().is_err() {
                    warn!(channel = name.as_str(), "consumer loop panicked");
                }
            }
            debug!(channel = name.as_str(), "unsubscribed");
        }
    }
}

impl<B: BrokerClient> RemoteEventSubscriber for StreamSubscriber<B> {
    fn subscribe(&self, channels: &[&str], handler: MessageHandler) -> Result<(), BusError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(BusError::ShuttingDown);
        }

        for &channel in channels {
            let mut map = self.inner.channels.lock().expect("channel map poisoned");
            if map.contains_key(channel) {
                debug!(channel, "already subscribed, skipping");
                continue;
            }

            // Consumer creation failure is fatal for this call, not retried.
            let consumer = self
                .inner
                .client
                .consumer(channel, &self.inner.settings.group_id)?;

            let stop = Arc::new(AtomicBool::new(false));
            let thread = spawn_consume_loop(
                consumer,
                channel.to_string(),
                Arc::clone(&handler),
                Arc::clone(&stop),
                Arc::clone(&self.inner.cancelled),
                self.inner.settings.commit_period,
                self.inner.settings.poll_timeout,
            );

            map.insert(
                channel.to_string(),
                ConsumerHandle {
                    stop,
                    thread: Some(thread),
                },
            );
            info!(channel, "subscribed");
        }
        Ok(())
    }

    fn unsubscribe(&self, channels: &[&str]) {
        self.stop_channels(channels.iter().map(|c| c.to_string()).collect());
    }

    fn unsubscribe_all(&self) {
        let names = self.active_channels();
        self.stop_channels(names);
    }
}

impl<B: BrokerClient> Drop for Inner<B> {
    fn drop(&mut self) {
        // Last handle gone: make sure every loop is told to stop. Threads
        // hold no clone of Inner, so joining here cannot deadlock.
        self.cancelled.store(true, Ordering::SeqCst);
        let mut channels = self.channels.lock().expect("channel map poisoned");
        for (_, handle) in channels.iter_mut() {
            handle.stop.store(true, Ordering::SeqCst);
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

fn spawn_consume_loop<C: EventConsumer + 'static>(
    mut consumer: C,
    channel: String,
    handler: MessageHandler,
    stop: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    commit_period: u64,
    poll_timeout: Duration,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("consume-{channel}"))
        .spawn(move || {
            let mut since_commit = 0u64;

            while !cancelled.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
                match consumer.poll(poll_timeout) {
                    Ok(None) => continue,
                    Ok(Some(ConsumerEvent::Message(message))) => {
                        // Handler failures must not stop consumption:
                        // availability of the loop outranks one bad message.
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            handler(&message.topic, &message.payload)
                        }));
                        if outcome.is_err() {
                            error!(
                                channel = channel.as_str(),
                                offset = message.offset,
                                "message handler panicked"
                            );
                        }

                        since_commit += 1;
                        if since_commit >= commit_period {
                            since_commit = 0;
                            if let Err(err) = consumer.commit() {
                                error!(channel = channel.as_str(), error = %err, "commit error");
                            }
                        }
                    }
                    Ok(Some(ConsumerEvent::EndOfStream { topic, partition })) => {
                        trace!(
                            topic = topic.as_str(),
                            partition,
                            "reached end of stream"
                        );
                    }
                    Ok(Some(ConsumerEvent::Assigned(partitions))) => {
                        info!(channel = channel.as_str(), ?partitions, "partitions assigned");
                    }
                    Ok(Some(ConsumerEvent::Revoked(partitions))) => {
                        info!(channel = channel.as_str(), ?partitions, "partitions revoked");
                    }
                    Err(err) => {
                        error!(channel = channel.as_str(), error = %err, "consume error");
                    }
                }
            }

            consumer.unsubscribe();
            debug!(channel = channel.as_str(), "consumer closed");
        })
        .expect("failed to spawn consumer thread")
}
