// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request Buffer (spec.md §4.4): a bounded, priority-ordered queue of
//! [`PendingRequest`]s held while no tunnel is usable, drained on a fixed
//! interval and whenever the Supervisor reports `connected`/`switched`.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::BufferConfig,
    collaborators::Clock,
    error::{BufferError, FacadeError},
    events::{Event, EventBus},
    facade::{HttpResponse, PendingRequest, RequestExecutor},
    model::buffered_request::{BufferPriority, BufferSortKey, BufferedRequest, BufferedRequestId},
    sync::Mutex,
};

struct QueueState {
    items: VecDeque<BufferedRequest>,
    next_sequence: u64,
}

fn sort_key(req: &BufferedRequest, config: &BufferConfig) -> BufferSortKey {
    BufferSortKey {
        neg_weight: -(req.priority.weight(&config.priority_weights) as i64),
        enqueued_at_ms: req.enqueued_at_ms,
        sequence: req.sequence,
    }
}

/// Inserts `req` at the position its [`BufferSortKey`] demands, preserving
/// the existing order of everything already queued.
fn insert_sorted(items: &mut VecDeque<BufferedRequest>, req: BufferedRequest, config: &BufferConfig) {
    let key = sort_key(&req, config);
    let pos = items.iter().position(|existing| sort_key(existing, config) > key).unwrap_or(items.len());
    items.insert(pos, req);
}

pub struct RequestBuffer {
    queue: Mutex<QueueState>,
    config: BufferConfig,
    executor: Arc<dyn RequestExecutor>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    disabled: AtomicBool,
    base_url: String,
}

impl RequestBuffer {
    pub fn new(
        config: BufferConfig,
        executor: Arc<dyn RequestExecutor>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(QueueState { items: VecDeque::new(), next_sequence: 0 }),
            config,
            executor,
            events,
            clock,
            disabled: AtomicBool::new(false),
            base_url: base_url.into(),
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.queue.acquire().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Holds `req` until it is drained, times out, or is evicted by the
    /// overflow policy; resolves once one of those happens (spec.md §4.4).
    pub async fn enqueue(
        self: &Arc<Self>,
        req: PendingRequest,
        priority: BufferPriority,
    ) -> Result<HttpResponse, FacadeError> {
        let (tx, rx) = oneshot::channel();
        let now = self.clock.now_ms();
        let id;
        {
            let mut state = self.queue.acquire().await;
            if state.items.len() >= self.config.max_size {
                evict_one(&mut state.items, BufferError::Overflow);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            id = BufferedRequestId::new();
            let buffered = BufferedRequest {
                id,
                priority,
                enqueued_at_ms: now,
                sequence,
                retry_count: 0,
                max_retries: self.config.max_retries,
                fulfillment: Some(tx),
                executor: req,
            };
            insert_sorted(&mut state.items, buffered, &self.config);
        }
        self.spawn_timeout(id);

        rx.await.unwrap_or_else(|_| Err(FacadeError::Other("buffered request dropped".to_string())))
    }

    fn spawn_timeout(self: &Arc<Self>, id: BufferedRequestId) {
        let buffer = self.clone();
        let timeout = self.config.timeout;
        tokio::spawn(async move {
            buffer.clock.sleep(timeout).await;
            buffer.evict_by_id(id, FacadeError::Other(BufferError::Timeout.to_string())).await;
        });
    }

    async fn evict_by_id(&self, id: BufferedRequestId, err: FacadeError) {
        let mut state = self.queue.acquire().await;
        if let Some(pos) = state.items.iter().position(|r| r.id == id) {
            if let Some(mut req) = state.items.remove(pos) {
                if let Some(tx) = req.fulfillment.take() {
                    let _ = tx.send(Err(err));
                }
            }
        }
    }

    /// Spawns the auto-drainer: wakes on `processingInterval` and on every
    /// `connected`/`disconnected`/`switched` event.
    pub fn spawn_drain_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let buffer = self.clone();
        let mut events = self.events.subscribe();
        let interval = self.config.processing_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = buffer.clock.sleep(interval) => {
                        buffer.drain().await;
                    },
                    received = events.recv() => {
                        match received {
                            Ok(Event::Disconnected(_)) => {
                                buffer.disabled.store(true, Ordering::SeqCst);
                            },
                            Ok(Event::Connected(_)) | Ok(Event::Switched(_)) => {
                                buffer.disabled.store(false, Ordering::SeqCst);
                                buffer.drain().await;
                            },
                            Ok(_) => {},
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {},
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    }

    /// Drains the queue head-to-tail while enabled: executes each request,
    /// resolving on success, retrying at the head on a retryable failure, or
    /// resolving with an error once its retry budget is spent.
    async fn drain(&self) {
        loop {
            if self.is_disabled() {
                return;
            }
            let mut req = {
                let mut state = self.queue.acquire().await;
                match state.items.pop_front() {
                    Some(r) => r,
                    None => return,
                }
            };

            match self.executor.execute(&self.base_url, &req.executor).await {
                Ok(resp) => {
                    if let Some(tx) = req.fulfillment.take() {
                        let _ = tx.send(Ok(resp));
                    }
                },
                Err(e) => {
                    req.retry_count += 1;
                    if req.retry_count <= req.max_retries {
                        let mut state = self.queue.acquire().await;
                        state.items.push_front(req);
                    } else if let Some(tx) = req.fulfillment.take() {
                        let _ = tx.send(Err(FacadeError::Other(
                            format!("{}: {e}", BufferError::RetryExhausted),
                        )));
                    }
                },
            }
        }
    }
}

/// Evicts the oldest `low`-priority entry, or, failing that, the absolute
/// oldest entry, resolving it with `err` (spec.md §4.4).
fn evict_one(items: &mut VecDeque<BufferedRequest>, err: BufferError) {
    let victim = items.iter().position(|r| r.priority == BufferPriority::Low).or_else(|| {
        items
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| (r.enqueued_at_ms, r.sequence))
            .map(|(i, _)| i)
    });
    if let Some(pos) = victim {
        if let Some(mut evicted) = items.remove(pos) {
            if let Some(tx) = evicted.fulfillment.take() {
                let _ = tx.send(Err(FacadeError::Other(err.to_string())));
            }
        }
    }
}
