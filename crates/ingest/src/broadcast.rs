//! 실시간 구독자 방송
//!
//! [`Broadcaster`]는 연결된 구독자 집합을 관리합니다. 구독자마다 bounded 큐가 있고,
//! 각 연결 핸들러는 자기 큐만 소비하므로 느린 구독자는 자기 큐만 채웁니다.
//!
//! # 백프레셔 정책 (disconnect-on-full)
//!
//! `publish`는 모든 구독자에게 `try_send`를 시도하며 대기하지 않습니다.
//! 큐가 가득 찼거나 수신 측이 닫힌 구독자는 집합에서 제거되고,
//! 해당 [`Subscription`]은 남은 항목을 모두 받은 뒤 스트림 끝(`None`)을 관측합니다.
//! 큐 초과로 제거된 경우 [`Subscription::evicted`]가 즉시 완료됩니다.
//!
//! 구독자 집합은 `std::sync::Mutex`로 보호되며 `.await` 동안 잠금을 유지하지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use kubewarn_core::EventDocument;
use kubewarn_core::metrics as m;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

use crate::error::IngestError;

/// 구독자 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 한 번의 `publish` 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// 큐에 넣은 구독자 수
    pub delivered: usize,
    /// 큐가 가득 차서 제거된 구독자 수
    pub dropped_full: usize,
    /// 수신 측이 이미 닫혀 제거된 구독자 수
    pub dropped_closed: usize,
}

impl PublishReport {
    /// 제거된 구독자 총수
    pub fn dropped(&self) -> usize {
        self.dropped_full + self.dropped_closed
    }
}

/// 방송기 쪽 구독자 슬롯
struct Slot {
    tx: mpsc::Sender<Arc<EventDocument>>,
    /// 큐 초과로 제거될 때 취소됨
    evicted: CancellationToken,
}

struct Shared {
    subscribers: Mutex<HashMap<SubscriberId, Slot>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    max_subscribers: usize,
    closed: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn remove(&self, id: SubscriberId) -> bool {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return false;
        };
        let removed = subscribers.remove(&id).is_some();
        if removed {
            metrics::gauge!(m::BROADCAST_SUBSCRIBERS).set(subscribers.len() as f64);
        }
        removed
    }
}

/// 실시간 구독자 방송기
///
/// 복제 비용이 작으며, 복제본은 같은 구독자 집합을 공유합니다.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    /// 새 방송기를 생성합니다.
    ///
    /// `queue_capacity`와 `max_subscribers`는 최소 1로 보정됩니다.
    pub fn new(queue_capacity: usize, max_subscribers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
                max_subscribers: max_subscribers.max(1),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// 새 구독자를 등록합니다.
    ///
    /// # Errors
    ///
    /// - `IngestError::BroadcasterClosed`: `close_all()` 이후
    /// - `IngestError::SubscriberLimit`: 구독자 수 상한 도달
    pub fn subscribe(&self) -> Result<Subscription, IngestError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(IngestError::BroadcasterClosed);
        }

        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .map_err(|_| IngestError::BroadcasterClosed)?;

        // close_all과의 경합: 잠금을 잡은 뒤 다시 확인
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(IngestError::BroadcasterClosed);
        }
        if subscribers.len() >= self.shared.max_subscribers {
            return Err(IngestError::SubscriberLimit(self.shared.max_subscribers));
        }

        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.shared.queue_capacity);
        let evicted = CancellationToken::new();
        subscribers.insert(
            id,
            Slot {
                tx,
                evicted: evicted.clone(),
            },
        );
        let count = subscribers.len();
        drop(subscribers);

        metrics::gauge!(m::BROADCAST_SUBSCRIBERS).set(count as f64);
        debug!(subscriber = %id, subscribers = count, "subscriber registered");

        Ok(Subscription {
            id,
            rx,
            evicted,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// 구독자를 제거합니다. 이미 없으면 `false`를 반환합니다.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.shared.remove(id);
        if removed {
            debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }

    /// 모든 구독자에게 문서를 전달합니다. 대기하지 않습니다.
    pub fn publish(&self, document: EventDocument) -> PublishReport {
        let document = Arc::new(document);
        let mut report = PublishReport::default();

        let Ok(mut subscribers) = self.shared.subscribers.lock() else {
            warn!("subscriber set lock poisoned, skipping publish");
            return report;
        };

        subscribers.retain(|id, slot| match slot.tx.try_send(Arc::clone(&document)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                report.dropped_full += 1;
                slot.evicted.cancel();
                warn!(
                    subscriber = %id,
                    event_id = %document.id,
                    "subscriber queue full, disconnecting"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                report.dropped_closed += 1;
                debug!(subscriber = %id, "subscriber already gone, removing");
                false
            }
        });
        let remaining = subscribers.len();
        drop(subscribers);

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::BROADCAST_PUBLISHED_TOTAL).increment(1);

        let dropped = report.dropped();
        if dropped > 0 {
            self.shared
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            metrics::counter!(m::BROADCAST_DROPPED_SUBSCRIBERS_TOTAL).increment(dropped as u64);
            metrics::gauge!(m::BROADCAST_SUBSCRIBERS).set(remaining as f64);
        }

        report
    }

    /// 모든 구독자를 해제하고 이후 구독을 거부합니다.
    ///
    /// 각 구독자는 남은 항목을 받은 뒤 스트림 끝을 관측합니다.
    pub fn close_all(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let drained = match self.shared.subscribers.lock() {
            Ok(mut subscribers) => {
                let count = subscribers.len();
                subscribers.clear();
                count
            }
            Err(_) => 0,
        };
        metrics::gauge!(m::BROADCAST_SUBSCRIBERS).set(0.0);
        debug!(subscribers = drained, "broadcaster closed");
    }

    /// 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// 누적 `publish` 호출 수
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// 누적 제거된 구독자 수 (큐 초과 또는 이미 닫힘)
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("queue_capacity", &self.shared.queue_capacity)
            .field("max_subscribers", &self.shared.max_subscribers)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 구독 핸들
///
/// 구독자 큐의 수신 측을 소유합니다. 드롭하면 구독이 해제됩니다.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<EventDocument>>,
    evicted: CancellationToken,
    shared: Weak<Shared>,
}

impl Subscription {
    /// 구독자 식별자
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// 다음 문서를 기다립니다.
    ///
    /// 방송기에서 제거되었거나 닫힌 경우, 남은 항목을 모두 받은 뒤 `None`을 반환합니다.
    pub async fn recv(&mut self) -> Option<Arc<EventDocument>> {
        self.rx.recv().await
    }

    /// 대기 없이 다음 문서를 가져옵니다.
    pub fn try_recv(&mut self) -> Option<Arc<EventDocument>> {
        self.rx.try_recv().ok()
    }

    /// 큐 초과로 방송기에서 제거되면 완료됩니다.
    ///
    /// `recv`와 달리 남은 항목을 기다리지 않으므로, 소켓 쓰기에 막힌
    /// 연결 핸들러도 즉시 연결을 정리할 수 있습니다.
    /// `close_all`이나 `unsubscribe`로 제거된 경우에는 완료되지 않습니다.
    /// 반환된 future는 구독을 빌리지 않으므로 `recv`와 함께 기다릴 수 있습니다.
    pub fn evicted(&self) -> WaitForCancellationFutureOwned {
        self.evicted.clone().cancelled_owned()
    }

    /// 큐 초과로 제거되었는지 확인합니다.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
