use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use busfeed::{
    Broker, BrokerConfig, Cancelled, CloseReason, DataSource, DeliveryError, FetchError, Latest,
    Poller, PollerConfig, SubscriberState,
};
use tokio_util::sync::CancellationToken;

mod common;
use common::{assert_silent, eventually, next, ChannelTransport};

fn broker(capacity: usize) -> Broker<u64> {
    Broker::new(BrokerConfig {
        capacity,
        write_timeout: Duration::from_secs(5),
    })
}

/// Источник, который возвращает номер попытки, начиная с нуля.
struct Counter(AtomicU64);

#[async_trait]
impl DataSource<u64> for Counter {
    async fn load(&self) -> Result<u64, FetchError> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Тест проверяет, что публикация без подписчиков только обновляет кэш.
#[tokio::test]
async fn test_publish_with_no_subscribers() {
    let broker = broker(4);
    assert_eq!(broker.latest(), Latest::Empty);

    broker.publish(7);

    assert_eq!(broker.latest(), Latest::Present(7));
    assert_eq!(broker.subscriber_count(), 0);
    let stats = broker.stats();
    assert_eq!(stats.publishes, 1);
    assert_eq!(stats.enqueued, 0);
    assert_eq!(stats.evictions, 0);
}

/// Тест проверяет, что каждый подписчик получает каждое сообщение ровно
/// один раз и в порядке публикации.
#[tokio::test]
async fn test_every_subscriber_gets_every_message_once() {
    let broker = broker(16);
    let cancel = CancellationToken::new();

    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (transport, rx) = ChannelTransport::<u64>::new();
        broker.subscribe(&cancel, transport);
        receivers.push(rx);
    }

    for value in 1..=5 {
        broker.publish(value);
    }

    for rx in receivers.iter_mut() {
        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(next(rx).await);
        }
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
        assert_silent(rx, Duration::from_millis(30)).await;
    }

    assert_eq!(broker.stats().enqueued, 15);
    cancel.cancel();
}

/// Тест проверяет, что опоздавший подписчик сразу получает последний
/// снимок, а затем новые.
#[tokio::test]
async fn test_late_joiner_is_seeded_immediately() {
    let broker = broker(4);
    let cancel = CancellationToken::new();
    broker.publish(1);
    broker.publish(2);

    let (transport, mut rx) = ChannelTransport::<u64>::new();
    broker.subscribe(&cancel, transport);
    assert_eq!(next(&mut rx).await, 2);

    broker.publish(3);
    assert_eq!(next(&mut rx).await, 3);
    assert_silent(&mut rx, Duration::from_millis(30)).await;
    cancel.cancel();
}

/// Тест проверяет, что опубликованный «нулевой» снимок тоже засевается.
#[tokio::test]
async fn test_zero_snapshot_is_seeded() {
    let broker: Broker<Vec<u64>> = Broker::new(BrokerConfig::default());
    let cancel = CancellationToken::new();
    broker.publish(Vec::new());

    let (transport, mut rx) = ChannelTransport::<Vec<u64>>::new();
    broker.subscribe(&cancel, transport);
    assert_eq!(next(&mut rx).await, Vec::<u64>::new());
    cancel.cancel();
}

/// Тест проверяет вытеснение медленного подписчика при ёмкости 1: здоровые
/// подписчики продолжают получать сообщения.
#[tokio::test]
async fn test_slow_consumer_is_evicted_with_capacity_one() {
    let broker = broker(1);
    let cancel = CancellationToken::new();

    let (slow, _slow_rx) = ChannelTransport::<u64>::stuck();
    let slow_sub = broker.subscribe(&cancel, slow.clone());
    let (fast, mut fast_rx) = ChannelTransport::<u64>::new();
    broker.subscribe(&cancel, fast);

    broker.publish(1);
    assert_eq!(next(&mut fast_rx).await, 1);
    eventually(|| slow_sub.state() == SubscriberState::Delivering).await;

    broker.publish(2);
    assert_eq!(next(&mut fast_rx).await, 2);
    broker.publish(3);

    let outcome = tokio::time::timeout(Duration::from_secs(1), slow_sub.wait())
        .await
        .expect("slow subscriber must be evicted");
    assert_eq!(outcome, DeliveryError::Evicted);
    assert_eq!(slow.close_reasons(), vec![CloseReason::SlowConsumer]);

    assert_eq!(next(&mut fast_rx).await, 3);
    assert_eq!(broker.subscriber_count(), 1);
    assert_eq!(broker.stats().evictions, 1);
    cancel.cancel();
}

/// Тест проверяет, что после отписки сообщения больше не доставляются, а
/// повторная отписка безопасна.
#[tokio::test]
async fn test_no_delivery_after_unsubscribe() {
    let broker = broker(4);
    let cancel = CancellationToken::new();
    let (transport, mut rx) = ChannelTransport::<u64>::new();
    let sub = broker.subscribe(&cancel, transport.clone());

    broker.publish(1);
    assert_eq!(next(&mut rx).await, 1);

    sub.unsubscribe().await;
    sub.unsubscribe().await;
    broker.publish(2);

    assert_silent(&mut rx, Duration::from_millis(50)).await;
    assert_eq!(sub.wait().await, DeliveryError::Unsubscribed);
    assert_eq!(transport.close_reasons(), vec![CloseReason::Normal]);
    assert_eq!(broker.subscriber_count(), 0);
}

/// Тест проверяет, что отключение клиента убирает его из реестра.
#[tokio::test]
async fn test_remote_disconnect_unregisters() {
    let broker = broker(4);
    let cancel = CancellationToken::new();
    let (transport, _rx) = ChannelTransport::<u64>::new();
    let sub = broker.subscribe(&cancel, transport.clone());

    transport.disconnect();
    let outcome = sub.wait().await;
    assert_eq!(outcome, DeliveryError::Disconnected);
    assert!(outcome.is_graceful());
    assert_eq!(broker.subscriber_count(), 0);
}

/// Тест проверяет сценарий с ёмкостью 1 и таймаутом записи 1 с: опрос
/// каждые 10 мс, S1 подписан до первого тика и получает каждый снимок без
/// вытеснения, S2 приходит на 25-й миллисекунде и первым получает снимок,
/// опубликованный на 20-й.
#[tokio::test(start_paused = true)]
async fn test_subscriber_joining_between_ticks_gets_latest_poll() {
    let broker = Broker::new(BrokerConfig {
        capacity: 1,
        write_timeout: Duration::from_secs(1),
    });
    let cancel = CancellationToken::new();

    let (first, mut first_rx) = ChannelTransport::<u64>::new();
    let s1 = broker.subscribe(&cancel, first);

    let poller = Arc::new(Poller::new(
        Counter(AtomicU64::new(0)),
        broker.clone(),
        PollerConfig {
            interval: Duration::from_millis(10),
        },
    ));
    let polling = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.poll(&cancel).await })
    };

    // Загрузки на 0, 10 и 20 мс дают снимки 0, 1 и 2.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let mut seen = Vec::new();
    while let Ok(value) = first_rx.try_recv() {
        seen.push(value);
    }
    assert_eq!(seen, vec![0, 1, 2]);

    let (second, mut second_rx) = ChannelTransport::<u64>::new();
    let s2 = broker.subscribe(&cancel, second);
    assert_eq!(next(&mut second_rx).await, 2);

    assert_eq!(next(&mut first_rx).await, 3);
    assert_eq!(next(&mut second_rx).await, 3);

    assert!(broker.contains(s1.id()));
    assert!(broker.contains(s2.id()));
    assert_eq!(s1.state(), SubscriberState::Delivering);
    assert_eq!(broker.stats().evictions, 0);

    cancel.cancel();
    assert_eq!(polling.await.unwrap(), Err(Cancelled));
}

/// Тест проверяет, что отмена корневого токена останавливает опрос,
/// завершает все циклы доставки и очищает реестр.
#[tokio::test]
async fn test_root_cancel_stops_everything() {
    let broker = broker(4);
    let cancel = CancellationToken::new();
    let poller = Arc::new(Poller::new(
        Counter(AtomicU64::new(0)),
        broker.clone(),
        PollerConfig {
            interval: Duration::from_millis(10),
        },
    ));
    let polling = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.poll(&cancel).await })
    };

    let mut subs = Vec::new();
    let mut transports = Vec::new();
    for _ in 0..4 {
        let (transport, _rx) = ChannelTransport::<u64>::new();
        subs.push(broker.subscribe(&cancel, transport.clone()));
        transports.push((transport, _rx));
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    cancel.cancel();
    let stopped = tokio::time::timeout(Duration::from_millis(50), polling)
        .await
        .expect("poll must stop within one tick")
        .unwrap();
    assert_eq!(stopped, Err(Cancelled));

    for sub in subs {
        assert_eq!(sub.wait().await, DeliveryError::Cancelled);
    }
    assert_eq!(broker.subscriber_count(), 0);
    for (transport, _) in &transports {
        assert_eq!(transport.close_reasons(), vec![CloseReason::GoingAway]);
    }
}

/// Тест проверяет, что публикации из нескольких задач не теряются и не
/// блокируются при конкурентных подписках.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publish_and_subscribe() {
    let broker = broker(1_000);
    let cancel = CancellationToken::new();

    let (transport, mut rx) = ChannelTransport::<u64>::new();
    broker.subscribe(&cancel, transport);

    let publishers: Vec<_> = (0..4u64)
        .map(|task| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for i in 0..50u64 {
                    broker.publish(task * 1_000 + i);
                }
            })
        })
        .collect();

    let joiners: Vec<_> = (0..8)
        .map(|_| {
            let broker = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (transport, _rx) = ChannelTransport::<u64>::new();
                broker.subscribe(&cancel, transport).id()
            })
        })
        .collect();

    for p in publishers {
        p.await.unwrap();
    }
    for j in joiners {
        j.await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..200 {
        received.push(next(&mut rx).await);
    }
    // Порядок внутри одной публикующей задачи сохраняется.
    for task in 0..4u64 {
        let own: Vec<_> = received
            .iter()
            .copied()
            .filter(|v| v / 1_000 == task)
            .collect();
        assert_eq!(own, (0..50).map(|i| task * 1_000 + i).collect::<Vec<_>>());
    }
    assert_eq!(broker.stats().publishes, 200);
    cancel.cancel();
}

/// Тест проверяет, что подписчик, пришедший во время серии публикаций,
/// получает непрерывную последовательность без повторов: снимок приходит
/// либо засевом, либо рассылкой, но не обоими путями.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_during_publish_sees_no_duplicates() {
    const LAST: u64 = 2_000;

    let broker = broker(4_096);
    let cancel = CancellationToken::new();
    broker.publish(0);

    let publisher = {
        let broker = broker.clone();
        tokio::spawn(async move {
            for value in 1..=LAST {
                broker.publish(value);
                if value % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let joiners: Vec<_> = (0..16)
        .map(|_| {
            let broker = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (transport, rx) = ChannelTransport::<u64>::new();
                broker.subscribe(&cancel, transport);
                rx
            })
        })
        .collect();

    publisher.await.unwrap();
    for joiner in joiners {
        let mut rx = joiner.await.unwrap();
        let first = next(&mut rx).await;
        let mut expected = first;
        while expected < LAST {
            expected += 1;
            assert_eq!(next(&mut rx).await, expected, "gap or duplicate after {first}");
        }
        assert_silent(&mut rx, Duration::from_millis(20)).await;
    }

    assert_eq!(broker.stats().evictions, 0);
    cancel.cancel();
}
