//! Gateway process lifecycle: workers, reconnection, shutdown.

use crate::amqp::{AmqpBroker, AmqpChannel};
use crate::channel::{ConsumerSource, Deliveries, ReplyChannel};
use crate::rpc::RpcGateway;
use relay_core::config::{BrokerConfig, GatewayConfig};
use relay_core::{AppError, AppResult};
use relay_pipeline::Answerer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// First delay before reconnecting to the broker.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Runs the consume loops against the broker until shutdown.
pub struct GatewayService {
    broker: BrokerConfig,
    config: GatewayConfig,
    rpc: Arc<RpcGateway>,
}

impl GatewayService {
    pub fn new(broker: BrokerConfig, config: GatewayConfig, answerer: Arc<dyn Answerer>) -> Self {
        let rpc = Arc::new(RpcGateway::new(answerer, config.ack_mode));
        Self {
            broker,
            config,
            rpc,
        }
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Failing to connect or to open the worker channels at startup is fatal.
    /// A connection lost later is re-established with exponential backoff.
    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        let (mut broker, mut consumers) = self.connect().await?;

        tracing::info!(
            "Serving queue {} with {} worker(s), ack mode {}",
            broker.queue(),
            self.config.workers,
            self.config.ack_mode
        );

        loop {
            let result = run_workers(&self.rpc, consumers, &shutdown).await;
            broker.close().await;

            if shutdown.is_cancelled() {
                tracing::info!("Gateway stopped");
                return Ok(());
            }

            match result {
                Ok(()) => tracing::warn!("Consumers stopped, reconnecting"),
                Err(e) => tracing::warn!("Connection lost: {}", e),
            }

            (broker, consumers) = match self.reconnect(&shutdown).await {
                Some(connected) => connected,
                None => {
                    tracing::info!("Gateway stopped while reconnecting");
                    return Ok(());
                }
            };
        }
    }

    /// Connect and open every worker's consumer.
    async fn connect(&self) -> AppResult<(AmqpBroker, Vec<(AmqpChannel, Deliveries)>)> {
        let broker = AmqpBroker::connect(&self.broker).await?;

        match open_consumers(&broker, self.config.workers).await {
            Ok(consumers) => Ok((broker, consumers)),
            Err(e) => {
                broker.close().await;
                Err(e)
            }
        }
    }

    async fn reconnect(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<(AmqpBroker, Vec<(AmqpChannel, Deliveries)>)> {
        let max = Duration::from_secs(self.config.reconnect_max_secs).max(INITIAL_BACKOFF);
        let mut delay = INITIAL_BACKOFF;

        loop {
            tracing::info!("Reconnecting in {:?}", delay);

            let attempt = tokio::select! {
                _ = shutdown.cancelled() => return None,
                attempt = async {
                    tokio::time::sleep(delay).await;
                    self.connect().await
                } => attempt,
            };

            match attempt {
                Ok(connected) => {
                    tracing::info!("Reconnected to broker");
                    return Some(connected);
                }
                Err(e) => {
                    tracing::warn!("Reconnect failed: {}", e);
                    delay = next_backoff(delay, max);
                }
            }
        }
    }
}

/// Open one consumer per worker.
///
/// All consumers are open before any worker runs, so a failure here never
/// interrupts a message in flight.
pub async fn open_consumers<B: ConsumerSource>(
    source: &B,
    workers: usize,
) -> AppResult<Vec<(B::Channel, Deliveries)>> {
    let mut consumers = Vec::with_capacity(workers);

    for id in 0..workers {
        let tag = format!("relay-{}-{}", std::process::id(), id);
        consumers.push(source.open_consumer(&tag).await?);
    }

    Ok(consumers)
}

/// Run one consume loop per consumer until any of them exits.
///
/// The first worker to stop cancels its siblings; each still finishes the
/// message it is on. Returns the first error.
pub async fn run_workers<C>(
    rpc: &Arc<RpcGateway>,
    consumers: Vec<(C, Deliveries)>,
    shutdown: &CancellationToken,
) -> AppResult<()>
where
    C: ReplyChannel + 'static,
{
    let connection_scope = shutdown.child_token();
    let mut workers = JoinSet::new();

    for (id, (channel, deliveries)) in consumers.into_iter().enumerate() {
        let rpc = Arc::clone(rpc);
        let scope = connection_scope.clone();

        workers.spawn(
            async move {
                tracing::debug!("Worker started");
                let result = rpc.consume(deliveries, &channel, &scope).await;
                // Siblings share the connection; take them down too
                scope.cancel();
                result
            }
            .instrument(tracing::info_span!("worker", id)),
        );
    }

    let mut outcome = Ok(());
    while let Some(joined) = workers.join_next().await {
        let result = joined
            .map_err(|e| AppError::Other(format!("Worker task failed: {}", e)))
            .and_then(|result| result);

        if let Err(e) = result {
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
    }

    outcome
}

/// Double `current`, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InboundMessage, Reply};
    use futures::StreamExt;
    use relay_core::AckMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NeverCalled;

    #[async_trait::async_trait]
    impl Answerer for NeverCalled {
        async fn answer_text(&self, _query: &str) -> AppResult<String> {
            Err(AppError::Other("unexpected call".to_string()))
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl Answerer for Echo {
        async fn answer_text(&self, query: &str) -> AppResult<String> {
            Ok(format!("echo: {}", query))
        }
    }

    /// Records acks and published replies, shared by every channel it opens.
    #[derive(Clone, Default)]
    struct SharedLog(Arc<Mutex<Vec<String>>>);

    impl SharedLog {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ReplyChannel for SharedLog {
        async fn publish(&self, reply: &Reply) -> AppResult<()> {
            self.0.lock().unwrap().push(format!("publish {}", reply.text));
            Ok(())
        }

        async fn ack(&self, delivery_tag: u64) -> AppResult<()> {
            self.0.lock().unwrap().push(format!("ack {}", delivery_tag));
            Ok(())
        }

        async fn reject(&self, delivery_tag: u64, requeue: bool) -> AppResult<()> {
            self.0
                .lock()
                .unwrap()
                .push(format!("reject {} {}", delivery_tag, requeue));
            Ok(())
        }
    }

    /// Opens consumers with one pending message each, failing at `fail_at`.
    struct FlakySource {
        log: SharedLog,
        fail_at: usize,
        opened: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ConsumerSource for FlakySource {
        type Channel = SharedLog;

        async fn open_consumer(&self, _consumer_tag: &str) -> AppResult<(SharedLog, Deliveries)> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                return Err(AppError::BrokerConnection("channel refused".to_string()));
            }

            let message = InboundMessage::new(format!("q{}", n), n as u64).with_reply_to("replies");
            Ok((self.log.clone(), futures::stream::iter(vec![Ok(message)]).boxed()))
        }
    }

    fn rpc(answerer: Arc<dyn Answerer>) -> Arc<RpcGateway> {
        Arc::new(RpcGateway::new(answerer, AckMode::BeforeProcessing))
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let max = Duration::from_secs(30);
        let mut delay = INITIAL_BACKOFF;
        let mut seen = vec![delay.as_secs()];

        for _ in 0..6 {
            delay = next_backoff(delay, max);
            seen.push(delay.as_secs());
        }

        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test]
    async fn test_channel_failure_starts_no_worker() {
        let source = FlakySource {
            log: SharedLog::default(),
            fail_at: 1,
            opened: AtomicUsize::new(0),
        };

        let result = open_consumers(&source, 3).await;

        assert!(matches!(result, Err(AppError::BrokerConnection(_))));
        assert_eq!(source.opened.load(Ordering::SeqCst), 2);
        // The consumer opened before the failure never took a message
        assert!(source.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_workers_run_once_all_consumers_open() {
        let source = FlakySource {
            log: SharedLog::default(),
            fail_at: usize::MAX,
            opened: AtomicUsize::new(0),
        };

        let consumers = open_consumers(&source, 2).await.unwrap();
        assert_eq!(consumers.len(), 2);

        // The first worker to exit has drained its stream
        run_workers(&rpc(Arc::new(Echo)), consumers, &CancellationToken::new())
            .await
            .unwrap();

        let entries = source.log.entries();
        assert!(entries.contains(&"ack 0".to_string()) || entries.contains(&"ack 1".to_string()));
        let acks = entries.iter().filter(|e| e.starts_with("ack")).count();
        let replies = entries.iter().filter(|e| e.starts_with("publish")).count();
        assert_eq!(acks, replies);
    }

    #[tokio::test]
    async fn test_worker_error_stops_siblings() {
        let log = SharedLog::default();
        let failing: Deliveries = futures::stream::iter(vec![Err(AppError::BrokerConnection(
            "consumer cancelled".to_string(),
        ))])
        .boxed();
        let idle: Deliveries = futures::stream::pending().boxed();

        let result = run_workers(
            &rpc(Arc::new(NeverCalled)),
            vec![(log.clone(), failing), (log.clone(), idle)],
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(AppError::BrokerConnection(_))));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_startup_connection_failure_is_fatal() {
        let broker = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..BrokerConfig::default()
        };
        let service = GatewayService::new(broker, GatewayConfig::default(), Arc::new(NeverCalled));

        let result = service.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(AppError::BrokerConnection(_))));
    }
}
