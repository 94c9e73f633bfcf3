use super::{StatRecord, StatisticsRepository};
use crate::error::{BlinkTrackerError, Result};
use crate::events::{publish_or_log, BlinkEvent, EventBus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Display model derived from the stored history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsModel {
    pub records: Vec<StatRecord>,
    pub minutes_tracked: usize,
    pub total_blinks: u64,
    pub average_per_minute: f64,
    pub min_per_minute: Option<u32>,
    pub max_per_minute: Option<u32>,
}

impl StatisticsModel {
    pub fn from_records(records: &[StatRecord]) -> Self {
        let total_blinks: u64 = records.iter().map(|r| r.blinks as u64).sum();
        let average_per_minute = if records.is_empty() {
            0.0
        } else {
            total_blinks as f64 / records.len() as f64
        };

        Self {
            records: records.to_vec(),
            minutes_tracked: records.len(),
            total_blinks,
            average_per_minute,
            min_per_minute: records.iter().map(|r| r.blinks).min(),
            max_per_minute: records.iter().map(|r| r.blinks).max(),
        }
    }
}

/// Statistics component: records per-period blink counts and exposes history
pub struct BlinkStatistic {
    repository: Arc<dyn StatisticsRepository>,
    event_bus: Arc<EventBus>,
    models: Arc<watch::Sender<StatisticsModel>>,
    cancellation_token: CancellationToken,
    observer_task: Mutex<Option<JoinHandle<()>>>,
}

impl BlinkStatistic {
    pub fn new(
        repository: Arc<dyn StatisticsRepository>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let initial = StatisticsModel::from_records(&repository.observe().borrow());
        let (models, _) = watch::channel(initial);

        Self {
            repository,
            event_bus,
            models: Arc::new(models),
            cancellation_token,
            observer_task: Mutex::new(None),
        }
    }

    /// Start following the repository history
    pub async fn start(&self) -> Result<()> {
        let mut history = self.repository.observe();
        let models = Arc::clone(&self.models);
        let token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            // Pick up anything inserted between construction and start
            models.send_replace(StatisticsModel::from_records(&history.borrow_and_update()));

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = history.changed() => {
                        if changed.is_err() {
                            debug!("Statistics history closed");
                            break;
                        }
                        let model = StatisticsModel::from_records(&history.borrow_and_update());
                        models.send_replace(model);
                    }
                }
            }
        });

        *self.observer_task.lock().await = Some(handle);
        info!("Statistics component started");
        Ok(())
    }

    /// Record the blink count of a completed measuring period
    pub async fn on_new_blinks_value(&self, value: u32) {
        if let Err(e) = self.repository.insert(value, Utc::now()).await {
            error!("Failed to store blink statistics: {}", e);
            publish_or_log(
                &self.event_bus,
                BlinkEvent::ErrorCaught {
                    component: "statistic".to_string(),
                    error: e.to_string(),
                },
            );
        }
    }

    pub fn models(&self) -> watch::Receiver<StatisticsModel> {
        self.models.subscribe()
    }

    pub fn model(&self) -> StatisticsModel {
        self.models.borrow().clone()
    }

    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();
        if let Some(handle) = self.observer_task.lock().await.take() {
            handle.await.map_err(|e| {
                BlinkTrackerError::component("statistic", format!("observer task failed: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatisticsError;
    use crate::statistics::StatisticsStore;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::time::Duration;
    use tokio::time::timeout;

    struct FailingRepository {
        records: watch::Sender<Vec<StatRecord>>,
    }

    #[async_trait]
    impl StatisticsRepository for FailingRepository {
        async fn insert(&self, _count: u32, _date: DateTime<Utc>) -> Result<()> {
            Err(StatisticsError::Append {
                details: "disk full".to_string(),
            }
            .into())
        }

        fn observe(&self) -> watch::Receiver<Vec<StatRecord>> {
            self.records.subscribe()
        }
    }

    #[test]
    fn test_model_summary() {
        let now = Utc::now();
        let records: Vec<StatRecord> = [12, 3, 15]
            .iter()
            .map(|blinks| StatRecord {
                blinks: *blinks,
                date: now,
            })
            .collect();

        let model = StatisticsModel::from_records(&records);
        assert_eq!(model.minutes_tracked, 3);
        assert_eq!(model.total_blinks, 30);
        assert_eq!(model.average_per_minute, 10.0);
        assert_eq!(model.min_per_minute, Some(3));
        assert_eq!(model.max_per_minute, Some(15));

        let empty = StatisticsModel::from_records(&[]);
        assert_eq!(empty.average_per_minute, 0.0);
        assert_eq!(empty.min_per_minute, None);
    }

    #[tokio::test]
    async fn test_three_values_yield_three_records_in_order() {
        let event_bus = Arc::new(EventBus::new(8));
        let statistic = BlinkStatistic::new(
            Arc::new(StatisticsStore::in_memory()),
            event_bus,
            CancellationToken::new(),
        );
        statistic.start().await.unwrap();
        let mut models = statistic.models();

        statistic.on_new_blinks_value(14).await;
        statistic.on_new_blinks_value(6).await;
        statistic.on_new_blinks_value(11).await;

        let model = timeout(Duration::from_secs(1), async {
            loop {
                models.changed().await.unwrap();
                let model = models.borrow_and_update().clone();
                if model.records.len() == 3 {
                    return model;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(
            model.records.iter().map(|r| r.blinks).collect::<Vec<_>>(),
            vec![14, 6, 11]
        );
        assert!(model.records[0].date <= model.records[2].date);

        statistic.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_failure_surfaces_error_signal() {
        let event_bus = Arc::new(EventBus::new(8));
        let mut receiver = event_bus.subscribe();
        let (records, _) = watch::channel(Vec::new());
        let statistic = BlinkStatistic::new(
            Arc::new(FailingRepository { records }),
            Arc::clone(&event_bus),
            CancellationToken::new(),
        );

        statistic.on_new_blinks_value(5).await;

        match receiver.recv().await.unwrap() {
            BlinkEvent::ErrorCaught { component, error } => {
                assert_eq!(component, "statistic");
                assert!(error.contains("disk full"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(statistic.model().records.is_empty());
    }
}
