/// Reference vocabulary loader, initialized once per process
use crate::clients::ChargingDataSource;
use crate::domain::{FilterOptions, OptionItem, ReferenceData};
use crate::errors::{ApiError, ApiResult};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

pub struct ReferenceLoader<S> {
    source: Arc<S>,
    cache: OnceCell<ReferenceData>,
}

impl<S: ChargingDataSource> ReferenceLoader<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    /// Load the vocabularies; a failed attempt leaves the cell empty for the next caller
    pub async fn load(&self) -> ApiResult<&ReferenceData> {
        self.cache
            .get_or_try_init(|| async {
                let data = self.source.fetch_reference_data().await?;
                info!(
                    operators = data.operators.len(),
                    connection_types = data.connection_types.len(),
                    "Reference data loaded"
                );
                Ok::<_, ApiError>(data)
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.initialized()
    }

    /// Sorted facet options; degrades to empty lists when loading fails
    pub async fn options(&self) -> FilterOptions {
        match self.load().await {
            Ok(data) => build_options(data),
            Err(e) => {
                error!("Reference data load error: {:?}", e);
                FilterOptions::default()
            }
        }
    }
}

pub fn build_options(data: &ReferenceData) -> FilterOptions {
    FilterOptions {
        operators: sorted(data.operators.iter().map(|i| (i.id, &i.title))),
        connection_types: sorted(data.connection_types.iter().map(|i| (i.id, &i.title))),
        levels: sorted(data.levels.iter().map(|i| (i.id, &i.title))),
        usage_types: sorted(data.usage_types.iter().map(|i| (i.id, &i.title))),
        status_types: sorted(data.status_types.iter().map(|i| (i.id, &i.title))),
    }
}

fn sorted<'a>(items: impl Iterator<Item = (i64, &'a String)>) -> Vec<OptionItem> {
    let mut options: Vec<OptionItem> = items
        .map(|(id, title)| OptionItem {
            id,
            label: title.clone(),
        })
        .collect();
    options.sort_by_cached_key(|o| o.label.to_lowercase());
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReferenceItem, StatusTypeItem};
    use crate::services::testing::FakeSource;
    use std::sync::atomic::Ordering;

    fn reference() -> ReferenceData {
        ReferenceData {
            operators: vec![
                ReferenceItem {
                    id: 7,
                    title: "zeta Charge".to_string(),
                },
                ReferenceItem {
                    id: 3,
                    title: "Albania Power".to_string(),
                },
            ],
            status_types: vec![StatusTypeItem {
                id: 50,
                title: "Operational".to_string(),
                is_operational: Some(true),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_loads_once_and_sorts_by_label() {
        let source = Arc::new(FakeSource::default());
        *source.reference.lock().unwrap() = Some(reference());
        let loader = ReferenceLoader::new(source.clone());

        let first = loader.options().await;
        let second = loader.options().await;

        assert_eq!(source.reference_calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
        let labels: Vec<_> = first.operators.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Albania Power", "zeta Charge"]);
        assert_eq!(second.status_types.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty_and_is_not_cached() {
        let source = Arc::new(FakeSource::default());
        let loader = ReferenceLoader::new(source.clone());

        let options = loader.options().await;
        assert!(options.operators.is_empty());
        assert!(!loader.is_loaded());

        *source.reference.lock().unwrap() = Some(reference());
        let options = loader.options().await;
        assert_eq!(options.operators.len(), 2);
        assert_eq!(source.reference_calls.load(Ordering::SeqCst), 2);
    }
}
