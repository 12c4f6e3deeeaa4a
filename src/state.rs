use crate::analysis::{AnalysisClient, OpenAiClient};
use crate::config::{AppConfig, ImageBackend};
use crate::nutrition::RegexExtractor;
use crate::records::RecordStore;
use crate::storage::{ImageStore, LocalImageStore, S3ImageStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<RecordStore>,
    pub analyzer: Arc<dyn AnalysisClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let images = match config.image_backend {
            ImageBackend::Local => Arc::new(
                LocalImageStore::new(config.upload_dir.clone(), &config.public_base_url)
                    .await
                    .context("open upload dir")?,
            ) as Arc<dyn ImageStore>,
            ImageBackend::S3 => {
                let s3 = config.s3.as_ref().context("s3 backend without s3 config")?;
                Arc::new(S3ImageStore::new(s3).await?) as Arc<dyn ImageStore>
            }
        };

        let store = RecordStore::open(&config.data_dir, images, Arc::new(RegexExtractor))
            .await
            .context("open record store")?;
        match store.sweep_orphans().await {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "startup orphan sweep"),
            Err(e) => warn!(error = %e, "startup orphan sweep failed"),
        }

        let analyzer = Arc::new(OpenAiClient::new(&config.analysis)?) as Arc<dyn AnalysisClient>;

        Ok(Self {
            config,
            store: Arc::new(store),
            analyzer,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::records::repo_types::{
            DeletionTable, EntryTable, NutritionTable, SupplementTable,
        };
        use crate::storage::MemoryImageStore;
        use crate::tables::MemoryTable;

        let store = RecordStore::new(
            Arc::new(MemoryTable::<EntryTable>::default()),
            Arc::new(MemoryTable::<SupplementTable>::default()),
            Arc::new(MemoryTable::<NutritionTable>::default()),
            Arc::new(MemoryTable::<DeletionTable>::default()),
            Arc::new(MemoryImageStore::default()),
            Arc::new(RegexExtractor),
        );
        Self::from_store(Arc::new(store), Arc::new(ScriptedAnalyzer(Ok(FAKE_ANALYSIS))))
    }

    #[cfg(test)]
    pub fn fake_with_failing_analyzer(store: Arc<RecordStore>) -> Self {
        Self::from_store(store, Arc::new(ScriptedAnalyzer(Err("quota exceeded"))))
    }

    #[cfg(test)]
    fn from_store(store: Arc<RecordStore>, analyzer: Arc<dyn AnalysisClient>) -> Self {
        use crate::config::AnalysisConfig;

        let config = Arc::new(AppConfig {
            data_dir: "fake".into(),
            upload_dir: "fake".into(),
            public_base_url: "https://fake.local".into(),
            image_backend: ImageBackend::Local,
            s3: None,
            analysis: AnalysisConfig {
                api_key: "test".into(),
                base_url: "https://fake.local/v1".into(),
                model: "test".into(),
                timeout_secs: 5,
            },
            utc_offset: time::UtcOffset::from_hms(8, 0, 0).expect("valid offset"),
        });
        Self {
            config,
            store,
            analyzer,
        }
    }
}

#[cfg(test)]
pub const FAKE_ANALYSIS: &str = "1. 食物項目：白飯、滷雞腿、燙青菜\n\
3. 總熱量：650 大卡\n\
熱量：650大卡，碳水化合物：85公克，蛋白質：35公克，脂肪：18公克";

#[cfg(test)]
struct ScriptedAnalyzer(Result<&'static str, &'static str>);

#[cfg(test)]
#[axum::async_trait]
impl AnalysisClient for ScriptedAnalyzer {
    async fn analyze(&self, _image_url: &str, _instruction: &str) -> anyhow::Result<String> {
        match self.0 {
            Ok(text) => Ok(text.to_string()),
            Err(msg) => anyhow::bail!(msg),
        }
    }
}
