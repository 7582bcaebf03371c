use crate::domain::model::{Panel, RenderOptions};
use crate::sources::PanelData;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One dashboard: where its data comes from and how it is drawn.
#[async_trait]
pub trait PanelSource: Send + Sync {
    fn panel(&self) -> Panel;

    async fn fetch(&self) -> Result<PanelData>;

    fn compose(&self, data: &PanelData, options: &RenderOptions) -> Result<String>;
}
