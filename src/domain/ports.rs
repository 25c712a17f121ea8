use crate::domain::model::{DamageImage, DataPackage, PackageRecord};
use crate::domain::stage::{StageKind, StageReport};
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

/// A multimodal request: subject images first, reference images after,
/// all carried by a single call.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub subject_images: &'a [DamageImage],
    pub reference_images: &'a [DamageImage],
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn vision_completion(&self, request: VisionRequest<'_>) -> Result<String>;

    async fn text_completion(&self, model: &str, system_prompt: &str, user_prompt: &str)
        -> Result<String>;
}

#[async_trait]
pub trait VehicleDataProvider: Send + Sync {
    async fn fetch(&self, registration: &str, package: DataPackage) -> Result<PackageRecord>;
}

/// Consumer of stage progress. Implementations only display what they get.
pub trait StageReporter: Send + Sync {
    fn stage_started(&self, stage: StageKind, status_label: &str);
    fn stage_completed(&self, stage: StageKind, report: &StageReport);
    fn stage_failed(&self, stage: StageKind, message: &str);
}
