use crate::{HealthProbe, ProviderError};

/// Stand-in probe used when no AI tagger URL is configured.
#[derive(Debug, Default)]
pub struct DisabledTagger;

#[async_trait::async_trait]
impl HealthProbe for DisabledTagger {
    async fn check(&self) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured("ai tagger base url".into()))
    }
}
