use {
    std::{collections::HashMap, sync::Arc},
    async_trait::async_trait,
    crate::error::ResolutionError,
};

/// Maps provider native topic identifiers (e.g. an ARN) to user facing topic names.
#[async_trait]
pub trait TopicResolver: Send + Sync {
    async fn resolve_topic_name(&self, provider_topic_id: &str) -> Result<String, ResolutionError>;
}

pub type BoxedTopicResolver = Arc<dyn TopicResolver>;

/// Resolver backed by a fixed inventory of provisioned topics.
#[derive(Debug, Clone, Default)]
pub struct StaticTopicResolver {
    // topic name -> provider topic id
    topics: HashMap<String, String>,
}

impl StaticTopicResolver {
    pub fn new(topics: HashMap<String, String>) -> Self {
        Self {
            topics,
        }
    }

    pub fn with_topic(mut self, name: impl Into<String>, provider_topic_id: impl Into<String>) -> Self {
        self.topics.insert(name.into(), provider_topic_id.into());
        self
    }
}

#[async_trait]
impl TopicResolver for StaticTopicResolver {
    async fn resolve_topic_name(&self, provider_topic_id: &str) -> Result<String, ResolutionError> {
        self.topics.iter()
            .find(|(_, id)| id.as_str() == provider_topic_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| ResolutionError::TopicNotFound { provider_id: provider_topic_id.to_owned() })
    }
}

pub struct UnimplementedTopicResolver;

#[async_trait]
impl TopicResolver for UnimplementedTopicResolver {
    async fn resolve_topic_name(&self, _provider_topic_id: &str) -> Result<String, ResolutionError> {
        Err(ResolutionError::Unimplemented)
    }
}
