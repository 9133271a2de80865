//! News publisher and channel caches
//!
//! Both caches wrap a [`CachingWrapper`] over one collection of a
//! [`NewsController`] and add the follow/subscribe mutations the news
//! settings UI needs. Mutations are optimistic: the cache changes first,
//! the controller is called second, and a failed call restores the
//! previous entry.

use crate::caching::{CachingWrapper, EntitySource};
use crate::error::Result;
use crate::types::EntityMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The user's explicit choice for a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEnabled {
    NotModified,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherType {
    /// Publisher from the combined sources list
    CombinedSource,
    /// Feed the user added by URL
    DirectSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleInfo {
    pub locale: String,
    pub channels: Vec<String>,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub publisher_id: String,
    pub publisher_name: String,
    pub category_name: String,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub publisher_type: PublisherType,
    pub locales: Vec<LocaleInfo>,
    /// Enabled by default for the user's locale
    pub is_enabled: bool,
    pub user_enabled_status: UserEnabled,
}

impl Publisher {
    /// Explicitly followed, or untouched and enabled by default
    pub fn is_followed(&self) -> bool {
        match self.user_enabled_status {
            UserEnabled::Enabled => true,
            UserEnabled::NotModified => self.is_enabled,
            UserEnabled::Disabled => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_name: String,
    pub subscribed_locales: Vec<String>,
}

impl Channel {
    pub fn is_subscribed(&self, locale: &str) -> bool {
        self.subscribed_locales.iter().any(|l| l == locale)
    }
}

/// Remote news settings controller
#[async_trait]
pub trait NewsController: Send + Sync {
    async fn get_publishers(&self) -> Result<EntityMap<Publisher>>;
    async fn set_publisher_pref(&self, publisher_id: &str, status: UserEnabled) -> Result<()>;
    async fn get_channels(&self) -> Result<EntityMap<Channel>>;
    /// Returns the channel as stored after the change
    async fn set_channel_subscribed(
        &self,
        locale: &str,
        channel_id: &str,
        subscribed: bool,
    ) -> Result<Channel>;
}

struct PublisherSource(Arc<dyn NewsController>);

#[async_trait]
impl EntitySource<Publisher> for PublisherSource {
    async fn fetch_all(&self) -> Result<EntityMap<Publisher>> {
        self.0.get_publishers().await
    }
}

struct ChannelSource(Arc<dyn NewsController>);

#[async_trait]
impl EntitySource<Channel> for ChannelSource {
    async fn fetch_all(&self) -> Result<EntityMap<Channel>> {
        self.0.get_channels().await
    }
}

/// Cache of all publishers
pub struct PublisherCache {
    cache: CachingWrapper<Publisher>,
    controller: Arc<dyn NewsController>,
}

impl PublisherCache {
    /// Starts fetching publishers; needs a tokio runtime
    pub fn new(controller: Arc<dyn NewsController>) -> Self {
        let cache = CachingWrapper::new(Arc::new(PublisherSource(Arc::clone(&controller))));
        Self { cache, controller }
    }

    pub fn cache(&self) -> &CachingWrapper<Publisher> {
        &self.cache
    }

    pub fn get(&self, publisher_id: &str) -> Option<Publisher> {
        self.cache.get(publisher_id)
    }

    /// Follow (`Enabled`) or unfollow (`Disabled`) a publisher
    pub async fn set_publisher_followed(
        &self,
        publisher_id: &str,
        followed: bool,
    ) -> Result<Publisher> {
        let status = if followed {
            UserEnabled::Enabled
        } else {
            UserEnabled::Disabled
        };
        debug!(publisher_id, ?status, "updating publisher follow state");

        let controller = Arc::clone(&self.controller);
        let id = publisher_id.to_string();
        self.cache
            .update_optimistic(
                publisher_id,
                |publisher| publisher.user_enabled_status = status,
                async move {
                    controller.set_publisher_pref(&id, status).await?;
                    Ok(None)
                },
            )
            .await
    }

    /// Followed publishers sorted by name
    pub fn followed_publishers(&self) -> Vec<Publisher> {
        let mut followed: Vec<Publisher> = self
            .cache
            .entities()
            .into_values()
            .filter(Publisher::is_followed)
            .collect();
        followed.sort_by(|a, b| a.publisher_name.cmp(&b.publisher_name));
        followed
    }
}

/// Cache of all channels
pub struct ChannelCache {
    cache: CachingWrapper<Channel>,
    controller: Arc<dyn NewsController>,
}

impl ChannelCache {
    /// Starts fetching channels; needs a tokio runtime
    pub fn new(controller: Arc<dyn NewsController>) -> Self {
        let cache = CachingWrapper::new(Arc::new(ChannelSource(Arc::clone(&controller))));
        Self { cache, controller }
    }

    pub fn cache(&self) -> &CachingWrapper<Channel> {
        &self.cache
    }

    pub fn get(&self, channel_id: &str) -> Option<Channel> {
        self.cache.get(channel_id)
    }

    /// Subscribe or unsubscribe `locale` to a channel; the controller's
    /// answer replaces the optimistic entry
    pub async fn set_channel_subscribed(
        &self,
        locale: &str,
        channel_id: &str,
        subscribed: bool,
    ) -> Result<Channel> {
        let controller = Arc::clone(&self.controller);
        let (locale_owned, id) = (locale.to_string(), channel_id.to_string());
        self.cache
            .update_optimistic(
                channel_id,
                |channel| {
                    if subscribed {
                        if !channel.is_subscribed(locale) {
                            channel.subscribed_locales.push(locale.to_string());
                        }
                    } else {
                        channel.subscribed_locales.retain(|l| l != locale);
                    }
                },
                async move {
                    let channel = controller
                        .set_channel_subscribed(&locale_owned, &id, subscribed)
                        .await?;
                    Ok(Some(channel))
                },
            )
            .await
    }

    /// Names of the channels `locale` is subscribed to, sorted
    pub fn subscribed_channels(&self, locale: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .entities()
            .into_values()
            .filter(|channel| channel.is_subscribed(locale))
            .map(|channel| channel.channel_name)
            .collect();
        names.sort();
        names
    }
}
