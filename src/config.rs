use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    clients::consumer::{ConsumerOptions, DEFAULT_PREFETCH_COUNT},
    dispatch::RedeliveryPolicy,
    models::retry::RetryConfig,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,

    pub rabbitmq_url: String,
    #[serde(default = "default_consumer_queue_name")]
    pub consumer_queue_name: String,
    #[serde(default = "default_consumer_routing_keys")]
    pub consumer_routing_keys: Vec<String>,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    pub max_delivery_attempts: Option<u32>,
    pub dead_letter_queue_name: Option<String>,

    pub database_url: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_app_name() -> String {
    "user-service".to_string()
}

fn default_consumer_queue_name() -> String {
    "user-service.events".to_string()
}

fn default_consumer_routing_keys() -> Vec<String> {
    vec!["user.*".to_string()]
}

fn default_prefetch_count() -> u16 {
    DEFAULT_PREFETCH_COUNT
}

fn default_server_port() -> u16 {
    8080
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.consumer_routing_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(anyhow!("CONSUMER_ROUTING_KEYS must not contain empty patterns"));
        }
        if self.prefetch_count == 0 {
            return Err(anyhow!("PREFETCH_COUNT must be greater than zero"));
        }
        if self.max_delivery_attempts == Some(0) {
            return Err(anyhow!("MAX_DELIVERY_ATTEMPTS must be greater than zero"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Bounded redelivery only applies when both the cap and the dead letter
    /// queue are configured.
    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        match (self.max_delivery_attempts, &self.dead_letter_queue_name) {
            (Some(max_attempts), Some(queue)) => RedeliveryPolicy::DeadLetter {
                max_attempts,
                queue: queue.clone(),
            },
            _ => RedeliveryPolicy::Requeue,
        }
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            prefetch_count: self.prefetch_count,
            consumer_tag: format!("{}-consumer", self.app_name),
            redelivery: self.redelivery_policy(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
