//! 수집 파이프라인 설정
//!
//! [`IngestPipelineConfig`]는 core의 [`IngestConfig`](kubewarn_core::config::IngestConfig)를
//! 타입이 있는 값으로 변환한 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use kubewarn_core::config::KubewarnConfig;
//! use kubewarn_ingest::IngestPipelineConfig;
//!
//! let core_config = KubewarnConfig::default();
//! let config = IngestPipelineConfig::from_core(&core_config.ingest)?;
//! ```

use std::fmt;
use std::str::FromStr;

use kubewarn_core::config::{IngestConfig, MAX_SUBSCRIBER_QUEUE_CAPACITY, MAX_SUBSCRIBERS};
use kubewarn_event_store::PutOutcome;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// 이미 기록된 이벤트를 다시 관측했을 때의 방송 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// 새로 기록된 이벤트만 방송
    #[default]
    InsertedOnly,
    /// 중복 관측도 방송
    Always,
}

impl PublishPolicy {
    /// `put` 결과에 따라 방송 여부를 결정합니다.
    pub fn should_publish(self, outcome: PutOutcome) -> bool {
        match self {
            Self::InsertedOnly => outcome.is_inserted(),
            Self::Always => true,
        }
    }
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertedOnly => write!(f, "inserted_only"),
            Self::Always => write!(f, "always"),
        }
    }
}

impl FromStr for PublishPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inserted_only" => Ok(Self::InsertedOnly),
            "always" => Ok(Self::Always),
            other => Err(IngestError::Config {
                field: "publish_policy".to_owned(),
                reason: format!("unknown policy '{other}' (expected inserted_only or always)"),
            }),
        }
    }
}

/// 수집 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestPipelineConfig {
    /// 방송 정책
    pub publish_policy: PublishPolicy,
    /// 구독자별 송신 큐 용량
    pub subscriber_queue_capacity: usize,
    /// 최대 동시 구독자 수
    pub max_subscribers: usize,
}

impl Default for IngestPipelineConfig {
    fn default() -> Self {
        Self {
            publish_policy: PublishPolicy::InsertedOnly,
            subscriber_queue_capacity: 64,
            max_subscribers: 1_024,
        }
    }
}

impl IngestPipelineConfig {
    /// core의 `IngestConfig`에서 설정을 생성합니다.
    pub fn from_core(core: &IngestConfig) -> Result<Self, IngestError> {
        let config = Self {
            publish_policy: core.publish_policy.parse()?,
            subscriber_queue_capacity: core.subscriber_queue_capacity,
            max_subscribers: core.max_subscribers,
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.subscriber_queue_capacity == 0
            || self.subscriber_queue_capacity > MAX_SUBSCRIBER_QUEUE_CAPACITY
        {
            return Err(IngestError::Config {
                field: "subscriber_queue_capacity".to_owned(),
                reason: format!("must be 1-{MAX_SUBSCRIBER_QUEUE_CAPACITY}"),
            });
        }
        if self.max_subscribers == 0 || self.max_subscribers > MAX_SUBSCRIBERS {
            return Err(IngestError::Config {
                field: "max_subscribers".to_owned(),
                reason: format!("must be 1-{MAX_SUBSCRIBERS}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_only_skips_duplicates() {
        let policy = PublishPolicy::InsertedOnly;
        assert!(policy.should_publish(PutOutcome::Inserted));
        assert!(!policy.should_publish(PutOutcome::AlreadyExists));
    }

    #[test]
    fn always_publishes_duplicates() {
        let policy = PublishPolicy::Always;
        assert!(policy.should_publish(PutOutcome::Inserted));
        assert!(policy.should_publish(PutOutcome::AlreadyExists));
    }

    #[test]
    fn policy_parses_and_displays() {
        for policy in [PublishPolicy::InsertedOnly, PublishPolicy::Always] {
            assert_eq!(policy.to_string().parse::<PublishPolicy>().unwrap(), policy);
        }
        assert!("sometimes".parse::<PublishPolicy>().is_err());
    }

    #[test]
    fn from_core_uses_core_values() {
        let core = IngestConfig {
            publish_policy: "always".to_owned(),
            subscriber_queue_capacity: 8,
            max_subscribers: 2,
        };
        let config = IngestPipelineConfig::from_core(&core).unwrap();
        assert_eq!(config.publish_policy, PublishPolicy::Always);
        assert_eq!(config.subscriber_queue_capacity, 8);
        assert_eq!(config.max_subscribers, 2);
    }

    #[test]
    fn from_core_default_matches_default() {
        let config = IngestPipelineConfig::from_core(&IngestConfig::default()).unwrap();
        assert_eq!(config, IngestPipelineConfig::default());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = IngestPipelineConfig {
            subscriber_queue_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subscriber_queue_capacity"));
    }

    #[test]
    fn validate_rejects_zero_subscribers() {
        let config = IngestPipelineConfig {
            max_subscribers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
