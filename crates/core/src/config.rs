//! 설정 관리 -- kubewarn.toml 파싱 및 런타임 설정
//!
//! [`KubewarnConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`KUBEWARN_STORAGE_BACKEND=memory` 형식)
//! 3. 설정 파일 (`kubewarn.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), kubewarn_core::error::KubewarnError> {
//! use kubewarn_core::config::KubewarnConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = KubewarnConfig::load("kubewarn.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = KubewarnConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, KubewarnError};
use crate::event::WARNING_FIELD_SELECTOR;

/// 구독자 큐 용량 상한
pub const MAX_SUBSCRIBER_QUEUE_CAPACITY: usize = 65_536;

/// 동시 구독자 수 상한
pub const MAX_SUBSCRIBERS: usize = 100_000;

/// DB 커넥션 풀 크기 상한
pub const MAX_DB_CONNECTIONS: u32 = 1_000;

/// DB 연결 타임아웃 상한 (초)
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 300;

/// 웹소켓 쓰기 타임아웃 상한 (초)
pub const MAX_WRITE_TIMEOUT_SECS: u64 = 300;

/// kubewarn 통합 설정
///
/// `kubewarn.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubewarnConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Kubernetes 이벤트 소스 설정
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    /// 이벤트 스토어 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 수집 파이프라인 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// HTTP/웹소켓 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl KubewarnConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KubewarnError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    ///
    /// 검증은 오버라이드 이후에 수행해야 하므로 여기서는 하지 않습니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, KubewarnError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KubewarnError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                KubewarnError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, KubewarnError> {
        toml::from_str(toml_str).map_err(|e| {
            KubewarnError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `KUBEWARN_{SECTION}_{FIELD}`
    /// 예: `KUBEWARN_SERVER_LISTEN_ADDR=0.0.0.0:9090`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "KUBEWARN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "KUBEWARN_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "KUBEWARN_GENERAL_PID_FILE");

        // Kubernetes
        override_string(
            &mut self.kubernetes.field_selector,
            "KUBEWARN_KUBERNETES_FIELD_SELECTOR",
        );
        override_string(
            &mut self.kubernetes.namespace,
            "KUBEWARN_KUBERNETES_NAMESPACE",
        );

        // Storage
        override_string(&mut self.storage.backend, "KUBEWARN_STORAGE_BACKEND");
        override_string(
            &mut self.storage.postgres_url,
            "KUBEWARN_STORAGE_POSTGRES_URL",
        );
        override_u32(
            &mut self.storage.max_connections,
            "KUBEWARN_STORAGE_MAX_CONNECTIONS",
        );
        override_u64(
            &mut self.storage.connect_timeout_secs,
            "KUBEWARN_STORAGE_CONNECT_TIMEOUT_SECS",
        );

        // Ingest
        override_string(
            &mut self.ingest.publish_policy,
            "KUBEWARN_INGEST_PUBLISH_POLICY",
        );
        override_usize(
            &mut self.ingest.subscriber_queue_capacity,
            "KUBEWARN_INGEST_SUBSCRIBER_QUEUE_CAPACITY",
        );
        override_usize(
            &mut self.ingest.max_subscribers,
            "KUBEWARN_INGEST_MAX_SUBSCRIBERS",
        );

        // Server
        override_string(&mut self.server.listen_addr, "KUBEWARN_SERVER_LISTEN_ADDR");
        override_bool(
            &mut self.server.cors_permissive,
            "KUBEWARN_SERVER_CORS_PERMISSIVE",
        );
        override_u64(
            &mut self.server.write_timeout_secs,
            "KUBEWARN_SERVER_WRITE_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "KUBEWARN_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "KUBEWARN_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "KUBEWARN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), KubewarnError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.kubernetes.validate()?;
        self.storage.validate()?;
        self.ingest.validate()?;
        self.server.validate()?;
        self.metrics.validate()?;

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> KubewarnError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Kubernetes 이벤트 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// 서버 측 필드 셀렉터
    pub field_selector: String,
    /// 감시할 네임스페이스 (빈 문자열이면 클러스터 전체)
    pub namespace: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            field_selector: WARNING_FIELD_SELECTOR.to_owned(),
            namespace: String::new(),
        }
    }
}

impl KubernetesConfig {
    fn validate(&self) -> Result<(), KubewarnError> {
        if self.field_selector.trim().is_empty() {
            return Err(invalid(
                "kubernetes.field_selector",
                "must not be empty",
            ));
        }
        if self.namespace.chars().any(char::is_whitespace) {
            return Err(invalid(
                "kubernetes.namespace",
                "must not contain whitespace",
            ));
        }
        Ok(())
    }
}

/// 이벤트 스토어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 스토어 백엔드 (postgres, memory)
    pub backend: String,
    /// PostgreSQL 연결 문자열
    pub postgres_url: String,
    /// 커넥션 풀 최대 크기
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "postgres".to_owned(),
            postgres_url: "postgresql://localhost:5432/kubewarn".to_owned(),
            max_connections: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), KubewarnError> {
        let valid_backends = ["postgres", "memory"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(invalid(
                "storage.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if self.backend == "postgres" {
            if !(self.postgres_url.starts_with("postgres://")
                || self.postgres_url.starts_with("postgresql://"))
            {
                return Err(invalid(
                    "storage.postgres_url",
                    "must start with postgres:// or postgresql://",
                ));
            }
            if self.max_connections == 0 || self.max_connections > MAX_DB_CONNECTIONS {
                return Err(invalid(
                    "storage.max_connections",
                    format!("must be between 1 and {MAX_DB_CONNECTIONS}"),
                ));
            }
            if self.connect_timeout_secs == 0
                || self.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS
            {
                return Err(invalid(
                    "storage.connect_timeout_secs",
                    format!("must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}"),
                ));
            }
        }
        Ok(())
    }
}

/// 수집 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 이미 기록된 이벤트를 다시 방송할지 여부 (inserted_only, always)
    pub publish_policy: String,
    /// 구독자별 송신 큐 용량
    pub subscriber_queue_capacity: usize,
    /// 최대 동시 구독자 수
    pub max_subscribers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            publish_policy: "inserted_only".to_owned(),
            subscriber_queue_capacity: 64,
            max_subscribers: 1_024,
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> Result<(), KubewarnError> {
        let valid_policies = ["inserted_only", "always"];
        if !valid_policies.contains(&self.publish_policy.as_str()) {
            return Err(invalid(
                "ingest.publish_policy",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }
        if self.subscriber_queue_capacity == 0
            || self.subscriber_queue_capacity > MAX_SUBSCRIBER_QUEUE_CAPACITY
        {
            return Err(invalid(
                "ingest.subscriber_queue_capacity",
                format!("must be between 1 and {MAX_SUBSCRIBER_QUEUE_CAPACITY}"),
            ));
        }
        if self.max_subscribers == 0 || self.max_subscribers > MAX_SUBSCRIBERS {
            return Err(invalid(
                "ingest.max_subscribers",
                format!("must be between 1 and {MAX_SUBSCRIBERS}"),
            ));
        }
        Ok(())
    }
}

/// HTTP/웹소켓 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소 (`host:port`)
    pub listen_addr: String,
    /// 모든 origin을 허용하는 CORS 레이어 사용 여부
    pub cors_permissive: bool,
    /// 실시간 피드 프레임 하나를 쓰는 데 허용하는 시간 (초)
    ///
    /// 초과하면 읽지 않는 뷰어로 보고 연결을 끊습니다.
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_owned(),
            cors_permissive: true,
            write_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// 바인드 주소를 파싱합니다.
    pub fn socket_addr(&self) -> Result<SocketAddr, KubewarnError> {
        self.listen_addr
            .parse()
            .map_err(|e| invalid("server.listen_addr", format!("{e}")))
    }

    fn validate(&self) -> Result<(), KubewarnError> {
        self.socket_addr()?;
        if self.write_timeout_secs == 0 || self.write_timeout_secs > MAX_WRITE_TIMEOUT_SECS {
            return Err(invalid(
                "server.write_timeout_secs",
                format!("must be between 1 and {MAX_WRITE_TIMEOUT_SECS}"),
            ));
        }
        Ok(())
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 IP
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), KubewarnError> {
        if !self.enabled {
            return Ok(());
        }
        if self.listen_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(invalid(
                "metrics.listen_addr",
                "must be an IP address",
            ));
        }
        if self.port == 0 {
            return Err(invalid("metrics.port", "must not be 0"));
        }
        if !self.endpoint.starts_with('/') {
            return Err(invalid("metrics.endpoint", "must start with '/'"));
        }
        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}
