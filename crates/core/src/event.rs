//! 이벤트 모델 -- 파이프라인을 흐르는 Warning 이벤트
//!
//! [`WarningEvent`]는 Kubernetes가 발행한 `Event` 오브젝트 하나를 나타냅니다.
//! 시스템은 `id`(`metadata.uid`)와 `type` 필드만 해석하며,
//! 나머지 내용은 `payload`에 그대로 보관하고 재생합니다.
//!
//! [`EventDocument`]는 외부(웹소켓, REST)로 노출되는 `{id, data}` 형태입니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Warning 이벤트 타입 값 (`Event.type`)
pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Warning 이벤트만 선택하는 기본 필드 셀렉터
pub const WARNING_FIELD_SELECTOR: &str = "type=Warning";

/// Kubernetes Warning 이벤트
///
/// `id`는 Kubernetes가 부여한 불변 비즈니스 키이며,
/// 스토어의 유일성 제약이 이 값을 기준으로 동작합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningEvent {
    /// 이벤트 고유 ID (`metadata.uid`)
    pub id: String,
    /// 이벤트 분류 (`type`, 예: "Warning", "Normal")
    pub event_type: String,
    /// 직렬화된 원본 이벤트 레코드
    pub payload: serde_json::Value,
}

impl WarningEvent {
    /// 구성 요소로부터 이벤트를 생성합니다.
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// 직렬화된 Kubernetes `Event` 오브젝트에서 이벤트를 추출합니다.
    ///
    /// `metadata.uid`가 없거나 비어 있으면 `None`을 반환합니다.
    /// `type` 필드가 없으면 빈 문자열로 취급합니다.
    pub fn from_payload(payload: serde_json::Value) -> Option<Self> {
        let id = payload
            .pointer("/metadata/uid")
            .and_then(serde_json::Value::as_str)
            .filter(|uid| !uid.is_empty())?
            .to_owned();
        let event_type = payload
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Some(Self {
            id,
            event_type,
            payload,
        })
    }

    /// Warning 이벤트인지 확인합니다.
    pub fn is_warning(&self) -> bool {
        self.event_type == EVENT_TYPE_WARNING
    }

    /// 이벤트 사유 (`reason`, 예: "BackOff")
    pub fn reason(&self) -> Option<&str> {
        self.payload.get("reason").and_then(serde_json::Value::as_str)
    }

    /// 관련 오브젝트의 `namespace/name`
    pub fn involved_object(&self) -> Option<String> {
        let object = self.payload.get("involvedObject")?;
        let name = object.get("name").and_then(serde_json::Value::as_str)?;
        match object.get("namespace").and_then(serde_json::Value::as_str) {
            Some(ns) if !ns.is_empty() => Some(format!("{ns}/{name}")),
            _ => Some(name.to_owned()),
        }
    }

    /// 외부 노출용 문서로 변환합니다.
    pub fn to_document(&self) -> EventDocument {
        EventDocument {
            id: self.id.clone(),
            data: self.payload.clone(),
        }
    }

    /// 소유권을 넘기며 외부 노출용 문서로 변환합니다.
    pub fn into_document(self) -> EventDocument {
        EventDocument {
            id: self.id,
            data: self.payload,
        }
    }
}

impl fmt::Display for WarningEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WarningEvent[{}] type={} reason={} object={}",
            self.id.chars().take(8).collect::<String>(),
            self.event_type,
            self.reason().unwrap_or("-"),
            self.involved_object().as_deref().unwrap_or("-"),
        )
    }
}

/// 외부로 노출되는 이벤트 문서 (`{id, data}`)
///
/// 스토리지 내부 필드(시퀀스, 기록 시각)는 포함하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    /// 이벤트 고유 ID
    pub id: String,
    /// 원본 이벤트 레코드
    pub data: serde_json::Value,
}
