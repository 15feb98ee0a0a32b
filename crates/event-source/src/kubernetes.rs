//! Kubernetes API 기반 이벤트 소스
//!
//! `kube::runtime::watcher`로 list+watch를 수행하고,
//! `WatchStreamExt::default_backoff`로 전송 에러 후 무한 재시도합니다.
//! watcher 신호는 다음과 같이 [`SourceEvent`]로 변환됩니다.
//!
//! | watcher::Event      | SourceEvent            |
//! |---------------------|------------------------|
//! | `Init`              | `Resync`               |
//! | `InitApply` `Apply` | `Observed`             |
//! | `InitDone`          | `Synced`               |
//! | `Delete`            | (무시)                 |
//! | `Err(_)`            | `Disconnected(reason)` |

use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::{Api, ListParams};
use kube::runtime::{WatchStreamExt, watcher};
use kube::Client;
use kubewarn_core::WarningEvent;
use tracing::{debug, warn};

use crate::error::EventSourceError;
use crate::source::{EventFilter, EventSource, SourceEvent, SourceStream};

/// Kubernetes API 서버를 감시하는 운영용 이벤트 소스
///
/// `kube::Client`는 내부적으로 `Arc`를 공유하므로 복제 비용이 작습니다.
#[derive(Clone)]
pub struct KubeEventSource {
    client: Client,
    namespace: Option<String>,
}

impl KubeEventSource {
    /// 클러스터 내부 설정 또는 kubeconfig에서 클라이언트를 생성합니다.
    ///
    /// # Errors
    ///
    /// 설정을 찾을 수 없거나 잘못된 경우 `EventSourceError::Client`
    pub async fn try_default() -> Result<Self, EventSourceError> {
        let client = Client::try_default()
            .await
            .map_err(|e| EventSourceError::Client(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// 기존 클라이언트로 소스를 생성합니다.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace: None,
        }
    }

    /// `connect()`가 목록 권한을 확인할 네임스페이스를 지정합니다.
    ///
    /// `watch()`는 전달받은 필터의 네임스페이스를 따릅니다.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    fn api(&self, namespace: Option<&str>) -> Api<Event> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

impl EventSource for KubeEventSource {
    async fn connect(&self) -> Result<(), EventSourceError> {
        let api = self.api(self.namespace.as_deref());
        let list = api
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| EventSourceError::Connection(e.to_string()))?;
        debug!(
            resource_version = list.metadata.resource_version.as_deref().unwrap_or("-"),
            "kubernetes event api reachable"
        );
        Ok(())
    }

    fn watch(&self, filter: EventFilter) -> SourceStream {
        let api = self.api(filter.namespace.as_deref());
        let config = watcher::Config::default().fields(&filter.field_selector);

        watcher(api, config)
            .default_backoff()
            .filter_map(|item| futures::future::ready(translate(item)))
            .boxed()
    }
}

/// watcher 항목 하나를 [`SourceEvent`]로 변환합니다.
fn translate(item: Result<watcher::Event<Event>, watcher::Error>) -> Option<SourceEvent> {
    match item {
        Ok(watcher::Event::Init) => Some(SourceEvent::Resync),
        Ok(watcher::Event::InitApply(event)) | Ok(watcher::Event::Apply(event)) => {
            to_warning_event(&event).map(SourceEvent::Observed)
        }
        Ok(watcher::Event::InitDone) => Some(SourceEvent::Synced),
        Ok(watcher::Event::Delete(_)) => None,
        Err(e) => Some(SourceEvent::Disconnected(e.to_string())),
    }
}

/// Kubernetes `Event` 오브젝트를 도메인 이벤트로 변환합니다.
///
/// uid가 없으면 경고를 남기고 `None`을 반환합니다.
fn to_warning_event(event: &Event) -> Option<WarningEvent> {
    let payload = match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                name = event.metadata.name.as_deref().unwrap_or("-"),
                error = %e,
                "failed to serialize kubernetes event, skipping"
            );
            return None;
        }
    };

    let converted = WarningEvent::from_payload(payload);
    if converted.is_none() {
        warn!(
            name = event.metadata.name.as_deref().unwrap_or("-"),
            namespace = event.metadata.namespace.as_deref().unwrap_or("-"),
            "kubernetes event without metadata.uid, skipping"
        );
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn k8s_event(uid: Option<&str>, type_: &str) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some("web-7d4b9.17a".to_owned()),
                namespace: Some("default".to_owned()),
                uid: uid.map(str::to_owned),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Pod".to_owned()),
                name: Some("web-7d4b9".to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            reason: Some("BackOff".to_owned()),
            message: Some("Back-off restarting failed container".to_owned()),
            type_: Some(type_.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn apply_with_uid_becomes_observed() {
        let item = Ok(watcher::Event::Apply(k8s_event(Some("uid-1"), "Warning")));
        match translate(item) {
            Some(SourceEvent::Observed(event)) => {
                assert_eq!(event.id, "uid-1");
                assert!(event.is_warning());
                assert_eq!(event.reason(), Some("BackOff"));
                assert_eq!(event.involved_object().as_deref(), Some("default/web-7d4b9"));
            }
            other => panic!("expected Observed, got {other:?}"),
        }
    }

    #[test]
    fn init_apply_becomes_observed() {
        let item = Ok(watcher::Event::InitApply(k8s_event(Some("uid-2"), "Warning")));
        assert!(matches!(translate(item), Some(SourceEvent::Observed(_))));
    }

    #[test]
    fn payload_keeps_full_object() {
        let item = Ok(watcher::Event::Apply(k8s_event(Some("uid-3"), "Warning")));
        let Some(SourceEvent::Observed(event)) = translate(item) else {
            panic!("expected Observed");
        };
        assert_eq!(event.payload["kind"], "Event");
        assert_eq!(event.payload["message"], "Back-off restarting failed container");
    }

    #[test]
    fn event_without_uid_is_skipped() {
        let item = Ok(watcher::Event::Apply(k8s_event(None, "Warning")));
        assert!(translate(item).is_none());
    }

    #[test]
    fn normal_event_is_passed_through_for_pipeline_recheck() {
        let item = Ok(watcher::Event::Apply(k8s_event(Some("uid-4"), "Normal")));
        let Some(SourceEvent::Observed(event)) = translate(item) else {
            panic!("expected Observed");
        };
        assert!(!event.is_warning());
    }

    #[test]
    fn delete_is_ignored() {
        let item = Ok(watcher::Event::Delete(k8s_event(Some("uid-5"), "Warning")));
        assert!(translate(item).is_none());
    }

    #[test]
    fn lifecycle_signals_are_translated() {
        assert_eq!(translate(Ok(watcher::Event::Init)), Some(SourceEvent::Resync));
        assert_eq!(translate(Ok(watcher::Event::InitDone)), Some(SourceEvent::Synced));
    }

    #[test]
    fn watch_error_becomes_disconnected() {
        let item = Err(watcher::Error::NoResourceVersion);
        assert!(matches!(translate(item), Some(SourceEvent::Disconnected(_))));
    }
}
