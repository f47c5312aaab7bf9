use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type that always bypasses the capture-scope gate (§4.5.1). Privacy
/// flags and the app denylist still apply.
pub const CUSTOM_ACTIVITY_EVENT_TYPE: &str = "custom_activity";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BehaviorEventInputMeta {
    pub key_event_count: i64,
    pub shortcut_count: i64,
    pub scroll_count: i64,
    pub metadata_only: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BehaviorEventMouseMeta {
    pub move_distance_px: f64,
    pub click_count: i64,
    pub drag_count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BehaviorPrivacyFlags {
    pub secure_input: bool,
    pub private_context: bool,
    pub denylisted_app: bool,
    pub redacted: bool,
}

impl BehaviorPrivacyFlags {
    pub fn any_set(&self) -> bool {
        self.secure_input || self.private_context || self.denylisted_app || self.redacted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Finder,
    System,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finder => "finder",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "finder" => Self::Finder,
            _ => Self::System,
        }
    }
}

/// A single raw behavior sample before it reaches `behavior_events_v1` (§4.5.1).
#[derive(Debug, Clone)]
pub struct BehaviorEvent {
    pub event_id: String,
    pub timestamp_ms: i64,
    pub source: EventSource,
    pub event_type: String,
    pub app_bundle_id: Option<String>,
    pub window_title_hash: Option<String>,
    pub browser_host_hash: Option<String>,
    pub item_path: Option<String>,
    pub item_id: Option<i64>,
    pub input_meta: BehaviorEventInputMeta,
    pub mouse_meta: BehaviorEventMouseMeta,
    pub privacy_flags: BehaviorPrivacyFlags,
    pub attribution_confidence: f64,
    pub context_event_id: Option<String>,
    pub activity_digest: Option<String>,
}

impl BehaviorEvent {
    pub fn new(event_type: impl Into<String>, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source,
            event_type: event_type.into(),
            app_bundle_id: None,
            window_title_hash: None,
            browser_host_hash: None,
            item_path: None,
            item_id: None,
            input_meta: BehaviorEventInputMeta::default(),
            mouse_meta: BehaviorEventMouseMeta::default(),
            privacy_flags: BehaviorPrivacyFlags::default(),
            attribution_confidence: 0.0,
            context_event_id: None,
            activity_digest: None,
        }
    }

    fn normalized_event_type(&self) -> String {
        self.event_type.trim().to_lowercase()
    }
}

/// Capture-scope flags read from `settings` (§4.5.1). Each maps to a named
/// settings key, defaulting to enabled.
#[derive(Debug, Clone, Copy)]
pub struct CaptureScope {
    pub app_activity_enabled: bool,
    pub input_activity_enabled: bool,
    pub search_events_enabled: bool,
    pub window_title_hash_enabled: bool,
    pub browser_host_hash_enabled: bool,
}

impl Default for CaptureScope {
    fn default() -> Self {
        Self {
            app_activity_enabled: true,
            input_activity_enabled: true,
            search_events_enabled: true,
            window_title_hash_enabled: true,
            browser_host_hash_enabled: true,
        }
    }
}

const SEARCH_EVENT_TYPES: &[&str] = &["query_submitted", "result_open", "result_select", "result_activate"];

/// Outcome of applying the privacy/capture-scope filter chain to one event.
pub enum IntakeDecision {
    /// Drop silently; filtered for the given reason (never surfaced to callers as an error).
    Drop(&'static str),
    /// Persist, with window-title/browser-host hashes cleared per scope flags.
    Persist(BehaviorEvent),
}

/// Applies the §4.5.1 filter chain: privacy flags, app denylist, then capture-scope,
/// with `custom_activity` exempted from the capture-scope gate only.
pub fn filter_intake(
    mut event: BehaviorEvent,
    behavior_stream_enabled: bool,
    denylisted_apps: &HashSet<String>,
    scope: CaptureScope,
) -> IntakeDecision {
    if !behavior_stream_enabled {
        return IntakeDecision::Drop("behavior_stream_disabled");
    }
    if event.privacy_flags.any_set() {
        return IntakeDecision::Drop("privacy_flag_set");
    }
    if let Some(bundle_id) = event.app_bundle_id.as_deref() {
        let normalized = bundle_id.trim().to_lowercase();
        if !normalized.is_empty() && denylisted_apps.contains(&normalized) {
            return IntakeDecision::Drop("denylisted_app");
        }
    }

    let event_type = event.normalized_event_type();
    let exempt = event_type == CUSTOM_ACTIVITY_EVENT_TYPE;

    if !exempt {
        if event_type == "app_activated" && !scope.app_activity_enabled {
            return IntakeDecision::Drop("app_activity_capture_disabled");
        }
        if event_type == "input_activity" && !scope.input_activity_enabled {
            return IntakeDecision::Drop("input_activity_capture_disabled");
        }
        if event.source == EventSource::Finder
            && SEARCH_EVENT_TYPES.contains(&event_type.as_str())
            && !scope.search_events_enabled
        {
            return IntakeDecision::Drop("search_event_capture_disabled");
        }
    }

    if !scope.window_title_hash_enabled {
        event.window_title_hash = None;
    }
    if !scope.browser_host_hash_enabled {
        event.browser_host_hash = None;
    }

    IntakeDecision::Persist(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_event(event_type: &str) -> BehaviorEvent {
        BehaviorEvent::new(event_type, EventSource::Finder)
    }

    #[test]
    fn privacy_flag_drops_regardless_of_scope() {
        let mut event = base_event("app_activated");
        event.privacy_flags.secure_input = true;
        let decision = filter_intake(event, true, &HashSet::new(), CaptureScope::default());
        assert!(matches!(decision, IntakeDecision::Drop("privacy_flag_set")));
    }

    #[test]
    fn custom_activity_bypasses_scope_gate() {
        let event = base_event(CUSTOM_ACTIVITY_EVENT_TYPE);
        let scope = CaptureScope {
            app_activity_enabled: false,
            input_activity_enabled: false,
            search_events_enabled: false,
            ..CaptureScope::default()
        };
        let decision = filter_intake(event, true, &HashSet::new(), scope);
        assert!(matches!(decision, IntakeDecision::Persist(_)));
    }

    #[test]
    fn scope_disabled_drops_matching_event_type() {
        let event = base_event("app_activated");
        let scope = CaptureScope {
            app_activity_enabled: false,
            ..CaptureScope::default()
        };
        let decision = filter_intake(event, true, &HashSet::new(), scope);
        assert!(matches!(decision, IntakeDecision::Drop("app_activity_capture_disabled")));
    }

    #[test]
    fn denylisted_app_drops_even_with_exempt_event_type() {
        let mut event = base_event(CUSTOM_ACTIVITY_EVENT_TYPE);
        event.app_bundle_id = Some("com.blocked.app".to_string());
        let mut denylist = HashSet::new();
        denylist.insert("com.blocked.app".to_string());
        let decision = filter_intake(event, true, &denylist, CaptureScope::default());
        assert!(matches!(decision, IntakeDecision::Drop("denylisted_app")));
    }
}
