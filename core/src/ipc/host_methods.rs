use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::ipc::message::{IpcEnvelope, IpcErrorBody};
use crate::ipc::service_base;
use crate::learning::events::{filter_intake, BehaviorEvent, CaptureScope, EventSource, IntakeDecision};
use crate::learning::ranker_trait::{Ranker, TrainCycleConfig};
use crate::learning::rollout::RolloutGate;
use crate::learning::training::PromotionGateConfig;
use crate::query::QueryContext;
use crate::ranking::pipeline;
use crate::state::AppState;

const SERVICE_NAME: &str = "finder-core";

/// The host's own request-dispatch table (distinct from the clients it holds to
/// talk to the supervised workers). Reserved methods (`ping`/`shutdown`) are
/// handled first by `service_base::route`, matching how every worker answers them.
pub async fn dispatch(state: Arc<AppState>, id: u64, method: String, params: Option<Value>) -> IpcEnvelope {
    service_base::route(id, method, params, SERVICE_NAME, move |id, method, params| {
        dispatch_owned(state, id, method, params)
    })
    .await
}

async fn dispatch_owned(state: Arc<AppState>, id: u64, method: String, params: Option<Value>) -> IpcEnvelope {
    let result = match method.as_str() {
        "getHealth" => get_health(&state).await,
        "getSupervisorSnapshot" => get_supervisor_snapshot(&state).await,
        "getSetting" => get_setting(&state, params).await,
        "setSetting" => set_setting(&state, params).await,
        "recordBehaviorEvent" => record_behavior_event(&state, params).await,
        "runTrainingCycle" => run_training_cycle(&state).await,
        "search" => search(&state, params).await,
        _ => return crate::ipc::server::not_found(id, &method),
    };

    match result {
        Ok(value) => IpcEnvelope::Response { id, result: value },
        Err(err) => IpcEnvelope::Error {
            id,
            error: IpcErrorBody::new(err.ipc_code(), err.to_string()),
        },
    }
}

async fn get_health(state: &AppState) -> Result<Value, CoreError> {
    if let Some(snapshot) = state.health.latest().await {
        return Ok(serde_json::to_value(snapshot)?);
    }
    let snapshot = state.health.build_snapshot().await;
    Ok(serde_json::to_value(snapshot)?)
}

async fn get_supervisor_snapshot(state: &AppState) -> Result<Value, CoreError> {
    let snapshot = state.supervisor.service_snapshot().await;
    Ok(serde_json::to_value(snapshot)?)
}

#[derive(Deserialize)]
struct GetSettingParams {
    key: String,
}

async fn get_setting(state: &AppState, params: Option<Value>) -> Result<Value, CoreError> {
    let params: GetSettingParams = parse_params(params)?;
    let value = state.settings_repo.get(&params.key).await?;
    Ok(json!({ "key": params.key, "value": value }))
}

#[derive(Deserialize)]
struct SetSettingParams {
    key: String,
    value: String,
}

async fn set_setting(state: &AppState, params: Option<Value>) -> Result<Value, CoreError> {
    let params: SetSettingParams = parse_params(params)?;
    state.settings_repo.set(&params.key, &params.value).await?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct RecordBehaviorEventParams {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    app_bundle_id: Option<String>,
    #[serde(default)]
    item_path: Option<String>,
    #[serde(default)]
    item_id: Option<i64>,
}

async fn record_behavior_event(state: &AppState, params: Option<Value>) -> Result<Value, CoreError> {
    let params: RecordBehaviorEventParams = parse_params(params)?;
    if params.event_type.trim().is_empty() {
        return Err(CoreError::InvalidParams("event_type is required".to_string()));
    }

    let mut event = BehaviorEvent::new(params.event_type, EventSource::parse(&params.source));
    event.app_bundle_id = params.app_bundle_id;
    event.item_path = params.item_path;
    event.item_id = params.item_id;

    let stream_enabled = state.settings_repo.get_bool("behaviorStreamEnabled", true).await;
    let denylist: HashSet<String> = HashSet::new();
    let scope = CaptureScope::default();

    state.activity.record();

    match filter_intake(event, stream_enabled, &denylist, scope) {
        IntakeDecision::Drop(reason) => Ok(json!({ "persisted": false, "reason": reason })),
        IntakeDecision::Persist(event) => {
            state.behavior_repo.insert_ignore(&event).await?;
            Ok(json!({ "persisted": true }))
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    cwd_path: Option<String>,
    #[serde(default)]
    frontmost_app_bundle_id: Option<String>,
}

async fn search(state: &AppState, params: Option<Value>) -> Result<Value, CoreError> {
    let params: SearchParams = parse_params(params)?;
    if params.query.trim().is_empty() {
        return Err(CoreError::InvalidParams("query is required".to_string()));
    }

    let context = QueryContext {
        cwd_path: params.cwd_path,
        frontmost_app_bundle_id: params.frontmost_app_bundle_id,
    };

    let rollout = RolloutGate::new(state.settings_repo.clone());
    let blend_alpha = rollout.serving_blend_alpha().await;
    let ranker = state.ranker.lock().await;

    let response = pipeline::search(
        &state.supervisor,
        &state.item_repo,
        &state.training_repo,
        &*ranker as &dyn Ranker,
        blend_alpha,
        &params.query,
        &context,
    )
    .await?;

    Ok(serde_json::to_value(response)?)
}

async fn run_training_cycle(state: &AppState) -> Result<Value, CoreError> {
    let mut ranker = state.ranker.lock().await;
    let train_config = TrainCycleConfig::default();
    let gate_config = PromotionGateConfig::default();
    let result = state
        .training_cycle
        .run(&mut *ranker as &mut dyn Ranker, &train_config, &gate_config, true)
        .await?;
    Ok(json!({
        "status": result.status,
        "reason": result.reason,
        "activeLoss": result.active_loss,
        "candidateLoss": result.candidate_loss,
        "sampleCount": result.sample_count,
        "promoted": result.promoted,
        "manual": result.manual,
    }))
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, CoreError> {
    let params = params.ok_or_else(|| CoreError::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))
}
