//! Bridge route handlers.

use axum::extract::{Query, State};
use axum::Json;
use tracing::{debug, info};

use cryptonite_core::{DecisionEngine, Directive, PendingLookup, Tab};

use crate::error::{BridgeError, Result};
use crate::models::{
    EventResponse, HistoryQuery, HistoryResponse, InboundEvent, RefreshSubscriptionRequest,
    SubscriptionResponse,
};
use crate::state::AppState;

/// POST /api/events - Apply a browser event and return the resulting directives.
///
/// The response carries the directives this event produced, after any
/// left behind by the trial timer.
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<EventResponse>> {
    let mut produced = Vec::new();

    match event {
        InboundEvent::TabUpdated {
            tab,
            status,
            url_changed,
        } => {
            state.queue.upsert_tab(tab.clone());
            let check = run_engine(&state, &mut produced, |engine| {
                engine.on_tab_updated(&tab, status, url_changed)
            })
            .await;

            if let Some(pending) = check.into_lookup() {
                resolve_tab_lookup(&state, &mut produced, pending).await;
            }
        }
        InboundEvent::TabRemoved { tab_id } => {
            debug!(tab_id, "Tab removed");
            state.queue.remove_tab(tab_id);
            run_engine(&state, &mut produced, |engine| engine.on_tab_removed(tab_id)).await;
        }
        InboundEvent::Installed { reason, tabs } => {
            sync_tabs(&state, tabs);
            let lookups = run_engine(&state, &mut produced, |engine| engine.on_installed(reason)).await;
            for pending in lookups {
                resolve_tab_lookup(&state, &mut produced, pending).await;
            }
        }
        InboundEvent::Startup { tabs } => {
            info!("Browser started");
            sync_tabs(&state, tabs);
            run_engine(&state, &mut produced, |engine| engine.on_startup()).await;
        }
        InboundEvent::Message { sender, message } => {
            let sender_id = sender.as_ref().map(|t| t.id);
            if let Some(tab) = sender {
                state.queue.upsert_tab(tab);
            }

            let lookups = run_engine(&state, &mut produced, |engine| {
                engine.handle_message(sender_id, message)
            })
            .await;
            for lookup in lookups {
                let result = state.api.check_url(lookup.request.clone()).await;
                run_engine(&state, &mut produced, |engine| {
                    engine.complete_link_check(lookup, result)
                })
                .await;
            }
        }
        InboundEvent::InstallBannerTab { tab_id } => {
            run_engine(&state, &mut produced, |engine| engine.show_install_banner(tab_id)).await;
        }
    }

    let mut directives = state.queue.drain();
    directives.extend(produced);
    Ok(Json(EventResponse { directives }))
}

/// Runs `f` on the engine and keeps the directives it produced for this request.
async fn run_engine<R>(
    state: &AppState,
    produced: &mut Vec<Directive>,
    f: impl FnOnce(&mut DecisionEngine) -> R,
) -> R {
    let mut engine = state.engine.lock().await;
    let (result, directives) = state.queue.capture(|| f(&mut *engine));
    produced.extend(directives);
    result
}

/// Runs the remote lookup without holding the engine.
async fn resolve_tab_lookup(state: &AppState, produced: &mut Vec<Directive>, pending: PendingLookup) {
    let result = state.api.check_url(pending.request.clone()).await;
    run_engine(state, produced, |engine| {
        engine.complete_tab_check(pending, result);
    })
    .await;
}

fn sync_tabs(state: &AppState, tabs: Vec<Tab>) {
    for tab in tabs {
        state.queue.upsert_tab(tab);
    }
}

/// GET /api/history - Recently verified sites, newest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    if query.limit == Some(0) {
        return Err(BridgeError::BadRequest("limit must be positive".to_string()));
    }

    let entries = state.engine.lock().await.history(query.limit);
    Ok(Json(HistoryResponse { entries }))
}

/// GET /api/subscription - Current subscription status.
pub async fn get_subscription(State(state): State<AppState>) -> Result<Json<SubscriptionResponse>> {
    let engine = state.engine.lock().await;
    Ok(Json(subscription_response(&engine)))
}

/// POST /api/subscription/refresh - Re-run the purchase lookup.
pub async fn refresh_subscription(
    State(state): State<AppState>,
    Json(req): Json<RefreshSubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>> {
    let gate = {
        let engine = state.engine.lock().await;
        if let Some(id) = req.subscription_id.as_deref() {
            if id.trim().is_empty() {
                return Err(BridgeError::BadRequest(
                    "subscriptionId must not be empty".to_string(),
                ));
            }
            engine.gate().set_subscription_id(id.trim());
        }
        engine.gate().clone()
    };

    let paid = gate.refresh_purchases(state.api.as_ref()).await;
    info!(paid, "Purchase lookup finished");

    let engine = state.engine.lock().await;
    Ok(Json(subscription_response(&engine)))
}

fn subscription_response(engine: &DecisionEngine) -> SubscriptionResponse {
    let status = engine.subscription_status();
    SubscriptionResponse {
        status,
        can_use_extension: status.can_use_extension(),
        subscription_id: engine.gate().subscription_id(),
    }
}
