// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Heatwise.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! REST surface of the engine.
//!
//! Reads return copies of the current state. Writes go through the validated
//! update contracts of the core and are persisted once accepted; a rejected
//! write leaves every value as it was.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use heatwise_core::statistics::{
    CostDay, HourPattern, RatePoint, StatisticsView, Summary, UsageDay,
};
use heatwise_types::{
    DecisionReason, HeatingWindow, Mode, OverrideState, Period, RateClass, SystemSettings,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::app::AppState;
use crate::error::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/mode", get(get_mode_handler).put(put_mode_handler))
        .route(
            "/api/heating-windows",
            get(get_windows_handler).put(put_windows_handler),
        )
        .route(
            "/api/settings",
            get(get_settings_handler).put(put_settings_handler),
        )
        .route("/api/summary", get(summary_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/rates/history", get(rate_history_handler))
        .route("/api/usage/history", get(usage_history_handler))
        .route("/api/costs/history", get(cost_history_handler))
        .route("/api/patterns/history", get(patterns_handler))
        .route("/api/export", get(export_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub current_rate: Option<f64>,
    pub rate_class: Option<RateClass>,
    pub is_peak: bool,
    pub is_heating: bool,
    pub mode: Mode,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub reason: Option<DecisionReason>,
    pub relay_ok: bool,
    pub last_relay_error: Option<String>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeResponse {
    pub mode: Mode,
    pub boost_expires_at: Option<DateTime<Utc>>,
}

impl From<OverrideState> for ModeResponse {
    fn from(state: OverrideState) -> Self {
        Self {
            mode: state.mode,
            boost_expires_at: state.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
    #[serde(default)]
    pub boost_duration: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowsBody {
    pub windows: Vec<HeatingWindow>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

impl PeriodQuery {
    /// Requested period, `week` when absent.
    fn resolve(query: Result<Query<Self>, QueryRejection>) -> AppResult<Period> {
        let Query(query) = query?;
        match query.period.as_deref() {
            None | Some("") => Ok(Period::default()),
            Some(raw) => raw.parse().map_err(AppError::BadRequest),
        }
    }
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.control.status().relay_healthy {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DEGRADED")
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let settings = state.schedule.get_settings();
    let local = now.with_timezone(&state.schedule.timezone());
    let rate = state.rates.rate_at(now).map(|slot| slot.unit_rate);
    let mode = state.mode.current();
    let control = state.control.status();

    Json(StatusResponse {
        current_rate: rate,
        rate_class: rate.map(|r| settings.classify(r)),
        is_peak: settings.is_peak(local.time()),
        is_heating: control.is_heating(),
        mode: mode.mode,
        boost_expires_at: mode.expires_at,
        reason: control.reason(),
        relay_ok: control.relay_healthy,
        last_relay_error: control.last_relay_error,
        last_tick_at: control.last_tick_at,
    })
}

async fn get_mode_handler(State(state): State<AppState>) -> Json<ModeResponse> {
    Json(state.mode.current().into())
}

async fn put_mode_handler(
    State(state): State<AppState>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> AppResult<Json<ModeResponse>> {
    let Json(request) = body?;
    let mode: Mode = request.mode.parse().map_err(AppError::BadRequest)?;

    let next = state.mode.set_mode(mode, request.boost_duration, Utc::now())?;
    state.persist()?;
    state.control.request_reevaluation();

    Ok(Json(next.into()))
}

async fn get_windows_handler(State(state): State<AppState>) -> Json<WindowsBody> {
    Json(WindowsBody {
        windows: state.schedule.list_windows(),
    })
}

async fn put_windows_handler(
    State(state): State<AppState>,
    body: Result<Json<WindowsBody>, JsonRejection>,
) -> AppResult<Json<WindowsBody>> {
    let Json(request) = body?;
    state.schedule.replace_windows(request.windows)?;
    state.persist()?;

    Ok(Json(WindowsBody {
        windows: state.schedule.list_windows(),
    }))
}

async fn get_settings_handler(State(state): State<AppState>) -> Json<SystemSettings> {
    Json(state.schedule.get_settings())
}

async fn put_settings_handler(
    State(state): State<AppState>,
    body: Result<Json<SystemSettings>, JsonRejection>,
) -> AppResult<Json<SystemSettings>> {
    let Json(settings) = body?;
    state.schedule.update_settings(settings)?;
    state.persist()?;

    Ok(Json(state.schedule.get_settings()))
}

async fn summary_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<Summary>> {
    let period = PeriodQuery::resolve(query)?;
    Ok(Json(state.stats.summary(period, Utc::now())?))
}

async fn statistics_handler(State(state): State<AppState>) -> AppResult<Json<StatisticsView>> {
    Ok(Json(state.stats.statistics(Utc::now())?))
}

async fn rate_history_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<Vec<RatePoint>>> {
    let period = PeriodQuery::resolve(query)?;
    Ok(Json(state.stats.rate_history(period, Utc::now())))
}

async fn usage_history_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<Vec<UsageDay>>> {
    let period = PeriodQuery::resolve(query)?;
    Ok(Json(state.stats.usage_history(period, Utc::now())?))
}

async fn cost_history_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<Vec<CostDay>>> {
    let period = PeriodQuery::resolve(query)?;
    Ok(Json(state.stats.cost_history(period, Utc::now())?))
}

async fn patterns_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<Json<Vec<HourPattern>>> {
    let period = PeriodQuery::resolve(query)?;
    Ok(Json(state.stats.patterns(period, Utc::now())?))
}

async fn export_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let period = PeriodQuery::resolve(query)?;
    let now = Utc::now();
    let csv = state.stats.export_csv(period, now)?;

    let filename = format!("heatwise_{}_{}.csv", period, now.format("%Y%m%d_%H%M%S"));
    info!("Exporting {} decision data as {}", period, filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}
