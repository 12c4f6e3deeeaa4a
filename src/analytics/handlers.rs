use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{debug, instrument};

use super::dto::{DailyTotals, DateRange, NutritionSeries, RangeQuery};
use super::services::aggregate;
use crate::{error::AppError, state::AppState};

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/nutrition", get(nutrition_series))
        .route("/analytics/nutrition/daily", get(nutrition_daily))
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<Date>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(Some)
        .map_err(|_| AppError::Validation(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

fn parse_range(q: &RangeQuery) -> Result<DateRange, AppError> {
    let range = DateRange {
        from: parse_date("from", q.from.as_deref())?,
        to: parse_date("to", q.to.as_deref())?,
    };
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(AppError::Validation("from is after to".into()));
        }
    }
    Ok(range)
}

async fn daily_totals(state: &AppState, q: &RangeQuery) -> Result<Vec<DailyTotals>, AppError> {
    let range = parse_range(q)?;
    let snapshots = state.store.nutrition_by_entry().await?;
    let days = aggregate(snapshots.values(), &range, OffsetDateTime::now_utc());
    debug!(snapshots = snapshots.len(), days = days.len(), "nutrition aggregated");
    Ok(days)
}

/// GET /analytics/nutrition?from=YYYY-MM-DD&to=YYYY-MM-DD
#[instrument(skip(state))]
pub async fn nutrition_series(
    State(state): State<AppState>,
    q: Result<Query<RangeQuery>, QueryRejection>,
) -> Result<Json<NutritionSeries>, AppError> {
    let Query(q) = q?;
    Ok(Json(daily_totals(&state, &q).await?.into()))
}

#[instrument(skip(state))]
pub async fn nutrition_daily(
    State(state): State<AppState>,
    q: Result<Query<RangeQuery>, QueryRejection>,
) -> Result<Json<Vec<DailyTotals>>, AppError> {
    let Query(q) = q?;
    Ok(Json(daily_totals(&state, &q).await?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use time::macros::datetime;
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    async fn get_json(app: Router, uri: &str) -> (u16, serde_json::Value) {
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn seeded() -> AppState {
        let state = AppState::fake();
        for (ts, text) in [
            (datetime!(2024-01-01 08:00 +08:00), "熱量：300大卡，脂肪：5公克"),
            (datetime!(2024-01-01 19:00 +08:00), "熱量：500大卡，脂肪：7公克"),
            (datetime!(2024-01-02 12:00 +08:00), "熱量：400大卡"),
        ] {
            let e = state
                .store
                .create_entry("x.jpg".into(), "u".into(), ts)
                .await
                .unwrap();
            state.store.record_analysis(e.id, text, "").await.unwrap();
        }
        state
    }

    #[tokio::test]
    async fn series_over_covering_range() {
        let app = build_app(seeded().await);
        let (status, body) =
            get_json(app, "/api/v1/analytics/nutrition?from=2024-01-01&to=2024-01-31").await;
        assert_eq!(status, 200);
        assert_eq!(body["dates"], serde_json::json!(["01/01", "01/02"]));
        assert_eq!(body["calories"], serde_json::json!([800, 400]));
        assert_eq!(body["fat"], serde_json::json!([12, 0]));
    }

    #[tokio::test]
    async fn daily_records_use_iso_dates() {
        let app = build_app(seeded().await);
        let (_, body) = get_json(app, "/api/v1/analytics/nutrition/daily?to=2024-01-01").await;
        let days = body.as_array().unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0]["date"], "2024-01-01");
        assert_eq!(days[0]["entries"], 2);
    }

    #[tokio::test]
    async fn bad_dates_are_rejected() {
        let app = build_app(AppState::fake());
        let (status, body) = get_json(app.clone(), "/api/v1/analytics/nutrition?from=01/02").await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) =
            get_json(app.clone(), "/api/v1/analytics/nutrition?from=2024-02-01&to=2024-01-01").await;
        assert_eq!(status, 400);

        // repeated key fails query deserialization itself
        let (status, body) =
            get_json(app, "/api/v1/analytics/nutrition/daily?from=2024-01-01&from=2024-01-02").await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[test]
    fn blank_bounds_are_open() {
        let range = parse_range(&RangeQuery {
            from: Some(" ".into()),
            to: None,
        })
        .unwrap();
        assert_eq!(range, DateRange::default());
    }
}
