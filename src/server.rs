use axum::{
    Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::NaiveDate;
use http::{StatusCode, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::oasis::analysis::ForecastErrorTable;
use crate::oasis::areas::{self, TacArea};
use crate::oasis::summary::{ErrorSummary, ProfileBucket, hourly_profile, weekday_profile};
use crate::oasis::{OasisClient, format_period};

/// Report names used when a request does not override them
#[derive(Debug, Clone)]
pub struct ReportQueries {
    pub forecast: String,
    pub actual: String,
}

#[derive(Clone)]
struct AppState {
    oasis_client: Arc<OasisClient>,
    queries: Arc<ReportQueries>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct PeriodQuery {
    /// First operating date (YYYY-MM-DD)
    start: NaiveDate,
    /// End of the period, exclusive (YYYY-MM-DD)
    end: NaiveDate,
    forecast_query: Option<String>,
    actual_query: Option<String>,
}

#[derive(Serialize)]
struct ForecastErrorResponse {
    tac_area: String,
    area_name: Option<String>,
    start: NaiveDate,
    end: NaiveDate,
    summary: ErrorSummary,
    hourly_profile: Vec<ProfileBucket>,
    weekday_profile: Vec<ProfileBucket>,
    rows: ForecastErrorTable,
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, message: String) -> ApiError {
    (status, Json(ApiResponse::error(message)))
}

/// Fetch both reports and merge them for the requested TAC area
async fn load_forecast_error(
    state: &AppState,
    tac_area: &str,
    query: &PeriodQuery,
) -> Result<ForecastErrorTable, ApiError> {
    if query.start >= query.end {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("start ({}) must be before end ({})", query.start, query.end),
        ));
    }

    let forecast_query = query
        .forecast_query
        .as_deref()
        .unwrap_or(state.queries.forecast.as_str());
    let actual_query = query
        .actual_query
        .as_deref()
        .unwrap_or(state.queries.actual.as_str());
    let (period_start, period_end) = format_period(query.start, query.end);

    state
        .oasis_client
        .fetch_forecast_error(
            forecast_query,
            actual_query,
            &period_start,
            &period_end,
            tac_area,
        )
        .await
        .map_err(|e| {
            error!("OASIS API error: {}", e);
            api_error(StatusCode::BAD_GATEWAY, e.to_string())
        })
}

/// GET /api/v1/forecast-error/:tac_area?start=YYYY-MM-DD&end=YYYY-MM-DD
/// Hourly forecast error with summary figures
async fn get_forecast_error(
    State(state): State<AppState>,
    Path(tac_area): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<ForecastErrorResponse>>, ApiError> {
    let table = load_forecast_error(&state, &tac_area, &query).await?;

    let response = ForecastErrorResponse {
        area_name: areas::get_tac_area(&tac_area).map(|area| area.name.to_string()),
        start: query.start,
        end: query.end,
        summary: ErrorSummary::from_table(&table),
        hourly_profile: hourly_profile(&table),
        weekday_profile: weekday_profile(&table),
        rows: table,
        tac_area,
    };

    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/v1/forecast-error/:tac_area/csv?start=YYYY-MM-DD&end=YYYY-MM-DD
/// Same rows as CSV
async fn get_forecast_error_csv(
    State(state): State<AppState>,
    Path(tac_area): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let table = load_forecast_error(&state, &tac_area, &query).await?;

    let csv = table.to_csv().map_err(|e| {
        error!("CSV export error: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}

/// GET /api/v1/tac-areas
/// List all known TAC areas
async fn list_tac_areas() -> Json<ApiResponse<Vec<&'static TacArea>>> {
    Json(ApiResponse::success(areas::list_tac_areas()))
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

fn router(oasis_client: OasisClient, queries: ReportQueries) -> Router {
    let state = AppState {
        oasis_client: Arc::new(oasis_client),
        queries: Arc::new(queries),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tac-areas", get(list_tac_areas))
        .route(
            "/api/v1/forecast-error/{tac_area}",
            get(get_forecast_error),
        )
        .route(
            "/api/v1/forecast-error/{tac_area}/csv",
            get(get_forecast_error_csv),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    oasis_client: OasisClient,
    queries: ReportQueries,
    bind: &str,
) -> anyhow::Result<()> {
    let app = router(oasis_client, queries);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Server running on http://{}", listener.local_addr()?);
    info!("Available endpoints:");
    info!("  GET /health");
    info!("  GET /api/v1/tac-areas");
    info!("  GET /api/v1/forecast-error/:tac_area?start=YYYY-MM-DD&end=YYYY-MM-DD");
    info!("  GET /api/v1/forecast-error/:tac_area/csv?start=YYYY-MM-DD&end=YYYY-MM-DD");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oasis::tests::zip_archive;
    use mockito::Matcher;
    use serde_json::Value;

    const FORECAST_CSV: &str = "TAC_AREA_NAME,OPR_DT,OPR_HR,MW\n\
PGE-TAC,2024-01-01,1,100\n\
PGE-TAC,2024-01-01,1,120\n\
PGE-TAC,2024-01-01,2,90\n";
    const ACTUAL_CSV: &str = "TAC_AREA_NAME,OPR_DT,OPR_HR,MW\n\
PGE-TAC,2024-01-01,1,100\n\
PGE-TAC,2024-01-01,2,100\n";

    async fn spawn_app(oasis_url: String) -> String {
        let app = router(
            OasisClient::with_base_url(oasis_url),
            ReportQueries {
                forecast: "SLD_FCST".to_string(),
                actual: "ACTUAL".to_string(),
            },
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: String) -> Value {
        let body = reqwest::get(url).await.unwrap().text().await.unwrap();
        serde_json::from_str(&body).unwrap()
    }

    async fn mock_oasis(server: &mut mockito::Server) -> Vec<mockito::Mock> {
        let forecast = server
            .mock("GET", "/oasisapi/SingleZip")
            .match_query(Matcher::UrlEncoded("queryname".into(), "SLD_FCST".into()))
            .with_status(200)
            .with_body(zip_archive(&[("forecast.csv", FORECAST_CSV)]))
            .create_async()
            .await;
        let actual = server
            .mock("GET", "/oasisapi/SingleZip")
            .match_query(Matcher::UrlEncoded("queryname".into(), "ACTUAL".into()))
            .with_status(200)
            .with_body(zip_archive(&[("actual.csv", ACTUAL_CSV)]))
            .create_async()
            .await;
        vec![forecast, actual]
    }

    #[tokio::test]
    async fn test_health_and_tac_areas() {
        let base = spawn_app("http://127.0.0.1:9/unused".to_string()).await;

        let health = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(health.text().await.unwrap(), "OK");

        let body = get_json(format!("{}/api/v1/tac-areas", base)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][1]["code"], "PGE-TAC");
    }

    #[tokio::test]
    async fn test_forecast_error_json() {
        let mut oasis = mockito::Server::new_async().await;
        let _mocks = mock_oasis(&mut oasis).await;
        let base = spawn_app(format!("{}/oasisapi/SingleZip", oasis.url())).await;

        let body = get_json(format!(
            "{}/api/v1/forecast-error/PGE-TAC?start=2024-01-01&end=2024-01-02",
            base
        ))
        .await;

        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["tac_area"], "PGE-TAC");
        assert_eq!(data["area_name"], "Pacific Gas & Electric");
        assert_eq!(data["rows"].as_array().unwrap().len(), 2);
        assert_eq!(data["rows"][0]["MW_forecast"], 110.0);
        assert_eq!(data["summary"]["hours"], 2);
        assert_eq!(data["summary"]["mean_absolute_error"], 10.0);
    }

    #[tokio::test]
    async fn test_unmatched_tac_area_is_empty_success() {
        let mut oasis = mockito::Server::new_async().await;
        let _mocks = mock_oasis(&mut oasis).await;
        let base = spawn_app(format!("{}/oasisapi/SingleZip", oasis.url())).await;

        let body = get_json(format!(
            "{}/api/v1/forecast-error/VEA-TAC?start=2024-01-01&end=2024-01-02",
            base
        ))
        .await;

        assert_eq!(body["success"], true);
        assert!(body["error"].is_null());
        let data = &body["data"];
        assert_eq!(data["tac_area"], "VEA-TAC");
        assert_eq!(data["rows"], Value::Array(vec![]));
        assert_eq!(data["summary"]["hours"], 0);
        assert_eq!(data["summary"]["mean_absolute_error"], 0.0);
        assert!(data["summary"]["worst_hour"].is_null());
        assert_eq!(data["hourly_profile"], Value::Array(vec![]));
        assert_eq!(data["weekday_profile"], Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_forecast_error_csv() {
        let mut oasis = mockito::Server::new_async().await;
        let _mocks = mock_oasis(&mut oasis).await;
        let base = spawn_app(format!("{}/oasisapi/SingleZip", oasis.url())).await;

        let response = reqwest::get(format!(
            "{}/api/v1/forecast-error/PGE-TAC/csv?start=2024-01-01&end=2024-01-02",
            base
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers()["content-type"], "text/csv");

        let csv = response.text().await.unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("OPR_DT,OPR_HR,MW_forecast"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let mut oasis = mockito::Server::new_async().await;
        let _mock = oasis
            .mock("GET", "/oasisapi/SingleZip")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let base = spawn_app(format!("{}/oasisapi/SingleZip", oasis.url())).await;

        let response = reqwest::get(format!(
            "{}/api/v1/forecast-error/PGE-TAC?start=2024-01-01&end=2024-01-02",
            base
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 502);

        let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_reversed_period_is_bad_request() {
        let base = spawn_app("http://127.0.0.1:9/unused".to_string()).await;

        let response = reqwest::get(format!(
            "{}/api/v1/forecast-error/PGE-TAC?start=2024-01-02&end=2024-01-01",
            base
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }
}
