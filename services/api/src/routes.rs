use crate::infra::{ApiService, AppState, InMemoryDirectory, Registration};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use food_rescue::donations::{donation_router, DonationError, Donor, Ngo};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_donation_routes(
    service: Arc<ApiService>,
    directory: Arc<InMemoryDirectory>,
) -> Router {
    donation_router(service)
        .merge(directory_router(directory))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

fn directory_router(directory: Arc<InMemoryDirectory>) -> Router {
    Router::new()
        .route("/donors", get(list_donors).post(register_donor))
        .route("/ngos", get(list_ngos).post(register_ngo))
        .with_state(directory)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn register_donor(
    State(directory): State<Arc<InMemoryDirectory>>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<Donor>), DonationError> {
    let donor = directory.register_donor(registration)?;
    Ok((StatusCode::CREATED, Json(donor)))
}

async fn list_donors(
    State(directory): State<Arc<InMemoryDirectory>>,
) -> Result<Json<Vec<Donor>>, DonationError> {
    Ok(Json(directory.donors()?))
}

async fn register_ngo(
    State(directory): State<Arc<InMemoryDirectory>>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<Ngo>), DonationError> {
    let ngo = directory.register_ngo(registration)?;
    Ok((StatusCode::CREATED, Json(ngo)))
}

async fn list_ngos(
    State(directory): State<Arc<InMemoryDirectory>>,
) -> Result<Json<Vec<Ngo>>, DonationError> {
    Ok(Json(directory.ngos()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ConfiguredIdentityProvider;
    use axum::body::Body;
    use axum::http::Request;
    use food_rescue::config::AccessTokenGrant;
    use food_rescue::donations::{DonationService, MemoryEntityStore, Role};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> Router {
        let directory = Arc::new(InMemoryDirectory::default());
        let identity = ConfiguredIdentityProvider::from_grants(&[
            AccessTokenGrant {
                token: "donor-secret".to_string(),
                subject: "market@example.org".to_string(),
                role: Role::Donor,
            },
            AccessTokenGrant {
                token: "ngo-secret".to_string(),
                subject: "kitchen@example.org".to_string(),
                role: Role::Ngo,
            },
        ]);
        let service = Arc::new(DonationService::new(
            Arc::new(MemoryEntityStore::new()),
            directory.clone(),
            Arc::new(identity),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_donation_routes(service, directory).layer(Extension(state))
    }

    fn post(uri: &str, token: Option<&str>, payload: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    async fn body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration(name: &str) -> Value {
        json!({ "name": name, "city": "Durban", "contact_email": "team@example.org" })
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        let pending = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(body(ready).await["status"], "ready");
    }

    #[tokio::test]
    async fn health_and_metrics_respond() {
        let router = app(true);
        let health = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn registered_parties_can_list_and_claim() {
        let router = app(true);

        let donor = router
            .clone()
            .oneshot(post("/donors", None, registration("Harbour Bakery")))
            .await
            .unwrap();
        assert_eq!(donor.status(), StatusCode::CREATED);
        assert_eq!(body(donor).await["id"], 1);

        let ngo = router
            .clone()
            .oneshot(post("/ngos", None, registration("Soup Kitchen")))
            .await
            .unwrap();
        assert_eq!(ngo.status(), StatusCode::CREATED);

        let expires_at = chrono::Utc::now() + chrono::Duration::days(1);
        let listing = router
            .clone()
            .oneshot(post(
                "/listings?donor_id=1",
                Some("donor-secret"),
                json!({
                    "title": "Bread rolls",
                    "quantity": 120,
                    "unit": "rolls",
                    "expires_at": expires_at,
                    "city": "Durban",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(listing.status(), StatusCode::CREATED);
        let listing_id = body(listing).await["id"].clone();

        let claim = router
            .clone()
            .oneshot(post(
                "/claims",
                Some("ngo-secret"),
                json!({ "listing_id": listing_id, "ngo_id": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(claim.status(), StatusCode::CREATED);

        let ngos = router
            .oneshot(Request::get("/ngos").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body(ngos).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_for_unregistered_donor_is_rejected() {
        let response = app(true)
            .oneshot(post(
                "/listings?donor_id=7",
                Some("donor-secret"),
                json!({
                    "title": "Apples",
                    "quantity": 3,
                    "unit": "crates",
                    "expires_at": chrono::Utc::now() + chrono::Duration::days(1),
                    "city": "Durban",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
