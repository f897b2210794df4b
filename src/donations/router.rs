use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::claims::Pickup;
use super::directory::DirectoryService;
use super::domain::{
    Claim, ClaimId, ClaimRequest, DonorId, Listing, ListingId, ListingStatus, ListingSubmission,
};
use super::error::{DonationError, ErrorKind};
use super::identity::{IdentityProvider, Role};
use super::search::{ListingFilter, SearchParams};
use super::service::DonationService;
use super::store::EntityStore;

type SharedService<S, D, I> = State<Arc<DonationService<S, D, I>>>;

/// Router builder exposing the listing and claim operations over JSON.
pub fn donation_router<S, D, I>(service: Arc<DonationService<S, D, I>>) -> Router
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    Router::new()
        .route(
            "/listings",
            post(create_listing_handler::<S, D, I>).get(list_listings_handler::<S, D, I>),
        )
        .route("/listings/search", get(search_handler::<S, D, I>))
        .route("/listings/:listing_id", get(listing_handler::<S, D, I>))
        .route(
            "/listings/:listing_id/transition",
            post(transition_handler::<S, D, I>),
        )
        .route("/listings/:listing_id/cancel", post(cancel_handler::<S, D, I>))
        .route("/listings/:listing_id/pickup", post(pickup_handler::<S, D, I>))
        .route(
            "/listings/:listing_id/claims",
            get(listing_claims_handler::<S, D, I>),
        )
        .route("/claims", post(submit_claim_handler::<S, D, I>))
        .route("/claims/:claim_id", get(claim_handler::<S, D, I>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DonorTarget {
    pub(crate) donor_id: DonorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionRequest {
    pub(crate) from: ListingStatus,
    pub(crate) to: ListingStatus,
}

impl IntoResponse for DonationError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Unavailable => {
                error!(error = %self, "donation backend unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let payload = json!({
            "error": self.to_string(),
            "kind": kind.label(),
        });
        (status, Json(payload)).into_response()
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub(crate) async fn create_listing_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    headers: HeaderMap,
    Query(target): Query<DonorTarget>,
    Json(submission): Json<ListingSubmission>,
) -> Result<(StatusCode, Json<Listing>), DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    service.authorize(bearer_token(&headers), Role::Donor)?;
    let listing = service
        .listings()
        .create_listing(target.donor_id, submission)?;
    Ok((StatusCode::CREATED, Json(listing)))
}

pub(crate) async fn list_listings_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
) -> Result<Json<Vec<Listing>>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(service.listings().all()?))
}

pub(crate) async fn search_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Listing>>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    let filter = ListingFilter::from_params(params)?;
    Ok(Json(service.search().search(&filter)?))
}

pub(crate) async fn listing_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    Path(listing_id): Path<u64>,
) -> Result<Json<Listing>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(service.listings().get(ListingId(listing_id))?))
}

pub(crate) async fn transition_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Listing>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    service.authorize(bearer_token(&headers), Role::Donor)?;
    let listing =
        service
            .listings()
            .transition(ListingId(listing_id), request.from, request.to)?;
    Ok(Json(listing))
}

pub(crate) async fn cancel_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
) -> Result<Json<Listing>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    service.authorize(bearer_token(&headers), Role::Donor)?;
    Ok(Json(service.listings().cancel(ListingId(listing_id))?))
}

pub(crate) async fn pickup_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
) -> Result<Json<Pickup>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    service.authorize(bearer_token(&headers), Role::Ngo)?;
    Ok(Json(service.claims().confirm_pickup(ListingId(listing_id))?))
}

pub(crate) async fn listing_claims_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    Path(listing_id): Path<u64>,
) -> Result<Json<Vec<Claim>>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(
        service.claims().claims_for_listing(ListingId(listing_id))?,
    ))
}

pub(crate) async fn submit_claim_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    headers: HeaderMap,
    Json(request): Json<ClaimRequest>,
) -> Result<(StatusCode, Json<Claim>), DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    service.authorize(bearer_token(&headers), Role::Ngo)?;
    let claim = service.claims().submit_claim(request)?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub(crate) async fn claim_handler<S, D, I>(
    State(service): SharedService<S, D, I>,
    Path(claim_id): Path<u64>,
) -> Result<Json<Claim>, DonationError>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(service.claims().claim(ClaimId(claim_id))?))
}
