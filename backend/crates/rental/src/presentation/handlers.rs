//! HTTP Handlers

use crate::application::config::RentalConfig;
use crate::application::inspect_token::InspectTokenUseCase;
use crate::application::issue_rental_token::{IssueRentalTokenInput, IssueRentalTokenUseCase};
use crate::application::issue_return_token::IssueReturnTokenUseCase;
use crate::application::receipt::GetReceiptUseCase;
use crate::application::redeem_token::{RedeemInput, RedeemOutput, RedeemTokenUseCase};
use crate::domain::clock::Clock;
use crate::domain::repository::RentalStore;
use crate::domain::value_objects::{Actor, TokenKind};
use crate::error::{RentalError, RentalResult};
use crate::presentation::dto::{
    GenerateRentalRequest, GenerateReturnRequest, ProcessTokenRequest, ReceiptResponse,
    RentalStartedResponse, RentalView, ReturnProcessedResponse, TokenIssuedResponse,
    TokenMetadataResponse, ValidateTokenRequest,
};
use axum::Json;
use axum::extract::{Extension, Path, State};
use kernel::id::RentalId;
use std::sync::Arc;

/// Shared state for rental handlers
#[derive(Clone)]
pub struct RentalAppState<R>
where
    R: RentalStore,
{
    pub repo: Arc<R>,
    pub config: Arc<RentalConfig>,
    pub clock: Arc<dyn Clock>,
}

impl<R> RentalAppState<R>
where
    R: RentalStore,
{
    fn redeem_use_case(&self) -> RedeemTokenUseCase<R, R, R> {
        RedeemTokenUseCase::new(
            self.repo.clone(),
            self.repo.clone(),
            self.repo.clone(),
            self.config.clone(),
            self.clock.clone(),
        )
    }
}

/// POST /api/rental/generate
pub async fn generate_rental<R>(
    State(state): State<RentalAppState<R>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<GenerateRentalRequest>,
) -> RentalResult<Json<TokenIssuedResponse>>
where
    R: RentalStore,
{
    let use_case = IssueRentalTokenUseCase::new(
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let input = IssueRentalTokenInput {
        cycle_id: req.cycle_id,
        student_id: req.student_id,
        duration_minutes: req.duration,
        location: req.location,
    };

    let issued = use_case.execute(input, actor).await?;
    Ok(Json(issued.into()))
}

/// POST /api/rental/process
pub async fn process_rental<R>(
    State(state): State<RentalAppState<R>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ProcessTokenRequest>,
) -> RentalResult<Json<RentalStartedResponse>>
where
    R: RentalStore,
{
    let input = RedeemInput {
        scanned: req.token,
        expected_kind: Some(TokenKind::Rental),
        redeemer: actor,
        return_location: None,
    };

    match state.redeem_use_case().execute(input).await? {
        RedeemOutput::RentalStarted(rental) => Ok(Json(RentalStartedResponse {
            rental: RentalView::from(&rental),
        })),
        RedeemOutput::RentalReturned(_) => Err(RentalError::Internal(
            "rental endpoint redeemed a return token".to_string(),
        )),
    }
}

/// POST /api/return/generate
pub async fn generate_return<R>(
    State(state): State<RentalAppState<R>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<GenerateReturnRequest>,
) -> RentalResult<Json<TokenIssuedResponse>>
where
    R: RentalStore,
{
    let use_case = IssueReturnTokenUseCase::new(
        state.repo.clone(),
        state.repo.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let issued = use_case.execute(req.rental_id, actor).await?;
    Ok(Json(issued.into()))
}

/// POST /api/return/process
pub async fn process_return<R>(
    State(state): State<RentalAppState<R>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ProcessTokenRequest>,
) -> RentalResult<Json<ReturnProcessedResponse>>
where
    R: RentalStore,
{
    let input = RedeemInput {
        scanned: req.token,
        expected_kind: Some(TokenKind::Return),
        redeemer: actor,
        return_location: req.location,
    };

    match state.redeem_use_case().execute(input).await? {
        RedeemOutput::RentalReturned(receipt) => {
            Ok(Json(ReturnProcessedResponse::from(&receipt)))
        }
        RedeemOutput::RentalStarted(_) => Err(RentalError::Internal(
            "return endpoint redeemed a rental token".to_string(),
        )),
    }
}

/// POST /api/qr/validate
pub async fn validate_token<R>(
    State(state): State<RentalAppState<R>>,
    Json(req): Json<ValidateTokenRequest>,
) -> RentalResult<Json<TokenMetadataResponse>>
where
    R: RentalStore,
{
    let use_case = InspectTokenUseCase::new(state.repo.clone(), state.clock.clone());
    let metadata = use_case.execute(&req.token).await?;
    Ok(Json(metadata.into()))
}

/// GET /api/rentals/{id}/receipt
pub async fn get_receipt<R>(
    State(state): State<RentalAppState<R>>,
    Extension(actor): Extension<Actor>,
    Path(rental_id): Path<RentalId>,
) -> RentalResult<Json<ReceiptResponse>>
where
    R: RentalStore,
{
    let use_case = GetReceiptUseCase::new(state.repo.clone(), state.config.clone());
    let receipt = use_case.execute(rental_id, actor).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}
