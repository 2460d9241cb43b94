//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, RentalId, UserId};
use serde::{Deserialize, Serialize};

use crate::application::inspect_token::TokenMetadata;
use crate::application::issue_rental_token::IssuedToken;
use crate::domain::entities::{Rental, ReturnReceipt};
use crate::domain::qr::QrPayload;
use crate::domain::value_objects::{RentalStatus, TokenKind};

/// Request for POST /api/rental/generate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRentalRequest {
    pub cycle_id: CycleId,
    pub student_id: UserId,
    /// Minutes
    pub duration: u32,
    pub location: String,
}

/// Response for POST /api/rental/generate and POST /api/return/generate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenIssuedResponse {
    pub token: String,
    /// Unix milliseconds
    pub expires_at: i64,
    pub qr: QrPayload,
}

impl From<IssuedToken> for TokenIssuedResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token.as_str().to_string(),
            expires_at: issued.expires_at_ms,
            qr: issued.qr,
        }
    }
}

/// Request for POST /api/rental/process and POST /api/return/process
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTokenRequest {
    /// Bare token or the scanned QR JSON text
    pub token: String,
    /// Drop-off point for returns
    #[serde(default)]
    pub location: Option<String>,
}

/// Rental as returned when it starts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalView {
    #[serde(rename = "_id")]
    pub id: RentalId,
    pub cycle: CycleId,
    pub student: UserId,
    pub duration: u32,
    pub location: String,
    pub status: RentalStatus,
    pub start_time: DateTime<Utc>,
    pub expected_return_time: DateTime<Utc>,
}

impl From<&Rental> for RentalView {
    fn from(rental: &Rental) -> Self {
        Self {
            id: rental.id,
            cycle: rental.cycle_id,
            student: rental.student_id,
            duration: rental.duration_minutes,
            location: rental.location.clone(),
            status: rental.status,
            start_time: rental.start_time,
            expected_return_time: rental.expected_return_time,
        }
    }
}

/// Response for POST /api/rental/process
#[derive(Debug, Clone, Serialize)]
pub struct RentalStartedResponse {
    pub rental: RentalView,
}

/// Request for POST /api/return/generate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReturnRequest {
    pub rental_id: RentalId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RentalRef {
    #[serde(rename = "_id")]
    pub id: RentalId,
}

/// Response for POST /api/return/process
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnProcessedResponse {
    pub rental: RentalRef,
    pub cycle: CycleId,
    /// Allocated minutes
    pub duration: u32,
    /// Minutes actually used, rounded up
    pub actual_duration: i64,
    pub fine: i64,
    pub overtime_minutes: i64,
}

impl From<&ReturnReceipt> for ReturnProcessedResponse {
    fn from(receipt: &ReturnReceipt) -> Self {
        Self {
            rental: RentalRef {
                id: receipt.rental_id,
            },
            cycle: receipt.cycle_id,
            duration: receipt.duration_minutes,
            actual_duration: receipt.actual_duration_minutes,
            fine: receipt.fine,
            overtime_minutes: receipt.overtime_minutes,
        }
    }
}

/// Request for POST /api/qr/validate
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

/// Response for POST /api/qr/validate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadataResponse {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub issued_at: i64,
    pub expires_at: i64,
    pub remaining_ms: i64,
    pub expired: bool,
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<CycleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_id: Option<RentalId>,
}

impl From<TokenMetadata> for TokenMetadataResponse {
    fn from(meta: TokenMetadata) -> Self {
        Self {
            kind: meta.kind,
            issued_at: meta.issued_at.timestamp_millis(),
            expires_at: meta.expires_at.timestamp_millis(),
            remaining_ms: meta.remaining_ms,
            expired: meta.expired,
            claimed: meta.claimed,
            cycle_id: meta.cycle_id,
            student_id: meta.student_id,
            duration: meta.duration_minutes,
            location: meta.location,
            rental_id: meta.rental_id,
        }
    }
}

/// Response for GET /api/rentals/{id}/receipt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub rental_id: RentalId,
    pub cycle_id: CycleId,
    pub student_id: UserId,
    pub duration: u32,
    pub actual_duration: i64,
    pub overtime_minutes: i64,
    pub fine: i64,
    pub start_time: DateTime<Utc>,
    pub expected_return_time: DateTime<Utc>,
    pub actual_return_time: DateTime<Utc>,
    pub digest: String,
}

impl From<&ReturnReceipt> for ReceiptResponse {
    fn from(receipt: &ReturnReceipt) -> Self {
        Self {
            rental_id: receipt.rental_id,
            cycle_id: receipt.cycle_id,
            student_id: receipt.student_id,
            duration: receipt.duration_minutes,
            actual_duration: receipt.actual_duration_minutes,
            overtime_minutes: receipt.overtime_minutes,
            fine: receipt.fine,
            start_time: receipt.start_time,
            expected_return_time: receipt.expected_return_time,
            actual_return_time: receipt.actual_return_time,
            digest: receipt.digest(),
        }
    }
}
