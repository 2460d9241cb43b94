//! QR payloads
//!
//! What the client renders into a QR code, and how a scanned code is parsed
//! back. Display fields are informational only; the server re-reads everything
//! it needs from the stored token.

use kernel::id::{CycleId, RentalId};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{QrToken, TokenPayload};
use crate::domain::value_objects::{TokenId, TokenKind};
use crate::error::{RentalError, RentalResult};

/// JSON object encoded into the QR image: `{token, type, ...display fields}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum QrPayload {
    Rental {
        token: String,
        cycle_id: CycleId,
        duration: u32,
        location: String,
        expires_at: i64,
    },
    Return {
        token: String,
        rental_id: RentalId,
        expires_at: i64,
    },
}

impl QrPayload {
    pub fn for_token(token: &QrToken) -> Self {
        let expires_at = token.expires_at.timestamp_millis();
        match &token.payload {
            TokenPayload::Rental(draft) => QrPayload::Rental {
                token: token.id.as_str().to_string(),
                cycle_id: draft.cycle_id,
                duration: draft.duration_minutes,
                location: draft.location.clone(),
                expires_at,
            },
            TokenPayload::Return { rental_id } => QrPayload::Return {
                token: token.id.as_str().to_string(),
                rental_id: *rental_id,
                expires_at,
            },
        }
    }
}

/// Minimal view of a scanned QR object; display fields are ignored
#[derive(Deserialize)]
struct ScannedObject {
    token: String,
    #[serde(rename = "type")]
    kind: String,
}

/// A scanned code, parsed once at the redemption boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    pub token_id: TokenId,
    /// Kind the QR object claims to be; `None` for a bare token
    pub declared_kind: Option<TokenKind>,
}

impl ScannedCode {
    /// Accepts either a bare token ID or the full JSON QR object.
    pub fn parse(raw: &str) -> RentalResult<Self> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            let object: ScannedObject = serde_json::from_str(raw)
                .map_err(|e| RentalError::InvalidPayload(format!("malformed QR payload: {}", e)))?;
            let kind = TokenKind::from_code(&object.kind).ok_or_else(|| {
                RentalError::InvalidPayload(format!("unknown QR type: {}", object.kind))
            })?;
            let token_id = TokenId::parse(&object.token)
                .ok_or_else(|| RentalError::InvalidPayload("malformed token".to_string()))?;
            return Ok(Self {
                token_id,
                declared_kind: Some(kind),
            });
        }

        let token_id = TokenId::parse(raw)
            .ok_or_else(|| RentalError::InvalidPayload("malformed token".to_string()))?;
        Ok(Self {
            token_id,
            declared_kind: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RentalDraft;
    use chrono::{TimeZone, Utc};
    use kernel::id::Id;

    fn rental_token() -> QrToken {
        let draft = RentalDraft {
            cycle_id: Id::new(),
            student_id: Id::new(),
            guard_id: Id::new(),
            duration_minutes: 60,
            location: "Main Gate".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        QrToken::issue(
            TokenPayload::Rental(draft),
            now,
            std::time::Duration::from_secs(30),
        )
    }

    #[test]
    fn test_qr_payload_shape() {
        let token = rental_token();
        let json = serde_json::to_value(QrPayload::for_token(&token)).unwrap();

        assert_eq!(json["type"], "rental");
        assert_eq!(json["token"], token.id.as_str());
        assert_eq!(json["duration"], 60);
        assert_eq!(json["location"], "Main Gate");
        assert_eq!(json["expiresAt"], token.expires_at.timestamp_millis());
        assert!(json.get("cycleId").is_some());
    }

    #[test]
    fn test_scanned_bare_token() {
        let token = rental_token();
        let scanned = ScannedCode::parse(token.id.as_str()).unwrap();
        assert_eq!(scanned.token_id, token.id);
        assert_eq!(scanned.declared_kind, None);
    }

    #[test]
    fn test_scanned_qr_object() {
        let token = rental_token();
        let text = serde_json::to_string(&QrPayload::for_token(&token)).unwrap();

        let scanned = ScannedCode::parse(&text).unwrap();
        assert_eq!(scanned.token_id, token.id);
        assert_eq!(scanned.declared_kind, Some(TokenKind::Rental));
    }

    #[test]
    fn test_scanned_unknown_type_is_invalid() {
        let token = rental_token();
        let text = format!(r#"{{"token":"{}","type":"refund"}}"#, token.id.as_str());
        assert!(matches!(
            ScannedCode::parse(&text),
            Err(RentalError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_scanned_garbage_is_invalid() {
        for raw in ["", "{", r#"{"type":"rental"}"#, "not a token", r#"{"token":"x","type":"rental"}"#] {
            assert!(
                matches!(ScannedCode::parse(raw), Err(RentalError::InvalidPayload(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }
}
