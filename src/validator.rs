//! Token Validator
//!
//! The only place sessions move `pending → active` and `active → expired`.
//!
//! ```text
//! pending --(first validate)--> active --(now > start + duration)--> expired
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::{Session, SessionStatus};
use crate::store::SessionStore;
use crate::token::{fingerprint, SessionTokenSigner};

/// Successful validation result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedSession {
    pub session: Session,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
    /// True when this call started the session clock
    pub started_now: bool,
}

#[derive(Clone)]
pub struct TokenValidator {
    signer: SessionTokenSigner,
    sessions: SessionStore,
}

impl TokenValidator {
    pub fn new(signer: SessionTokenSigner, sessions: SessionStore) -> Self {
        Self { signer, sessions }
    }

    /// Validate a session token presented from `client_ip` at `now`
    pub fn validate(
        &self,
        token: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedSession, ApiError> {
        let claims = self.signer.verify(token).map_err(|e| {
            debug!(token = %fingerprint(token), "Rejected session token");
            e
        })?;

        let mut session = self
            .sessions
            .get(claims.session_id)?
            .ok_or_else(|| ApiError::NotFound("session".into()))?;

        if session.network_id != claims.network_id || session.guest != claims.guest.to_lowercase() {
            return Err(ApiError::InvalidToken);
        }

        let mut started_now = false;
        if session.start_time.is_none() && session.status == SessionStatus::Pending {
            started_now = self.sessions.start(session.session_id, now)?;
            // Reload so racing first uses agree on the stored start time
            session = self
                .sessions
                .get(session.session_id)?
                .ok_or_else(|| ApiError::NotFound("session".into()))?;

            if started_now {
                info!(
                    session_id = session.session_id,
                    network_id = %session.network_id,
                    "Session started"
                );
            }
        }

        let expires_at = match (session.status, session.expires_at()) {
            (SessionStatus::Expired, _) | (_, None) => return Err(self.expire(&session)),
            (_, Some(expires_at)) => expires_at,
        };

        if now > expires_at {
            return Err(self.expire(&session));
        }

        self.sessions.add_ip(session.session_id, client_ip, now)?;
        session.observed_ips.insert(client_ip.to_string());

        Ok(ValidatedSession {
            remaining_secs: (expires_at - now).num_seconds(),
            expires_at,
            started_now,
            session,
        })
    }

    fn expire(&self, session: &Session) -> ApiError {
        match self.sessions.expire(session.session_id) {
            Ok(true) => {
                info!(session_id = session.session_id, "Session expired");
                ApiError::Expired
            }
            Ok(false) => ApiError::Expired,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::token::SessionClaims;
    use chrono::Duration;

    const SECRET: &str = "test-secret-at-least-32-characters-long";
    const GUEST: &str = "0x00000000000000000000000000000000000000aa";

    fn setup(duration_hours: i64) -> (TokenValidator, SessionStore, String, DateTime<Utc>) {
        let sessions = SessionStore::new(Database::open_in_memory().unwrap());
        let signer = SessionTokenSigner::new(SECRET);
        let t0 = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();

        let token = signer
            .sign(&SessionClaims {
                session_id: 1,
                network_id: "4".into(),
                guest: GUEST.into(),
                iat: t0.timestamp(),
            })
            .unwrap();
        sessions
            .insert_if_absent(&Session::pending(1, "4", GUEST, token.clone(), duration_hours, "0", t0))
            .unwrap();

        (TokenValidator::new(signer, sessions.clone()), sessions, token, t0)
    }

    #[test]
    fn test_first_use_starts_clock() {
        let (validator, sessions, token, t0) = setup(1);

        let result = validator.validate(&token, "10.0.0.5", t0).unwrap();
        assert!(result.started_now);
        assert_eq!(result.remaining_secs, 3600);

        let stored = sessions.get(1).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert!(stored.active);
        assert_eq!(stored.start_time.unwrap().timestamp(), t0.timestamp());
        assert!(stored.observed_ips.contains("10.0.0.5"));
    }

    #[test]
    fn test_repeat_validation_is_idempotent() {
        let (validator, sessions, token, t0) = setup(1);

        validator.validate(&token, "10.0.0.5", t0).unwrap();
        let again = validator
            .validate(&token, "10.0.0.5", t0 + Duration::minutes(10))
            .unwrap();
        assert!(!again.started_now);

        let stored = sessions.get(1).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.start_time.unwrap().timestamp(), t0.timestamp());
        assert_eq!(stored.observed_ips.len(), 1);
    }

    #[test]
    fn test_one_hour_session_scenario() {
        let (validator, sessions, token, t0) = setup(1);

        validator.validate(&token, "10.0.0.5", t0).unwrap();

        let mid = validator.validate(&token, "10.0.0.5", t0 + Duration::minutes(30));
        assert!(mid.is_ok());
        assert_eq!(sessions.get(1).unwrap().unwrap().status, SessionStatus::Active);

        let late = validator.validate(&token, "10.0.0.5", t0 + Duration::minutes(90));
        assert!(matches!(late, Err(ApiError::Expired)));

        let stored = sessions.get(1).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
        assert!(!stored.active);
    }

    #[test]
    fn test_oversized_duration_is_capped() {
        let (validator, _, token, t0) = setup(10_000_000_000);

        let result = validator.validate(&token, "10.0.0.5", t0).unwrap();
        assert_eq!(result.remaining_secs, crate::models::MAX_DURATION_HOURS * 3600);
        assert_eq!(result.session.status, SessionStatus::Active);
    }

    #[test]
    fn test_expired_stays_expired() {
        let (validator, sessions, token, t0) = setup(1);
        validator.validate(&token, "10.0.0.5", t0).unwrap();

        let after = t0 + Duration::hours(2);
        assert!(matches!(validator.validate(&token, "10.0.0.5", after), Err(ApiError::Expired)));
        assert!(matches!(validator.validate(&token, "10.0.0.5", after), Err(ApiError::Expired)));
        // Even a clock that goes backwards cannot revive it
        assert!(matches!(validator.validate(&token, "10.0.0.5", t0), Err(ApiError::Expired)));
        assert_eq!(sessions.get(1).unwrap().unwrap().status, SessionStatus::Expired);
    }

    #[test]
    fn test_new_ips_accumulate() {
        let (validator, sessions, token, t0) = setup(1);
        validator.validate(&token, "10.0.0.5", t0).unwrap();
        let result = validator.validate(&token, "10.0.0.6", t0).unwrap();
        assert_eq!(result.session.observed_ips.len(), 2);
        assert_eq!(sessions.get(1).unwrap().unwrap().observed_ips.len(), 2);
    }

    #[test]
    fn test_invalid_token() {
        let (validator, _, _, t0) = setup(1);
        assert!(matches!(
            validator.validate("garbage", "10.0.0.5", t0),
            Err(ApiError::InvalidToken)
        ));

        let foreign = SessionTokenSigner::new("some-other-secret-of-sufficient-size")
            .sign(&SessionClaims {
                session_id: 1,
                network_id: "4".into(),
                guest: GUEST.into(),
                iat: 0,
            })
            .unwrap();
        assert!(matches!(
            validator.validate(&foreign, "10.0.0.5", t0),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn test_unknown_session() {
        let (validator, _, _, t0) = setup(1);
        let token = SessionTokenSigner::new(SECRET)
            .sign(&SessionClaims {
                session_id: 99,
                network_id: "4".into(),
                guest: GUEST.into(),
                iat: 0,
            })
            .unwrap();
        assert!(matches!(
            validator.validate(&token, "10.0.0.5", t0),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_claims_must_match_session() {
        let (validator, _, _, t0) = setup(1);
        let token = SessionTokenSigner::new(SECRET)
            .sign(&SessionClaims {
                session_id: 1,
                network_id: "5".into(),
                guest: GUEST.into(),
                iat: 0,
            })
            .unwrap();
        assert!(matches!(
            validator.validate(&token, "10.0.0.5", t0),
            Err(ApiError::InvalidToken)
        ));
    }
}
