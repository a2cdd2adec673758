use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::entities::user::UserRole;

type HmacSha256 = Hmac<Sha256>;

/// Session state carried by the signed cookie. The server is the sole
/// mutator: clients receive the cookie opaque and replay it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Option<Uuid>,
    pub role: Option<UserRole>,
    pub is_logged_in: bool,
    /// Unix seconds at issue time; used for expiry on decode
    pub issued_at: i64,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            role: None,
            is_logged_in: false,
            issued_at: Utc::now().timestamp(),
        }
    }

    pub fn authenticated(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
            is_logged_in: true,
            issued_at: Utc::now().timestamp(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_logged_in && self.role == Some(UserRole::Admin)
    }
}

/// Codec and cookie policy for the session cookie.
///
/// Tokens are `base64url(json) + "." + base64url(hmac_sha256(json))`.
/// Verification failure of any kind (missing cookie, bad signature, bad
/// JSON, expired) degrades to an anonymous session, never an error.
#[derive(Clone)]
pub struct Sessions {
    secret: Vec<u8>,
    cookie_name: String,
    max_age_secs: i64,
}

impl Sessions {
    pub fn new(secret: &str, cookie_name: &str, max_age_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            cookie_name: cookie_name.to_string(),
            max_age_secs,
        }
    }

    pub fn encode(&self, session: &Session) -> String {
        // Session is a plain struct of serde-friendly fields; serialization
        // cannot fail in practice, but degrade to anonymous JSON if it does.
        let payload = serde_json::to_vec(session)
            .unwrap_or_else(|_| b"{\"is_logged_in\":false}".to_vec());
        let mac = self.sign(&payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(mac)
        )
    }

    /// Decodes and verifies a token, failing open to anonymous.
    pub fn decode(&self, token: &str) -> Session {
        match self.try_decode(token) {
            Some(session) => session,
            None => {
                tracing::debug!("session token rejected, treating as anonymous");
                Session::anonymous()
            }
        }
    }

    fn try_decode(&self, token: &str) -> Option<Session> {
        let (payload_b64, mac_b64) = token.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let mac = URL_SAFE_NO_PAD.decode(mac_b64).ok()?;
        let mut verifier = HmacSha256::new_from_slice(&self.secret).ok()?;
        verifier.update(&payload);
        verifier.verify_slice(&mac).ok()?;
        let session: Session = serde_json::from_slice(&payload).ok()?;
        let age = Utc::now().timestamp() - session.issued_at;
        if age < 0 || age > self.max_age_secs {
            return None;
        }
        Some(session)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        // new_from_slice only fails on zero-length keys, which config
        // validation rules out; an empty mac simply never verifies.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return Vec::new();
        };
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Loads the session from the request cookie jar.
    pub fn load(&self, jar: &CookieJar) -> Session {
        match jar.get(&self.cookie_name) {
            Some(cookie) => self.decode(cookie.value()),
            None => Session::anonymous(),
        }
    }

    /// Re-issues the session cookie with a fresh timestamp (activity refresh).
    pub fn issue(&self, jar: CookieJar, session: &Session) -> CookieJar {
        let refreshed = Session {
            issued_at: Utc::now().timestamp(),
            ..session.clone()
        };
        let cookie = Cookie::build((self.cookie_name.clone(), self.encode(&refreshed)))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.max_age_secs))
            .build();
        jar.add(cookie)
    }

    /// Destroys the session cookie (logout).
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build((self.cookie_name.clone(), "")).path("/").build())
    }

    /// Whether a response already carries a `Set-Cookie` for the session
    /// cookie. The guard must not re-issue over a handler's own cookie,
    /// or logout's removal would be overridden by the activity refresh.
    pub fn response_sets_cookie(&self, headers: &axum::http::HeaderMap) -> bool {
        let prefix = format!("{}=", self.cookie_name);
        headers
            .get_all(axum::http::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.starts_with(&prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> Sessions {
        Sessions::new(
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            "session",
            7 * 24 * 3600,
        )
    }

    #[test]
    fn round_trips_an_authenticated_session() {
        let s = sessions();
        let session = Session::authenticated(Uuid::new_v4(), UserRole::Customer);
        let decoded = s.decode(&s.encode(&session));
        assert!(decoded.is_logged_in);
        assert_eq!(decoded.user_id, session.user_id);
        assert_eq!(decoded.role, Some(UserRole::Customer));
    }

    #[test]
    fn tampered_payload_degrades_to_anonymous() {
        let s = sessions();
        let token = s.encode(&Session::authenticated(Uuid::new_v4(), UserRole::Admin));
        let (payload, mac) = token.split_once('.').unwrap();
        // Forge an admin payload with the original mac
        let mut forged = payload.to_string();
        forged.replace_range(0..1, if payload.starts_with('a') { "b" } else { "a" });
        let decoded = s.decode(&format!("{forged}.{mac}"));
        assert!(!decoded.is_logged_in);
        assert_eq!(decoded.role, None);
    }

    #[test]
    fn garbage_token_degrades_to_anonymous() {
        let s = sessions();
        for token in ["", "not-a-token", "a.b", "a.b.c", "...."] {
            let decoded = s.decode(token);
            assert!(!decoded.is_logged_in, "token {token:?} should be anonymous");
        }
    }

    #[test]
    fn expired_session_degrades_to_anonymous() {
        let s = sessions();
        let mut session = Session::authenticated(Uuid::new_v4(), UserRole::Customer);
        session.issued_at = Utc::now().timestamp() - 8 * 24 * 3600;
        let decoded = s.decode(&s.encode(&session));
        assert!(!decoded.is_logged_in);
    }

    #[test]
    fn recognizes_session_set_cookie_on_responses() {
        let s = sessions();
        let mut headers = axum::http::HeaderMap::new();
        assert!(!s.response_sets_cookie(&headers));

        headers.append(axum::http::header::SET_COOKIE, "cart=abc".parse().unwrap());
        assert!(!s.response_sets_cookie(&headers));

        headers.append(
            axum::http::header::SET_COOKIE,
            "session=; Max-Age=0".parse().unwrap(),
        );
        assert!(s.response_sets_cookie(&headers));
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let s = sessions();
        let other = Sessions::new(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            "session",
            7 * 24 * 3600,
        );
        let token = other.encode(&Session::authenticated(Uuid::new_v4(), UserRole::Admin));
        assert!(!s.decode(&token).is_logged_in);
    }
}
