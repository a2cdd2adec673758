use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::entities::user::UserRole;
use crate::errors::ApiError;
use crate::AppState;

use super::session::Session;

pub const LOGIN_ROUTE: &str = "/auth/login";
pub const HOME_ROUTE: &str = "/";
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

const ANY_AUTHENTICATED: &[UserRole] = &[UserRole::Admin, UserRole::Customer];
const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

/// One protected route prefix with the roles allowed through and where to
/// send a browser that is denied.
#[derive(Debug, Clone, Copy)]
pub struct GuardRule {
    pub prefix: &'static str,
    pub roles: &'static [UserRole],
    pub redirect: &'static str,
}

/// Protected prefixes, first match wins. `/api/admin` must precede the
/// broader `/api/view/...` entries so admin routes get the admin rule.
pub const GUARD_RULES: &[GuardRule] = &[
    GuardRule {
        prefix: "/api/admin",
        roles: ADMIN_ONLY,
        redirect: UNAUTHORIZED_ROUTE,
    },
    GuardRule {
        prefix: "/admin",
        roles: ADMIN_ONLY,
        redirect: UNAUTHORIZED_ROUTE,
    },
    GuardRule {
        prefix: "/api/view/order",
        roles: ANY_AUTHENTICATED,
        redirect: LOGIN_ROUTE,
    },
    GuardRule {
        prefix: "/api/view/user",
        roles: ANY_AUTHENTICATED,
        redirect: LOGIN_ROUTE,
    },
    GuardRule {
        prefix: "/checkout",
        roles: ANY_AUTHENTICATED,
        redirect: LOGIN_ROUTE,
    },
    GuardRule {
        prefix: "/profile",
        roles: ANY_AUTHENTICATED,
        redirect: LOGIN_ROUTE,
    },
];

/// Routes that only make sense for anonymous visitors; an authenticated
/// session is sent back home.
const GUEST_ONLY: &[&str] = &[LOGIN_ROUTE, "/auth/signup"];

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    /// Browser flows: send the client to this route
    DenyRedirect(&'static str),
    /// In-handler denials: render a 403 body instead of redirecting
    DenyFallback,
}

/// Checks a session against a required-role set. Used both by the route
/// guard (which maps `DenyFallback` to the rule's redirect target) and
/// directly by handlers that gate on role mid-request.
pub fn authorize(session: &Session, required: &[UserRole]) -> AuthDecision {
    if !session.is_logged_in {
        return AuthDecision::DenyRedirect(LOGIN_ROUTE);
    }
    match session.role {
        Some(role) if required.contains(&role) => AuthDecision::Allow,
        _ => AuthDecision::DenyFallback,
    }
}

/// Evaluates the guard table for a request path. Unmatched paths are
/// allowed unconditionally.
pub fn evaluate(session: &Session, path: &str) -> AuthDecision {
    if GUEST_ONLY.iter().any(|route| matches_prefix(path, route)) {
        if session.is_logged_in {
            return AuthDecision::DenyRedirect(HOME_ROUTE);
        }
        return AuthDecision::Allow;
    }

    for rule in GUARD_RULES {
        if matches_prefix(path, rule.prefix) {
            return match authorize(session, rule.roles) {
                AuthDecision::DenyFallback => AuthDecision::DenyRedirect(rule.redirect),
                decision => decision,
            };
        }
    }

    AuthDecision::Allow
}

/// Prefix match on path-segment boundaries: `/admin` guards `/admin` and
/// `/admin/orders` but not `/administrator`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Route guard middleware. Loads the session from the cookie, consults the
/// guard table, and either denies or forwards the request with the session
/// stored in extensions. On allow, the session cookie is re-issued so
/// activity keeps a session alive.
pub async fn session_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let session = state.sessions.load(&jar);
    let path = request.uri().path().to_string();

    match evaluate(&session, &path) {
        AuthDecision::Allow => {
            let refresh = session.is_logged_in;
            let mut request = request;
            request.extensions_mut().insert(session.clone());
            let response = next.run(request).await;
            // A handler that set the session cookie itself (login, logout)
            // owns the final value; refreshing over it would resurrect a
            // session the handler just destroyed.
            if refresh && !state.sessions.response_sets_cookie(response.headers()) {
                let jar = state.sessions.issue(jar, &session);
                (jar, response).into_response()
            } else {
                response
            }
        }
        AuthDecision::DenyRedirect(target) => deny(&session, &path, target),
        AuthDecision::DenyFallback => ApiError::Forbidden.into_response(),
    }
}

/// API paths answer with JSON status codes; page paths redirect.
fn deny(session: &Session, path: &str, target: &'static str) -> Response {
    tracing::debug!(%path, logged_in = session.is_logged_in, "request denied by route guard");
    if path.starts_with("/api/") {
        if session.is_logged_in {
            ApiError::Forbidden.into_response()
        } else {
            ApiError::Unauthorized.into_response()
        }
    } else {
        Redirect::to(target).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn customer() -> Session {
        Session::authenticated(Uuid::new_v4(), UserRole::Customer)
    }

    fn admin() -> Session {
        Session::authenticated(Uuid::new_v4(), UserRole::Admin)
    }

    #[test]
    fn customer_on_admin_prefix_is_denied_never_allowed() {
        for path in ["/api/admin/product", "/admin", "/admin/orders"] {
            assert_eq!(
                evaluate(&customer(), path),
                AuthDecision::DenyRedirect(UNAUTHORIZED_ROUTE),
                "customer must not pass {path}"
            );
        }
    }

    #[test]
    fn admin_passes_admin_prefix() {
        assert_eq!(evaluate(&admin(), "/api/admin/product"), AuthDecision::Allow);
    }

    #[test]
    fn anonymous_on_protected_prefix_is_sent_to_login() {
        for path in ["/api/view/order/abc", "/checkout", "/profile"] {
            assert_eq!(
                evaluate(&Session::anonymous(), path),
                AuthDecision::DenyRedirect(LOGIN_ROUTE)
            );
        }
    }

    #[test]
    fn guest_only_routes_redirect_authenticated_sessions_home() {
        assert_eq!(
            evaluate(&customer(), "/auth/login"),
            AuthDecision::DenyRedirect(HOME_ROUTE)
        );
        assert_eq!(evaluate(&Session::anonymous(), "/auth/login"), AuthDecision::Allow);
        assert_eq!(evaluate(&Session::anonymous(), "/auth/signup"), AuthDecision::Allow);
    }

    #[test]
    fn unmatched_paths_are_open() {
        for path in ["/", "/api/view/product", "/api/view/cart", "/health"] {
            assert_eq!(evaluate(&Session::anonymous(), path), AuthDecision::Allow);
        }
    }

    #[test]
    fn prefix_matching_respects_segment_boundaries() {
        assert!(matches_prefix("/admin/orders", "/admin"));
        assert!(matches_prefix("/admin", "/admin"));
        assert!(!matches_prefix("/administrator", "/admin"));
    }

    #[test]
    fn admin_rule_wins_over_view_rules_for_api_admin_paths() {
        // A customer is denied on /api/admin even though they would pass
        // the any-authenticated rules listed later.
        assert_eq!(
            evaluate(&customer(), "/api/admin/order"),
            AuthDecision::DenyRedirect(UNAUTHORIZED_ROUTE)
        );
    }

    #[test]
    fn authorize_distinguishes_missing_login_from_wrong_role() {
        assert_eq!(
            authorize(&Session::anonymous(), ADMIN_ONLY),
            AuthDecision::DenyRedirect(LOGIN_ROUTE)
        );
        assert_eq!(authorize(&customer(), ADMIN_ONLY), AuthDecision::DenyFallback);
        assert_eq!(authorize(&admin(), ADMIN_ONLY), AuthDecision::Allow);
    }
}
