//! Authentication endpoints
//!
//! Password signup/login, session management and the OAuth
//! authorization-code flow with PKCE.

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    routing::post,
};
use axum_extra::extract::CookieJar;

use super::dto::{
    AuthResponse, LoginRequest, MeResponse, OAuthCallbackParams, SignupRequest, SuccessResponse,
    UserResponse,
};
use crate::AppState;
use crate::auth::session::{
    build_flow_cookie, build_session_cookie, clear_flow_cookie, clear_session_cookie, sign_value,
    verify_signed_value,
};
use crate::auth::{CurrentUser, OAuthProvider, PkceChallenge, extract_token_from_headers};
use crate::data::Session;
use crate::error::AppError;
use crate::metrics::OAUTH_LOGINS_TOTAL;
use crate::service::{AuthOutcome, AuthService, OAuthUserService};

const LOGIN_PAGE: &str = "/login";
const DASHBOARD_PAGE: &str = "/dashboard";

/// Create auth router, mounted under `/api/auth`
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/oauth/:provider", get(oauth_start))
        .route(
            "/oauth/:provider/callback",
            get(oauth_callback_query).post(oauth_callback_form),
        )
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(state.db.clone(), state.config.session_ttl())
}

fn with_session_cookie(state: &AppState, jar: CookieJar, session: &Session) -> CookieJar {
    jar.add(build_session_cookie(
        &session.token,
        session.expires_at,
        state.config.should_use_secure_cookies(),
    ))
}

fn auth_response(outcome: &AuthOutcome) -> AuthResponse {
    AuthResponse {
        user: UserResponse::from(&outcome.user),
        token: outcome.session.token.clone(),
    }
}

// =============================================================================
// Password auth
// =============================================================================

/// POST /api/auth/signup
async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let outcome = auth_service(&state)
        .signup(&req.email, &req.password, req.name)
        .await?;

    let jar = with_session_cookie(&state, jar, &outcome.session);
    Ok((jar, Json(auth_response(&outcome))))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let outcome = auth_service(&state).login(&req.email, &req.password).await?;

    let jar = with_session_cookie(&state, jar, &outcome.session);
    Ok((jar, Json(auth_response(&outcome))))
}

/// POST /api/auth/logout
///
/// Always succeeds; the cookie is cleared even without a live session.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SuccessResponse>), AppError> {
    if let Some(token) = extract_token_from_headers(&headers) {
        auth_service(&state).logout(&token).await?;
    }

    Ok((jar.add(clear_session_cookie()), Json(SuccessResponse::ok())))
}

/// GET /api/auth/me
async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserResponse::from(&user),
    })
}

/// POST /api/auth/refresh
///
/// Revokes every session of the caller and issues a new one.
async fn refresh(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let session = auth_service(&state).refresh_session(&user.id).await?;
    let outcome = AuthOutcome { user, session };

    let jar = with_session_cookie(&state, jar, &outcome.session);
    Ok((jar, Json(auth_response(&outcome))))
}

// =============================================================================
// OAuth
// =============================================================================

fn parse_provider(raw: &str) -> Result<OAuthProvider, AppError> {
    OAuthProvider::parse(raw).ok_or_else(|| AppError::Validation("Invalid provider".to_string()))
}

fn login_redirect(jar: CookieJar, error: &str) -> Response {
    let location = format!("{}?error={}", LOGIN_PAGE, urlencoding::encode(error));
    (jar, Redirect::to(&location)).into_response()
}

/// GET /api/auth/oauth/:provider
///
/// Stores signed state and PKCE verifier cookies, then redirects to the
/// provider's authorization endpoint.
async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = parse_provider(&provider)?;
    let pkce = PkceChallenge::generate();
    let authorization_url = state.oauth.authorization_url(provider, &pkce)?;

    let secret = &state.config.auth.session_secret;
    let secure = state.config.should_use_secure_cookies();
    let cross_site = provider.uses_form_post();
    let jar = jar
        .add(build_flow_cookie(
            provider.state_cookie_name(),
            sign_value(&pkce.state, secret)?,
            secure,
            cross_site,
        ))
        .add(build_flow_cookie(
            provider.verifier_cookie_name(),
            sign_value(&pkce.code_verifier, secret)?,
            secure,
            cross_site,
        ));

    tracing::debug!(provider = %provider, "Redirecting to OAuth provider");
    Ok((jar, Redirect::to(&authorization_url)))
}

/// GET /api/auth/oauth/:provider/callback
async fn oauth_callback_query(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Response, AppError> {
    let provider = parse_provider(&provider)?;
    Ok(complete_oauth(&state, provider, params, jar).await)
}

/// POST /api/auth/oauth/:provider/callback (Apple `form_post`)
async fn oauth_callback_form(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Form(params): Form<OAuthCallbackParams>,
) -> Result<Response, AppError> {
    let provider = parse_provider(&provider)?;
    if !provider.uses_form_post() {
        return Err(AppError::Validation(
            "POST only supported for Apple".to_string(),
        ));
    }
    Ok(complete_oauth(&state, provider, params, jar).await)
}

/// Finish the authorization-code flow
///
/// Every outcome is a redirect: `/dashboard` with a session cookie, or
/// `/login?error=...`.
async fn complete_oauth(
    state: &AppState,
    provider: OAuthProvider,
    params: OAuthCallbackParams,
    jar: CookieJar,
) -> Response {
    let record = |status: &str| {
        OAUTH_LOGINS_TOTAL
            .with_label_values(&[provider.as_str(), status])
            .inc();
    };

    let secret = &state.config.auth.session_secret;
    let state_cookie = provider.state_cookie_name();
    let verifier_cookie = provider.verifier_cookie_name();
    let stored_state = jar
        .get(&state_cookie)
        .and_then(|cookie| verify_signed_value(cookie.value(), secret));
    let code_verifier = jar
        .get(&verifier_cookie)
        .and_then(|cookie| verify_signed_value(cookie.value(), secret));

    // Flow cookies are single use, whatever the outcome
    let jar = jar
        .add(clear_flow_cookie(state_cookie))
        .add(clear_flow_cookie(verifier_cookie));

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        tracing::warn!(provider = %provider, error = %error, "OAuth provider returned an error");
        record("denied");
        return login_redirect(jar, &error);
    }

    let code = params.code.filter(|c| !c.is_empty());
    let returned_state = params.state.filter(|s| !s.is_empty());
    let (Some(code), Some(returned_state)) = (code, returned_state) else {
        record("invalid_request");
        return login_redirect(jar, "missing_code_or_state");
    };

    let code_verifier = match (stored_state, code_verifier) {
        (Some(stored), Some(verifier)) if stored == returned_state => verifier,
        _ => {
            tracing::warn!(provider = %provider, "OAuth state mismatch");
            record("invalid_state");
            return login_redirect(jar, "invalid_state");
        }
    };

    match login_with_code(state, provider, &code, &code_verifier).await {
        Ok(outcome) => {
            record("success");
            tracing::info!(
                provider = %provider,
                user_id = %outcome.user.id,
                "OAuth login completed"
            );
            let jar = with_session_cookie(state, jar, &outcome.session);
            (jar, Redirect::to(DASHBOARD_PAGE)).into_response()
        }
        Err(error) => {
            tracing::error!(provider = %provider, %error, "OAuth callback failed");
            record("failure");
            login_redirect(jar, "oauth_failed")
        }
    }
}

async fn login_with_code(
    state: &AppState,
    provider: OAuthProvider,
    code: &str,
    code_verifier: &str,
) -> Result<AuthOutcome, AppError> {
    let tokens = state
        .oauth
        .exchange_code(provider, code, code_verifier)
        .await?;
    let info = state.oauth.fetch_user_info(provider, &tokens).await?;

    OAuthUserService::new(state.db.clone(), state.config.session_ttl())
        .find_or_create_user(provider, &info, &tokens)
        .await
}
