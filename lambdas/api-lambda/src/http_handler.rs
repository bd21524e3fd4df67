use bookden_shared::{auth, books, error::ApiError, users, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::env;
use std::sync::Arc;

/// Request-scoped identity, extracted once per request and passed
/// explicitly into every repository call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthContext {
    pub user_id: String,
}

/// Extract the caller identity from the JWT authorizer claims (the API
/// Gateway validates the token before we see it). The X-User-Id header
/// override exists for local development only. No fallback identity:
/// a request without claims is unauthenticated.
pub(crate) fn auth_context(event: &Request) -> Option<AuthContext> {
    if let Some(user_id) = event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        return Some(AuthContext {
            user_id: user_id.to_string(),
        });
    }

    event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .and_then(|jwt| jwt.claims.get("sub"))
        .map(|sub| AuthContext {
            user_id: sub.to_string(),
        })
}

/// Main Lambda handler - routes requests to auth, user and book endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return cors_preflight();
    }

    // Auth endpoints (no session required)
    if path.starts_with("/auth/") {
        let client_id = env::var("COGNITO_CLIENT_ID").expect("COGNITO_CLIENT_ID must be set");
        let client_secret =
            env::var("COGNITO_CLIENT_SECRET").expect("COGNITO_CLIENT_SECRET must be set");
        let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "bookden".to_string());

        return match (method, path) {
            (&Method::POST, "/auth/login") => {
                auth::login(&state.cognito_client, &client_id, &client_secret, body).await
            }
            (&Method::POST, "/auth/signup") => {
                auth::signup(
                    &state.cognito_client,
                    &state.dynamo_client,
                    &table_name,
                    &client_id,
                    &client_secret,
                    body,
                )
                .await
            }
            (&Method::POST, "/auth/refresh") => {
                auth::refresh_token(&state.cognito_client, &client_id, &client_secret, body).await
            }
            (&Method::POST, "/auth/oauth") => {
                let cognito_domain =
                    env::var("COGNITO_DOMAIN").expect("COGNITO_DOMAIN must be set");
                let redirect_uri =
                    env::var("OAUTH_REDIRECT_URI").expect("OAUTH_REDIRECT_URI must be set");
                auth::oauth_exchange(
                    &state.http_client,
                    &state.dynamo_client,
                    &table_name,
                    &cognito_domain,
                    &client_id,
                    &client_secret,
                    &redirect_uri,
                    body,
                )
                .await
            }
            (&Method::POST, _) => not_found(),
            _ => method_not_allowed(),
        };
    }

    // Everything below requires an authenticated caller
    let Some(ctx) = auth_context(&event) else {
        tracing::warn!("No auth context - Method: {} Path: {}", method, path);
        return ApiError::Unauthorized.into_response();
    };

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "bookden".to_string());

    // Books routes
    if path.starts_with("/books") {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        return match (method, parts.as_slice()) {
            // GET /books - list the caller's books
            (&Method::GET, ["books"]) => {
                books::list_books(&state.dynamo_client, &table_name, &ctx.user_id).await
            }
            // POST /books - create a book owned by the caller
            (&Method::POST, ["books"]) => {
                books::create_book(&state.dynamo_client, &table_name, &ctx.user_id, body).await
            }
            // DELETE /books/{id} - delete after the ownership check
            (&Method::DELETE, ["books", book_id]) => {
                books::delete_book(&state.dynamo_client, &table_name, &ctx.user_id, book_id).await
            }
            _ => not_found(),
        };
    }

    // Users routes
    if path.starts_with("/users") {
        return match (method, path) {
            (&Method::GET, "/users/me") => {
                users::get_user(&state.dynamo_client, &table_name, &ctx.user_id).await
            }
            _ => not_found(),
        };
    }

    tracing::warn!("No route matched - Method: {} Path: {}", method, path);
    not_found()
}

fn cors_preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET,POST,DELETE,OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type,Authorization,X-User-Id",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "Method not allowed"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
    use aws_sdk_dynamodb::Client as DynamoClient;

    // Clients built from bare configs never reach the network in these
    // tests; the routes under test return before any AWS call.
    fn test_state() -> Arc<AppState> {
        let cognito = CognitoClient::from_conf(
            aws_sdk_cognitoidentityprovider::Config::builder()
                .behavior_version(aws_sdk_cognitoidentityprovider::config::BehaviorVersion::latest())
                .build(),
        );
        let dynamo = DynamoClient::from_conf(
            aws_sdk_dynamodb::Config::builder()
                .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
                .build(),
        );
        AppState::new(cognito, dynamo)
    }

    fn request(method: Method, path: &str, user_id: Option<&str>) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method(method)
            .uri(format!("https://api.example.com{}", path));
        if let Some(user_id) = user_id {
            builder = builder.header("X-User-Id", user_id);
        }
        builder.body(Body::Empty).unwrap()
    }

    #[test]
    fn test_auth_context_from_header() {
        let event = request(Method::GET, "/books", Some("u1"));
        assert_eq!(
            auth_context(&event),
            Some(AuthContext {
                user_id: "u1".to_string()
            })
        );
    }

    #[test]
    fn test_auth_context_absent_without_claims() {
        let event = request(Method::GET, "/books", None);
        assert_eq!(auth_context(&event), None);

        // an empty header does not count as an identity
        let event = request(Method::GET, "/books", Some(""));
        assert_eq!(auth_context(&event), None);
    }

    #[tokio::test]
    async fn test_books_without_session_is_unauthorized() {
        let event = request(Method::GET, "/books", None);
        let response = function_handler(event, test_state()).await.unwrap();
        assert_eq!(response.status(), 401);

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_delete_without_session_is_unauthorized() {
        let event = request(Method::DELETE, "/books/abc", None);
        let response = function_handler(event, test_state()).await.unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_preflight_allows_the_api_methods() {
        let event = request(Method::OPTIONS, "/books", None);
        let response = function_handler(event, test_state()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response
                .headers()
                .get("Access-Control-Allow-Methods")
                .unwrap(),
            "GET,POST,DELETE,OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let event = request(Method::GET, "/nope", Some("u1"));
        let response = function_handler(event, test_state()).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_unknown_books_subroute_is_not_found() {
        let event = request(Method::GET, "/books/1/pages", Some("u1"));
        let response = function_handler(event, test_state()).await.unwrap();
        assert_eq!(response.status(), 404);
    }
}
