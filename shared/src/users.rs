use crate::error::{json_response, ApiError};
use crate::types::User;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

// Profile rows live at PK=USER#{id}, SK=USER#{id}. A companion
// EMAIL#{email} row maps each email to exactly one account id; its
// conditional put is what enforces the unique-email invariant across
// password and OAuth signups.

fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

fn email_pk(email: &str) -> String {
    format!("EMAIL#{}", email.to_lowercase())
}

/// Create the profile row and claim the email. Fails with a
/// user-facing message when the email is already taken.
pub async fn put_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    email: &str,
    name: Option<&str>,
    image: Option<&str>,
) -> Result<(), String> {
    let now = chrono::Utc::now().to_rfc3339();
    let email_key = email_pk(email);

    let claim = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(email_key.clone()))
        .item("SK", AttributeValue::S(email_key))
        .item("user_id", AttributeValue::S(user_id.to_string()))
        .condition_expression("attribute_not_exists(PK)")
        .send()
        .await;

    if let Err(e) = claim {
        let message = format!("{:?}", e);
        if message.contains("ConditionalCheckFailedException") {
            return Err("An account with this email already exists".to_string());
        }
        tracing::error!("Failed to claim email row: {}", message);
        return Err("Failed to create account".to_string());
    }

    let pk = user_pk(user_id);
    let mut put_request = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("email", AttributeValue::S(email.to_string()))
        .item("created_at", AttributeValue::S(now.clone()))
        .item("updated_at", AttributeValue::S(now));

    if let Some(name) = name {
        put_request = put_request.item("name", AttributeValue::S(name.to_string()));
    }
    if let Some(image) = image {
        put_request = put_request.item("image", AttributeValue::S(image.to_string()));
    }

    if let Err(e) = put_request.send().await {
        tracing::error!("Failed to write profile row: {:?}", e);
        return Err("Failed to create account".to_string());
    }

    Ok(())
}

/// Resolve an email to its account, creating the account on first
/// OAuth login. Returns the canonical user id for the email.
pub async fn ensure_user(
    client: &DynamoClient,
    table_name: &str,
    sub: &str,
    email: &str,
    name: Option<&str>,
    image: Option<&str>,
) -> Result<String, Error> {
    let email_key = email_pk(email);

    let existing = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(email_key.clone()))
        .key("SK", AttributeValue::S(email_key))
        .send()
        .await?;

    if let Some(item) = existing.item() {
        if let Some(user_id) = item.get("user_id").and_then(|v| v.as_s().ok()) {
            return Ok(user_id.to_string());
        }
    }

    tracing::info!("First OAuth login for {}, creating account", email);
    put_user(client, table_name, sub, email, name, image)
        .await
        .map_err(Error::from)?;
    Ok(sub.to_string())
}

/// Get the current user's profile
pub async fn get_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = user_pk(user_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    let Some(item) = result.item() else {
        return ApiError::NotFound("User").into_response();
    };

    let get_s = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };

    let user = User {
        id: user_id.to_string(),
        email: get_s("email").unwrap_or_default(),
        name: get_s("name"),
        image: get_s("image"),
        created_at: get_s("created_at").unwrap_or_default(),
        updated_at: get_s("updated_at").unwrap_or_default(),
    };

    json_response(StatusCode::OK, &serde_json::to_value(&user)?)
}
