pub mod types;
pub mod error;
pub mod auth;
pub mod users;
pub mod books;
pub mod forms;
pub mod catalog;
pub mod client;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub cognito_client: CognitoClient,
    pub dynamo_client: DynamoClient,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(cognito_client: CognitoClient, dynamo_client: DynamoClient) -> Arc<Self> {
        Arc::new(Self {
            cognito_client,
            dynamo_client,
            http_client: reqwest::Client::new(),
        })
    }
}
