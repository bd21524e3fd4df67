use serde::{Deserialize, Serialize};

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ========== BOOK ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    pub cover_url: Option<String>,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    pub rating: Option<f64>,
    pub user_id: String,
    pub date_added: String,
    pub updated_at: String,
}

/// Body of POST /books. Year and rating arrive as either numbers or
/// numeric strings depending on the form serializer, so they are kept
/// raw here and parsed during validation. A `userId` field in the body
/// is accepted but never trusted.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    pub cover_url: Option<String>,
    pub published_year: Option<serde_json::Value>,
    pub isbn: Option<String>,
    pub rating: Option<serde_json::Value>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}
