//! Typed client for the catalog API. Holds a disposable local copy of
//! the caller's books: the server remains the source of truth, and the
//! cache is reconciled against server responses after every mutation.

use crate::types::Book;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Book payload for POST /books
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewBookPayload {
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

pub struct CatalogClient {
    base_url: String,
    access_token: String,
    http: reqwest::Client,
    books: Vec<Book>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            http: reqwest::Client::new(),
            books: Vec::new(),
        }
    }

    /// The local copy of the caller's books, most recent first.
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    async fn error_for(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| "Unknown error".to_string());

        match status {
            401 => ClientError::Unauthorized,
            403 => ClientError::Forbidden,
            404 => ClientError::NotFound(message),
            400 => ClientError::Validation(message),
            _ => ClientError::Api { status, message },
        }
    }

    /// Replace the local copy with the server's list.
    pub async fn fetch_books(&mut self) -> Result<&[Book], ClientError> {
        let response = self
            .http
            .get(format!("{}/books", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        self.books = response.json().await?;
        Ok(&self.books)
    }

    /// Create a book and reconcile the cache against the server's row
    /// (which carries the generated id and timestamps), not the input.
    pub async fn add_book(&mut self, payload: &NewBookPayload) -> Result<Book, ClientError> {
        let response = self
            .http
            .post(format!("{}/books", self.base_url))
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let created: Book = response.json().await?;
        self.books.insert(0, created.clone());
        Ok(created)
    }

    /// Delete a book; the cached row is only dropped once the server
    /// confirms, so a failed delete leaves the local copy intact.
    pub async fn delete_book(&mut self, id: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(format!("{}/books/{}", self.base_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        self.books.retain(|book| book.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn book_json(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "author": "Author",
            "description": "Desc",
            "genre": "Fantasy",
            "coverUrl": null,
            "publishedYear": null,
            "isbn": null,
            "rating": null,
            "userId": "u1",
            "dateAdded": "2024-01-01T00:00:00+00:00",
            "updatedAt": "2024-01-01T00:00:00+00:00",
        })
    }

    #[tokio::test]
    async fn test_fetch_replaces_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/books"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                book_json("1", "Dune"),
                book_json("2", "Emma")
            ])))
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "token-1");
        let books = client.fetch_books().await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "Dune");
    }

    #[tokio::test]
    async fn test_fetch_unauthorized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/books"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})),
            )
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "bad-token");
        let err = client.fetch_books().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized));
        assert!(client.books().is_empty());
    }

    #[tokio::test]
    async fn test_add_book_prepends_server_row() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/books"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(book_json("server-id", "Dune")),
            )
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "token-1");
        let payload = NewBookPayload {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            description: "Desert planet".to_string(),
            genre: "Science Fiction".to_string(),
            ..Default::default()
        };
        let created = client.add_book(&payload).await.unwrap();
        // the cache carries the server-assigned id, not a local one
        assert_eq!(created.id, "server-id");
        assert_eq!(client.books()[0].id, "server-id");
    }

    #[tokio::test]
    async fn test_add_book_validation_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/books"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "Validation failed"})),
            )
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "token-1");
        let err = client
            .add_book(&NewBookPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(client.books().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/books"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([book_json("1", "Dune")])),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/books/1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "Forbidden"})))
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "token-1");
        client.fetch_books().await.unwrap();

        let err = client.delete_book("1").await.unwrap_err();
        assert!(matches!(err, ClientError::Forbidden));
        assert_eq!(client.books().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_cache() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/books"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                book_json("1", "Dune"),
                book_json("2", "Emma")
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/books/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "Book deleted successfully"})),
            )
            .mount(&mock_server)
            .await;

        let mut client = CatalogClient::new(mock_server.uri(), "token-1");
        client.fetch_books().await.unwrap();
        client.delete_book("1").await.unwrap();

        assert_eq!(client.books().len(), 1);
        assert_eq!(client.books()[0].id, "2");
    }
}
