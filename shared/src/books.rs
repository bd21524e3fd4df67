use crate::error::{json_response, ApiError};
use crate::forms::{validate_new_book, NewBook};
use crate::types::{Book, CreateBookRequest};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

// Single-table layout:
//   PK=BOOK#{id}  SK=BOOK#{id}   the book row, carries user_id (owner)
//   PK=USER#{id}  SK=BOOK#{id}   ownership link, enables list-by-owner

fn book_pk(book_id: &str) -> String {
    format!("BOOK#{}", book_id)
}

fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

/// Materialize a book row with the owner forced to the authenticated
/// user. Any owner supplied in the request body has already been
/// discarded by this point.
fn new_book_row(user_id: &str, new: NewBook) -> Book {
    let now = chrono::Utc::now().to_rfc3339();
    Book {
        id: uuid::Uuid::new_v4().to_string(),
        title: new.title,
        author: new.author,
        description: new.description,
        genre: new.genre,
        cover_url: new.cover_url,
        published_year: new.published_year,
        isbn: new.isbn,
        rating: new.rating,
        user_id: user_id.to_string(),
        date_added: now.clone(),
        updated_at: now,
    }
}

fn book_item(book: &Book) -> HashMap<String, AttributeValue> {
    let pk = book_pk(&book.id);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    item.insert("SK".to_string(), AttributeValue::S(pk));
    item.insert("title".to_string(), AttributeValue::S(book.title.clone()));
    item.insert("author".to_string(), AttributeValue::S(book.author.clone()));
    item.insert(
        "description".to_string(),
        AttributeValue::S(book.description.clone()),
    );
    item.insert("genre".to_string(), AttributeValue::S(book.genre.clone()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(book.user_id.clone()),
    );
    item.insert(
        "date_added".to_string(),
        AttributeValue::S(book.date_added.clone()),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(book.updated_at.clone()),
    );
    if let Some(cover_url) = &book.cover_url {
        item.insert(
            "cover_url".to_string(),
            AttributeValue::S(cover_url.clone()),
        );
    }
    if let Some(year) = book.published_year {
        item.insert(
            "published_year".to_string(),
            AttributeValue::N(year.to_string()),
        );
    }
    if let Some(isbn) = &book.isbn {
        item.insert("isbn".to_string(), AttributeValue::S(isbn.clone()));
    }
    if let Some(rating) = book.rating {
        item.insert("rating".to_string(), AttributeValue::N(rating.to_string()));
    }
    item
}

fn link_item(book: &Book) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        "PK".to_string(),
        AttributeValue::S(user_pk(&book.user_id)),
    );
    item.insert("SK".to_string(), AttributeValue::S(book_pk(&book.id)));
    item.insert(
        "added_at".to_string(),
        AttributeValue::S(book.date_added.clone()),
    );
    item
}

fn book_from_item(book_id: &str, item: &HashMap<String, AttributeValue>) -> Book {
    let get_s = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };
    Book {
        id: book_id.to_string(),
        title: get_s("title").unwrap_or_default(),
        author: get_s("author").unwrap_or_default(),
        description: get_s("description").unwrap_or_default(),
        genre: get_s("genre").unwrap_or_default(),
        cover_url: get_s("cover_url"),
        published_year: item
            .get("published_year")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok()),
        isbn: get_s("isbn"),
        rating: item
            .get("rating")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok()),
        user_id: get_s("user_id").unwrap_or_default(),
        date_added: get_s("date_added").unwrap_or_default(),
        updated_at: get_s("updated_at").unwrap_or_default(),
    }
}

/// List the caller's books, most recently added first
pub async fn list_books(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(user_pk(user_id)))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("BOOK#".to_string()))
        .send()
        .await?;

    let mut book_ids = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(book_id) = sk.strip_prefix("BOOK#") {
                book_ids.push(book_id.to_string());
            }
        }
    }

    let mut books: Vec<Book> = Vec::new();

    // Batch fetch the book rows (DynamoDB allows up to 100 keys per batch)
    for chunk in book_ids.chunks(100) {
        let mut keys = Vec::new();
        for book_id in chunk {
            let pk = book_pk(book_id);
            let mut key = HashMap::new();
            key.insert("PK".to_string(), AttributeValue::S(pk.clone()));
            key.insert("SK".to_string(), AttributeValue::S(pk));
            keys.push(key);
        }

        let batch_result = client
            .batch_get_item()
            .request_items(
                table_name,
                aws_sdk_dynamodb::types::KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .build()?,
            )
            .send()
            .await?;

        if let Some(responses) = batch_result.responses() {
            if let Some(items) = responses.get(table_name) {
                for item in items {
                    if let Some(pk) = item.get("PK").and_then(|v| v.as_s().ok()) {
                        if let Some(book_id) = pk.strip_prefix("BOOK#") {
                            books.push(book_from_item(book_id, item));
                        }
                    }
                }
            }
        }
    }

    // batch_get_item does not preserve key order
    books.sort_by(|a, b| b.date_added.cmp(&a.date_added));

    json_response(StatusCode::OK, &serde_json::to_value(&books)?)
}

/// Create a book owned by the caller
pub async fn create_book(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateBookRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("[CREATE] Parse error: {}", e);
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": format!("Invalid request body: {}", e) }),
            );
        }
    };

    let new = match validate_new_book(&req) {
        Ok(new) => new,
        Err(fields) => return ApiError::Validation(fields).into_response(),
    };

    if let Some(claimed) = &req.user_id {
        if claimed != user_id {
            tracing::warn!("[CREATE] Ignoring client-supplied owner {}", claimed);
        }
    }

    let book = new_book_row(user_id, new);
    tracing::info!("[CREATE] Book {} for user {}", book.id, user_id);

    client
        .batch_write_item()
        .request_items(
            table_name,
            vec![
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(book_item(&book)))
                            .build()?,
                    )
                    .build(),
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(link_item(&book)))
                            .build()?,
                    )
                    .build(),
            ],
        )
        .send()
        .await?;

    json_response(StatusCode::CREATED, &serde_json::to_value(&book)?)
}

/// Missing row is NotFound, someone else's row is Forbidden. Existence
/// is checked first, so deleting another user's book does not masquerade
/// as a missing one.
fn authorize_delete(
    item: Option<&HashMap<String, AttributeValue>>,
    user_id: &str,
    book_id: &str,
) -> Result<(), ApiError> {
    let Some(item) = item else {
        return Err(ApiError::NotFound("Book"));
    };

    let owner = item
        .get("user_id")
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .unwrap_or_default();
    if owner != user_id {
        tracing::warn!(
            "[DELETE] User {} attempted to delete book {} owned by {}",
            user_id,
            book_id,
            owner
        );
        return Err(ApiError::Forbidden);
    }

    Ok(())
}

/// Delete a book after verifying it exists and the caller owns it
pub async fn delete_book(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    book_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = book_pk(book_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk.clone()))
        .send()
        .await?;

    if let Err(e) = authorize_delete(result.item(), user_id, book_id) {
        return e.into_response();
    }

    let mut book_key = HashMap::new();
    book_key.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    book_key.insert("SK".to_string(), AttributeValue::S(pk.clone()));

    let mut link_key = HashMap::new();
    link_key.insert("PK".to_string(), AttributeValue::S(user_pk(user_id)));
    link_key.insert("SK".to_string(), AttributeValue::S(pk));

    let delete_requests: Vec<_> = [book_key, link_key]
        .into_iter()
        .map(|key| {
            aws_sdk_dynamodb::types::WriteRequest::builder()
                .delete_request(
                    aws_sdk_dynamodb::types::DeleteRequest::builder()
                        .set_key(Some(key))
                        .build()
                        .expect("delete request has a key"),
                )
                .build()
        })
        .collect();

    let mut attempts = 0;
    let mut unprocessed = Some(delete_requests);
    while let Some(requests) = unprocessed {
        attempts += 1;
        if attempts > 5 {
            tracing::warn!(
                "[DELETE] Max retry attempts reached, {} items may not be deleted",
                requests.len()
            );
            break;
        }

        let result = client
            .batch_write_item()
            .request_items(table_name, requests)
            .send()
            .await?;

        unprocessed = result
            .unprocessed_items()
            .and_then(|items| items.get(table_name))
            .filter(|items| !items.is_empty())
            .cloned();

        if unprocessed.is_some() {
            tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64)).await;
        }
    }

    tracing::info!("[DELETE] Book {} deleted by {}", book_id, user_id);

    json_response(
        StatusCode::OK,
        &serde_json::json!({ "message": "Book deleted successfully" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new() -> NewBook {
        NewBook {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            description: "Desert planet".to_string(),
            genre: "Science Fiction".to_string(),
            cover_url: None,
            published_year: Some(1965),
            isbn: None,
            rating: Some(4.5),
        }
    }

    #[test]
    fn test_owner_always_the_session_user() {
        // a request carrying someone else's userId must not change the owner
        let req = CreateBookRequest {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            description: "d".to_string(),
            genre: "Science Fiction".to_string(),
            user_id: Some("intruder".to_string()),
            ..Default::default()
        };
        let new = validate_new_book(&req).unwrap();
        let book = new_book_row("u1", new);
        assert_eq!(book.user_id, "u1");
    }

    #[test]
    fn test_book_row_gets_id_and_timestamps() {
        let book = new_book_row("u1", sample_new());
        assert!(!book.id.is_empty());
        assert_eq!(book.date_added, book.updated_at);
        assert!(chrono::DateTime::parse_from_rfc3339(&book.date_added).is_ok());
    }

    #[test]
    fn test_item_keys_and_link() {
        let book = new_book_row("u1", sample_new());
        let item = book_item(&book);
        let pk = format!("BOOK#{}", book.id);
        assert_eq!(item.get("PK").unwrap().as_s().unwrap(), &pk);
        assert_eq!(item.get("SK").unwrap().as_s().unwrap(), &pk);
        assert_eq!(item.get("user_id").unwrap().as_s().unwrap(), "u1");
        // absent optionals are not written as empty strings
        assert!(!item.contains_key("cover_url"));
        assert!(!item.contains_key("isbn"));

        let link = link_item(&book);
        assert_eq!(link.get("PK").unwrap().as_s().unwrap(), "USER#u1");
        assert_eq!(link.get("SK").unwrap().as_s().unwrap(), &pk);
    }

    #[test]
    fn test_delete_missing_book_is_not_found() {
        let result = authorize_delete(None, "u1", "b1");
        assert!(matches!(result, Err(ApiError::NotFound("Book"))));
    }

    #[test]
    fn test_delete_foreign_book_is_forbidden() {
        let book = new_book_row("owner", sample_new());
        let item = book_item(&book);

        assert!(matches!(
            authorize_delete(Some(&item), "intruder", &book.id),
            Err(ApiError::Forbidden)
        ));
        assert!(authorize_delete(Some(&item), "owner", &book.id).is_ok());
    }

    #[test]
    fn test_book_from_item_restores_fields() {
        let book = new_book_row("u1", sample_new());
        let restored = book_from_item(&book.id, &book_item(&book));
        assert_eq!(restored.title, "Dune");
        assert_eq!(restored.published_year, Some(1965));
        assert_eq!(restored.rating, Some(4.5));
        assert_eq!(restored.cover_url, None);
        assert_eq!(restored.user_id, "u1");
    }
}
