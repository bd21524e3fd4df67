use crate::types::CreateBookRequest;
use serde::Serialize;
use std::collections::BTreeMap;

/// Suggested genres offered by the add-book form. Free text is still
/// accepted server-side; this list is advisory, not enforced.
pub const GENRES: [&str; 20] = [
    "Classic Literature",
    "Science Fiction",
    "Fantasy",
    "Mystery",
    "Romance",
    "Thriller",
    "Non-Fiction",
    "Biography",
    "History",
    "Self-Help",
    "Business",
    "Technology",
    "Health",
    "Travel",
    "Poetry",
    "Drama",
    "Horror",
    "Adventure",
    "Young Adult",
    "Children's",
];

pub const MIN_PUBLISHED_YEAR: i32 = 1000;
pub const MAX_RATING: f64 = 5.0;

pub fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

// ========== FIELD CONFIGURATION ==========

/// Discriminated per-field configuration for the add-book form.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Select { options: Vec<&'static str> },
    Year { min: i32, max: i32 },
    Isbn,
    Rating { max: u8 },
    Url,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
}

/// The add-book form, one entry per field.
pub fn book_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            name: "title",
            label: "Title",
            kind: FieldKind::Text,
            required: true,
        },
        FieldSpec {
            name: "author",
            label: "Author",
            kind: FieldKind::Text,
            required: true,
        },
        FieldSpec {
            name: "description",
            label: "Description",
            kind: FieldKind::TextArea,
            required: true,
        },
        FieldSpec {
            name: "genre",
            label: "Genre",
            kind: FieldKind::Select {
                options: GENRES.to_vec(),
            },
            required: true,
        },
        FieldSpec {
            name: "coverUrl",
            label: "Cover URL",
            kind: FieldKind::Url,
            required: false,
        },
        FieldSpec {
            name: "publishedYear",
            label: "Published Year",
            kind: FieldKind::Year {
                min: MIN_PUBLISHED_YEAR,
                max: current_year() + 1,
            },
            required: false,
        },
        FieldSpec {
            name: "isbn",
            label: "ISBN",
            kind: FieldKind::Isbn,
            required: false,
        },
        FieldSpec {
            name: "rating",
            label: "Rating",
            kind: FieldKind::Rating { max: 5 },
            required: false,
        },
    ]
}

// ========== VALIDATION ==========

/// A create request that passed validation: required fields trimmed and
/// non-empty, optional fields normalized to absent rather than empty,
/// year and rating parsed.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    pub cover_url: Option<String>,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    pub rating: Option<f64>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accepts a JSON number or a numeric string (the form submits strings).
fn parse_i32(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().map(|n| n as i32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validate a create request. Returns the normalized book on success or
/// a field -> message map naming every offending field.
pub fn validate_new_book(
    req: &CreateBookRequest,
) -> Result<NewBook, BTreeMap<&'static str, String>> {
    let mut errors = BTreeMap::new();

    let title = non_empty(&req.title);
    if title.is_none() {
        errors.insert("title", "Title is required".to_string());
    }
    let author = non_empty(&req.author);
    if author.is_none() {
        errors.insert("author", "Author is required".to_string());
    }
    let description = non_empty(&req.description);
    if description.is_none() {
        errors.insert("description", "Description is required".to_string());
    }
    let genre = non_empty(&req.genre);
    if genre.is_none() {
        errors.insert("genre", "Genre is required".to_string());
    }

    let published_year = match &req.published_year {
        Some(value) if !value.is_null() => match parse_i32(value) {
            Some(year) if (MIN_PUBLISHED_YEAR..=current_year() + 1).contains(&year) => {
                Some(year)
            }
            _ => {
                errors.insert("publishedYear", "Please enter a valid year".to_string());
                None
            }
        },
        _ => None,
    };

    let rating = match &req.rating {
        Some(value) if !value.is_null() => match parse_f64(value) {
            Some(rating) if (0.0..=MAX_RATING).contains(&rating) => Some(rating),
            _ => {
                errors.insert("rating", "Rating must be between 0 and 5".to_string());
                None
            }
        },
        _ => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewBook {
        title: title.unwrap(),
        author: author.unwrap(),
        description: description.unwrap(),
        genre: genre.unwrap(),
        cover_url: req.cover_url.as_deref().and_then(non_empty),
        published_year,
        isbn: req.isbn.as_deref().and_then(non_empty),
        rating,
    })
}
