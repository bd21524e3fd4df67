//! List presentation over a fetched book collection: filter, sort,
//! paginate. These run client-side on the local copy and are recomputed
//! whenever the query changes; the server always returns the full
//! owner-scoped list.

use crate::types::Book;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Author,
    DateAdded,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Grid shows 6 cards per page, the table view 12 rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Grid,
    Table,
}

impl ViewMode {
    pub fn page_size(self) -> usize {
        match self {
            ViewMode::Grid => 6,
            ViewMode::Table => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenreFilter {
    All,
    Genre(String),
}

#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub search: String,
    pub genre: GenreFilter,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub view: ViewMode,
    pub page: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            genre: GenreFilter::All,
            sort_by: SortKey::DateAdded,
            order: SortOrder::Desc,
            view: ViewMode::Grid,
            page: 1,
        }
    }
}

/// Distinguishes "you have no books" from "your filter matched nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryState {
    EmptyLibrary,
    NoMatches,
    Results,
}

#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub books: Vec<Book>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    pub state: LibraryState,
}

/// A book is retained when the term is empty or matches title, author
/// or genre, case-insensitively, and it passes the genre filter.
fn matches(book: &Book, search: &str, genre: &GenreFilter) -> bool {
    let matches_search = if search.trim().is_empty() {
        true
    } else {
        let term = search.to_lowercase();
        book.title.to_lowercase().contains(&term)
            || book.author.to_lowercase().contains(&term)
            || book.genre.to_lowercase().contains(&term)
    };

    let matches_genre = match genre {
        GenreFilter::All => true,
        GenreFilter::Genre(wanted) => book.genre == *wanted,
    };

    matches_search && matches_genre
}

fn compare(a: &Book, b: &Book, key: SortKey) -> Ordering {
    match key {
        // case-folded code-point order, not locale collation
        SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortKey::Author => a.author.to_lowercase().cmp(&b.author.to_lowercase()),
        // RFC 3339 UTC timestamps sort lexicographically
        SortKey::DateAdded => a.date_added.cmp(&b.date_added),
        SortKey::Rating => {
            let a = a.rating.unwrap_or(0.0);
            let b = b.rating.unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

/// Stable sort; ties keep their prior relative order, no secondary key.
pub fn sort_books(books: &mut [Book], key: SortKey, order: SortOrder) {
    books.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Apply filter, sort and pagination in that order. The requested page
/// is clamped to the recomputed page count, so a filter change can
/// never leave the caller on a silently empty page.
pub fn apply(books: &[Book], query: &CatalogQuery) -> CatalogPage {
    let mut filtered: Vec<Book> = books
        .iter()
        .filter(|book| matches(book, &query.search, &query.genre))
        .cloned()
        .collect();

    sort_books(&mut filtered, query.sort_by, query.order);

    let total_matches = filtered.len();
    let page_size = query.view.page_size();
    let total_pages = total_matches.div_ceil(page_size);
    let page = query.page.clamp(1, total_pages.max(1));

    let start = (page - 1) * page_size;
    let page_books: Vec<Book> = filtered
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    let state = if books.is_empty() {
        LibraryState::EmptyLibrary
    } else if total_matches == 0 {
        LibraryState::NoMatches
    } else {
        LibraryState::Results
    };

    CatalogPage {
        books: page_books,
        page,
        total_pages,
        total_matches,
        state,
    }
}

/// Unique genres present in the collection, sorted, for the filter
/// dropdown.
pub fn genres(books: &[Book]) -> Vec<String> {
    let mut genres: Vec<String> = books.iter().map(|b| b.genre.clone()).collect();
    genres.sort();
    genres.dedup();
    genres
}

/// Stored cover URL, or a generated placeholder reference when absent.
pub fn cover_or_placeholder(book: &Book) -> String {
    match &book.cover_url {
        Some(url) => url.clone(),
        None => format!(
            "/covers/placeholder.svg?title={}",
            urlencoding::encode(&book.title)
        ),
    }
}
