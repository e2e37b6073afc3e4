//! Catalog and order models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Columns `GET /products` may sort by
pub const SORTABLE_PRODUCT_COLUMNS: &[&str] = &["name", "price", "category"];

const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteProductRequest {
    pub id: String,
}

/// Query string of `GET /products`. Paging values stay raw text so a
/// malformed value falls back to its default instead of failing the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub id: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
}

impl ProductQuery {
    /// Pages are 1-indexed; anything below 1 means the first page
    pub fn page(&self) -> i64 {
        positive(self.page.as_deref()).unwrap_or(1)
    }

    /// Capped at `MAX_PAGE_SIZE`
    pub fn page_size(&self) -> i64 {
        positive(self.page_size.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    /// ORDER BY clause built only from whitelisted columns. Without `sortBy`
    /// rows come back in insertion order; an unknown column sorts by name.
    pub fn order_clause(&self) -> String {
        let Some(requested) = self.sort_by.as_deref().filter(|s| !s.is_empty()) else {
            return "ORDER BY rowid ASC".to_string();
        };
        let column = SORTABLE_PRODUCT_COLUMNS
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(requested))
            .copied()
            .unwrap_or("name");
        let direction = match self.order.as_deref() {
            Some(o) if o.eq_ignore_ascii_case("desc") => "DESC",
            _ => "ASC",
        };
        format!("ORDER BY {} {}, rowid ASC", column, direction)
    }
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if page_size < 1 {
        return 0;
    }
    total / page_size + i64::from(total % page_size != 0)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Filtered, sorted and paginated product listing
pub async fn list_products(
    db: &SqlitePool,
    query: &ProductQuery,
) -> Result<ProductPage, sqlx::Error> {
    let page = query.page();
    let page_size = query.page_size();

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(id) = query.id.as_ref().filter(|v| !v.is_empty()) {
        conditions.push("id = ?");
        bindings.push(id.clone());
    }

    if let Some(category) = query.category.as_ref().filter(|v| !v.is_empty()) {
        conditions.push("category = ?");
        bindings.push(category.clone());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM products {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT id, name, price, category FROM products {} {} LIMIT ? OFFSET ?",
        where_clause,
        query.order_clause()
    );
    let mut select = sqlx::query_as::<_, Product>(&sql);
    for binding in &bindings {
        select = select.bind(binding);
    }
    let products = select.bind(page_size).bind(query.offset()).fetch_all(db).await?;

    Ok(ProductPage {
        products,
        total,
        page,
        page_size,
        total_pages: total_pages(total, page_size),
    })
}

/// One line of a shopping cart as posted by the storefront
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    /// JSON array of [`CartLine`]
    pub items: String,
    pub total_amount: f64,
    pub currency: String,
    pub payment_status: String,
    pub created_at: String,
}

impl Order {
    pub fn lines(&self) -> Vec<CartLine> {
        serde_json::from_str(&self.items).unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub message: String,
    pub payment_status: String,
    pub total_amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let query = ProductQuery {
            page: Some("0".to_string()),
            page_size: Some("-4".to_string()),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), 10);
        assert_eq!(query.offset(), 0);

        let query = ProductQuery {
            page: Some("3".to_string()),
            page_size: Some(" 10 ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn test_malformed_paging_falls_back_to_defaults() {
        for (page, page_size) in [("abc", "x"), ("", ""), ("1.5", "9999999999999999999999")] {
            let query = ProductQuery {
                page: Some(page.to_string()),
                page_size: Some(page_size.to_string()),
                ..Default::default()
            };
            assert_eq!(query.page(), 1);
            assert_eq!(query.page_size(), 10);
        }
    }

    #[test]
    fn test_page_size_is_capped() {
        let query = ProductQuery {
            page: Some(i64::MAX.to_string()),
            page_size: Some(i64::MAX.to_string()),
            ..Default::default()
        };
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);
        assert!(query.offset() > 0);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(2, i64::MAX), 1);
        assert_eq!(total_pages(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_order_clause_whitelist() {
        let mut query = ProductQuery::default();
        assert_eq!(query.order_clause(), "ORDER BY rowid ASC");

        query.sort_by = Some("Price".to_string());
        query.order = Some("desc".to_string());
        assert_eq!(query.order_clause(), "ORDER BY price DESC, rowid ASC");

        query.sort_by = Some("price; DROP TABLE products".to_string());
        query.order = None;
        assert_eq!(query.order_clause(), "ORDER BY name ASC, rowid ASC");
    }

    #[test]
    fn test_order_lines_round_trip_through_json() {
        let order = Order {
            id: "o1".to_string(),
            items: r#"[{"id":"p1","name":"Brie","price":7.5,"quantity":2}]"#.to_string(),
            total_amount: 15.0,
            currency: "USD".to_string(),
            payment_status: "Completed".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let lines = order.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }
}
