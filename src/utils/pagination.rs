// src/utils/pagination.rs

//! Translates `page`/`limit`/`sortBy`/`ord` query parameters into a bounded,
//! ordered window over the posts table.

use crate::error::AppError;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Title,
    Score,
    CommentsCount,
}

impl SortField {
    /// Accepts the short query keys as well as the field names themselves.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "date" | "createdAt" => Some(SortField::CreatedAt),
            "name" | "title" => Some(SortField::Title),
            "score" => Some(SortField::Score),
            "commentsNum" | "commentsNumber" | "commentsCount" => Some(SortField::CommentsCount),
            _ => None,
        }
    }

    /// Whitelisted column name; safe to splice into SQL.
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "p.created_at",
            SortField::Title => "p.title",
            SortField::Score => "p.score",
            SortField::CommentsCount => "p.comments_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortSpec {
    /// `ORDER BY` body with an id tie-breaker in the same direction.
    pub fn order_by(&self) -> String {
        format!(
            "{col} {ord}, p.id {ord}",
            col = self.field.column(),
            ord = self.order.keyword()
        )
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub skip: i64,
    pub sort: SortSpec,
}

impl PageRequest {
    /// Validates raw parameters. Unknown sort keys or orders are rejected
    /// rather than silently replaced by the defaults.
    pub fn from_params(
        page: Option<i64>,
        limit: Option<i64>,
        sort_by: Option<&str>,
        ord: Option<&str>,
    ) -> Result<Self, AppError> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        if page < 1 {
            return Err(AppError::BadRequest(format!(
                "Invalid query parameter: 'page' = {page}"
            )));
        }

        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit < 1 {
            return Err(AppError::BadRequest(format!(
                "Invalid query parameter: 'limit' = {limit}"
            )));
        }
        let limit = limit.min(MAX_LIMIT);

        let mut sort = SortSpec::default();
        if let Some(o) = ord.filter(|o| !o.is_empty()) {
            sort.order = SortOrder::parse(o).ok_or_else(|| {
                AppError::BadRequest(format!("Invalid query parameter: 'ord' = {o}"))
            })?;
        }
        if let Some(s) = sort_by.filter(|s| !s.is_empty()) {
            sort.field = SortField::parse(s).ok_or_else(|| {
                AppError::BadRequest(format!("Invalid query parameter: 'sortBy' = {s}"))
            })?;
        }

        let skip = (page - 1).saturating_mul(limit);

        Ok(Self {
            page,
            limit,
            skip,
            sort,
        })
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}
