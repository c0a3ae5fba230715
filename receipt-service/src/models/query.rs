//! Filter, sort and pagination vocabulary for bill queries.

use serde::{Deserialize, Serialize};

/// Predicate over bills. Every supplied bound is ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillFilter {
    /// Inclusive lower bound on the `YYYY-MM-DD` date string.
    pub date_from: Option<String>,
    /// Inclusive upper bound on the `YYYY-MM-DD` date string.
    pub date_to: Option<String>,
    /// Case-insensitive substring of the store name.
    pub store_name: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Case-insensitive substring of the store name or the date.
    pub search_term: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Date,
    StoreName,
    Total,
    Tax,
    Subtotal,
}

impl SortField {
    /// Column name; only ever interpolated from this fixed set.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::StoreName => "storeName",
            SortField::Total => "total",
            SortField::Tax => "tax",
            SortField::Subtotal => "subtotal",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortField::Date),
            "storeName" => Ok(SortField::StoreName),
            "total" => Ok(SortField::Total),
            "tax" => Ok(SortField::Tax),
            "subtotal" => Ok(SortField::Subtotal),
            _ => Err(format!(
                "Invalid sortField: {}. Allowed: date, storeName, total, tax, subtotal",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(format!("Invalid sortDirection: {}. Allowed: asc, desc", s)),
        }
    }
}

/// Single-key ordering. Defaults to newest date first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BillSort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 1000;

    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: PageRequest, total_count: u64) -> Self {
        Self {
            current_page: page.page,
            page_size: page.page_size,
            total_count,
            total_pages: total_count.div_ceil(u64::from(page.page_size)),
        }
    }
}

/// Summary over a filtered set of bills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillStats {
    pub total: f64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let page = PageRequest::new(1, 20);
        assert_eq!(Pagination::new(page, 0).total_pages, 0);
        assert_eq!(Pagination::new(page, 20).total_pages, 1);
        assert_eq!(Pagination::new(page, 21).total_pages, 2);
    }

    #[test]
    fn page_request_is_clamped() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
        assert_eq!(PageRequest::new(1, 50_000).page_size, PageRequest::MAX_PAGE_SIZE);
    }

    #[test]
    fn sort_vocabulary_parses() {
        assert_eq!("storeName".parse::<SortField>().unwrap(), SortField::StoreName);
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("amount".parse::<SortField>().is_err());
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
