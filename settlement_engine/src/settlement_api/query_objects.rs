use std::fmt::Display;

use serde::{Deserialize, Serialize};
use settlement_common::Kobo;

use crate::db_types::{FundRelease, FundReleaseStatus, OrderId, SubOrder, WithdrawalStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

//--------------------------------------      Pagination       ---------------------------------------------------------
/// One-based page selection. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self { page: self.page.max(1), page_size: self.page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.normalized().page_size)
    }

    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.page_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub fn new(pagination: Pagination, total: i64) -> Self {
        let p = pagination.normalized();
        let size = i64::from(p.page_size);
        let total_pages = (total + size - 1) / size;
        Self { page: p.page, page_size: p.page_size, total, total_pages }
    }
}

/// A page of results in the `{data, pagination}` envelope returned by every listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self { data, pagination: PageInfo::new(pagination, total) }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

//--------------------------------------   FundReleaseQuery    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundReleaseSortBy {
    #[default]
    CreatedAt,
    ScheduledReleaseTime,
    Amount,
}

impl FundReleaseSortBy {
    /// The column to sort on. Only ever one of these fixed identifiers is pushed into SQL.
    pub fn column(&self) -> &'static str {
        match self {
            FundReleaseSortBy::CreatedAt => "created_at",
            FundReleaseSortBy::ScheduledReleaseTime => "scheduled_release_time",
            FundReleaseSortBy::Amount => "amount",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundReleaseQuery {
    pub status: Option<FundReleaseStatus>,
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub sort_by: FundReleaseSortBy,
    #[serde(default)]
    pub sort_dir: SortDirection,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for FundReleaseQuery {
    fn default() -> Self {
        Self {
            status: None,
            order_id: None,
            sort_by: FundReleaseSortBy::default(),
            sort_dir: SortDirection::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FundReleaseQuery {
    pub fn with_status(mut self, status: FundReleaseStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn sorted_by(mut self, sort_by: FundReleaseSortBy, dir: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.sort_dir = dir;
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }
}

impl Display for FundReleaseQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(status) = &self.status {
            write!(f, "status: {status}. ")?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        write!(
            f,
            "sort: {} {}. page {} ({} per page)",
            self.sort_by.column(),
            self.sort_dir.sql(),
            self.page,
            self.page_size
        )
    }
}

//--------------------------------------    WithdrawalQuery    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for WithdrawalQuery {
    fn default() -> Self {
        Self { status: None, page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl WithdrawalQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }
}

//--------------------------------------     Summaries         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: FundReleaseStatus,
    pub count: i64,
    pub total_amount: Kobo,
}

/// A fund release together with a snapshot of the sub-order it settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundReleaseDetail {
    pub release: FundRelease,
    pub sub_order: SubOrder,
}
