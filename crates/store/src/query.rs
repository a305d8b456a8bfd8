use common::{RequestId, UserId};
use domain::{BidStatus, OrderStatus, RequestStatus};

/// Builder for bid listing queries.
///
/// Unset fields do not filter. Results are ordered oldest first.
#[derive(Debug, Clone, Default)]
pub struct BidFilter {
    /// Filter by the request the bids were placed on.
    pub request_id: Option<RequestId>,

    /// Filter by bidding supplier.
    pub supplier_id: Option<UserId>,

    /// Filter by bid status.
    pub status: Option<BidStatus>,

    /// Restrict to bids on requests owned by this buyer.
    pub buyer_id: Option<UserId>,

    /// Maximum number of bids to return.
    pub limit: Option<usize>,

    /// Number of bids to skip.
    pub offset: Option<usize>,
}

impl BidFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for every bid on one request.
    pub fn for_request(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Default::default()
        }
    }

    pub fn request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn supplier(mut self, supplier_id: UserId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn buyer(mut self, buyer_id: UserId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn status(mut self, status: BidStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Filter for request listings, newest first.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub buyer_id: Option<UserId>,
    pub status: Option<RequestStatus>,
    pub limit: Option<usize>,
}

impl RequestFilter {
    pub fn for_buyer(buyer_id: UserId) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    pub fn open() -> Self {
        Self {
            status: Some(RequestStatus::Open),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for catalog listings, newest first.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub supplier_id: Option<UserId>,
    /// Case-insensitive exact category match.
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl ProductFilter {
    pub fn for_supplier(supplier_id: UserId) -> Self {
        Self {
            supplier_id: Some(supplier_id),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for order listings, newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub buyer_id: Option<UserId>,
    pub supplier_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_buyer(buyer_id: UserId) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    pub fn for_supplier(supplier_id: UserId) -> Self {
        Self {
            supplier_id: Some(supplier_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}
