//! Supplier bids and their lifecycle outside of acceptance.
//!
//! Acceptance changes several records at once and lives in
//! [`crate::coordinator::BidAcceptanceSaga`].

use chrono::Utc;
use common::{BidId, RequestId, UserId};
use domain::{Actor, Bid, BidStatus, NewBid, Role};
use store::{BidFilter, MarketStore, MarketStoreExt, UnitOfWork};

use crate::error::{Result, SagaError};
use crate::services::require_role;

#[derive(Clone)]
pub struct BidService<S> {
    store: S,
}

impl<S: MarketStore + Clone> BidService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places a bid on an open request.
    ///
    /// One bid per supplier per request. The product's current tier price
    /// for the bid quantity is snapshotted as the original price.
    #[tracing::instrument(skip(self, input), fields(supplier_id = %actor.user_id, request_id = %input.request_id))]
    pub async fn create_bid(&self, actor: &Actor, input: NewBid) -> Result<Bid> {
        require_role(actor, Role::Supplier, "place bids")?;
        input.validate()?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let request = uow
            .lock_request(input.request_id)
            .await?
            .ok_or_else(|| SagaError::not_found("request", input.request_id))?;
        request.ensure_accepts_bids(now)?;

        if uow.find_bid(request.id, actor.user_id).await?.is_some() {
            return Err(SagaError::conflict(format!(
                "supplier already bid on request {}",
                request.request_number
            )));
        }

        let product = uow
            .get_product(input.product_id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", input.product_id))?;
        if product.supplier_id != actor.user_id {
            return Err(SagaError::forbidden("bids must reference your own product"));
        }

        let bid = Bid {
            id: BidId::new(),
            request_id: request.id,
            supplier_id: actor.user_id,
            supplier_name: supplier_name(uow.as_mut(), actor).await?,
            product_id: product.id,
            product_title: product.title.clone(),
            bid_price: input.bid_price,
            original_price: product.unit_price_for(input.quantity, None)?,
            quantity: input.quantity,
            delivery_time_days: input.delivery_time_days,
            message: input.message,
            status: BidStatus::Pending,
            created_at: now,
            accepted_at: None,
            rejected_at: None,
            withdrawn_at: None,
        };

        uow.insert_bid(&bid).await?;
        uow.adjust_bid_count(request.id, 1).await?;
        uow.commit().await?;

        metrics::counter!("bids_created_total").increment(1);
        tracing::info!(bid_id = %bid.id, discount = bid.discount_percent(), "bid placed");
        Ok(bid)
    }

    /// Suppliers see their own bids; buyers see bids on their requests.
    pub async fn get_bid(&self, actor: &Actor, id: BidId) -> Result<Bid> {
        let bid = self
            .store
            .bid(id)
            .await?
            .ok_or_else(|| SagaError::not_found("bid", id))?;
        match actor.role {
            Role::Supplier if bid.supplier_id == actor.user_id => Ok(bid),
            Role::Buyer => {
                let owner = self.request_owner(bid.request_id).await?;
                if owner == Some(actor.user_id) {
                    Ok(bid)
                } else {
                    Err(SagaError::forbidden("bid is on another buyer's request"))
                }
            }
            Role::Supplier => Err(SagaError::forbidden("bid belongs to another supplier")),
        }
    }

    /// Lists bids visible to the caller, narrowed by `filter`.
    pub async fn list_bids(&self, actor: &Actor, filter: BidFilter) -> Result<Vec<Bid>> {
        let filter = match actor.role {
            Role::Supplier => filter.supplier(actor.user_id),
            Role::Buyer => filter.buyer(actor.user_id),
        };
        Ok(self.store.bids(filter).await?)
    }

    /// The request owner turns down a pending bid.
    #[tracing::instrument(skip(self), fields(buyer_id = %actor.user_id))]
    pub async fn reject_bid(&self, actor: &Actor, id: BidId) -> Result<Bid> {
        require_role(actor, Role::Buyer, "reject bids")?;

        let mut uow = self.store.begin().await?;
        let mut bid = uow
            .get_bid(id)
            .await?
            .ok_or_else(|| SagaError::not_found("bid", id))?;
        let request = uow
            .get_request(bid.request_id)
            .await?
            .ok_or_else(|| SagaError::not_found("request", bid.request_id))?;
        if request.buyer_id != actor.user_id {
            return Err(SagaError::forbidden("bid is on another buyer's request"));
        }

        bid.transition(BidStatus::Rejected, Utc::now())?;
        uow.update_bid(&bid, BidStatus::Pending).await?;
        uow.commit().await?;
        Ok(bid)
    }

    /// The bidding supplier pulls a pending bid.
    ///
    /// The request's bid counter is decremented afterwards in its own unit
    /// of work; a failure there is logged and does not undo the withdrawal.
    #[tracing::instrument(skip(self), fields(supplier_id = %actor.user_id))]
    pub async fn withdraw_bid(&self, actor: &Actor, id: BidId) -> Result<Bid> {
        require_role(actor, Role::Supplier, "withdraw bids")?;

        let mut uow = self.store.begin().await?;
        let mut bid = uow
            .get_bid(id)
            .await?
            .ok_or_else(|| SagaError::not_found("bid", id))?;
        if bid.supplier_id != actor.user_id {
            return Err(SagaError::forbidden("bid belongs to another supplier"));
        }
        bid.transition(BidStatus::Withdrawn, Utc::now())?;
        uow.update_bid(&bid, BidStatus::Pending).await?;
        uow.commit().await?;

        if let Err(err) = self.decrement_bid_count(&bid).await {
            tracing::warn!(
                bid_id = %bid.id,
                request_id = %bid.request_id,
                error = %err,
                "bid withdrawn but request bid count was not decremented"
            );
        }
        Ok(bid)
    }

    async fn decrement_bid_count(&self, bid: &Bid) -> Result<()> {
        let mut uow = self.store.begin().await?;
        uow.adjust_bid_count(bid.request_id, -1).await?;
        uow.commit().await?;
        Ok(())
    }

    async fn request_owner(&self, request_id: RequestId) -> Result<Option<UserId>> {
        Ok(self.store.request(request_id).await?.map(|r| r.buyer_id))
    }
}

/// Display name frozen onto a bid: company, then profile name, then email.
async fn supplier_name(uow: &mut dyn UnitOfWork, actor: &Actor) -> Result<String> {
    Ok(match uow.get_user(actor.user_id).await? {
        Some(profile) => profile
            .company
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(profile.name),
        None => actor.email.clone(),
    })
}
