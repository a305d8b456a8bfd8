//! Saga coordinator for bid acceptance.

use chrono::Utc;
use common::BidId;
use domain::{Actor, Bid, BidStatus, CartItem, PartySnapshot, Request, RequestStatus, Role};
use serde::Serialize;
use store::{MarketStore, MarketStoreExt};
use uuid::Uuid;

use crate::bid_acceptance::{
    SAGA_TYPE, STEP_ACCEPT_BID, STEP_APPEND_CART_LINE, STEP_COMMIT, STEP_FULFILL_REQUEST,
    STEP_LOAD_BID, STEP_LOAD_SNAPSHOTS, STEP_LOCK_REQUEST, STEP_REJECT_SIBLINGS,
};
use crate::error::{Result, SagaError};
use crate::services::directory::party_for_user;
use crate::services::require_role;

/// Outcome of a completed acceptance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceReceipt {
    pub saga_id: Uuid,
    pub bid: Bid,
    pub request: Request,
    pub rejected_bids: Vec<BidId>,
    pub cart_item: CartItem,
    pub supplier: PartySnapshot,
    pub completed_steps: Vec<&'static str>,
}

/// Tags an error with the saga step it came from.
trait StepResultExt<T> {
    fn step(self, name: &'static str) -> Result<T>;
}

impl<T, E: Into<SagaError>> StepResultExt<T> for std::result::Result<T, E> {
    fn step(self, name: &'static str) -> Result<T> {
        self.map_err(|err| err.into().in_step(name))
    }
}

/// Orchestrates bid acceptance.
///
/// Every write of the saga happens in a single unit of work: accepting the
/// bid, rejecting the other pending bids, fulfilling the request and
/// appending the bid line to the buyer's cart. A failed step drops the unit
/// of work, which rolls back everything before it, so there is nothing to
/// compensate.
#[derive(Clone)]
pub struct BidAcceptanceSaga<S> {
    store: S,
}

impl<S: MarketStore + Clone> BidAcceptanceSaga<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Accepts `bid_id` on behalf of the request's buyer.
    ///
    /// A lost race against another acceptance, a reject or a withdraw
    /// surfaces as a conflict and is not retried.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE, buyer_id = %actor.user_id))]
    pub async fn accept(&self, actor: &Actor, bid_id: BidId) -> Result<AcceptanceReceipt> {
        let saga_start = std::time::Instant::now();
        let saga_id = Uuid::new_v4();

        let result = self.execute(actor, bid_id, saga_id).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("bid_acceptances_total").increment(1);
                tracing::info!(
                    %saga_id,
                    %bid_id,
                    rejected = receipt.rejected_bids.len(),
                    duration,
                    "saga completed successfully"
                );
            }
            Err(err) if err.is_conflict() => {
                metrics::counter!("bid_acceptance_conflicts_total").increment(1);
                tracing::warn!(%saga_id, %bid_id, error = %err, "saga lost a race");
            }
            Err(err) => {
                tracing::warn!(%saga_id, %bid_id, error = %err, "saga failed");
            }
        }
        result
    }

    async fn execute(&self, actor: &Actor, bid_id: BidId, saga_id: Uuid) -> Result<AcceptanceReceipt> {
        require_role(actor, Role::Buyer, "accept bids")?;
        let mut completed_steps = Vec::with_capacity(8);

        // Ownership and state are checked before any write; everything is
        // checked again under the request lock.
        tracing::info!(%saga_id, step = STEP_LOAD_BID, "saga step started");
        let bid = self
            .store
            .bid(bid_id)
            .await
            .step(STEP_LOAD_BID)?
            .ok_or_else(|| SagaError::not_found("bid", bid_id))?;
        let request = self
            .store
            .request(bid.request_id)
            .await
            .step(STEP_LOAD_BID)?
            .ok_or_else(|| SagaError::not_found("request", bid.request_id))?;
        if request.buyer_id != actor.user_id {
            return Err(SagaError::forbidden("bid is on another buyer's request"));
        }
        if bid.status != BidStatus::Pending {
            return Err(SagaError::conflict(format!("bid is already {}", bid.status)));
        }
        completed_steps.push(STEP_LOAD_BID);

        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        tracing::info!(%saga_id, step = STEP_LOCK_REQUEST, "saga step started");
        let mut request = uow
            .lock_request(request.id)
            .await
            .step(STEP_LOCK_REQUEST)?
            .ok_or_else(|| SagaError::not_found("request", request.id))?;
        if request.status != RequestStatus::Open {
            return Err(
                SagaError::conflict(format!("request is already {}", request.status))
                    .in_step(STEP_LOCK_REQUEST),
            );
        }
        let mut bid = uow
            .get_bid(bid_id)
            .await
            .step(STEP_LOCK_REQUEST)?
            .ok_or_else(|| SagaError::not_found("bid", bid_id))?;
        completed_steps.push(STEP_LOCK_REQUEST);

        tracing::info!(%saga_id, step = STEP_ACCEPT_BID, "saga step started");
        bid.transition(BidStatus::Accepted, now).step(STEP_ACCEPT_BID)?;
        uow.update_bid(&bid, BidStatus::Pending)
            .await
            .step(STEP_ACCEPT_BID)?;
        completed_steps.push(STEP_ACCEPT_BID);

        tracing::info!(%saga_id, step = STEP_REJECT_SIBLINGS, "saga step started");
        let rejected_bids = uow
            .reject_pending_bids(request.id, bid.id, now)
            .await
            .step(STEP_REJECT_SIBLINGS)?;
        completed_steps.push(STEP_REJECT_SIBLINGS);

        tracing::info!(%saga_id, step = STEP_FULFILL_REQUEST, "saga step started");
        request.fulfill(bid.id, now).step(STEP_FULFILL_REQUEST)?;
        uow.update_request(&request, RequestStatus::Open)
            .await
            .step(STEP_FULFILL_REQUEST)?;
        completed_steps.push(STEP_FULFILL_REQUEST);

        tracing::info!(%saga_id, step = STEP_LOAD_SNAPSHOTS, "saga step started");
        let product = uow
            .get_product(bid.product_id)
            .await
            .step(STEP_LOAD_SNAPSHOTS)?
            .ok_or_else(|| {
                SagaError::not_found("product", bid.product_id).in_step(STEP_LOAD_SNAPSHOTS)
            })?;
        let supplier = party_for_user(uow.as_mut(), bid.supplier_id, &bid.supplier_name)
            .await
            .step(STEP_LOAD_SNAPSHOTS)?;
        completed_steps.push(STEP_LOAD_SNAPSHOTS);

        tracing::info!(%saga_id, step = STEP_APPEND_CART_LINE, "saga step started");
        uow.upsert_cart(actor.user_id, now)
            .await
            .step(STEP_APPEND_CART_LINE)?;
        let line = CartItem::from_accepted_bid(&bid, &product, now).step(STEP_APPEND_CART_LINE)?;
        let cart_item = uow
            .append_item(actor.user_id, &line)
            .await
            .step(STEP_APPEND_CART_LINE)?;
        completed_steps.push(STEP_APPEND_CART_LINE);

        tracing::info!(%saga_id, step = STEP_COMMIT, "saga step started");
        uow.commit().await.step(STEP_COMMIT)?;
        completed_steps.push(STEP_COMMIT);

        Ok(AcceptanceReceipt {
            saga_id,
            bid,
            request,
            rejected_bids,
            cart_item,
            supplier,
            completed_steps,
        })
    }
}
