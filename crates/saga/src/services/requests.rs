//! Buyer sourcing requests.

use chrono::Utc;
use common::RequestId;
use domain::{Actor, DisplayStatus, NewRequest, Request, RequestStatus, Role};
use serde::Serialize;
use store::{MarketStore, MarketStoreExt, RequestFilter};

use crate::error::{Result, SagaError};
use crate::services::numbering::assign_request_number;
use crate::services::require_role;
use crate::settings::MarketSettings;

/// A request together with its display status at read time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub display_status: DisplayStatus,
}

impl RequestView {
    fn at_now(request: Request) -> Self {
        let display_status = request.display_status(Utc::now());
        Self {
            request,
            display_status,
        }
    }
}

#[derive(Clone)]
pub struct RequestService<S> {
    store: S,
    settings: MarketSettings,
}

impl<S: MarketStore + Clone> RequestService<S> {
    pub fn new(store: S, settings: MarketSettings) -> Self {
        Self { store, settings }
    }

    #[tracing::instrument(skip(self, input), fields(buyer_id = %actor.user_id))]
    pub async fn create_request(&self, actor: &Actor, input: NewRequest) -> Result<RequestView> {
        require_role(actor, Role::Buyer, "post requests")?;
        let mut request = Request::create(
            RequestId::new(),
            actor.user_id,
            input,
            self.settings.request_ttl,
            Utc::now(),
        )?;

        let mut uow = self.store.begin().await?;
        assign_request_number(uow.as_mut(), &mut request).await?;
        uow.insert_request(&request).await?;
        uow.commit().await?;

        tracing::info!(request_id = %request.id, number = %request.request_number, "request opened");
        Ok(RequestView::at_now(request))
    }

    /// Open requests are visible to every supplier; anything else only to
    /// the owning buyer.
    pub async fn get_request(&self, actor: &Actor, id: RequestId) -> Result<RequestView> {
        let request = self
            .store
            .request(id)
            .await?
            .ok_or_else(|| SagaError::not_found("request", id))?;
        let visible = match actor.role {
            Role::Buyer => request.buyer_id == actor.user_id,
            Role::Supplier => request.status == RequestStatus::Open,
        };
        if !visible {
            return Err(SagaError::forbidden("request belongs to another buyer"));
        }
        Ok(RequestView::at_now(request))
    }

    /// Buyers see their own requests; suppliers see the open, unexpired ones.
    pub async fn list_requests(&self, actor: &Actor) -> Result<Vec<RequestView>> {
        let now = Utc::now();
        let requests = match actor.role {
            Role::Buyer => self.store.requests(RequestFilter::for_buyer(actor.user_id)).await?,
            Role::Supplier => self
                .store
                .requests(RequestFilter::open())
                .await?
                .into_iter()
                .filter(|r| !r.is_expired(now))
                .collect(),
        };
        Ok(requests.into_iter().map(RequestView::at_now).collect())
    }

    /// Closes an open request without accepting a bid.
    #[tracing::instrument(skip(self), fields(buyer_id = %actor.user_id))]
    pub async fn close_request(&self, actor: &Actor, id: RequestId) -> Result<RequestView> {
        require_role(actor, Role::Buyer, "close requests")?;

        let mut uow = self.store.begin().await?;
        let mut request = uow
            .lock_request(id)
            .await?
            .ok_or_else(|| SagaError::not_found("request", id))?;
        if request.buyer_id != actor.user_id {
            return Err(SagaError::forbidden("request belongs to another buyer"));
        }
        request.close(Utc::now())?;
        uow.update_request(&request, RequestStatus::Open).await?;
        uow.commit().await?;
        Ok(RequestView::at_now(request))
    }
}
