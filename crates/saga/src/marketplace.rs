use store::MarketStore;

use crate::checkout::OrderMaterializer;
use crate::coordinator::BidAcceptanceSaga;
use crate::services::{
    BidService, CartService, CatalogService, DirectoryService, OrderService, RequestService,
};
use crate::settings::MarketSettings;

/// Every marketplace service wired to one store.
#[derive(Clone)]
pub struct Marketplace<S> {
    pub directory: DirectoryService<S>,
    pub catalog: CatalogService<S>,
    pub requests: RequestService<S>,
    pub bids: BidService<S>,
    pub acceptance: BidAcceptanceSaga<S>,
    pub cart: CartService<S>,
    pub materializer: OrderMaterializer<S>,
    pub orders: OrderService<S>,
}

impl<S: MarketStore + Clone> Marketplace<S> {
    pub fn new(store: S, settings: MarketSettings) -> Self {
        Self {
            directory: DirectoryService::new(store.clone()),
            catalog: CatalogService::new(store.clone(), settings),
            requests: RequestService::new(store.clone(), settings),
            bids: BidService::new(store.clone()),
            acceptance: BidAcceptanceSaga::new(store.clone()),
            cart: CartService::new(store.clone()),
            materializer: OrderMaterializer::new(store.clone()),
            orders: OrderService::new(store),
        }
    }
}
