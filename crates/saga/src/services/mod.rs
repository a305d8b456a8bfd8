//! Application services.
//!
//! Every call takes the resolved [`Actor`]. Role and ownership checks run
//! before a unit of work is opened; everything that writes runs inside
//! exactly one unit of work.

pub mod bidding;
pub mod cart;
pub mod catalog;
pub mod directory;
pub(crate) mod numbering;
pub mod orders;
pub mod requests;

use domain::{Actor, Role};

use crate::error::{Result, SagaError};

pub use bidding::BidService;
pub use cart::{AddToCart, CartService, CartView};
pub use catalog::CatalogService;
pub use directory::{DirectoryService, ProfileInput};
pub use orders::OrderService;
pub use requests::{RequestService, RequestView};

/// Refuses callers that do not hold `role`.
pub(crate) fn require_role(actor: &Actor, role: Role, action: &str) -> Result<()> {
    if actor.role != role {
        return Err(SagaError::forbidden(format!("only a {role} can {action}")));
    }
    Ok(())
}
