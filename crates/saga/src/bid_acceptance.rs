//! Bid acceptance saga constants.

/// The saga type identifier for bid acceptance.
pub const SAGA_TYPE: &str = "BidAcceptance";

/// Step name: Load the bid and its request and check the caller owns it.
pub const STEP_LOAD_BID: &str = "load_bid";

/// Step name: Lock the request and confirm it is still open.
pub const STEP_LOCK_REQUEST: &str = "lock_request";

/// Step name: Move the winning bid from pending to accepted.
pub const STEP_ACCEPT_BID: &str = "accept_bid";

/// Step name: Reject every other pending bid on the request.
pub const STEP_REJECT_SIBLINGS: &str = "reject_siblings";

/// Step name: Mark the request fulfilled by the winning bid.
pub const STEP_FULFILL_REQUEST: &str = "fulfill_request";

/// Step name: Re-read the product and supplier snapshots.
pub const STEP_LOAD_SNAPSHOTS: &str = "load_snapshots";

/// Step name: Put the bid line into the buyer's cart.
pub const STEP_APPEND_CART_LINE: &str = "append_cart_line";

/// Step name: Commit the unit of work.
pub const STEP_COMMIT: &str = "commit";
