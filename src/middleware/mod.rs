pub mod identity;
pub mod response;

pub use identity::{attach, strip_hop_by_hop, strip_identity_headers};
pub use response::ApiResponse;
