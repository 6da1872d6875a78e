// Request forwarding core
//
// route   - route table and path translation
// forward - outbound call and transport error mapping
// router  - composition of auth, identity propagation and forwarding
pub mod forward;
pub mod route;
pub mod router;

pub use forward::{ForwardRequest, ForwardResult, Forwarder, HttpForwarder};
pub use route::{translate, RouteRule, RouteTable};
pub use router::{proxy_handler, Gateway};
