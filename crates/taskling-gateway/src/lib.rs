pub mod router;
pub mod server;

pub use router::build_router;
pub use server::GatewayServer;
