//! distodo client
//!
//! The real-time gateway connection with its command and interaction
//! registries, the REST API client, and the bulk-deletion workflow.

pub mod api_client;
pub mod gateway;
pub mod purge;

pub use api_client::{ApiClient, JsonResponse};
pub use gateway::{
    CommandHandler, Gateway, GatewayConfig, GatewayError, GatewayHandle, InteractionHandler,
    InteractionMissPolicy, ReconnectConfig, SessionSnapshot, Token,
};
pub use purge::{spawn_purge, PurgeEvent, PurgeHandle, PurgePlan, PurgeSummary};
