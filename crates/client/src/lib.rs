pub mod bootstrap;
pub mod gateway;
pub mod services;

pub use bootstrap::connect;
pub use gateway::{DocumentGateway, GatewayError, HttpDocumentGateway, InMemoryDocumentGateway};
pub use services::{
    ApprovalDesk, FulfillmentOptions, FulfillmentSession, RequestBoard, RequestSubmitter,
};
