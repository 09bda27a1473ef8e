pub mod access;
pub mod domain;
pub mod orders;
pub mod partners;
pub mod ports;
pub mod workflow;

#[cfg(test)]
mod memory;

pub use access::{AccessPolicy, DocumentAccess, GrantedAccess, TokenRejection};
pub use domain::{
    AccessToken, AuthSession, Customer, Document, DocumentReview, DocumentVersion, DocumentView,
    Measurement, Order, OrderStatus, OrderStatusEntry, PartnerLogin, Partnership,
    PartnershipStatus, ReviewDecision, ReviewStatus, Role, UploadReason, User, UserCredentials,
};
pub use orders::{OrderDesk, PlacedOrder};
pub use partners::PartnerOnboarding;
pub use ports::{
    AccessTokenStore, AuthStore, CustomerStore, DocumentStore, OrderStore, PartnershipStore,
    PortError, PortResult, SpeechToTextService, TextToSpeechService,
};
pub use workflow::DocumentWorkflow;
