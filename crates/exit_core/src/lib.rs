pub mod catalog;
pub mod chat;
pub mod counter;
pub mod domain;
pub mod ports;
pub mod quotes;

pub use domain::{
    ChatMode, ChatRole, ChatTurn, CounterReading, CounterState, FederatedIdentity,
    IdentityProvider, PendingLink, PhoneVerification, Quote, ResourceModule, StartSource, User,
    UserCredentials,
};
pub use ports::{
    DatabaseService, FederatedTokenVerifier, GenerativeTextService, PortError, PortResult,
    SmsSender,
};
