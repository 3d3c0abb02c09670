#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod sessions;

pub use learn_core::Clock;

pub use config::GatewayConfig;
pub use error::{ConfigError, FlowError, GatewayError};
pub use gateway::{
    AdvanceRequest, CallCounts, ContentKey, GradeRequest, HttpSessionGateway,
    InMemoryStudyServer, SessionGateway, TopicFixture,
};

pub use sessions::{
    FallbackController, GradeOutcome, ItemGrader, LoadOutcome, PhaseContent, PhaseDataLoader,
    ProgressAdvancer, SessionOrchestrator, SessionProgress, Transition,
};
