#![forbid(unsafe_code)]

pub mod account_service;
pub mod app_services;
pub mod config;
pub mod error;
mod lookup;
pub mod messaging_service;
pub mod pairing_service;
pub mod progress_service;
pub mod testing_service;

pub use mentor_core::Clock;

pub use account_service::{AccountService, Dashboard};
pub use app_services::AppServices;
pub use config::AppConfig;
pub use error::{AppServicesError, ConfigError, Entity, ForbiddenReason, ServiceError};
pub use messaging_service::{InboxEntry, MessagingService};
pub use pairing_service::{
    MeetingRequest, MenteeSummary, MentorDashboard, PairingService, UnpairedLearner,
};
pub use progress_service::{ProgressService, SessionDetail, SessionListItem};
pub use testing_service::TestingService;
