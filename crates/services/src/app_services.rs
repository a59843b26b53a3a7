use std::sync::Arc;

use mentor_core::policy::Policies;
use mentor_core::quiz::QuestionBankSet;
use storage::repository::Storage;

use crate::Clock;
use crate::account_service::AccountService;
use crate::config::AppConfig;
use crate::error::AppServicesError;
use crate::messaging_service::MessagingService;
use crate::pairing_service::PairingService;
use crate::progress_service::ProgressService;
use crate::testing_service::TestingService;

/// Assembles the app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    accounts: Arc<AccountService>,
    pairing: Arc<PairingService>,
    progress: Arc<ProgressService>,
    testing: Arc<TestingService>,
    messaging: Arc<MessagingService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the question banks fail to load or
    /// storage initialization fails.
    pub async fn from_config(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let banks = config.question_banks()?;
        let storage = Storage::sqlite(&config.db_url).await?;
        Ok(Self::new(storage, clock, config.policy, banks))
    }

    /// Build services over the in-memory backend with the bundled banks.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the bundled banks are broken.
    pub fn in_memory(clock: Clock, policies: Policies) -> Result<Self, AppServicesError> {
        let banks = AppConfig::default().question_banks()?;
        Ok(Self::new(Storage::in_memory(), clock, policies, banks))
    }

    #[must_use]
    pub fn new(storage: Storage, clock: Clock, policies: Policies, banks: QuestionBankSet) -> Self {
        let accounts = Arc::new(AccountService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
            Arc::clone(&storage.messages),
        ));
        let pairing = Arc::new(PairingService::new(
            clock,
            policies,
            Arc::clone(&storage.users),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            policies.completion_stamp,
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
        ));
        let testing = Arc::new(TestingService::new(
            clock,
            Arc::new(banks),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.curriculum),
        ));
        let messaging = Arc::new(MessagingService::new(
            clock,
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.messages),
        ));

        Self {
            accounts,
            pairing,
            progress,
            testing,
            messaging,
        }
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }

    #[must_use]
    pub fn pairing(&self) -> Arc<PairingService> {
        Arc::clone(&self.pairing)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn testing(&self) -> Arc<TestingService> {
        Arc::clone(&self.testing)
    }

    #[must_use]
    pub fn messaging(&self) -> Arc<MessagingService> {
        Arc::clone(&self.messaging)
    }
}
