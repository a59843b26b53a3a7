#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    CurriculumRepository, InMemoryRepository, MessageRepository, ProfileRepository, Storage,
    StorageError, UserRepository,
};
