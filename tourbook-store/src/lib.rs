pub mod app_config;
pub mod database;
pub mod memory;

mod availability_repo;
mod booking_repo;
mod catalog_repo;
mod db_error;
mod payment_repo;
mod user_repo;
mod vendor_repo;

pub use availability_repo::StoreAvailabilityRepository;
pub use booking_repo::StoreBookingRepository;
pub use catalog_repo::{StoreCategoryRepository, StoreTourRepository};
pub use database::DbClient;
pub use memory::MemoryStore;
pub use payment_repo::StorePaymentRepository;
pub use user_repo::{StorePasswordResetRepository, StoreUserRepository};
pub use vendor_repo::StoreVendorRepository;
