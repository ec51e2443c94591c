use std::sync::Arc;

use tourbook_booking::{BookingManager, BookingPolicy, PaymentOrchestrator};
use tourbook_core::repository::{
    AvailabilityRepository, BookingRepository, CategoryRepository, PasswordResetRepository,
    PaymentRepository, TourRepository, UserRepository, VendorRepository,
};
use tourbook_store::app_config::{self, BusinessRules};
use tourbook_store::{
    DbClient, MemoryStore, StoreAvailabilityRepository, StoreBookingRepository, StoreCategoryRepository,
    StorePasswordResetRepository, StorePaymentRepository, StoreTourRepository,
    StoreUserRepository, StoreVendorRepository,
};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
    pub reset_token_ttl: u64,
}

impl From<&app_config::AuthConfig> for AuthConfig {
    fn from(cfg: &app_config::AuthConfig) -> Self {
        Self {
            secret: cfg.jwt_secret.clone(),
            expiration: cfg.jwt_expiration_seconds,
            bcrypt_cost: cfg.bcrypt_cost,
            cookie_secure: cfg.cookie_secure,
            reset_token_ttl: cfg.reset_token_ttl_seconds,
        }
    }
}

/// One handle per entity, all backed by the same store.
#[derive(Clone)]
pub struct Repositories {
    pub tours: Arc<dyn TourRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub users: Arc<dyn UserRepository>,
    pub resets: Arc<dyn PasswordResetRepository>,
    pub vendors: Arc<dyn VendorRepository>,
    pub availability: Arc<dyn AvailabilityRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Repositories {
    pub fn postgres(db: &DbClient) -> Self {
        let pool = db.pool.clone();
        Self {
            tours: Arc::new(StoreTourRepository::new(pool.clone())),
            categories: Arc::new(StoreCategoryRepository::new(pool.clone())),
            users: Arc::new(StoreUserRepository::new(pool.clone())),
            resets: Arc::new(StorePasswordResetRepository::new(pool.clone())),
            vendors: Arc::new(StoreVendorRepository::new(pool.clone())),
            availability: Arc::new(StoreAvailabilityRepository::new(pool.clone())),
            bookings: Arc::new(StoreBookingRepository::new(pool.clone())),
            payments: Arc::new(StorePaymentRepository::new(pool)),
        }
    }

    pub fn shared(store: Arc<MemoryStore>) -> Self {
        Self {
            tours: store.clone(),
            categories: store.clone(),
            users: store.clone(),
            resets: store.clone(),
            vendors: store.clone(),
            availability: store.clone(),
            bookings: store.clone(),
            payments: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub tours: Arc<dyn TourRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub users: Arc<dyn UserRepository>,
    pub resets: Arc<dyn PasswordResetRepository>,
    pub vendors: Arc<dyn VendorRepository>,
    pub availability: Arc<dyn AvailabilityRepository>,
    pub bookings: Arc<BookingManager>,
    pub payments: Arc<PaymentOrchestrator>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(repos: Repositories, auth: AuthConfig, business_rules: BusinessRules) -> Self {
        let policy = BookingPolicy {
            number_prefix: business_rules.booking_number_prefix.clone(),
            number_attempts: business_rules.booking_number_attempts,
        };
        let bookings = BookingManager::new(repos.bookings, repos.availability.clone(), policy);
        let payments = PaymentOrchestrator::new(repos.payments, business_rules.default_currency.clone());

        Self {
            tours: repos.tours,
            categories: repos.categories,
            users: repos.users,
            resets: repos.resets,
            vendors: repos.vendors,
            availability: repos.availability,
            bookings: Arc::new(bookings),
            payments: Arc::new(payments),
            auth,
            business_rules,
        }
    }
}
