pub mod app_config;
pub mod database;
pub mod events;
pub mod redis_repo;
pub mod reservation_repo;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisLockStore;
pub use reservation_repo::PgReservationStore;
