pub mod postgres_activity;
pub mod postgres_conversation;
pub mod postgres_identity;
pub mod postgres_presence;

pub use postgres_activity::PostgresActivityRepository;
pub use postgres_conversation::PostgresConversationRepository;
pub use postgres_identity::PostgresIdentityRepository;
pub use postgres_presence::PostgresPresenceRepository;
