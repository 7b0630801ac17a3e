pub use super::adapted_faq::Entity as AdaptedFaq;
pub use super::competitor_faq::Entity as CompetitorFaq;
pub use super::conversation::Entity as Conversation;
pub use super::customer::Entity as Customer;
pub use super::dead_letter_message::Entity as DeadLetterMessage;
pub use super::import_job::Entity as ImportJob;
pub use super::message::Entity as Message;
pub use super::owner_faq::Entity as OwnerFaq;
pub use super::queue_message::Entity as QueueMessage;
pub use super::sender_rule::Entity as SenderRule;
pub use super::staging_message::Entity as StagingMessage;
pub use super::voice_profile::Entity as VoiceProfile;
pub use super::worker_lock::Entity as WorkerLock;
pub use super::workspace::Entity as Workspace;
