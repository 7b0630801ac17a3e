pub mod prelude;

pub mod adapted_faq;
pub mod competitor_faq;
pub mod conversation;
pub mod customer;
pub mod dead_letter_message;
pub mod import_job;
pub mod message;
pub mod owner_faq;
pub mod queue_message;
pub mod sender_rule;
pub mod staging_message;
pub mod voice_profile;
pub mod worker_lock;
pub mod workspace;
