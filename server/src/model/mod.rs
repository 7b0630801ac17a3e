pub mod conversation;
pub mod customer;
pub mod faq;
pub mod import_job;
pub mod message;
pub mod queue;
pub mod sender_rule;
pub mod staging_message;
pub mod voice_profile;
pub mod worker_lock;
pub mod workspace;
