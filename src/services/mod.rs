pub mod availability;
pub mod content;
pub mod directory;
pub mod init;
pub mod keywords;
pub mod live;
pub mod notifications;
pub mod reminders;
pub mod reservations;
