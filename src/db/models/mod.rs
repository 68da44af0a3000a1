#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` pick up every row type.

pub mod keyword_subscription;
pub mod notification;
pub mod reminder;
pub mod reservation;
pub mod venue;

pub use self::keyword_subscription::*;
pub use self::notification::*;
pub use self::reminder::*;
pub use self::reservation::*;
pub use self::venue::*;
