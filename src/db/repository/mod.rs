pub mod directory;
pub mod hospital_reservation;
pub mod hotel_reservation;
pub mod keyword_subscription;
pub mod notification_repository;
pub mod reminder_repository;

pub use directory::DirectoryRepository;
pub use hospital_reservation::HospitalReservationRepository;
pub use hotel_reservation::HotelReservationRepository;
pub use keyword_subscription::KeywordSubscriptionRepository;
pub use notification_repository::NotificationRepository;
pub use reminder_repository::ReminderRepository;
