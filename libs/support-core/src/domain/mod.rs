pub mod date_range;
pub mod local_clock;
pub mod payment;
pub mod phone;

pub use date_range::DateRange;
pub use local_clock::LocalClock;
pub use payment::payment_label;
pub use phone::{PhoneInput, PhoneNumber};

/// Internal primary key of a registered user.
pub type UserId = i64;
