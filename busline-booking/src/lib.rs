pub mod error;
pub mod events;
pub mod coordinator;

pub use error::BookingError;
pub use events::{SeatEvent, SeatEventKind};
pub use coordinator::BookingCoordinator;
