//! Table screens: upload records (audit queue) and user management.

mod records;
mod table;
mod users;

pub use records::RecordsScreen;
pub use table::LatestFetch;
pub use users::{UserRow, UsersScreen};
