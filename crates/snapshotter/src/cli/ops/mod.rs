pub mod cleanup;
pub mod destroy;
pub mod list;
pub mod reconnect;

pub use cleanup::Cleanup;
pub use destroy::Destroy;
pub use list::List;
pub use reconnect::Reconnect;
