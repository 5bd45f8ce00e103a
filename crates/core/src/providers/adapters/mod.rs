//! Provider adapter implementations.

mod command_provider;
pub mod mock_provider;

pub use command_provider::CommandProvider;
pub use mock_provider::MockProvider;
