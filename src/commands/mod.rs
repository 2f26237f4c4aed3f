pub mod assume;
pub mod completions;
pub mod init;
pub mod unassume;

pub use assume::AssumeCommand;
pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use unassume::UnassumeCommand;
