mod root;
mod transfer;
mod watch;

pub use root::{Cli, Commands, DeleteCommand, Services};
pub use transfer::{ExportCommand, ImportCommand};
pub use watch::WatchCommand;
