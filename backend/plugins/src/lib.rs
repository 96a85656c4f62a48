pub mod dev_loader;
pub mod installer;
pub mod lifecycle;
pub mod manager;
pub mod manifest;
pub mod router;
pub mod store;
pub mod watcher;
pub mod webview;

pub use dev_loader::{dev_server_port, DevLoaderSettings, DevLoaderStores, DevPluginSummary, PluginDevLoader};
pub use installer::DirectoryInstaller;
pub use manager::PluginManager;
pub use manifest::{load_manifest, MANIFEST_FILE_NAME};
pub use router::{Command, CommandRouter};
pub use store::MemoryPluginStore;
pub use watcher::{ChangeCallback, ChangeFilter, CreatedCallback, DirectoryWatch, SourceWatch};
pub use webview::PluginWebviewManager;
