//! Workspace auto-discovery for plughost.
//!
//! Finds sub-projects of a workspace root that have a live dev server and
//! registers them with the dev loader and the webview manager.

pub mod descriptor;
pub mod ports;
pub mod scanner;

pub use descriptor::{read_descriptor, DevelopmentOptions, ProjectDescriptor};
pub use ports::{extract_port, find_running_port, is_port_in_use, PortProbe, TcpPortProbe};
pub use scanner::{ProjectConfig, ScannerSettings, WorkspaceScanner};
