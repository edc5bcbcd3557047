pub mod hot_reload;
pub mod plugin;
pub mod proxy;
pub mod recorder;
pub mod route_table;

pub use hot_reload::HotReloadManager;
pub use plugin::{Plugin, PluginChain, PluginError, PluginFactory, PluginRegistry};
pub use proxy::{ProxyAdapter, ProxyError};
pub use recorder::{ResponseRecorder, ResponseSummary};
pub use route_table::{RouteHandler, RouteTable, RouteTableBuilder, RouteTarget};
