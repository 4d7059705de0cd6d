pub mod datasource;
pub mod marketcap;
pub mod mock;
pub mod notifier;
