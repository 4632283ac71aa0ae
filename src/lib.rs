pub mod alerts;
pub mod annotate;
pub mod app;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod fields;
pub mod health;
pub mod history;
pub mod http;
pub mod keys;
pub mod metrics;
pub mod model;
pub mod view;
pub mod zabbix;

pub use app::AppContext;
pub use fields::WidgetFields;
pub use view::{WidgetPayload, render};
