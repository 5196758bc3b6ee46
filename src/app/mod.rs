//! Application layer containing business logic and shared state.

pub mod allocator;
pub mod monitor;
pub mod payment;
pub mod price_oracle;
pub mod reference;
pub mod retry;
pub mod service;
pub mod state;

pub use allocator::SeatAllocator;
pub use monitor::{
    MonitorCallback, MonitorConfig, MonitorEvent, MonitorSupervisor, logging_callback,
    spawn_monitor,
};
pub use payment::{PaymentStateMachine, status_message};
pub use price_oracle::{Conversion, PriceOracle, fallback_rate, round_amount};
pub use reference::{ReferenceGenerator, parse_order_id};
pub use retry::{RetryPolicy, retry_on_conflict};
pub use service::{AppService, ServiceConfig};
pub use state::AppState;
